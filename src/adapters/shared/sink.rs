//! Adapter-side event sink
//!
//! Connection handlers run on the connection task and must never block it,
//! so events go into the bounded pipeline channel with `try_send`. A full
//! pipeline drops the event.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::adapters::shared::connection::{ConnectionEvent, EventHandler};
use crate::adapters::types::{Exchange, MarketType};
use crate::core::types::MarketEvent;

/// Non-blocking sender of [`MarketEvent`]s for one exchange
#[derive(Debug, Clone)]
pub struct EventSink {
    exchange: Exchange,
    tx: mpsc::Sender<MarketEvent>,
}

impl EventSink {
    pub fn new(exchange: Exchange, tx: mpsc::Sender<MarketEvent>) -> Self {
        Self { exchange, tx }
    }

    pub fn exchange(&self) -> Exchange {
        self.exchange
    }

    /// Push an event into the pipeline without waiting
    pub fn emit(&self, event: MarketEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::debug!(
                    exchange = %self.exchange,
                    event = ?event,
                    "Pipeline channel full, dropping event"
                );
            }
            Err(TrySendError::Closed(_)) => {
                tracing::trace!(exchange = %self.exchange, "Pipeline closed, event discarded");
            }
        }
    }

    /// Build a connection handler that maps lifecycle events to
    /// [`MarketEvent`]s and hands every inbound message to `decode`.
    pub fn connection_handler<F>(&self, market_type: Option<MarketType>, mut decode: F) -> EventHandler
    where
        F: FnMut(&str) -> Option<MarketEvent> + Send + Sync + 'static,
    {
        let sink = self.clone();
        Box::new(move |event: ConnectionEvent<'_>| {
            let exchange = sink.exchange;
            match event {
                ConnectionEvent::Message(text) => {
                    if let Some(event) = decode(text) {
                        sink.emit(event);
                    }
                }
                ConnectionEvent::Open => sink.emit(MarketEvent::Connected {
                    exchange,
                    market_type,
                }),
                ConnectionEvent::Close => sink.emit(MarketEvent::Disconnected {
                    exchange,
                    market_type,
                }),
                ConnectionEvent::Error(message) => sink.emit(MarketEvent::Error { exchange, message }),
                ConnectionEvent::Reconnecting { attempt, delay } => {
                    sink.emit(MarketEvent::Reconnecting {
                        exchange,
                        market_type,
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                    })
                }
                ConnectionEvent::ReconnectExhausted { attempts } => sink.emit(MarketEvent::Error {
                    exchange,
                    message: format!("reconnect gave up after {} attempts", attempts),
                }),
                ConnectionEvent::Flushed { count } => {
                    tracing::debug!(exchange = %exchange, market_type = ?market_type, count, "Flushed queued frames");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::types::CanonicalTick;

    #[test]
    fn test_full_pipeline_drops_event() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = EventSink::new(Exchange::Binance, tx);
        let tick = CanonicalTick::new(Exchange::Binance, "BTC-USDT", MarketType::Spot, 1.0, 1);
        sink.emit(MarketEvent::MarketData(tick.clone()));
        sink.emit(MarketEvent::MarketData(tick));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_handler_maps_lifecycle() {
        let (tx, mut rx) = mpsc::channel(8);
        let sink = EventSink::new(Exchange::Okx, tx);
        let mut handler = sink.connection_handler(None, |_| None);

        handler(ConnectionEvent::Open);
        handler(ConnectionEvent::Message("ignored"));
        handler(ConnectionEvent::ReconnectExhausted { attempts: 3 });

        assert_eq!(
            rx.try_recv().unwrap(),
            MarketEvent::Connected {
                exchange: Exchange::Okx,
                market_type: None
            }
        );
        match rx.try_recv().unwrap() {
            MarketEvent::Error { exchange, message } => {
                assert_eq!(exchange, Exchange::Okx);
                assert!(message.contains("3 attempts"));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_handler_decodes_messages() {
        let (tx, mut rx) = mpsc::channel(8);
        let sink = EventSink::new(Exchange::Binance, tx);
        let mut handler = sink.connection_handler(Some(MarketType::Fut), |text| {
            text.parse::<f64>().ok().map(|price| {
                MarketEvent::MarketData(CanonicalTick::new(
                    Exchange::Binance,
                    "BTC-USDT",
                    MarketType::Fut,
                    price,
                    0,
                ))
            })
        });

        handler(ConnectionEvent::Message("42.5"));
        handler(ConnectionEvent::Message("not a price"));

        match rx.try_recv().unwrap() {
            MarketEvent::MarketData(tick) => assert_eq!(tick.price, 42.5),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }
}
