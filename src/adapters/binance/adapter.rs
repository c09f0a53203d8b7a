//! Binance Adapter Implementation
//!
//! Two connections, one per market segment (spot and USD-M futures). Every
//! SUBSCRIBE frame goes to both so a symbol is quoted on each segment.
//! Only `aggTrade` events produce ticks.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::adapters::errors::{ExchangeError, ExchangeResult};
use crate::adapters::shared::{ConnectionConfig, EventSink, ResilientConnection};
use crate::adapters::symbols::{binance_stream_symbol, requested_symbol, SymbolRegistry};
use crate::adapters::traits::ExchangeAdapter;
use crate::adapters::types::{Exchange, MarketType, StreamKind, SubscriptionSet, Symbols};
use crate::core::types::MarketEvent;

use super::config::{BinanceConfig, MAX_STREAMS_PER_FRAME};
use super::types::{decode_message, SubscribeRequest};

// =============================================================================
// BinanceAdapter
// =============================================================================

/// Binance market data adapter implementing ExchangeAdapter
pub struct BinanceAdapter {
    config: BinanceConfig,
    spot: ResilientConnection,
    futures: ResilientConnection,
    subscriptions: SubscriptionSet,
    /// Shared with both decoders
    symbols: SymbolRegistry,
    next_request_id: u64,
}

impl BinanceAdapter {
    /// Create the adapter; no I/O happens until `connect()`
    pub fn new(config: BinanceConfig, events: mpsc::Sender<MarketEvent>) -> Self {
        let sink = EventSink::new(Exchange::Binance, events);
        let symbols = SymbolRegistry::new();
        let spot = Self::segment_connection(
            &config,
            &config.spot_ws_url,
            MarketType::Spot,
            &sink,
            &symbols,
        );
        let futures = Self::segment_connection(
            &config,
            &config.futures_ws_url,
            MarketType::Fut,
            &sink,
            &symbols,
        );

        Self {
            config,
            spot,
            futures,
            subscriptions: SubscriptionSet::new(),
            symbols,
            next_request_id: 1,
        }
    }

    fn segment_connection(
        config: &BinanceConfig,
        url: &str,
        market_type: MarketType,
        sink: &EventSink,
        symbols: &SymbolRegistry,
    ) -> ResilientConnection {
        let symbols = symbols.clone();
        let handler = sink.connection_handler(Some(market_type), move |text| {
            decode_message(text, market_type, &symbols)
        });
        ResilientConnection::new(
            format!("binance-{}", market_type.as_str().to_ascii_lowercase()),
            ConnectionConfig::new(url).with_backoff(config.backoff.clone()),
            handler,
        )
    }

    pub fn config(&self) -> &BinanceConfig {
        &self.config
    }

    /// Stream names (`btcusdt@aggTrade`) for pairs not yet subscribed
    fn new_stream_params(&self, symbols: &Symbols) -> Vec<(String, StreamKind, String)> {
        let mut seen: HashSet<(String, StreamKind)> = HashSet::new();
        let mut pending = Vec::new();

        for raw in symbols.iter() {
            let Some(symbol) = requested_symbol(raw) else {
                tracing::warn!(exchange = "Binance", symbol = %raw, "Skipping empty symbol");
                continue;
            };
            for stream in &self.config.streams {
                let Some(suffix) = stream.binance_suffix() else {
                    continue;
                };
                if self.subscriptions.contains(&symbol, *stream)
                    || !seen.insert((symbol.clone(), *stream))
                {
                    continue;
                }
                let param = format!("{}@{}", binance_stream_symbol(&symbol), suffix);
                pending.push((symbol.clone(), *stream, param));
            }
        }
        pending
    }

    fn take_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }
}

#[async_trait]
impl ExchangeAdapter for BinanceAdapter {
    async fn connect(&mut self) -> ExchangeResult<()> {
        tracing::info!(
            exchange = "Binance",
            spot = %self.spot.url(),
            futures = %self.futures.url(),
            "Connecting"
        );
        let (spot, futures) = tokio::join!(self.spot.connect(), self.futures.connect());
        spot?;
        futures?;
        tracing::info!(exchange = "Binance", "Spot and futures streams connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> ExchangeResult<()> {
        tokio::join!(self.spot.close(), self.futures.close());
        tracing::info!(exchange = "Binance", "Disconnected");
        Ok(())
    }

    async fn subscribe(&mut self, symbols: Symbols) -> ExchangeResult<usize> {
        let pending = self.new_stream_params(&symbols);
        if pending.is_empty() {
            tracing::debug!(exchange = "Binance", "Nothing new to subscribe");
            return Ok(0);
        }

        // Registered before any frame goes out so the first trade already resolves
        for (symbol, _, _) in &pending {
            self.symbols.register(symbol);
        }

        let params: Vec<String> = pending.iter().map(|(_, _, param)| param.clone()).collect();
        for chunk in params.chunks(MAX_STREAMS_PER_FRAME) {
            let spot_id = self.take_request_id();
            let futures_id = self.take_request_id();
            let failed = |e: &dyn std::fmt::Display| ExchangeError::SubscriptionFailed {
                symbol: chunk.join(","),
                reason: e.to_string(),
            };
            let spot_frame = serde_json::to_string(&SubscribeRequest::subscribe(chunk, spot_id))
                .map_err(|e| failed(&e))?;
            let futures_frame =
                serde_json::to_string(&SubscribeRequest::subscribe(chunk, futures_id))
                    .map_err(|e| failed(&e))?;
            self.spot.send_replayed(spot_frame).map_err(|e| failed(&e))?;
            self.futures.send_replayed(futures_frame).map_err(|e| failed(&e))?;
        }

        for (symbol, stream, _) in &pending {
            self.subscriptions.insert(symbol, *stream);
        }
        tracing::info!(
            exchange = "Binance",
            streams = ?params,
            "Subscribed"
        );
        Ok(pending.len())
    }

    fn subscriptions(&self) -> &SubscriptionSet {
        &self.subscriptions
    }

    fn is_connected(&self) -> bool {
        self.spot.is_open() && self.futures.is_open()
    }

    fn exchange(&self) -> Exchange {
        Exchange::Binance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter_with_streams(streams: Vec<StreamKind>) -> BinanceAdapter {
        let (tx, _rx) = mpsc::channel(8);
        let config = BinanceConfig {
            streams,
            ..BinanceConfig::default()
        };
        BinanceAdapter::new(config, tx)
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let mut adapter = adapter_with_streams(vec![StreamKind::AggTrade]);
        assert_eq!(adapter.subscribe("BTCUSDT".into()).await.unwrap(), 1);
        assert_eq!(adapter.subscribe("BTC-USDT".into()).await.unwrap(), 0);
        assert_eq!(adapter.subscribe("btc".into()).await.unwrap(), 0);
        assert_eq!(adapter.subscriptions().len(), 1);
        // One frame queued per segment, nothing for the repeats
        assert_eq!(adapter.spot.snapshot().pending_sends, 1);
        assert_eq!(adapter.futures.snapshot().pending_sends, 1);
    }

    #[tokio::test]
    async fn test_subscribe_dedups_within_one_call() {
        let mut adapter = adapter_with_streams(vec![StreamKind::AggTrade, StreamKind::BookTicker]);
        let added = adapter
            .subscribe(["BTC-USDT", "BTCUSDT", "ETH-USDT"].into())
            .await
            .unwrap();
        assert_eq!(added, 4);
        assert!(adapter.subscriptions().contains("ETH-USDT", StreamKind::BookTicker));
    }

    #[test]
    fn test_stream_params_format() {
        let adapter = adapter_with_streams(vec![StreamKind::AggTrade, StreamKind::Depth]);
        let params: Vec<String> = adapter
            .new_stream_params(&"ETH-USDC".into())
            .into_iter()
            .map(|(_, _, p)| p)
            .collect();
        assert_eq!(params, vec!["ethusdc@aggTrade", "ethusdc@depth"]);
    }

    #[tokio::test]
    async fn test_subscribe_after_disconnect_fails() {
        let mut adapter = adapter_with_streams(vec![StreamKind::AggTrade]);
        adapter.disconnect().await.unwrap();
        match adapter.subscribe("BTC-USDT".into()).await {
            Err(ExchangeError::SubscriptionFailed { symbol, reason }) => {
                assert_eq!(symbol, "btcusdt@aggTrade");
                assert!(reason.contains("closed"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(adapter.subscriptions().is_empty());
        assert!(!adapter.is_connected());
    }
}
