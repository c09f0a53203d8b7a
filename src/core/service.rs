//! Aggregation service
//!
//! Owns every adapter, the latest-price cache and the arbitrage detector.
//! Adapters push events into one bounded pipeline channel; a single pipeline
//! task applies each tick to the cache, runs the detector, and re-broadcasts
//! everything on the consumer event channel.
//!
//! Lifecycle is explicit: [`AggregationService::create`] builds adapters
//! without I/O, [`AggregationService::start`] spawns the pipeline and
//! connects all adapters concurrently, [`AggregationService::shutdown`]
//! ends every consumer stream.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::adapters::factory::{build_adapter, AdapterConfigs, AnyAdapter};
use crate::adapters::traits::ExchangeAdapter;
use crate::adapters::types::{Exchange, Symbols};
use crate::core::cache::FastLookupCache;
use crate::core::detector::{ArbitrageDetector, Detection, DetectorConfig};
use crate::core::events::{EventSubscription, DEFAULT_EVENT_CAPACITY};
use crate::core::types::{ArbitrageOpportunity, MarketEvent};
use crate::error::{AppError, Result};

/// Default capacity of the adapter → pipeline channel
pub const DEFAULT_PIPELINE_CAPACITY: usize = 4096;

// =============================================================================
// Configuration
// =============================================================================

/// Tunables for [`AggregationService`]
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub exchanges: Vec<Exchange>,
    pub adapters: AdapterConfigs,
    pub detector: DetectorConfig,
    pub pipeline_capacity: usize,
    pub event_capacity: usize,
    /// Per-adapter limit on the initial connect
    pub connect_timeout: Duration,
    /// Pause before incremental subscribes after the first start
    pub resubscribe_delay: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            exchanges: Exchange::ALL.to_vec(),
            adapters: AdapterConfigs::default(),
            detector: DetectorConfig::default(),
            pipeline_capacity: DEFAULT_PIPELINE_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            connect_timeout: Duration::from_secs(15),
            resubscribe_delay: Duration::from_millis(50),
        }
    }
}

// =============================================================================
// Service
// =============================================================================

enum Lifecycle {
    Created(mpsc::Receiver<MarketEvent>),
    Running(JoinHandle<()>),
    Stopped,
}

/// Single owner of adapters, cache and detector
pub struct AggregationService {
    config: ServiceConfig,
    adapters: tokio::sync::Mutex<Vec<AnyAdapter>>,
    cache: Arc<FastLookupCache>,
    detector: Arc<Mutex<ArbitrageDetector>>,
    /// Taken on shutdown so consumer streams end
    event_tx: Mutex<Option<broadcast::Sender<MarketEvent>>>,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
}

impl AggregationService {
    /// Build the service and its adapters. No network I/O happens here.
    pub fn create(config: ServiceConfig) -> Arc<Self> {
        let (pipeline_tx, pipeline_rx) = mpsc::channel(config.pipeline_capacity.max(1));
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));

        let mut exchanges = config.exchanges.clone();
        exchanges.sort();
        exchanges.dedup();
        let adapters = exchanges
            .into_iter()
            .map(|exchange| build_adapter(exchange, &config.adapters, pipeline_tx.clone()))
            .collect();

        Arc::new(Self {
            detector: Arc::new(Mutex::new(ArbitrageDetector::with_config(
                config.detector.clone(),
            ))),
            config,
            adapters: tokio::sync::Mutex::new(adapters),
            cache: Arc::new(FastLookupCache::new()),
            event_tx: Mutex::new(Some(event_tx)),
            lifecycle: tokio::sync::Mutex::new(Lifecycle::Created(pipeline_rx)),
        })
    }

    /// Spawn the pipeline and connect every adapter.
    ///
    /// A failing or slow adapter is logged and left reconnecting in the
    /// background; it never holds up the others. Calling this again on a
    /// running service does nothing.
    pub async fn start(&self) -> Result<()> {
        if self.spawn_pipeline().await? {
            self.connect_all().await;
        }
        Ok(())
    }

    /// Start on first use, then subscribe every adapter to `symbols`.
    ///
    /// On the first call the subscribe frames are queued before connecting,
    /// so each connection sends them as soon as it opens, whatever the
    /// other exchanges are doing. Later calls wait `resubscribe_delay` and
    /// subscribe incrementally; pairs already subscribed are skipped by the
    /// adapters.
    ///
    /// # Returns
    /// Number of newly subscribed (symbol, stream) pairs across adapters
    pub async fn start_market_data(&self, symbols: impl Into<Symbols>) -> Result<usize> {
        let symbols = symbols.into();
        if self.spawn_pipeline().await? {
            let added = self.subscribe_all(symbols).await;
            self.connect_all().await;
            return Ok(added);
        }
        tokio::time::sleep(self.config.resubscribe_delay).await;
        Ok(self.subscribe_all(symbols).await)
    }

    /// Register a consumer of the event stream.
    ///
    /// After [`shutdown`](Self::shutdown) the returned stream is already
    /// closed.
    pub fn subscribe(&self) -> EventSubscription {
        let rx = match self.event_tx.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            Some(tx) => tx.subscribe(),
            None => broadcast::channel(1).1,
        };
        EventSubscription::new(rx)
    }

    /// Shared read-only cache
    pub fn cache(&self) -> Arc<FastLookupCache> {
        Arc::clone(&self.cache)
    }

    /// Current opportunities, widest spread first
    pub fn opportunities(&self) -> Vec<ArbitrageOpportunity> {
        self.detector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .opportunities()
    }

    /// Connection state of each adapter
    pub async fn adapter_status(&self) -> Vec<(Exchange, bool)> {
        let adapters = self.adapters.lock().await;
        adapters
            .iter()
            .map(|adapter| (adapter.exchange(), adapter.is_connected()))
            .collect()
    }

    /// Total (symbol, stream) pairs subscribed across adapters
    pub async fn subscription_count(&self) -> usize {
        let adapters = self.adapters.lock().await;
        adapters.iter().map(|adapter| adapter.subscriptions().len()).sum()
    }

    /// Disconnect every adapter and stop the pipeline. Terminal.
    ///
    /// Consumers drain what was already broadcast, then see the end of
    /// their stream.
    pub async fn shutdown(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if matches!(*lifecycle, Lifecycle::Stopped) {
            return;
        }

        {
            let mut adapters = self.adapters.lock().await;
            join_all(adapters.iter_mut().map(|adapter| async move {
                let exchange = adapter.exchange();
                if let Err(e) = adapter.disconnect().await {
                    tracing::warn!(exchange = %exchange, error = %e, "Disconnect failed");
                }
            }))
            .await;
        }

        if let Lifecycle::Running(pipeline) = std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            pipeline.abort();
            // The task owns a sender clone; wait until it is dropped
            let _ = pipeline.await;
        }
        self.event_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        tracing::info!("Aggregation service stopped");
    }

    /// Returns `true` if this call spawned the pipeline
    async fn spawn_pipeline(&self) -> Result<bool> {
        let mut lifecycle = self.lifecycle.lock().await;
        let pipeline_rx = match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Created(rx) => rx,
            Lifecycle::Running(handle) => {
                *lifecycle = Lifecycle::Running(handle);
                return Ok(false);
            }
            Lifecycle::Stopped => {
                return Err(AppError::Config("aggregation service already shut down".into()));
            }
        };

        let events = self
            .event_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| AppError::Config("aggregation service already shut down".into()))?;

        let pipeline = tokio::spawn(run_pipeline(
            pipeline_rx,
            Arc::clone(&self.cache),
            Arc::clone(&self.detector),
            events,
        ));
        *lifecycle = Lifecycle::Running(pipeline);
        Ok(true)
    }

    async fn connect_all(&self) {
        let timeout = self.config.connect_timeout;
        let mut adapters = self.adapters.lock().await;
        tracing::info!(count = adapters.len(), "Connecting exchange adapters");

        join_all(adapters.iter_mut().map(|adapter| async move {
            let exchange = adapter.exchange();
            match tokio::time::timeout(timeout, adapter.connect()).await {
                Ok(Ok(())) => tracing::info!(exchange = %exchange, "Adapter connected"),
                Ok(Err(e)) => {
                    tracing::error!(exchange = %exchange, error = %e, "Adapter connect failed")
                }
                Err(_) => tracing::warn!(
                    exchange = %exchange,
                    timeout_ms = timeout.as_millis() as u64,
                    "Adapter connect timed out, retrying in background"
                ),
            }
        }))
        .await;
    }

    async fn subscribe_all(&self, symbols: Symbols) -> usize {
        let mut adapters = self.adapters.lock().await;
        let results = join_all(adapters.iter_mut().map(|adapter| {
            let symbols = symbols.clone();
            async move {
                let exchange = adapter.exchange();
                match adapter.subscribe(symbols).await {
                    Ok(added) => added,
                    Err(e) => {
                        tracing::warn!(exchange = %exchange, error = %e, "Subscribe failed");
                        0
                    }
                }
            }
        }))
        .await;
        results.into_iter().sum()
    }
}

// =============================================================================
// Pipeline
// =============================================================================

async fn run_pipeline(
    mut rx: mpsc::Receiver<MarketEvent>,
    cache: Arc<FastLookupCache>,
    detector: Arc<Mutex<ArbitrageDetector>>,
    events: broadcast::Sender<MarketEvent>,
) {
    tracing::debug!("Pipeline started");
    while let Some(event) = rx.recv().await {
        process_event(event, &cache, &detector, &events);
    }
    tracing::info!("Pipeline channel closed, pipeline shutting down");
}

/// Apply one adapter event: update state, then fan out.
///
/// Broadcast send errors only mean nobody is subscribed.
pub(crate) fn process_event(
    event: MarketEvent,
    cache: &FastLookupCache,
    detector: &Mutex<ArbitrageDetector>,
    events: &broadcast::Sender<MarketEvent>,
) {
    match event {
        MarketEvent::MarketData(tick) => {
            cache.update(tick.clone());
            let detection = detector
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .evaluate(&tick, cache);

            tracing::trace!(
                exchange = %tick.exchange,
                symbol = %tick.symbol,
                market_type = %tick.market_type,
                price = tick.price,
                "Tick"
            );
            let _ = events.send(MarketEvent::MarketData(tick));

            match detection {
                Some(Detection::Opportunity(opp)) => {
                    tracing::info!(
                        symbol = %opp.symbol,
                        market_type = %opp.market_type,
                        buy = %opp.best_ask.exchange,
                        sell = %opp.best_bid.exchange,
                        spread_pct = opp.spread_percent,
                        "Arbitrage opportunity detected"
                    );
                    let _ = events.send(MarketEvent::Arbitrage(opp));
                }
                Some(Detection::Cleared {
                    symbol,
                    market_type,
                }) => {
                    let _ = events.send(MarketEvent::ArbitrageCleared {
                        symbol,
                        market_type,
                    });
                }
                None => {}
            }
        }
        other => {
            match &other {
                MarketEvent::Connected {
                    exchange,
                    market_type,
                } => tracing::info!(exchange = %exchange, market_type = ?market_type, "Connected"),
                MarketEvent::Disconnected {
                    exchange,
                    market_type,
                } => tracing::warn!(exchange = %exchange, market_type = ?market_type, "Disconnected"),
                MarketEvent::Error { exchange, message } => {
                    tracing::warn!(exchange = %exchange, error = %message, "Adapter error")
                }
                _ => {}
            }
            let _ = events.send(other);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::types::{CanonicalTick, MarketType};

    fn tick(exchange: Exchange, price: f64) -> MarketEvent {
        MarketEvent::MarketData(CanonicalTick::new(
            exchange,
            "BTC-USDT",
            MarketType::Spot,
            price,
            1_700_000_000_000,
        ))
    }

    #[test]
    fn test_process_event_updates_cache_and_emits_arbitrage() {
        let cache = FastLookupCache::new();
        let detector = Mutex::new(ArbitrageDetector::new());
        let (tx, mut rx) = broadcast::channel(16);

        process_event(tick(Exchange::Binance, 50000.0), &cache, &detector, &tx);
        process_event(tick(Exchange::Okx, 50100.0), &cache, &detector, &tx);

        assert_eq!(cache.get_price(Exchange::Okx, "BTC-USDT", MarketType::Spot), Some(50100.0));
        assert!(matches!(rx.try_recv().unwrap(), MarketEvent::MarketData(_)));
        assert!(matches!(rx.try_recv().unwrap(), MarketEvent::MarketData(_)));
        match rx.try_recv().unwrap() {
            MarketEvent::Arbitrage(opp) => assert_eq!(opp.spread, 100.0),
            other => panic!("unexpected {:?}", other),
        }

        process_event(tick(Exchange::Okx, 50001.0), &cache, &detector, &tx);
        assert!(matches!(rx.try_recv().unwrap(), MarketEvent::MarketData(_)));
        assert!(matches!(
            rx.try_recv().unwrap(),
            MarketEvent::ArbitrageCleared { .. }
        ));
    }

    #[test]
    fn test_lifecycle_events_forwarded_unchanged() {
        let cache = FastLookupCache::new();
        let detector = Mutex::new(ArbitrageDetector::new());
        let (tx, mut rx) = broadcast::channel(16);
        let event = MarketEvent::Connected {
            exchange: Exchange::Okx,
            market_type: None,
        };
        process_event(event.clone(), &cache, &detector, &tx);
        assert_eq!(rx.try_recv().unwrap(), event);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_create_dedups_exchanges() {
        let config = ServiceConfig {
            exchanges: vec![Exchange::Okx, Exchange::Binance, Exchange::Okx],
            ..ServiceConfig::default()
        };
        let service = AggregationService::create(config);
        let adapters = service.adapters.try_lock().unwrap();
        assert_eq!(adapters.len(), 2);
    }

    #[tokio::test]
    async fn test_start_after_shutdown_fails() {
        let service = AggregationService::create(ServiceConfig {
            exchanges: vec![],
            ..ServiceConfig::default()
        });
        service.start().await.unwrap();
        service.start().await.unwrap();
        service.shutdown().await;
        assert!(service.start().await.is_err());
        assert!(service.start_market_data("BTC").await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_ends_event_streams() {
        let service = AggregationService::create(ServiceConfig {
            exchanges: vec![],
            ..ServiceConfig::default()
        });
        let mut early = service.subscribe();
        service.start().await.unwrap();
        service.shutdown().await;

        let next = tokio::time::timeout(Duration::from_secs(2), early.recv()).await;
        assert_eq!(next.expect("stream still open after shutdown"), None);

        let mut late = service.subscribe();
        assert_eq!(late.recv().await, None);
    }

    #[tokio::test]
    async fn test_shutdown_before_start_ends_event_streams() {
        let service = AggregationService::create(ServiceConfig {
            exchanges: vec![],
            ..ServiceConfig::default()
        });
        let mut events = service.subscribe();
        service.shutdown().await;
        assert_eq!(events.recv().await, None);
    }
}
