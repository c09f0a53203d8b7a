//! Core module - price cache, arbitrage detection and the aggregation service
//!
//! This module uses explicit re-exports instead of glob exports.

pub mod cache;
pub mod detector;
pub mod events;
pub mod service;
pub mod types;

pub use cache::{FastLookupCache, WatchCallback, WatchId};
pub use detector::{best_vs_best, ArbitrageDetector, Detection, DetectorConfig};
pub use events::{EventSubscription, DEFAULT_EVENT_CAPACITY};
pub use service::{AggregationService, ServiceConfig, DEFAULT_PIPELINE_CAPACITY};
pub use types::{current_time_ms, ArbitrageOpportunity, ExchangeQuote, MarketEvent};
