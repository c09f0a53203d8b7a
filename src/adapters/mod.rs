//! Exchange adapters for streaming market data
//!
//! This module provides the connection layer and the per-exchange adapters
//! that turn native WebSocket frames into canonical ticks.

pub mod binance;
pub mod errors;
pub mod factory;
pub mod okx;
pub mod shared;
pub mod symbols;
pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use binance::{BinanceAdapter, BinanceConfig};
pub use errors::{ExchangeError, ExchangeResult};
pub use factory::{build_adapter, AdapterConfigs, AnyAdapter};
pub use okx::{OkxAdapter, OkxConfig};
pub use traits::ExchangeAdapter;
pub use types::{CanonicalTick, Exchange, MarketType, StreamKind, SubscriptionSet, Symbols};
