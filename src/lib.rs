//! crossfeed - real-time cross-exchange price aggregation
//!
//! - Resilient WebSocket connections (backoff, heartbeat, send queue)
//! - Binance and OKX adapters normalizing to canonical ticks
//! - Latest-price cache and cross-exchange arbitrage detection

pub mod adapters;
pub mod config;
pub mod core;
pub mod error;

pub use error::{AppError, Result};
