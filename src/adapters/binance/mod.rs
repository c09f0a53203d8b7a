//! Binance exchange adapter module
//!
//! Aggregated trade streams from the Binance spot and USD-M futures markets.

pub mod adapter;
pub mod config;
pub mod types;

pub use adapter::BinanceAdapter;
pub use config::BinanceConfig;
