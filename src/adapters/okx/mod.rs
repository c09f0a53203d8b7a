//! OKX exchange adapter module
//!
//! Spot and perpetual swap tickers from the OKX v5 public WebSocket.

pub mod adapter;
pub mod config;
pub mod types;

pub use adapter::OkxAdapter;
pub use config::OkxConfig;
