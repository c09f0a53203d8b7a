//! OKX Configuration
//!
//! Public v5 endpoint; one socket carries both spot and perpetual swap tickers.

use std::time::Duration;

use crate::adapters::shared::{BackoffPolicy, HeartbeatConfig};
use crate::adapters::types::MarketType;

// =============================================================================
// Constants
// =============================================================================

/// Public WebSocket URL
pub const PUBLIC_WS_URL: &str = "wss://ws.okx.com:8443/ws/v5/public";

/// OKX drops idle sockets after 30s, so ping well inside that
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(20);
const DEFAULT_PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Max channel args per subscribe frame
pub const MAX_ARGS_PER_FRAME: usize = 100;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the OKX connection (public market data)
#[derive(Debug, Clone)]
pub struct OkxConfig {
    pub ws_url: String,
    /// Segments subscribed for every symbol
    pub market_types: Vec<MarketType>,
    pub heartbeat: HeartbeatConfig,
    pub backoff: BackoffPolicy,
}

impl Default for OkxConfig {
    fn default() -> Self {
        Self {
            ws_url: PUBLIC_WS_URL.to_string(),
            market_types: MarketType::ALL.to_vec(),
            heartbeat: HeartbeatConfig {
                interval: DEFAULT_PING_INTERVAL,
                timeout: DEFAULT_PONG_TIMEOUT,
                ..HeartbeatConfig::text_ping_pong("ping", "pong")
            },
            backoff: BackoffPolicy::default(),
        }
    }
}

impl OkxConfig {
    /// Create configuration from environment variables
    ///
    /// - `OKX_WS_URL`: endpoint override
    /// - `OKX_PING_INTERVAL_SECS`: heartbeat interval
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("OKX_WS_URL") {
            config.ws_url = url;
        }
        if let Some(secs) = std::env::var("OKX_PING_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
        {
            config.heartbeat.interval = Duration::from_secs(secs);
        }

        config
    }
}
