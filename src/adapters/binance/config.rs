//! Binance Configuration
//!
//! Public market data endpoints for the spot and USD-M futures segments.

use crate::adapters::shared::BackoffPolicy;
use crate::adapters::types::StreamKind;

// =============================================================================
// Constants
// =============================================================================

/// Spot WebSocket URL
pub const SPOT_WS_URL: &str = "wss://stream.binance.com:9443/ws";

/// USD-M futures WebSocket URL
pub const FUTURES_WS_URL: &str = "wss://fstream.binance.com/ws";

/// Max stream names per SUBSCRIBE frame
pub const MAX_STREAMS_PER_FRAME: usize = 200;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for Binance connections (public market data)
#[derive(Debug, Clone)]
pub struct BinanceConfig {
    pub spot_ws_url: String,
    pub futures_ws_url: String,
    /// Streams requested for every symbol; only `aggTrade` produces ticks
    pub streams: Vec<StreamKind>,
    pub backoff: BackoffPolicy,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            spot_ws_url: SPOT_WS_URL.to_string(),
            futures_ws_url: FUTURES_WS_URL.to_string(),
            streams: vec![StreamKind::AggTrade],
            backoff: BackoffPolicy::default(),
        }
    }
}

impl BinanceConfig {
    /// Create configuration from environment variables
    ///
    /// - `BINANCE_SPOT_WS_URL` / `BINANCE_FUTURES_WS_URL`: endpoint overrides
    /// - `BINANCE_STREAMS`: comma-separated list (`aggTrade,bookTicker,depth`)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let spot_ws_url = std::env::var("BINANCE_SPOT_WS_URL").unwrap_or(defaults.spot_ws_url);
        let futures_ws_url =
            std::env::var("BINANCE_FUTURES_WS_URL").unwrap_or(defaults.futures_ws_url);

        let streams = std::env::var("BINANCE_STREAMS")
            .ok()
            .map(|raw| parse_streams(&raw))
            .filter(|streams| !streams.is_empty())
            .unwrap_or(defaults.streams);

        Self {
            spot_ws_url,
            futures_ws_url,
            streams,
            backoff: defaults.backoff,
        }
    }
}

/// Parse a comma-separated stream list, skipping unknown names
pub fn parse_streams(raw: &str) -> Vec<StreamKind> {
    let mut streams = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let kind = match name.to_ascii_lowercase().as_str() {
            "aggtrade" => StreamKind::AggTrade,
            "bookticker" => StreamKind::BookTicker,
            "depth" => StreamKind::Depth,
            other => {
                tracing::warn!(stream = %other, "Unknown Binance stream, ignoring");
                continue;
            }
        };
        if !streams.contains(&kind) {
            streams.push(kind);
        }
    }
    streams
}
