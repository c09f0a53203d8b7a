//! Core data types for the aggregation and arbitrage pipeline.
//!
//! [`MarketEvent`] is the single event vocabulary shared by adapters, the
//! service pipeline and consumers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adapters::types::{CanonicalTick, Exchange, MarketType};

// =============================================================================
// Arbitrage Opportunity
// =============================================================================

/// Price quoted by one exchange
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExchangeQuote {
    pub exchange: Exchange,
    pub price: f64,
}

/// Cross-exchange price gap on one instrument.
///
/// At most one exists per (symbol, market type); a newer evaluation replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    pub symbol: Arc<str>,
    pub market_type: MarketType,
    /// best_bid - best_ask
    pub spread: f64,
    /// spread / best_bid * 100
    pub spread_percent: f64,
    /// Lowest quote (buy here)
    pub best_ask: ExchangeQuote,
    /// Highest quote (sell here)
    pub best_bid: ExchangeQuote,
    pub detected_at_ms: i64,
}

// =============================================================================
// Market Event
// =============================================================================

/// Events emitted by adapters and re-broadcast by the service
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum MarketEvent {
    /// Normalized price tick
    #[serde(rename = "market_data")]
    MarketData(CanonicalTick),
    /// A connection of the adapter opened (`market_type` is `None` when one
    /// socket serves every segment)
    #[serde(rename = "connected")]
    Connected {
        exchange: Exchange,
        market_type: Option<MarketType>,
    },
    #[serde(rename = "disconnected")]
    Disconnected {
        exchange: Exchange,
        market_type: Option<MarketType>,
    },
    #[serde(rename = "reconnecting")]
    Reconnecting {
        exchange: Exchange,
        market_type: Option<MarketType>,
        attempt: u32,
        delay_ms: u64,
    },
    /// Transport error or exchange error frame
    #[serde(rename = "error")]
    Error { exchange: Exchange, message: String },
    #[serde(rename = "arbitrage")]
    Arbitrage(ArbitrageOpportunity),
    /// A previously reported opportunity fell back under the threshold
    #[serde(rename = "arbitrage_cleared")]
    ArbitrageCleared {
        symbol: Arc<str>,
        market_type: MarketType,
    },
}

impl MarketEvent {
    /// Exchange that produced the event, if any
    pub fn exchange(&self) -> Option<Exchange> {
        match self {
            MarketEvent::MarketData(tick) => Some(tick.exchange),
            MarketEvent::Connected { exchange, .. }
            | MarketEvent::Disconnected { exchange, .. }
            | MarketEvent::Reconnecting { exchange, .. }
            | MarketEvent::Error { exchange, .. } => Some(*exchange),
            MarketEvent::Arbitrage(_) | MarketEvent::ArbitrageCleared { .. } => None,
        }
    }
}

// =============================================================================
// Utility
// =============================================================================

/// Current time in milliseconds since epoch
#[inline]
pub fn current_time_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
