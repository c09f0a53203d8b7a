//! Core data types shared by all exchange adapters
//!
//! Every adapter translates its native wire format into [`CanonicalTick`],
//! and tracks what it has asked the exchange for in a [`SubscriptionSet`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

// =============================================================================
// Exchange / Market Type
// =============================================================================

/// Exchanges with a streaming adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Exchange {
    #[serde(rename = "Binance")]
    Binance,
    #[serde(rename = "OKX")]
    Okx,
}

impl Exchange {
    /// All supported exchanges, in display order
    pub const ALL: [Exchange; 2] = [Exchange::Binance, Exchange::Okx];

    /// Display name, also used in cache keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Exchange::Binance => "Binance",
            Exchange::Okx => "OKX",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Exchange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binance" => Ok(Exchange::Binance),
            "okx" => Ok(Exchange::Okx),
            other => Err(format!("unknown exchange '{}'", other)),
        }
    }
}

/// Market segment of an instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MarketType {
    #[serde(rename = "SPOT")]
    Spot,
    /// Futures / perpetual swaps
    #[serde(rename = "FUT")]
    Fut,
}

impl MarketType {
    pub const ALL: [MarketType; 2] = [MarketType::Spot, MarketType::Fut];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketType::Spot => "SPOT",
            MarketType::Fut => "FUT",
        }
    }
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SPOT" => Ok(MarketType::Spot),
            "FUT" | "FUTURES" | "SWAP" => Ok(MarketType::Fut),
            other => Err(format!("unknown market type '{}'", other)),
        }
    }
}

// =============================================================================
// Canonical Tick
// =============================================================================

/// A single normalized price observation.
///
/// `symbol` is always in canonical `BASE-QUOTE` form and `price` is strictly
/// positive; adapters drop anything that would violate either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTick {
    pub exchange: Exchange,
    pub symbol: Arc<str>,
    pub market_type: MarketType,
    pub price: f64,
    /// Exchange event time in Unix milliseconds
    pub event_time_ms: i64,
}

impl CanonicalTick {
    pub fn new(
        exchange: Exchange,
        symbol: impl Into<Arc<str>>,
        market_type: MarketType,
        price: f64,
        event_time_ms: i64,
    ) -> Self {
        Self {
            exchange,
            symbol: symbol.into(),
            market_type,
            price,
            event_time_ms,
        }
    }

    /// Composite cache key `exchange|symbol|marketType`
    pub fn key(&self) -> String {
        format!("{}|{}|{}", self.exchange, self.symbol, self.market_type)
    }
}

// =============================================================================
// Subscriptions
// =============================================================================

/// Kind of stream an adapter can subscribe a symbol to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    /// Binance aggregated trades
    AggTrade,
    /// Binance best bid/offer
    BookTicker,
    /// Binance partial depth
    Depth,
    /// OKX tickers channel for one market segment
    Tickers(MarketType),
}

impl StreamKind {
    /// Binance stream suffix (`<symbol>@<suffix>`)
    pub fn binance_suffix(&self) -> Option<&'static str> {
        match self {
            StreamKind::AggTrade => Some("aggTrade"),
            StreamKind::BookTicker => Some("bookTicker"),
            StreamKind::Depth => Some("depth"),
            StreamKind::Tickers(_) => None,
        }
    }
}

/// Set of (canonical symbol, stream) pairs currently requested by an adapter
#[derive(Debug, Clone, Default)]
pub struct SubscriptionSet {
    entries: HashMap<Arc<str>, HashSet<StreamKind>>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pair; returns `true` only if it was not already present.
    pub fn insert(&mut self, symbol: &str, stream: StreamKind) -> bool {
        if let Some(streams) = self.entries.get_mut(symbol) {
            return streams.insert(stream);
        }
        self.entries
            .insert(Arc::from(symbol), HashSet::from([stream]));
        true
    }

    pub fn contains(&self, symbol: &str, stream: StreamKind) -> bool {
        self.entries
            .get(symbol)
            .is_some_and(|streams| streams.contains(&stream))
    }

    /// Number of (symbol, stream) pairs
    pub fn len(&self) -> usize {
        self.entries.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct symbols in the set, sorted
    pub fn symbols(&self) -> Vec<Arc<str>> {
        let mut symbols: Vec<Arc<str>> = self.entries.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, StreamKind)> {
        self.entries
            .iter()
            .flat_map(|(s, streams)| streams.iter().map(move |k| (s.as_ref(), *k)))
    }
}

/// Symbol input for `subscribe`: one symbol or an ordered list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Symbols(Vec<String>);

impl Symbols {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Symbols {
    fn from(symbol: &str) -> Self {
        Symbols(vec![symbol.to_string()])
    }
}

impl From<String> for Symbols {
    fn from(symbol: String) -> Self {
        Symbols(vec![symbol])
    }
}

impl From<Vec<String>> for Symbols {
    fn from(symbols: Vec<String>) -> Self {
        Symbols(symbols)
    }
}

impl From<&[String]> for Symbols {
    fn from(symbols: &[String]) -> Self {
        Symbols(symbols.to_vec())
    }
}

impl From<&[&str]> for Symbols {
    fn from(symbols: &[&str]) -> Self {
        Symbols(symbols.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Symbols {
    fn from(symbols: [&str; N]) -> Self {
        Symbols(symbols.iter().map(|s| s.to_string()).collect())
    }
}
