//! Symbol normalization
//!
//! Canonical form is `BASE-QUOTE` (e.g. `BTC-USDT`) whatever the source:
//! Binance concatenates (`BTCUSDT`), OKX dashes and appends `-SWAP` for
//! perpetuals (`BTC-USDT-SWAP`).

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::adapters::types::MarketType;

/// Quote assets recognized when splitting a concatenated symbol.
/// Ordered longest first so `FDUSD` wins over `USD`, `USDT` over `USD`.
const KNOWN_QUOTES: &[&str] = &[
    "FDUSD", "USDT", "USDC", "BUSD", "TUSD", "USD", "BTC", "ETH", "BNB", "EUR", "TRY",
];

/// Quotes that are also common suffixes of base asset names (`STETH`, `WBTC`)
const CRYPTO_QUOTES: &[&str] = &["BTC", "ETH", "BNB"];

/// Quote used when a request names only the base asset (`BTC` → `BTC-USDT`)
pub const DEFAULT_QUOTE: &str = "USDT";

/// Native suffixes that mark a derivatives instrument
const DERIVATIVE_SUFFIXES: &[&str] = &["-SWAP", "-PERP"];

/// Normalize an exchange-native symbol to canonical `BASE-QUOTE`.
///
/// Idempotent: a canonical symbol comes back unchanged. Unrecognized
/// concatenated symbols are returned upper-cased as-is.
pub fn canonical_symbol(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase();
    let stripped = strip_derivative_suffix(&upper);

    if stripped.contains('-') {
        let mut parts = stripped
            .split('-')
            .filter(|p| !p.is_empty() && !DERIVATIVE_SUFFIXES.iter().any(|s| &s[1..] == *p));
        return match (parts.next(), parts.next()) {
            (Some(base), Some(quote)) => format!("{}-{}", base, quote),
            (Some(base), None) => base.to_string(),
            _ => stripped.to_string(),
        };
    }

    match split_quote(stripped) {
        Some((base, quote)) => format!("{}-{}", base, quote),
        None => stripped.to_string(),
    }
}

/// Normalize a symbol requested by a consumer.
///
/// Same as [`canonical_symbol`], except that a bare base asset gets the
/// default quote appended. Returns `None` for empty input.
///
/// Undashed input is only split on fiat and stablecoin quotes: `STETH` and
/// `WBTC` are base assets here, so a crypto-quoted pair must be written
/// with a dash (`ETH-BTC`).
pub fn requested_symbol(raw: &str) -> Option<String> {
    let upper = raw.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return None;
    }
    let stripped = strip_derivative_suffix(&upper);
    if stripped.contains('-') {
        return Some(canonical_symbol(stripped));
    }
    match split_quote(stripped) {
        Some((base, quote)) if !CRYPTO_QUOTES.contains(&quote) => {
            Some(format!("{}-{}", base, quote))
        }
        _ => Some(format!("{}-{}", stripped, DEFAULT_QUOTE)),
    }
}

/// Canonical symbols keyed by the concatenated wire form an exchange
/// echoes back (`BTCBRL` → `BTC-BRL`).
///
/// Filled on subscribe so pairs with a quote outside the known list still
/// decode to the symbol that was asked for. Clones share one table.
#[derive(Debug, Clone, Default)]
pub struct SymbolRegistry {
    by_native: Arc<RwLock<HashMap<String, Arc<str>>>>,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the wire form of `canonical` (dashes removed, upper case)
    pub fn register(&self, canonical: &str) {
        let native = canonical.replace('-', "").to_ascii_uppercase();
        self.by_native
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(native, Arc::from(canonical));
    }

    /// Registered canonical symbol, or [`canonical_symbol`] for unknown input
    pub fn resolve(&self, native: &str) -> Arc<str> {
        let known = self
            .by_native
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(native)
            .cloned();
        known.unwrap_or_else(|| Arc::from(canonical_symbol(native)))
    }

    pub fn len(&self) -> usize {
        self.by_native.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whether a native symbol denotes a derivatives instrument
pub fn native_market_type(raw: &str) -> MarketType {
    let upper = raw.trim().to_ascii_uppercase();
    if DERIVATIVE_SUFFIXES.iter().any(|s| upper.ends_with(s)) {
        MarketType::Fut
    } else {
        MarketType::Spot
    }
}

/// Binance stream prefix for a canonical symbol (`BTC-USDT` → `btcusdt`)
pub fn binance_stream_symbol(canonical: &str) -> String {
    canonical.replace('-', "").to_ascii_lowercase()
}

/// OKX instrument id for a canonical symbol and market segment
pub fn okx_inst_id(canonical: &str, market_type: MarketType) -> String {
    match market_type {
        MarketType::Spot => canonical.to_string(),
        MarketType::Fut => format!("{}-SWAP", canonical),
    }
}

fn strip_derivative_suffix(upper: &str) -> &str {
    let mut current = upper;
    while let Some(stripped) = DERIVATIVE_SUFFIXES
        .iter()
        .find_map(|suffix| current.strip_suffix(suffix))
    {
        current = stripped;
    }
    current
}

fn split_quote(symbol: &str) -> Option<(&str, &str)> {
    KNOWN_QUOTES.iter().find_map(|quote| {
        symbol
            .strip_suffix(quote)
            .filter(|base| !base.is_empty())
            .map(|base| (base, *quote))
    })
}
