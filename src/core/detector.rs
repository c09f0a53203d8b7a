//! Cross-exchange arbitrage detector.
//!
//! Evaluated once per tick against the quotes of that tick's instrument.
//! Best-vs-best: the cheapest exchange is the ask, the dearest the bid.
//! One opportunity is kept per (symbol, market type) and replaced on each
//! evaluation above the threshold; it is cleared when the spread falls back.

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapters::types::{CanonicalTick, MarketType};
use crate::core::cache::FastLookupCache;
use crate::core::types::{current_time_ms, ArbitrageOpportunity, ExchangeQuote};

/// Configuration for the arbitrage detector.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    /// Spread percentage that must be exceeded (default 0.1%)
    pub threshold_percent: f64,
    /// Ignore quotes older than this relative to the evaluated tick
    pub max_quote_age_ms: Option<i64>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold_percent: 0.1,
            max_quote_age_ms: None,
        }
    }
}

/// Result of evaluating one tick
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// Opportunity stored or replaced
    Opportunity(ArbitrageOpportunity),
    /// Previously stored opportunity removed
    Cleared {
        symbol: Arc<str>,
        market_type: MarketType,
    },
}

/// Per-instrument arbitrage tracker
#[derive(Debug, Default)]
pub struct ArbitrageDetector {
    config: DetectorConfig,
    opportunities: HashMap<(Arc<str>, MarketType), ArbitrageOpportunity>,
}

impl ArbitrageDetector {
    /// Create with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom configuration.
    pub fn with_config(config: DetectorConfig) -> Self {
        Self {
            config,
            opportunities: HashMap::new(),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Re-evaluate the instrument of `tick` using the cache contents.
    ///
    /// The cache must already contain `tick`.
    pub fn evaluate(&mut self, tick: &CanonicalTick, cache: &FastLookupCache) -> Option<Detection> {
        let mut quotes = cache.quotes(&tick.symbol, tick.market_type);
        if let Some(max_age) = self.config.max_quote_age_ms {
            quotes.retain(|q| tick.event_time_ms.saturating_sub(q.event_time_ms) <= max_age);
        }
        self.evaluate_quotes(&tick.symbol, tick.market_type, &quotes)
    }

    /// Evaluate an explicit set of quotes for one instrument
    pub fn evaluate_quotes(
        &mut self,
        symbol: &Arc<str>,
        market_type: MarketType,
        quotes: &[CanonicalTick],
    ) -> Option<Detection> {
        let key = (Arc::clone(symbol), market_type);

        match best_vs_best(symbol, market_type, quotes) {
            Some(opp) if opp.spread_percent.abs() > self.config.threshold_percent => {
                tracing::debug!(
                    symbol = %opp.symbol,
                    market_type = %market_type,
                    buy = %opp.best_ask.exchange,
                    sell = %opp.best_bid.exchange,
                    spread_pct = opp.spread_percent,
                    "Arbitrage opportunity"
                );
                self.opportunities.insert(key, opp.clone());
                Some(Detection::Opportunity(opp))
            }
            _ => self.opportunities.remove(&key).map(|_| {
                tracing::debug!(symbol = %symbol, market_type = %market_type, "Arbitrage cleared");
                Detection::Cleared {
                    symbol: Arc::clone(symbol),
                    market_type,
                }
            }),
        }
    }

    /// Current opportunity for an instrument
    pub fn get(&self, symbol: &str, market_type: MarketType) -> Option<&ArbitrageOpportunity> {
        self.opportunities.get(&(Arc::from(symbol), market_type))
    }

    /// Snapshot of all current opportunities, widest spread first
    pub fn opportunities(&self) -> Vec<ArbitrageOpportunity> {
        let mut all: Vec<ArbitrageOpportunity> = self.opportunities.values().cloned().collect();
        all.sort_by(|a, b| b.spread_percent.total_cmp(&a.spread_percent));
        all
    }

    pub fn len(&self) -> usize {
        self.opportunities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opportunities.is_empty()
    }

    pub fn clear(&mut self) {
        self.opportunities.clear();
    }
}

/// Lowest quote against highest quote; `None` with fewer than two exchanges.
pub fn best_vs_best(
    symbol: &Arc<str>,
    market_type: MarketType,
    quotes: &[CanonicalTick],
) -> Option<ArbitrageOpportunity> {
    let mut iter = quotes.iter();
    let first = iter.next()?;
    let (mut ask, mut bid) = (first, first);
    let mut distinct = false;

    for quote in iter {
        if quote.exchange != first.exchange {
            distinct = true;
        }
        if quote.price < ask.price {
            ask = quote;
        }
        if quote.price > bid.price {
            bid = quote;
        }
    }
    if !distinct || bid.price <= 0.0 {
        return None;
    }

    let spread = bid.price - ask.price;
    Some(ArbitrageOpportunity {
        symbol: Arc::clone(symbol),
        market_type,
        spread,
        spread_percent: spread / bid.price * 100.0,
        best_ask: ExchangeQuote {
            exchange: ask.exchange,
            price: ask.price,
        },
        best_bid: ExchangeQuote {
            exchange: bid.exchange,
            price: bid.price,
        },
        detected_at_ms: current_time_ms(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::types::Exchange;

    fn tick(exchange: Exchange, price: f64, ts: i64) -> CanonicalTick {
        CanonicalTick::new(exchange, "BTC-USDT", MarketType::Spot, price, ts)
    }

    #[test]
    fn test_single_exchange_no_opportunity() {
        let cache = FastLookupCache::new();
        let mut detector = ArbitrageDetector::new();
        let t = tick(Exchange::Binance, 50000.0, 1);
        cache.update(t.clone());
        assert!(detector.evaluate(&t, &cache).is_none());
        assert!(detector.is_empty());
    }

    #[test]
    fn test_two_exchanges_above_threshold() {
        let cache = FastLookupCache::new();
        let mut detector = ArbitrageDetector::new();
        cache.update(tick(Exchange::Binance, 50000.0, 1));
        let t = tick(Exchange::Okx, 50100.0, 2);
        cache.update(t.clone());

        match detector.evaluate(&t, &cache) {
            Some(Detection::Opportunity(opp)) => {
                assert_eq!(opp.spread, 100.0);
                assert!((opp.spread_percent - 0.1996).abs() < 1e-4);
                assert_eq!(opp.best_ask.exchange, Exchange::Binance);
                assert_eq!(opp.best_ask.price, 50000.0);
                assert_eq!(opp.best_bid.exchange, Exchange::Okx);
                assert_eq!(opp.best_bid.price, 50100.0);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(detector.len(), 1);
    }

    #[test]
    fn test_opportunity_replaced_not_appended() {
        let cache = FastLookupCache::new();
        let mut detector = ArbitrageDetector::new();
        cache.update(tick(Exchange::Binance, 50000.0, 1));
        for price in [50100.0, 50200.0, 50300.0] {
            let t = tick(Exchange::Okx, price, 2);
            cache.update(t.clone());
            detector.evaluate(&t, &cache);
        }
        assert_eq!(detector.len(), 1);
        let opp = detector.get("BTC-USDT", MarketType::Spot).unwrap();
        assert_eq!(opp.best_bid.price, 50300.0);
    }

    #[test]
    fn test_below_threshold_clears() {
        let cache = FastLookupCache::new();
        let mut detector = ArbitrageDetector::new();
        cache.update(tick(Exchange::Binance, 50000.0, 1));
        let wide = tick(Exchange::Okx, 50100.0, 2);
        cache.update(wide.clone());
        assert!(matches!(detector.evaluate(&wide, &cache), Some(Detection::Opportunity(_))));

        let narrow = tick(Exchange::Okx, 50010.0, 3);
        cache.update(narrow.clone());
        match detector.evaluate(&narrow, &cache) {
            Some(Detection::Cleared { symbol, market_type }) => {
                assert_eq!(&*symbol, "BTC-USDT");
                assert_eq!(market_type, MarketType::Spot);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(detector.is_empty());
        // Nothing stored, nothing to clear again
        assert!(detector.evaluate(&narrow, &cache).is_none());
    }

    #[test]
    fn test_market_types_are_separate_instruments() {
        let cache = FastLookupCache::new();
        let mut detector = ArbitrageDetector::new();
        cache.update(tick(Exchange::Binance, 50000.0, 1));
        let fut = CanonicalTick::new(Exchange::Okx, "BTC-USDT", MarketType::Fut, 51000.0, 2);
        cache.update(fut.clone());
        assert!(detector.evaluate(&fut, &cache).is_none());
    }

    #[test]
    fn test_stale_quotes_excluded() {
        let cache = FastLookupCache::new();
        let mut detector = ArbitrageDetector::with_config(DetectorConfig {
            max_quote_age_ms: Some(1_000),
            ..DetectorConfig::default()
        });
        cache.update(tick(Exchange::Binance, 50000.0, 0));
        let t = tick(Exchange::Okx, 50100.0, 5_000);
        cache.update(t.clone());
        assert!(detector.evaluate(&t, &cache).is_none());
    }

    #[test]
    fn test_opportunities_sorted_by_spread() {
        let mut detector = ArbitrageDetector::new();
        let btc: Arc<str> = Arc::from("BTC-USDT");
        let eth: Arc<str> = Arc::from("ETH-USDT");
        let btc_quotes = [tick(Exchange::Binance, 100.0, 0), tick(Exchange::Okx, 101.0, 0)];
        let eth_quotes = [
            CanonicalTick::new(Exchange::Binance, "ETH-USDT", MarketType::Spot, 100.0, 0),
            CanonicalTick::new(Exchange::Okx, "ETH-USDT", MarketType::Spot, 105.0, 0),
        ];
        detector.evaluate_quotes(&btc, MarketType::Spot, &btc_quotes);
        detector.evaluate_quotes(&eth, MarketType::Spot, &eth_quotes);

        let all = detector.opportunities();
        assert_eq!(all.len(), 2);
        assert_eq!(&*all[0].symbol, "ETH-USDT");
    }

    #[test]
    fn test_best_vs_best_same_exchange_only() {
        let symbol: Arc<str> = Arc::from("BTC-USDT");
        let quotes = [tick(Exchange::Binance, 1.0, 0), tick(Exchange::Binance, 2.0, 0)];
        assert!(best_vs_best(&symbol, MarketType::Spot, &quotes).is_none());
        assert!(best_vs_best(&symbol, MarketType::Spot, &[]).is_none());
    }
}
