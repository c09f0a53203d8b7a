//! Latest-price cache
//!
//! Stores `symbol → (exchange, market type) → latest tick`, so both point
//! lookups and the per-instrument scan used by the detector are O(1) in the
//! number of symbols. Last write wins; entries only go away on `clear()`.
//!
//! Writes come from the single pipeline task; any number of readers may
//! query concurrently. Per-key watchers are notified after each write,
//! outside the data lock.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::adapters::types::{CanonicalTick, Exchange, MarketType};

/// Callback invoked with the new tick whenever a watched key updates
pub type WatchCallback = Arc<dyn Fn(&CanonicalTick) + Send + Sync>;

/// Handle returned by [`FastLookupCache::watch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

type SlotKey = (Exchange, MarketType);

#[derive(Default)]
struct CacheData {
    ticks: HashMap<Arc<str>, HashMap<SlotKey, CanonicalTick>>,
    exchanges: BTreeSet<Exchange>,
    types: BTreeSet<MarketType>,
    len: usize,
}

#[derive(Default)]
struct Watchers {
    by_key: HashMap<Arc<str>, HashMap<SlotKey, Vec<(WatchId, WatchCallback)>>>,
    index: HashMap<WatchId, (Arc<str>, SlotKey)>,
}

/// Shared latest-tick store
#[derive(Default)]
pub struct FastLookupCache {
    data: RwLock<CacheData>,
    watchers: RwLock<Watchers>,
    next_watch_id: AtomicU64,
}

impl FastLookupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the entry for the tick's key and notify its watchers
    pub fn update(&self, tick: CanonicalTick) {
        let slot = (tick.exchange, tick.market_type);
        let callbacks = self.callbacks_for(&tick.symbol, slot);

        {
            let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
            data.exchanges.insert(tick.exchange);
            data.types.insert(tick.market_type);

            let inserted = data
                .ticks
                .entry(Arc::clone(&tick.symbol))
                .or_default()
                .insert(slot, tick.clone())
                .is_none();
            if inserted {
                data.len += 1;
            }
        }

        for callback in callbacks {
            callback(&tick);
        }
    }

    /// Latest price for a key, `None` if never observed
    pub fn get_price(&self, exchange: Exchange, symbol: &str, market_type: MarketType) -> Option<f64> {
        self.get(exchange, symbol, market_type).map(|tick| tick.price)
    }

    /// Latest tick for a key
    pub fn get(&self, exchange: Exchange, symbol: &str, market_type: MarketType) -> Option<CanonicalTick> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.ticks.get(symbol)?.get(&(exchange, market_type)).cloned()
    }

    /// Latest tick of every exchange quoting this instrument
    pub fn quotes(&self, symbol: &str, market_type: MarketType) -> Vec<CanonicalTick> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        let Some(slots) = data.ticks.get(symbol) else {
            return Vec::new();
        };
        let mut quotes: Vec<CanonicalTick> = slots
            .iter()
            .filter(|((_, t), _)| *t == market_type)
            .map(|(_, tick)| tick.clone())
            .collect();
        quotes.sort_by_key(|tick| tick.exchange);
        quotes
    }

    /// Exchanges observed so far, sorted
    pub fn exchanges(&self) -> Vec<Exchange> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.exchanges.iter().copied().collect()
    }

    /// Market types observed so far, sorted
    pub fn types(&self) -> Vec<MarketType> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.types.iter().copied().collect()
    }

    /// Point-in-time copy keyed by `exchange|symbol|marketType`
    pub fn all_data(&self) -> HashMap<String, CanonicalTick> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.ticks
            .values()
            .flat_map(|slots| slots.values())
            .map(|tick| (tick.key(), tick.clone()))
            .collect()
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.data.read().unwrap_or_else(PoisonError::into_inner).len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry and observed dimension. Watchers stay registered.
    pub fn clear(&self) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        *data = CacheData::default();
    }

    // =========================================================================
    // Watchers
    // =========================================================================

    /// Call `callback` after every update of the given key
    pub fn watch(
        &self,
        exchange: Exchange,
        symbol: &str,
        market_type: MarketType,
        callback: WatchCallback,
    ) -> WatchId {
        let id = WatchId(self.next_watch_id.fetch_add(1, Ordering::Relaxed));
        let symbol: Arc<str> = Arc::from(symbol);
        let slot = (exchange, market_type);

        let mut watchers = self.watchers.write().unwrap_or_else(PoisonError::into_inner);
        watchers
            .by_key
            .entry(Arc::clone(&symbol))
            .or_default()
            .entry(slot)
            .or_default()
            .push((id, callback));
        watchers.index.insert(id, (symbol, slot));
        id
    }

    /// Remove a watcher; returns `false` if the id was unknown
    pub fn unwatch(&self, id: WatchId) -> bool {
        let mut watchers = self.watchers.write().unwrap_or_else(PoisonError::into_inner);
        let Some((symbol, slot)) = watchers.index.remove(&id) else {
            return false;
        };
        if let Some(slots) = watchers.by_key.get_mut(&symbol) {
            if let Some(list) = slots.get_mut(&slot) {
                list.retain(|(watch_id, _)| *watch_id != id);
                if list.is_empty() {
                    slots.remove(&slot);
                }
            }
            if slots.is_empty() {
                watchers.by_key.remove(&symbol);
            }
        }
        true
    }

    /// Number of registered watchers
    pub fn watcher_count(&self) -> usize {
        self.watchers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .index
            .len()
    }

    fn callbacks_for(&self, symbol: &str, slot: SlotKey) -> Vec<WatchCallback> {
        let watchers = self.watchers.read().unwrap_or_else(PoisonError::into_inner);
        watchers
            .by_key
            .get(symbol)
            .and_then(|slots| slots.get(&slot))
            .map(|list| list.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for FastLookupCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastLookupCache")
            .field("len", &self.len())
            .field("watchers", &self.watcher_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn tick(exchange: Exchange, symbol: &str, market_type: MarketType, price: f64) -> CanonicalTick {
        CanonicalTick::new(exchange, symbol, market_type, price, 1_700_000_000_000)
    }

    #[test]
    fn test_get_unknown_key_is_none() {
        let cache = FastLookupCache::new();
        assert_eq!(cache.get_price(Exchange::Binance, "BTC-USDT", MarketType::Spot), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_last_write_wins_per_key() {
        let cache = FastLookupCache::new();
        cache.update(tick(Exchange::Binance, "BTC-USDT", MarketType::Spot, 50000.0));
        cache.update(tick(Exchange::Okx, "BTC-USDT", MarketType::Spot, 50100.0));
        cache.update(tick(Exchange::Binance, "BTC-USDT", MarketType::Fut, 50050.0));
        cache.update(tick(Exchange::Binance, "BTC-USDT", MarketType::Spot, 50010.0));

        assert_eq!(cache.get_price(Exchange::Binance, "BTC-USDT", MarketType::Spot), Some(50010.0));
        assert_eq!(cache.get_price(Exchange::Okx, "BTC-USDT", MarketType::Spot), Some(50100.0));
        assert_eq!(cache.get_price(Exchange::Binance, "BTC-USDT", MarketType::Fut), Some(50050.0));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_observed_dimensions() {
        let cache = FastLookupCache::new();
        cache.update(tick(Exchange::Okx, "ETH-USDT", MarketType::Fut, 3000.0));
        assert_eq!(cache.exchanges(), vec![Exchange::Okx]);
        assert_eq!(cache.types(), vec![MarketType::Fut]);

        cache.update(tick(Exchange::Binance, "ETH-USDT", MarketType::Spot, 3001.0));
        assert_eq!(cache.exchanges(), vec![Exchange::Binance, Exchange::Okx]);
        assert_eq!(cache.types(), vec![MarketType::Spot, MarketType::Fut]);
    }

    #[test]
    fn test_quotes_filter_by_market_type() {
        let cache = FastLookupCache::new();
        cache.update(tick(Exchange::Okx, "BTC-USDT", MarketType::Spot, 2.0));
        cache.update(tick(Exchange::Binance, "BTC-USDT", MarketType::Spot, 1.0));
        cache.update(tick(Exchange::Binance, "BTC-USDT", MarketType::Fut, 3.0));

        let quotes = cache.quotes("BTC-USDT", MarketType::Spot);
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].exchange, Exchange::Binance);
        assert!(cache.quotes("SOL-USDT", MarketType::Spot).is_empty());
    }

    #[test]
    fn test_all_data_and_clear() {
        let cache = FastLookupCache::new();
        cache.update(tick(Exchange::Binance, "BTC-USDT", MarketType::Spot, 1.0));
        cache.update(tick(Exchange::Okx, "BTC-USDT", MarketType::Fut, 2.0));

        let snapshot = cache.all_data();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["OKX|BTC-USDT|FUT"].price, 2.0);

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.exchanges().is_empty());
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_watchers_fire_for_their_key_only() {
        let cache = FastLookupCache::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = cache.watch(
            Exchange::Binance,
            "BTC-USDT",
            MarketType::Spot,
            Arc::new(move |tick: &CanonicalTick| sink.lock().unwrap().push(tick.price)),
        );

        cache.update(tick(Exchange::Binance, "BTC-USDT", MarketType::Spot, 1.0));
        cache.update(tick(Exchange::Okx, "BTC-USDT", MarketType::Spot, 9.0));
        cache.update(tick(Exchange::Binance, "BTC-USDT", MarketType::Spot, 2.0));
        assert_eq!(*seen.lock().unwrap(), vec![1.0, 2.0]);

        assert!(cache.unwatch(id));
        assert!(!cache.unwatch(id));
        cache.update(tick(Exchange::Binance, "BTC-USDT", MarketType::Spot, 3.0));
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(cache.watcher_count(), 0);
    }

    #[test]
    fn test_watcher_can_read_cache() {
        let cache = Arc::new(FastLookupCache::new());
        let observed = Arc::new(Mutex::new(None));
        let (reader, sink) = (Arc::clone(&cache), observed.clone());
        cache.watch(
            Exchange::Okx,
            "ETH-USDT",
            MarketType::Fut,
            Arc::new(move |_tick: &CanonicalTick| {
                *sink.lock().unwrap() = reader.get_price(Exchange::Okx, "ETH-USDT", MarketType::Fut);
            }),
        );
        cache.update(tick(Exchange::Okx, "ETH-USDT", MarketType::Fut, 3000.0));
        assert_eq!(*observed.lock().unwrap(), Some(3000.0));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn last_write_wins(writes in prop::collection::vec((0usize..2, 0usize..3, 0usize..2, 1u32..100_000), 1..200)) {
                let cache = FastLookupCache::new();
                let symbols = ["BTC-USDT", "ETH-USDT", "SOL-USDT"];
                let mut expected: HashMap<(Exchange, &str, MarketType), f64> = HashMap::new();

                for (e, s, m, p) in writes {
                    let exchange = Exchange::ALL[e];
                    let market_type = MarketType::ALL[m];
                    let price = p as f64;
                    cache.update(tick(exchange, symbols[s], market_type, price));
                    expected.insert((exchange, symbols[s], market_type), price);
                }

                prop_assert_eq!(cache.len(), expected.len());
                for ((exchange, symbol, market_type), price) in expected {
                    prop_assert_eq!(cache.get_price(exchange, symbol, market_type), Some(price));
                }
            }
        }
    }
}
