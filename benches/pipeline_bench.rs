use criterion::{black_box, criterion_group, criterion_main, Criterion};
use crossfeed::adapters::symbols::canonical_symbol;
use crossfeed::adapters::types::{CanonicalTick, Exchange, MarketType};
use crossfeed::core::cache::FastLookupCache;
use crossfeed::core::detector::ArbitrageDetector;

fn make_tick(exchange: Exchange, symbol: &str, price: f64) -> CanonicalTick {
    CanonicalTick::new(exchange, symbol, MarketType::Spot, price, 1_700_000_000_000)
}

fn filled_cache(symbols: usize) -> FastLookupCache {
    let cache = FastLookupCache::new();
    for i in 0..symbols {
        let symbol = format!("SYM{}-USDT", i);
        cache.update(make_tick(Exchange::Binance, &symbol, 100.0));
        cache.update(make_tick(Exchange::Okx, &symbol, 100.5));
    }
    cache
}

fn bench_cache_update(c: &mut Criterion) {
    c.bench_function("cache_update", |b| {
        let cache = filled_cache(500);
        let tick = make_tick(Exchange::Okx, "SYM42-USDT", 101.0);

        b.iter(|| {
            cache.update(black_box(tick.clone()));
        });
    });
}

fn bench_cache_get_price(c: &mut Criterion) {
    c.bench_function("cache_get_price", |b| {
        let cache = filled_cache(500);

        b.iter(|| {
            black_box(cache.get_price(
                black_box(Exchange::Binance),
                black_box("SYM250-USDT"),
                MarketType::Spot,
            ));
        });
    });
}

fn bench_detector_evaluate(c: &mut Criterion) {
    c.bench_function("detector_evaluate", |b| {
        let cache = filled_cache(500);
        let mut detector = ArbitrageDetector::new();
        let tick = make_tick(Exchange::Okx, "SYM42-USDT", 100.5);
        cache.update(tick.clone());

        b.iter(|| {
            black_box(detector.evaluate(black_box(&tick), &cache));
        });
    });
}

fn bench_tick_pipeline(c: &mut Criterion) {
    c.bench_function("tick_pipeline", |b| {
        let cache = filled_cache(500);
        let mut detector = ArbitrageDetector::new();
        let mut price = 100.0;

        b.iter(|| {
            price = if price > 101.0 { 100.0 } else { price + 0.01 };
            let tick = make_tick(Exchange::Binance, "SYM7-USDT", price);
            cache.update(tick.clone());
            black_box(detector.evaluate(&tick, &cache));
        });
    });
}

fn bench_canonical_symbol(c: &mut Criterion) {
    c.bench_function("canonical_symbol", |b| {
        b.iter(|| {
            black_box(canonical_symbol(black_box("BTCUSDT")));
            black_box(canonical_symbol(black_box("ETH-USDT-SWAP")));
        });
    });
}

criterion_group!(
    benches,
    bench_cache_update,
    bench_cache_get_price,
    bench_detector_evaluate,
    bench_tick_pipeline,
    bench_canonical_symbol
);
criterion_main!(benches);
