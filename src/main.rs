//! crossfeed entry point
//!
//! 1. Loads configuration from the environment
//! 2. Creates the aggregation service and streams the configured symbols
//! 3. Logs arbitrage opportunities and periodic cache statistics
//! 4. Shuts down cleanly on Ctrl+C

use std::sync::Arc;

use tokio::signal;
use tracing::{error, info, warn};

use crossfeed::config::{init_logging, AppConfig};
use crossfeed::core::{AggregationService, EventSubscription, MarketEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenvy::dotenv().ok();
    init_logging();

    info!("crossfeed starting");

    let config = match AppConfig::from_env().and_then(|cfg| cfg.validate().map(|_| cfg)) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "Configuration failed");
            std::process::exit(1);
        }
    };
    info!(
        symbols = ?config.symbols,
        exchanges = ?config.service.exchanges,
        threshold_pct = config.service.detector.threshold_percent,
        "Configuration loaded"
    );

    let service = AggregationService::create(config.service.clone());
    let consumer = tokio::spawn(consume_events(service.subscribe()));
    let stats = tokio::spawn(log_stats(Arc::clone(&service), config.stats_interval));

    let subscribed = service.start_market_data(config.symbols.clone()).await?;
    info!(pairs = subscribed, "Market data streaming. Press Ctrl+C to stop");

    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown initiated"),
        Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
    }

    stats.abort();
    service.shutdown().await;
    // The event stream ends once the service is down
    if let Err(e) = consumer.await {
        warn!(error = %e, "Event consumer failed");
    }

    info!("Clean exit");
    Ok(())
}

async fn consume_events(mut events: EventSubscription) {
    let mut ticks: u64 = 0;
    while let Some(event) = events.recv().await {
        match event {
            MarketEvent::MarketData(_) => ticks += 1,
            MarketEvent::Arbitrage(opp) => info!(
                symbol = %opp.symbol,
                market_type = %opp.market_type,
                buy = %opp.best_ask.exchange,
                buy_price = opp.best_ask.price,
                sell = %opp.best_bid.exchange,
                sell_price = opp.best_bid.price,
                spread_pct = opp.spread_percent,
                total_ticks = ticks,
                "Arbitrage"
            ),
            MarketEvent::ArbitrageCleared {
                symbol,
                market_type,
            } => info!(symbol = %symbol, market_type = %market_type, "Arbitrage cleared"),
            MarketEvent::Reconnecting {
                exchange,
                market_type,
                attempt,
                delay_ms,
            } => warn!(
                exchange = %exchange,
                market_type = ?market_type,
                attempt,
                delay_ms,
                "Reconnecting"
            ),
            _ => {}
        }
    }
    info!(total_ticks = ticks, skipped = events.skipped(), "Event stream closed");
}

async fn log_stats(service: Arc<AggregationService>, every: std::time::Duration) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await;
    loop {
        interval.tick().await;
        let cache = service.cache();
        let adapters = service.adapter_status().await;
        info!(
            cached = cache.len(),
            exchanges = ?cache.exchanges(),
            opportunities = service.opportunities().len(),
            adapters = ?adapters,
            "Stats"
        );
    }
}
