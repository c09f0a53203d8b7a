//! Root application configuration
//!
//! Built from defaults with environment overrides:
//!
//! | Variable                | Default              |
//! |-------------------------|----------------------|
//! | `SYMBOLS`               | `BTC-USDT,ETH-USDT`  |
//! | `EXCHANGES`             | `binance,okx`        |
//! | `ARB_THRESHOLD_PERCENT` | `0.1`                |
//! | `MAX_QUOTE_AGE_MS`      | unset (no age limit) |
//! | `PIPELINE_CAPACITY`     | `4096`               |
//! | `EVENT_CAPACITY`        | `1024`               |
//! | `CONNECT_TIMEOUT_SECS`  | `15`                 |
//! | `RESUBSCRIBE_DELAY_MS`  | `50`                 |
//! | `STATS_INTERVAL_SECS`   | `30`                 |
//!
//! Per-exchange endpoints come from `BinanceConfig::from_env` and
//! `OkxConfig::from_env`.

use std::str::FromStr;
use std::time::Duration;

use crate::adapters::factory::AdapterConfigs;
use crate::adapters::types::Exchange;
use crate::core::detector::DetectorConfig;
use crate::core::service::ServiceConfig;
use crate::error::AppError;

/// Root application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Symbols to stream, any accepted notation
    pub symbols: Vec<String>,
    /// Enabled exchanges and service tunables
    pub service: ServiceConfig,
    /// How often the binary logs cache statistics
    pub stats_interval: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTC-USDT".to_string(), "ETH-USDT".to_string()],
            service: ServiceConfig::default(),
            stats_interval: Duration::from_secs(30),
        }
    }
}

impl AppConfig {
    /// Defaults overridden from the environment.
    ///
    /// Unparseable numbers and unknown exchange names are configuration
    /// errors rather than silently falling back.
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();

        let symbols = match std::env::var("SYMBOLS") {
            Ok(raw) => split_list(&raw).map(str::to_string).collect(),
            Err(_) => defaults.symbols,
        };

        let exchanges = match std::env::var("EXCHANGES") {
            Ok(raw) => split_list(&raw)
                .map(|name| name.parse::<Exchange>().map_err(AppError::Config))
                .collect::<Result<Vec<_>, _>>()?,
            Err(_) => defaults.service.exchanges,
        };

        let detector = DetectorConfig {
            threshold_percent: env_or("ARB_THRESHOLD_PERCENT", defaults.service.detector.threshold_percent)?,
            max_quote_age_ms: env_opt("MAX_QUOTE_AGE_MS")?,
        };

        let service = ServiceConfig {
            exchanges,
            adapters: AdapterConfigs::from_env(),
            detector,
            pipeline_capacity: env_or("PIPELINE_CAPACITY", defaults.service.pipeline_capacity)?,
            event_capacity: env_or("EVENT_CAPACITY", defaults.service.event_capacity)?,
            connect_timeout: Duration::from_secs(env_or(
                "CONNECT_TIMEOUT_SECS",
                defaults.service.connect_timeout.as_secs(),
            )?),
            resubscribe_delay: Duration::from_millis(env_or(
                "RESUBSCRIBE_DELAY_MS",
                defaults.service.resubscribe_delay.as_millis() as u64,
            )?),
        };

        let stats_interval = Duration::from_secs(env_or(
            "STATS_INTERVAL_SECS",
            defaults.stats_interval.as_secs(),
        )?);

        Ok(Self {
            symbols,
            service,
            stats_interval,
        })
    }

    /// Validate all configuration rules
    pub fn validate(&self) -> Result<(), AppError> {
        if self.symbols.is_empty() {
            return Err(AppError::Config(
                "At least one symbol must be configured".to_string(),
            ));
        }

        if self.service.exchanges.is_empty() {
            return Err(AppError::Config(
                "At least one exchange must be enabled".to_string(),
            ));
        }

        let threshold = self.service.detector.threshold_percent;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(AppError::Config(format!(
                "Arbitrage threshold must be a non-negative percentage (got {})",
                threshold
            )));
        }

        if let Some(age) = self.service.detector.max_quote_age_ms {
            if age <= 0 {
                return Err(AppError::Config(format!(
                    "MAX_QUOTE_AGE_MS must be > 0 (got {})",
                    age
                )));
            }
        }

        if self.service.pipeline_capacity == 0 || self.service.event_capacity == 0 {
            return Err(AppError::Config(
                "Channel capacities must be > 0".to_string(),
            ));
        }

        if self.service.connect_timeout.is_zero() {
            return Err(AppError::Config(
                "CONNECT_TIMEOUT_SECS must be > 0".to_string(),
            ));
        }

        if self.stats_interval.is_zero() {
            return Err(AppError::Config(
                "STATS_INTERVAL_SECS must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn env_opt<T: FromStr>(name: &str) -> Result<Option<T>, AppError> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AppError::Config(format!("{} has an invalid value '{}'", name, raw))),
        _ => Ok(None),
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> Result<T, AppError> {
    Ok(env_opt(name)?.unwrap_or(default))
}

// ============================================================================
// Tests
// ============================================================================
