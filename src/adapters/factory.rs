//! Adapter factory for dynamic exchange selection
//!
//! Builds the adapter for each enabled [`Exchange`]. Uses an enum-based
//! dispatch pattern (no `Box<dyn>`).

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::adapters::binance::{BinanceAdapter, BinanceConfig};
use crate::adapters::errors::ExchangeResult;
use crate::adapters::okx::{OkxAdapter, OkxConfig};
use crate::adapters::traits::ExchangeAdapter;
use crate::adapters::types::{Exchange, SubscriptionSet, Symbols};
use crate::core::types::MarketEvent;

// =============================================================================
// AnyAdapter - enum-based dispatch
// =============================================================================

/// Enum wrapping all concrete adapter types for runtime dispatch.
pub enum AnyAdapter {
    Binance(BinanceAdapter),
    Okx(OkxAdapter),
}

/// Delegate a trait method to the wrapped adapter
macro_rules! delegate {
    ($self:expr, $method:ident ( $($arg:expr),* )) => {
        match $self {
            AnyAdapter::Binance(a) => a.$method($($arg),*),
            AnyAdapter::Okx(a) => a.$method($($arg),*),
        }
    };
    (await $self:expr, $method:ident ( $($arg:expr),* )) => {
        match $self {
            AnyAdapter::Binance(a) => a.$method($($arg),*).await,
            AnyAdapter::Okx(a) => a.$method($($arg),*).await,
        }
    };
}

#[async_trait]
impl ExchangeAdapter for AnyAdapter {
    async fn connect(&mut self) -> ExchangeResult<()> {
        delegate!(await self, connect())
    }

    async fn disconnect(&mut self) -> ExchangeResult<()> {
        delegate!(await self, disconnect())
    }

    async fn subscribe(&mut self, symbols: Symbols) -> ExchangeResult<usize> {
        delegate!(await self, subscribe(symbols))
    }

    fn subscriptions(&self) -> &SubscriptionSet {
        delegate!(self, subscriptions())
    }

    fn is_connected(&self) -> bool {
        delegate!(self, is_connected())
    }

    fn exchange(&self) -> Exchange {
        delegate!(self, exchange())
    }
}

// =============================================================================
// Factory Functions
// =============================================================================

/// Per-exchange settings used when building adapters
#[derive(Debug, Clone, Default)]
pub struct AdapterConfigs {
    pub binance: BinanceConfig,
    pub okx: OkxConfig,
}

impl AdapterConfigs {
    pub fn from_env() -> Self {
        Self {
            binance: BinanceConfig::from_env(),
            okx: OkxConfig::from_env(),
        }
    }
}

/// Build the adapter for `exchange` from explicit configs.
///
/// The adapter is created but NOT connected; call `connect()` after.
pub fn build_adapter(
    exchange: Exchange,
    configs: &AdapterConfigs,
    events: mpsc::Sender<MarketEvent>,
) -> AnyAdapter {
    match exchange {
        Exchange::Binance => AnyAdapter::Binance(BinanceAdapter::new(configs.binance.clone(), events)),
        Exchange::Okx => AnyAdapter::Okx(OkxAdapter::new(configs.okx.clone(), events)),
    }
}
