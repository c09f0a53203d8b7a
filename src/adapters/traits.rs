//! Exchange adapter trait definition
//!
//! The ExchangeAdapter trait defines the common interface that all
//! exchange adapters implement so the service can drive them uniformly.

use async_trait::async_trait;

use crate::adapters::errors::ExchangeResult;
use crate::adapters::types::{Exchange, SubscriptionSet, Symbols};

/// Common trait for all streaming market data adapters
///
/// An adapter owns its connections and pushes every normalized tick and
/// lifecycle change into the pipeline channel it was built with.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Open all connections and wait until they are live
    ///
    /// Connections keep reconnecting in the background afterwards; callers
    /// usually bound this with a timeout.
    async fn connect(&mut self) -> ExchangeResult<()>;

    /// Close all connections. Terminal for the adapter.
    async fn disconnect(&mut self) -> ExchangeResult<()>;

    /// Subscribe one symbol or a list of symbols
    ///
    /// Accepts canonical (`BTC-USDT`), native (`BTCUSDT`) or bare base
    /// (`BTC`) symbols. Pairs already subscribed are skipped, so calling
    /// this twice with the same input sends nothing the second time.
    /// Frames sent before the socket is open are queued and flushed on open.
    ///
    /// # Returns
    /// Number of newly subscribed (symbol, stream) pairs
    async fn subscribe(&mut self, symbols: Symbols) -> ExchangeResult<usize>;

    /// Pairs requested so far (replayed after every reconnect)
    fn subscriptions(&self) -> &SubscriptionSet;

    /// Whether every owned connection is currently open
    fn is_connected(&self) -> bool;

    fn exchange(&self) -> Exchange;
}
