//! Exchange adapter error types
//!
//! All connection and adapter failures are wrapped in `ExchangeError`.
//! None of them are fatal to the process: the connection layer recovers
//! from transport errors on its own and only surfaces them as events.

use thiserror::Error;

/// Exchange-specific error types for connection and adapter operations
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// Connection to exchange failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection was closed manually or gave up reconnecting
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Subscription to market data failed
    #[error("Subscription failed for {symbol}: {reason}")]
    SubscriptionFailed { symbol: String, reason: String },

    /// Network operation timed out
    #[error("Network timeout after {0}ms")]
    NetworkTimeout(u64),

    /// WebSocket protocol error (boxed to reduce enum size)
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
}

/// Result type alias for exchange operations
pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;
