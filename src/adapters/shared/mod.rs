//! Shared helpers for exchange adapters
//!
//! Transport, backoff, outbound buffering and the self-healing connection
//! used by every adapter.

pub mod connection;
pub mod queue;
pub mod reconnect;
pub mod sink;
pub mod websocket;

pub use connection::{
    ConnectionConfig, ConnectionEvent, ConnectionSnapshot, ConnectionStatus, EventHandler,
    HeartbeatConfig, PongPredicate, ResilientConnection,
};
pub use queue::{OutboundQueue, DEFAULT_QUEUE_CAPACITY};
pub use reconnect::BackoffPolicy;
pub use sink::EventSink;
pub use websocket::{connect_ws, WsStream};
