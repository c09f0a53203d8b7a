//! Consumer-side event subscription
//!
//! Wraps a broadcast receiver. Dropping the subscription unregisters it.
//! A consumer that falls behind skips the events it missed.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::core::types::MarketEvent;

/// Default capacity of the service event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Handle returned by `AggregationService::subscribe`
#[derive(Debug)]
pub struct EventSubscription {
    rx: broadcast::Receiver<MarketEvent>,
    skipped: u64,
}

impl EventSubscription {
    pub fn new(rx: broadcast::Receiver<MarketEvent>) -> Self {
        Self { rx, skipped: 0 }
    }

    /// Next event, or `None` once the service has shut down
    pub async fn recv(&mut self) -> Option<MarketEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(n)) => {
                    self.skipped += n;
                    tracing::warn!(skipped = n, "Event subscriber lagged, skipped events");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next buffered event without waiting
    pub fn try_recv(&mut self) -> Option<MarketEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(n)) => {
                    self.skipped += n;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Total events skipped because this subscriber lagged
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}
