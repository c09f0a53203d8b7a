//! Bounded outbound send queue
//!
//! Holds payloads written while the socket is not open. On overflow the
//! oldest payloads are dropped, so the newest `capacity` always survive.

use std::collections::VecDeque;

/// Default maximum number of queued payloads
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// FIFO of pending text payloads with drop-oldest overflow
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    items: VecDeque<String>,
    capacity: usize,
    dropped: u64,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(64)),
            capacity,
            dropped: 0,
        }
    }

    /// Append a payload; returns how many old payloads were evicted.
    pub fn push(&mut self, payload: String) -> usize {
        self.items.push_back(payload);
        let mut evicted = 0;
        while self.items.len() > self.capacity {
            self.items.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            self.dropped += evicted as u64;
            tracing::debug!(
                capacity = self.capacity,
                evicted = evicted,
                "Send queue capped, dropping oldest payloads"
            );
        }
        evicted
    }

    /// Put a payload back at the head (failed flush), keeping send order.
    ///
    /// If the queue is already full the payload is discarded, since it is
    /// older than everything queued behind it.
    pub fn push_front(&mut self, payload: String) {
        if self.items.len() >= self.capacity {
            self.dropped += 1;
            tracing::debug!(capacity = self.capacity, "Send queue full, dropping requeued payload");
            return;
        }
        self.items.push_front(payload);
    }

    pub fn pop(&mut self) -> Option<String> {
        self.items.pop_front()
    }

    /// Move every payload of `other` to the back of this queue, in order
    pub fn append(&mut self, other: &mut OutboundQueue) {
        while let Some(payload) = other.pop() {
            self.push(payload);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total payloads dropped since creation
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
