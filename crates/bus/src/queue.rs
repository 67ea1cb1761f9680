// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded inter-worker event queues.
//!
//! Queue handles are clonable and multi-producer/multi-consumer. Puts and
//! gets return success booleans and options instead of raising, blocking at
//! most [`MPQUEUE_TIMEOUT`] so loops keep observing the shutdown flag.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use oet_core::EventMessage;
use std::time::Duration;

/// Maximum time a queue put or get blocks before giving up.
pub const MPQUEUE_TIMEOUT: Duration = Duration::from_millis(20);

/// Default queue capacity. Queues are always bounded; persistent fullness is
/// surfaced to the producer as a failed put.
pub const DEFAULT_CAPACITY: usize = 100;

/// Bounded MPMC queue of [`EventMessage`]s.
#[derive(Clone)]
pub struct EventQueue {
    tx: Sender<EventMessage>,
    rx: Receiver<EventMessage>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::bounded(DEFAULT_CAPACITY)
    }

    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx }
    }

    /// Put an item on the queue, blocking at most [`MPQUEUE_TIMEOUT`] for a
    /// free slot. Returns false if no slot became available in time.
    pub fn safe_put(&self, msg: EventMessage) -> bool {
        self.put_timeout(msg, MPQUEUE_TIMEOUT)
    }

    /// Put with an explicit timeout.
    pub fn put_timeout(&self, msg: EventMessage, timeout: Duration) -> bool {
        match self.tx.send_timeout(msg, timeout) {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(_)) | Err(SendTimeoutError::Disconnected(_)) => false,
        }
    }

    /// Remove and return the next item, blocking at most
    /// [`MPQUEUE_TIMEOUT`]. Returns None if no item became available.
    pub fn safe_get(&self) -> Option<EventMessage> {
        self.get_timeout(MPQUEUE_TIMEOUT)
    }

    /// Get with an explicit timeout.
    pub fn get_timeout(&self, timeout: Duration) -> Option<EventMessage> {
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => Some(msg),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drain all immediately available items.
    pub fn drain(&self) -> Vec<EventMessage> {
        let mut items = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            items.push(msg);
        }
        items
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
