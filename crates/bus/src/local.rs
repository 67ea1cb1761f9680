// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-worker topic bus.
//!
//! Each worker owns one registry; nothing is process-global. Subscribers
//! receive synchronous callbacks on the publishing thread. Only the event
//! bus bridge carries messages between workers.

use oet_core::{BusMessage, Topic};
use parking_lot::Mutex;
use std::sync::Arc;

/// Handle for removing a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type SubscriberFn = Arc<dyn Fn(&BusMessage) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    /// None subscribes to every topic.
    filter: Option<Topic>,
    callback: SubscriberFn,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscriptions: Vec<Subscription>,
}

/// Topic-filtered publish/subscribe registry scoped to one worker.
#[derive(Clone, Default)]
pub struct LocalBus {
    registry: Arc<Mutex<Registry>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a callback to one topic.
    pub fn subscribe(
        &self,
        topic: Topic,
        callback: impl Fn(&BusMessage) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.add(Some(topic), Arc::new(callback))
    }

    /// Subscribe a callback to every topic in the tree.
    pub fn subscribe_all(
        &self,
        callback: impl Fn(&BusMessage) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.add(None, Arc::new(callback))
    }

    fn add(&self, filter: Option<Topic>, callback: SubscriberFn) -> SubscriptionId {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        registry.subscriptions.push(Subscription { id, filter, callback });
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.registry.lock().subscriptions.retain(|s| s.id != id);
    }

    /// Deliver a message to every matching subscriber on this thread.
    ///
    /// Callbacks run outside the registry lock so they may subscribe or
    /// publish in turn.
    pub fn publish(&self, msg: &BusMessage) {
        let topic = msg.topic();
        let callbacks: Vec<SubscriberFn> = {
            let registry = self.registry.lock();
            registry
                .subscriptions
                .iter()
                .filter(|s| s.filter.is_none() || s.filter == Some(topic))
                .map(|s| Arc::clone(&s.callback))
                .collect()
        };
        for callback in callbacks {
            callback(msg);
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().subscriptions.len()
    }
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
