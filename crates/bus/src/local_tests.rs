// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use oet_core::{MessagePayload, ProcedureState};
use parking_lot::Mutex;
use std::sync::Arc;

fn statechange(state: ProcedureState) -> BusMessage {
    BusMessage::local(MessagePayload::ProcedureStateChange { new_state: state })
}

fn announce(msg: &str) -> BusMessage {
    BusMessage::local(MessagePayload::UserScriptAnnounce { msg: msg.into() })
}

#[test]
fn subscriber_receives_matching_topic_only() {
    let bus = LocalBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.subscribe(Topic::UserScriptAnnounce, move |msg| {
        sink.lock().push(msg.topic());
    });

    bus.publish(&statechange(ProcedureState::Idle));
    bus.publish(&announce("hello"));

    assert_eq!(seen.lock().as_slice(), &[Topic::UserScriptAnnounce]);
}

#[test]
fn subscribe_all_receives_every_topic() {
    let bus = LocalBus::new();
    let count = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&count);
    bus.subscribe_all(move |_| *sink.lock() += 1);

    bus.publish(&statechange(ProcedureState::Idle));
    bus.publish(&announce("hello"));
    assert_eq!(*count.lock(), 2);
}

#[test]
fn unsubscribe_stops_delivery() {
    let bus = LocalBus::new();
    let count = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&count);
    let id = bus.subscribe_all(move |_| *sink.lock() += 1);

    bus.publish(&announce("one"));
    bus.unsubscribe(id);
    bus.publish(&announce("two"));

    assert_eq!(*count.lock(), 1);
    assert_eq!(bus.subscriber_count(), 0);
}

#[test]
fn callbacks_run_on_publishing_thread() {
    let bus = LocalBus::new();
    let publisher_thread = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&publisher_thread);
    bus.subscribe(Topic::UserScriptAnnounce, move |_| {
        *sink.lock() = Some(std::thread::current().id());
    });
    bus.publish(&announce("hi"));
    assert_eq!(*publisher_thread.lock(), Some(std::thread::current().id()));
}

#[test]
fn subscriber_may_publish_in_turn() {
    let bus = LocalBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let chained = bus.clone();
    bus.subscribe(Topic::UserScriptAnnounce, move |msg| {
        if matches!(&msg.payload, MessagePayload::UserScriptAnnounce { msg } if msg == "first") {
            chained.publish(&announce("second"));
        }
    });
    let sink = Arc::clone(&seen);
    bus.subscribe(Topic::UserScriptAnnounce, move |msg| {
        if let MessagePayload::UserScriptAnnounce { msg } = &msg.payload {
            sink.lock().push(msg.clone());
        }
    });

    bus.publish(&announce("first"));
    let seen = seen.lock();
    assert!(seen.contains(&"first".to_string()));
    assert!(seen.contains(&"second".to_string()));
}

#[test]
fn clones_share_the_registry() {
    let bus = LocalBus::new();
    let other = bus.clone();
    let count = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&count);
    other.subscribe_all(move |_| *sink.lock() += 1);
    bus.publish(&announce("shared"));
    assert_eq!(*count.lock(), 1);
}
