// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event fabric specs: loop guard, request correlation, shutdown hygiene.

use super::helpers::*;
use oet_core::{ProcedureInput, ProcedureState, Topic};

/// Each prepare produces exactly one request-correlated created message and
/// exactly one broadcast created message on the API side; nothing bounces
/// back a second time through the bridge loop.
#[test]
fn created_events_are_delivered_exactly_once() {
    let h = Harness::new();
    let script = h.script("hello.lua", HAPPY_SCRIPT);

    let prepared = h
        .prepare(script, ProcedureInput::with_kwarg("subarray_id", serde_json::json!(1)))
        .expect("prepare");
    h.wait_for_state(prepared.id, ProcedureState::Ready);

    // one reply for the prepare call itself
    h.wait_for_stream(|m| m.topic == Topic::ProcedureLifecycleCreated && m.request_id.is_some());
    // one broadcast when loading finished
    h.wait_for_stream(|m| m.topic == Topic::ProcedureLifecycleCreated && m.request_id.is_none());
    std::thread::sleep(std::time::Duration::from_millis(100));

    let stream = h.stream.lock().clone();
    let with_id = stream
        .iter()
        .filter(|m| m.topic == Topic::ProcedureLifecycleCreated && m.request_id.is_some())
        .count();
    let broadcast = stream
        .iter()
        .filter(|m| m.topic == Topic::ProcedureLifecycleCreated && m.request_id.is_none())
        .count();
    assert_eq!(with_id, 1);
    assert_eq!(broadcast, 1);
    h.finish();
}

/// Concurrent requests each receive the reply minted for them.
#[test]
fn replies_match_their_requests_under_concurrency() {
    let h = Harness::new();
    let mut prepared = Vec::new();
    for i in 0..3 {
        let script = h.script(&format!("hello-{i}.lua"), HAPPY_SCRIPT);
        let summary = h
            .prepare(script, ProcedureInput::with_kwarg("subarray_id", serde_json::json!(i)))
            .expect("prepare");
        prepared.push(summary);
    }

    // every summary refers to its own request's subarray
    for (i, summary) in prepared.iter().enumerate() {
        assert_eq!(
            summary.script_args[0].fn_args.subarray_id(),
            Some(&serde_json::json!(i)),
        );
    }
    h.finish();
}

/// After a clean shutdown no worker is alive and the queues are drained.
#[test]
fn clean_shutdown_leaves_nothing_running() {
    let h = Harness::new();
    let script = h.script("hello.lua", HAPPY_SCRIPT);
    let prepared = h
        .prepare(script, ProcedureInput::with_kwarg("subarray_id", serde_json::json!(1)))
        .expect("prepare");
    h.wait_for_state(prepared.id, ProcedureState::Ready);

    let ctx = h.finish();
    assert!(ctx.workers().iter().all(|w| !w.is_alive()));
    assert_eq!(ctx.event_queue().len(), 0);
}

/// The statechange topic is internal but still observable downstream, with
/// the procedure id as its source.
#[test]
fn statechanges_stream_with_the_procedure_as_source() {
    let h = Harness::new();
    let script = h.script("hello.lua", HAPPY_SCRIPT);
    let prepared = h
        .prepare(script, ProcedureInput::with_kwarg("subarray_id", serde_json::json!(1)))
        .expect("prepare");
    h.wait_for_state(prepared.id, ProcedureState::Ready);

    let pid = prepared.id.to_string();
    h.wait_for_stream(|m| {
        m.topic == Topic::ProcedureLifecycleStatechange && m.msg_src.as_deref() == Some(&pid)
    });
    h.finish();
}
