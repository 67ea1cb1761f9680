// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Procedure lifecycle specs: the happy path and the failing script.

use super::helpers::*;
use oet_core::{
    procedure::valid_transition, MessagePayload, ProcedureInput, ProcedureState, Topic,
};

/// A filesystem script is prepared, progresses to READY, runs `main`, and
/// completes; the stream carries created/started/complete with the request
/// ids of the originating calls.
#[test]
fn happy_path_filesystem_script() {
    let h = Harness::new();
    let script = h.script("hello.lua", HAPPY_SCRIPT);

    let prepared = h
        .prepare(script, ProcedureInput::with_kwarg("subarray_id", serde_json::json!(1)))
        .expect("prepare");
    assert_eq!(prepared.history.process_states[0].0, ProcedureState::Creating);

    let ready = h.wait_for_state(prepared.id, ProcedureState::Ready);
    let states: Vec<ProcedureState> =
        ready.history.process_states.iter().map(|(s, _)| *s).collect();
    assert_eq!(
        states,
        vec![
            ProcedureState::Creating,
            ProcedureState::Loading,
            ProcedureState::Idle,
            ProcedureState::Running,
            ProcedureState::Ready,
        ]
    );

    h.start_main(prepared.id).expect("start");
    let done = h.wait_for_state(prepared.id, ProcedureState::Complete);
    assert_eq!(done.state, ProcedureState::Complete);
    for pair in done.history.process_states.windows(2) {
        assert!(valid_transition(pair[0].0, pair[1].0));
    }

    // the stream observed the whole lifecycle
    h.wait_for_stream(|m| m.topic == Topic::ProcedureLifecycleCreated);
    h.wait_for_stream(|m| m.topic == Topic::ProcedureLifecycleStarted);
    h.wait_for_stream(|m| m.topic == Topic::ProcedureLifecycleComplete);
    h.wait_for_stream(|m| {
        matches!(&m.payload, MessagePayload::UserScriptAnnounce { msg } if msg.contains("subarray 1"))
    });

    let ctx = h.finish();
    assert!(ctx.workers().iter().all(|w| !w.is_alive()));
}

/// A script that raises ends FAILED with the stacktrace recorded and the
/// failed lifecycle topic announced.
#[test]
fn raising_script_fails_with_stacktrace() {
    let h = Harness::new();
    let script = h.script("fail.lua", FAILING_SCRIPT);

    let prepared = h.prepare(script, ProcedureInput::default()).expect("prepare");
    h.wait_for_state(prepared.id, ProcedureState::Ready);
    h.start_main(prepared.id).expect("start");

    let failed = h.wait_for_state(prepared.id, ProcedureState::Failed);
    let stacktrace = failed.history.stacktrace.expect("stacktrace recorded");
    assert!(stacktrace.contains("boom"));

    h.wait_for_stream(|m| m.topic == Topic::ProcedureLifecycleFailed);
    h.finish();
}

/// Starting a procedure that is not READY is refused with a classified
/// error, not a crash.
#[test]
fn start_of_a_running_procedure_is_refused() {
    let h = Harness::new();
    let script = h.script("loop.lua", LOOPING_SCRIPT);

    let prepared = h
        .prepare(script, ProcedureInput::with_kwarg("subarray_id", serde_json::json!(1)))
        .expect("prepare");
    h.wait_for_state(prepared.id, ProcedureState::Ready);
    h.start_main(prepared.id).expect("start");
    h.wait_for_state(prepared.id, ProcedureState::Running);

    let err = h.start_main(prepared.id).expect_err("second start must fail");
    let detail = err.error_detail();
    assert_eq!(detail.kind, oet_core::ErrorKind::StateConflict);

    h.stop(prepared.id, false).expect("stop");
    h.wait_for_state(prepared.id, ProcedureState::Stopped);
    h.finish();
}

/// Stop on an already-terminal procedure changes nothing and creates no
/// abort procedure.
#[test]
fn stop_is_idempotent_on_terminal_procedures() {
    let h = Harness::new();
    let script = h.script("hello.lua", HAPPY_SCRIPT);

    let prepared = h
        .prepare(script, ProcedureInput::with_kwarg("subarray_id", serde_json::json!(1)))
        .expect("prepare");
    h.wait_for_state(prepared.id, ProcedureState::Ready);
    h.start_main(prepared.id).expect("start");
    h.wait_for_state(prepared.id, ProcedureState::Complete);

    let first = h.stop(prepared.id, true).expect("stop");
    let second = h.stop(prepared.id, true).expect("stop again");
    assert!(first.is_empty());
    assert!(second.is_empty());
    assert_eq!(h.list(Some(vec![prepared.id]))[0].state, ProcedureState::Complete);
    h.finish();
}

/// Unknown ids list as an empty pool, the REST layer's 404 signal.
#[test]
fn listing_an_unknown_procedure_is_empty() {
    let h = Harness::new();
    assert!(h.list(Some(vec![oet_core::ProcedureId(41)])).is_empty());
    h.finish();
}
