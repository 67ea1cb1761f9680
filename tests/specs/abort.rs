// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two-phase abort specs.

use super::helpers::*;
use oet_core::{ErrorKind, ProcedureInput, ProcedureState};

/// Stopping a running script with the abort flag stops it, then prepares
/// and runs the canned abort script against the same subarray.
#[test]
fn stop_with_abort_runs_the_abort_script() {
    let h = Harness::new();
    let script = h.script("loop.lua", LOOPING_SCRIPT);

    let prepared = h
        .prepare(script, ProcedureInput::with_kwarg("subarray_id", serde_json::json!(2)))
        .expect("prepare");
    h.wait_for_state(prepared.id, ProcedureState::Ready);
    h.start_main(prepared.id).expect("start");
    h.wait_for_state(prepared.id, ProcedureState::Running);

    let summaries = h.stop(prepared.id, true).expect("stop with abort");
    assert_eq!(summaries.len(), 1);
    let abort = &summaries[0];
    assert_ne!(abort.id, prepared.id);
    assert_eq!(
        abort.script_args[0].fn_args.subarray_id(),
        Some(&serde_json::json!(2)),
    );

    assert_eq!(
        h.list(Some(vec![prepared.id]))[0].state,
        ProcedureState::Stopped
    );
    h.wait_for_state(abort.id, ProcedureState::Complete);
    h.finish();
}

/// Without the abort flag a stop creates no follow-up procedure.
#[test]
fn stop_without_abort_creates_no_procedure() {
    let h = Harness::new();
    let script = h.script("loop.lua", LOOPING_SCRIPT);

    let prepared = h
        .prepare(script, ProcedureInput::with_kwarg("subarray_id", serde_json::json!(2)))
        .expect("prepare");
    h.wait_for_state(prepared.id, ProcedureState::Ready);
    h.start_main(prepared.id).expect("start");
    h.wait_for_state(prepared.id, ProcedureState::Running);

    let summaries = h.stop(prepared.id, false).expect("stop");
    assert!(summaries.is_empty());
    h.wait_for_state(prepared.id, ProcedureState::Stopped);
    assert_eq!(h.list(None).len(), 1);
    h.finish();
}

/// The abort needs a subarray to target; a script started without one
/// fails the stop command with a classified error.
#[test]
fn abort_without_a_subarray_id_fails_the_command() {
    let h = Harness::new();
    let script = h.script("loop.lua", LOOPING_SCRIPT);

    let prepared = h.prepare(script, ProcedureInput::default()).expect("prepare");
    h.wait_for_state(prepared.id, ProcedureState::Ready);
    h.start_main(prepared.id).expect("start");
    h.wait_for_state(prepared.id, ProcedureState::Running);

    let err = h.stop(prepared.id, true).expect_err("abort must fail");
    assert_eq!(err.error_detail().kind, ErrorKind::StateConflict);
    assert!(err.error_detail().message.contains("Subarray ID not specified"));
    h.finish();
}
