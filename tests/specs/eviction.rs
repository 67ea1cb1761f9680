// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Procedure history eviction specs.

use super::helpers::*;
use oet_core::{ProcedureId, ProcedureInput, ProcedureState};

/// After twelve completed procedures only ten summaries remain and the two
/// earliest ids are gone.
#[test]
fn history_retains_at_most_ten_procedures() {
    let h = Harness::new();
    let mut pids: Vec<ProcedureId> = Vec::new();

    for i in 0..12 {
        let script = h.script(&format!("hello-{i}.lua"), HAPPY_SCRIPT);
        let prepared = h
            .prepare(script, ProcedureInput::with_kwarg("subarray_id", serde_json::json!(1)))
            .expect("prepare");
        h.wait_for_state(prepared.id, ProcedureState::Ready);
        h.start_main(prepared.id).expect("start");
        h.wait_for_state(prepared.id, ProcedureState::Complete);
        pids.push(prepared.id);
    }

    let summaries = h.list(None);
    assert_eq!(summaries.len(), 10);
    let retained: Vec<ProcedureId> = summaries.iter().map(|s| s.id).collect();
    assert!(!retained.contains(&pids[0]));
    assert!(!retained.contains(&pids[1]));
    for pid in &pids[2..] {
        assert!(retained.contains(pid), "{pid} should have been retained");
    }
    h.finish();
}

/// A procedure still running is never evicted, even over the cap.
#[test]
fn running_procedures_survive_eviction() {
    let h = Harness::new();
    let looping = h
        .prepare(
            h.script("loop.lua", LOOPING_SCRIPT),
            ProcedureInput::with_kwarg("subarray_id", serde_json::json!(1)),
        )
        .expect("prepare");
    h.wait_for_state(looping.id, ProcedureState::Ready);
    h.start_main(looping.id).expect("start");
    h.wait_for_state(looping.id, ProcedureState::Running);

    for i in 0..12 {
        let script = h.script(&format!("hello-{i}.lua"), HAPPY_SCRIPT);
        let prepared = h
            .prepare(script, ProcedureInput::with_kwarg("subarray_id", serde_json::json!(1)))
            .expect("prepare");
        h.wait_for_state(prepared.id, ProcedureState::Ready);
        h.start_main(prepared.id).expect("start");
        h.wait_for_state(prepared.id, ProcedureState::Complete);
    }

    let summaries = h.list(None);
    assert!(summaries.iter().any(|s| s.id == looping.id));
    assert!(summaries.len() <= 11);

    h.stop(looping.id, false).expect("stop");
    h.wait_for_state(looping.id, ProcedureState::Stopped);
    h.finish();
}
