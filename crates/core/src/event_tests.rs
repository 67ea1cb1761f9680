// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::ErrorKind;
use crate::procedure::{ProcedureId, ProcedureState};
use crate::script::FileSystemScript;

fn sample_summary() -> crate::procedure::ProcedureSummary {
    crate::procedure::ProcedureSummary {
        id: ProcedureId(4),
        script: crate::script::ExecutableScript::Filesystem(
            FileSystemScript::new("file:///scripts/observe.lua").unwrap(),
        ),
        script_args: vec![],
        history: crate::procedure::ProcedureHistory::default(),
        state: ProcedureState::Ready,
    }
}

#[test]
fn payload_serialises_with_topic_tag() {
    let payload = MessagePayload::ProcedureStateChange { new_state: ProcedureState::Running };
    let json = serde_json::to_value(&payload).unwrap();
    assert_eq!(json["topic"], "procedure.lifecycle.statechange");
    assert_eq!(json["new_state"], "RUNNING");
}

#[test]
fn payload_with_unknown_topic_fails_deserialisation() {
    let json = serde_json::json!({"topic": "procedure.lifecycle.vanish", "new_state": "IDLE"});
    assert!(serde_json::from_value::<MessagePayload>(json).is_err());
}

#[test]
fn payload_topic_matches_serde_tag() {
    let cases = vec![
        MessagePayload::ProcedureStateChange { new_state: ProcedureState::Idle },
        MessagePayload::ProcedureStacktrace { stacktrace: "trace".into() },
        MessagePayload::ProcedureCreated {
            request_id: Some(7),
            result: CommandResult::from_summary(sample_summary()),
        },
        MessagePayload::ProcedurePoolList {
            request_id: None,
            result: CommandResult::Summaries { summaries: vec![] },
        },
        MessagePayload::UserScriptAnnounce { msg: "hello".into() },
        MessagePayload::SbStarted { sbi_id: "sbi-001".into() },
    ];
    for payload in cases {
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["topic"], payload.topic().as_str());
        let back: MessagePayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }
}

#[test]
fn request_id_extraction() {
    let req = MessagePayload::RequestProcedureList { request_id: 99, pids: None };
    assert_eq!(req.request_id(), Some(99));

    let reply = MessagePayload::ProcedureCreated {
        request_id: Some(99),
        result: CommandResult::from_error(ErrorDetail::new(
            ErrorKind::StartupFailure,
            "no signal",
        )),
    };
    assert_eq!(reply.request_id(), Some(99));

    let internal = MessagePayload::ProcedureStateChange { new_state: ProcedureState::Idle };
    assert_eq!(internal.request_id(), None);
}

#[test]
fn command_result_accessor_covers_response_topics() {
    let reply = MessagePayload::ProcedureStopped {
        request_id: Some(1),
        result: CommandResult::Summaries { summaries: vec![sample_summary()] },
    };
    assert!(reply.command_result().is_some());

    let req = MessagePayload::RequestProcedureList { request_id: 1, pids: None };
    assert!(req.command_result().is_none());
}

#[test]
fn bus_message_local_has_no_source() {
    let msg = BusMessage::local(MessagePayload::UserScriptAnnounce { msg: "hi".into() });
    assert!(msg.msg_src.is_none());
    assert_eq!(msg.topic(), Topic::UserScriptAnnounce);

    let stamped = BusMessage::from_source("exec-worker", msg.payload);
    assert_eq!(stamped.msg_src.as_deref(), Some("exec-worker"));
}

#[test]
fn event_message_constructors() {
    let evt = EventMessage::pubsub(
        "3",
        MessagePayload::ProcedureStateChange { new_state: ProcedureState::Complete },
    );
    assert_eq!(evt.msg_src, "3");
    assert!(evt.payload().is_some());

    let fatal = EventMessage::fatal("exec-worker", "queue closed");
    assert!(matches!(fatal.content, MessageContent::Fatal { .. }));
    assert!(fatal.payload().is_none());

    let end = EventMessage::end("main");
    assert!(matches!(end.content, MessageContent::End));
}

#[test]
fn command_result_round_trips() {
    let results = vec![
        CommandResult::from_summary(sample_summary()),
        CommandResult::Summaries { summaries: vec![sample_summary()] },
        CommandResult::from_error(ErrorDetail::new(ErrorKind::Timeout, "no reply")),
    ];
    for result in results {
        let json = serde_json::to_value(&result).unwrap();
        let back: CommandResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }
}
