// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use oet_core::{
    ArgCapture, ExecutableScript, FileSystemScript, ProcedureHistory, ProcedureId,
    ProcedureState, ProcedureSummary,
};

fn summary(id: u32) -> ProcedureSummary {
    ProcedureSummary {
        id: ProcedureId(id),
        script: ExecutableScript::Filesystem(
            FileSystemScript::new("file:///scripts/observe.lua").unwrap(),
        ),
        script_args: vec![ArgCapture::new("init", Default::default(), 1.0)],
        history: ProcedureHistory::default(),
        state: ProcedureState::Ready,
    }
}

/// Echo a reply for every list request, addressed to the request's id.
fn install_list_responder(bus: &LocalBus, reply_with: u32) {
    let responder = bus.clone();
    bus.subscribe(Topic::RequestProcedureList, move |msg: &BusMessage| {
        if let MessagePayload::RequestProcedureList { request_id, .. } = &msg.payload {
            responder.publish(&BusMessage::local(MessagePayload::ProcedurePoolList {
                request_id: Some(*request_id),
                result: CommandResult::Summaries { summaries: vec![summary(reply_with)] },
            }));
        }
    });
}

#[test]
fn request_ids_are_unique_and_monotonic() {
    let mut last = 0;
    for _ in 0..1_000 {
        let id = mint_request_id();
        assert!(id > last);
        last = id;
    }
}

#[test]
fn round_trip_returns_matching_reply() {
    let bus = LocalBus::new();
    install_list_responder(&bus, 7);

    let bridge = RequestBridge::with_timeout(bus, Duration::from_millis(500));
    let result = bridge
        .call(Topic::ProcedurePoolList, |request_id| MessagePayload::RequestProcedureList {
            request_id,
            pids: None,
        })
        .unwrap();
    match result {
        CommandResult::Summaries { summaries } => assert_eq!(summaries[0].id, ProcedureId(7)),
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn replies_for_other_requests_are_ignored() {
    let bus = LocalBus::new();

    // A decoy reply with a foreign request id arrives first; the bridge
    // must keep waiting for its own.
    let decoy_bus = bus.clone();
    bus.subscribe(Topic::RequestProcedureList, move |msg: &BusMessage| {
        if let MessagePayload::RequestProcedureList { request_id, .. } = &msg.payload {
            decoy_bus.publish(&BusMessage::local(MessagePayload::ProcedurePoolList {
                request_id: Some(request_id + 1),
                result: CommandResult::Summaries { summaries: vec![summary(666)] },
            }));
            decoy_bus.publish(&BusMessage::local(MessagePayload::ProcedurePoolList {
                request_id: Some(*request_id),
                result: CommandResult::Summaries { summaries: vec![summary(1)] },
            }));
        }
    });

    let bridge = RequestBridge::with_timeout(bus, Duration::from_millis(500));
    let result = bridge
        .call(Topic::ProcedurePoolList, |request_id| MessagePayload::RequestProcedureList {
            request_id,
            pids: None,
        })
        .unwrap();
    match result {
        CommandResult::Summaries { summaries } => assert_eq!(summaries[0].id, ProcedureId(1)),
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn timeout_surfaces_as_gateway_timeout() {
    let bus = LocalBus::new();
    let bridge = RequestBridge::with_timeout(bus.clone(), Duration::from_millis(50));
    let err = bridge
        .call(Topic::ProcedurePoolList, |request_id| MessagePayload::RequestProcedureList {
            request_id,
            pids: None,
        })
        .unwrap_err();
    assert!(matches!(err, BridgeError::Timeout { .. }));
    assert_eq!(err.error_detail().kind, ErrorKind::Timeout);
    // the temporary subscription is removed again
    assert_eq!(bus.subscriber_count(), 0);
}

#[test]
fn error_payload_is_reraised_with_its_kind() {
    let bus = LocalBus::new();
    let responder = bus.clone();
    bus.subscribe(Topic::RequestProcedureCreate, move |msg: &BusMessage| {
        if let MessagePayload::RequestProcedureCreate { request_id, .. } = &msg.payload {
            responder.publish(&BusMessage::local(MessagePayload::ProcedureCreated {
                request_id: Some(*request_id),
                result: CommandResult::from_error(ErrorDetail::new(
                    ErrorKind::StartupFailure,
                    "no startup signal",
                )),
            }));
        }
    });

    let bridge = RequestBridge::with_timeout(bus, Duration::from_millis(500));
    let err = bridge
        .call(Topic::ProcedureLifecycleCreated, |request_id| {
            MessagePayload::RequestProcedureCreate {
                request_id,
                cmd: oet_core::PrepareCommand {
                    script: ExecutableScript::Filesystem(
                        FileSystemScript::new("file:///scripts/observe.lua").unwrap(),
                    ),
                    init_args: Default::default(),
                },
            }
        })
        .unwrap_err();
    match err {
        BridgeError::Remote(detail) => {
            assert_eq!(detail.kind, ErrorKind::StartupFailure);
            assert_eq!(detail.message, "no startup signal");
        }
        other => panic!("unexpected error {other:?}"),
    }
}
