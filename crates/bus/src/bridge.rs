// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Synchronous request/response over the asynchronous bus.
//!
//! The bridge publishes a request topic with a freshly minted request id,
//! then blocks on a single-slot rendezvous that a temporary response-topic
//! subscription fills — but only for the reply whose `request_id` matches.
//! Timeouts surface as gateway timeouts; error payloads are re-raised with
//! their classified kind.

use crate::local::LocalBus;
use oet_core::{BusMessage, CommandResult, ErrorDetail, ErrorKind, MessagePayload, RequestId, Topic};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Maximum wait for a reply before surfacing a gateway timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

static LAST_REQUEST_ID: AtomicU64 = AtomicU64::new(0);

/// Mint a unique request id: monotonic nanoseconds since the epoch, bumped
/// past the previous id when the clock does not advance between calls.
pub fn mint_request_id() -> RequestId {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let mut prev = LAST_REQUEST_ID.load(Ordering::SeqCst);
    loop {
        let id = now.max(prev + 1);
        match LAST_REQUEST_ID.compare_exchange(prev, id, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return id,
            Err(actual) => prev = actual,
        }
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("timeout waiting for msg #{request_id} on topic {topic}")]
    Timeout { topic: Topic, request_id: RequestId },

    #[error("{0}")]
    Remote(ErrorDetail),

    #[error("reply on topic {topic} carried no command result")]
    MalformedReply { topic: Topic },
}

impl BridgeError {
    /// Classified detail for the HTTP error document.
    pub fn error_detail(&self) -> ErrorDetail {
        match self {
            BridgeError::Timeout { topic, request_id } => ErrorDetail::new(
                ErrorKind::Timeout,
                format!("Timeout waiting for msg #{request_id} on topic {topic}"),
            ),
            BridgeError::Remote(detail) => detail.clone(),
            BridgeError::MalformedReply { topic } => ErrorDetail::new(
                ErrorKind::Fatal,
                format!("reply on topic {topic} carried no command result"),
            ),
        }
    }
}

/// Correlates one published request with its matching reply.
#[derive(Clone)]
pub struct RequestBridge {
    bus: LocalBus,
    timeout: Duration,
}

impl RequestBridge {
    pub fn new(bus: LocalBus) -> Self {
        Self { bus, timeout: REQUEST_TIMEOUT }
    }

    pub fn with_timeout(bus: LocalBus, timeout: Duration) -> Self {
        Self { bus, timeout }
    }

    /// Publish the request built by `make_request` and block until the
    /// matching reply arrives on `response_topic` or the timeout elapses.
    pub fn call(
        &self,
        response_topic: Topic,
        make_request: impl FnOnce(RequestId) -> MessagePayload,
    ) -> Result<CommandResult, BridgeError> {
        let request_id = mint_request_id();
        let (reply_tx, reply_rx) = crossbeam_channel::bounded::<MessagePayload>(1);

        let subscription = self.bus.subscribe(response_topic, move |msg: &BusMessage| {
            if msg.request_id() == Some(request_id) {
                // Single-slot handoff; a duplicate reply is dropped.
                let _ = reply_tx.try_send(msg.payload.clone());
            }
        });

        self.bus.publish(&BusMessage::local(make_request(request_id)));
        let outcome = reply_rx.recv_timeout(self.timeout);
        self.bus.unsubscribe(subscription);

        match outcome {
            Ok(payload) => match payload.command_result() {
                Some(CommandResult::Error { error }) => Err(BridgeError::Remote(error.clone())),
                Some(result) => Ok(result.clone()),
                None => Err(BridgeError::MalformedReply { topic: response_topic }),
            },
            Err(_) => Err(BridgeError::Timeout { topic: response_topic, request_id }),
        }
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
