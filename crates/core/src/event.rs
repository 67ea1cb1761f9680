// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message envelopes for the two bus layers.
//!
//! [`BusMessage`] is the intra-worker pub/sub unit: a topic-tagged payload
//! plus the name of the worker (or procedure) it originated from. A missing
//! `msg_src` marks a message first published by the local worker; the event
//! bus bridge stamps the worker name when it republishes outbound.
//!
//! [`EventMessage`] is the inter-worker queue item routed by the main
//! context: PUBSUB messages fan out to every worker inbox, FATAL and END
//! break the dispatch loop, SHUTDOWN records a worker's normal exit.

use serde::{Deserialize, Serialize};

use crate::command::{PrepareCommand, StartCommand, StopCommand};
use crate::error::ErrorDetail;
use crate::procedure::{ProcedureId, ProcedureState, ProcedureSummary};
use crate::topic::Topic;

/// Correlation id minted by the request bridge (monotonic nanoseconds).
pub type RequestId = u64;

/// Result value carried on response topics.
///
/// Exceptions are not thrown across the bus; failures travel as the `Error`
/// variant and are re-raised by the request bridge at the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandResult {
    Summary { summary: ProcedureSummary },
    Summaries { summaries: Vec<ProcedureSummary> },
    Error { error: ErrorDetail },
}

impl CommandResult {
    pub fn from_summary(summary: ProcedureSummary) -> Self {
        CommandResult::Summary { summary }
    }

    pub fn from_error(error: ErrorDetail) -> Self {
        CommandResult::Error { error }
    }
}

/// Topic-tagged message payload. The serde tag is the dotted topic string,
/// so the closed topic tree is enforced by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic")]
pub enum MessagePayload {
    #[serde(rename = "request.procedure.create")]
    RequestProcedureCreate { request_id: RequestId, cmd: PrepareCommand },

    #[serde(rename = "request.procedure.start")]
    RequestProcedureStart { request_id: RequestId, cmd: StartCommand },

    #[serde(rename = "request.procedure.stop")]
    RequestProcedureStop { request_id: RequestId, cmd: StopCommand },

    #[serde(rename = "request.procedure.list")]
    RequestProcedureList {
        request_id: RequestId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pids: Option<Vec<ProcedureId>>,
    },

    /// Collaborator layer; the command document is opaque to this core.
    #[serde(rename = "request.activity.run")]
    RequestActivityRun { request_id: RequestId, cmd: serde_json::Value },

    #[serde(rename = "request.activity.list")]
    RequestActivityList {
        request_id: RequestId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        activity_ids: Option<Vec<String>>,
    },

    /// Internal; emitted for every state change of a script worker.
    #[serde(rename = "procedure.lifecycle.statechange")]
    ProcedureStateChange { new_state: ProcedureState },

    #[serde(rename = "procedure.lifecycle.stacktrace")]
    ProcedureStacktrace { stacktrace: String },

    #[serde(rename = "procedure.lifecycle.created")]
    ProcedureCreated {
        #[serde(default)]
        request_id: Option<RequestId>,
        result: CommandResult,
    },

    #[serde(rename = "procedure.lifecycle.started")]
    ProcedureStarted {
        #[serde(default)]
        request_id: Option<RequestId>,
        result: CommandResult,
    },

    #[serde(rename = "procedure.lifecycle.complete")]
    ProcedureComplete {
        #[serde(default)]
        request_id: Option<RequestId>,
        result: CommandResult,
    },

    #[serde(rename = "procedure.lifecycle.failed")]
    ProcedureFailed {
        #[serde(default)]
        request_id: Option<RequestId>,
        result: CommandResult,
    },

    #[serde(rename = "procedure.lifecycle.stopped")]
    ProcedureStopped {
        #[serde(default)]
        request_id: Option<RequestId>,
        result: CommandResult,
    },

    #[serde(rename = "procedure.pool.list")]
    ProcedurePoolList {
        #[serde(default)]
        request_id: Option<RequestId>,
        result: CommandResult,
    },

    #[serde(rename = "activity.lifecycle.running")]
    ActivityRunning {
        #[serde(default)]
        request_id: Option<RequestId>,
        result: serde_json::Value,
    },

    #[serde(rename = "activity.pool.list")]
    ActivityPoolList {
        #[serde(default)]
        request_id: Option<RequestId>,
        result: serde_json::Value,
    },

    #[serde(rename = "sb.lifecycle.started")]
    SbStarted { sbi_id: String },

    #[serde(rename = "sb.lifecycle.finished.succeeded")]
    SbFinishedSucceeded { sbi_id: String },

    #[serde(rename = "sb.lifecycle.finished.failed")]
    SbFinishedFailed { sbi_id: String },

    /// Free-form announcement from a user script, forwarded unchanged.
    #[serde(rename = "user.script.announce")]
    UserScriptAnnounce { msg: String },
}

impl MessagePayload {
    pub fn topic(&self) -> Topic {
        match self {
            MessagePayload::RequestProcedureCreate { .. } => Topic::RequestProcedureCreate,
            MessagePayload::RequestProcedureStart { .. } => Topic::RequestProcedureStart,
            MessagePayload::RequestProcedureStop { .. } => Topic::RequestProcedureStop,
            MessagePayload::RequestProcedureList { .. } => Topic::RequestProcedureList,
            MessagePayload::RequestActivityRun { .. } => Topic::RequestActivityRun,
            MessagePayload::RequestActivityList { .. } => Topic::RequestActivityList,
            MessagePayload::ProcedureStateChange { .. } => Topic::ProcedureLifecycleStatechange,
            MessagePayload::ProcedureStacktrace { .. } => Topic::ProcedureLifecycleStacktrace,
            MessagePayload::ProcedureCreated { .. } => Topic::ProcedureLifecycleCreated,
            MessagePayload::ProcedureStarted { .. } => Topic::ProcedureLifecycleStarted,
            MessagePayload::ProcedureComplete { .. } => Topic::ProcedureLifecycleComplete,
            MessagePayload::ProcedureFailed { .. } => Topic::ProcedureLifecycleFailed,
            MessagePayload::ProcedureStopped { .. } => Topic::ProcedureLifecycleStopped,
            MessagePayload::ProcedurePoolList { .. } => Topic::ProcedurePoolList,
            MessagePayload::ActivityRunning { .. } => Topic::ActivityLifecycleRunning,
            MessagePayload::ActivityPoolList { .. } => Topic::ActivityPoolList,
            MessagePayload::SbStarted { .. } => Topic::SbLifecycleStarted,
            MessagePayload::SbFinishedSucceeded { .. } => Topic::SbLifecycleFinishedSucceeded,
            MessagePayload::SbFinishedFailed { .. } => Topic::SbLifecycleFinishedFailed,
            MessagePayload::UserScriptAnnounce { .. } => Topic::UserScriptAnnounce,
        }
    }

    /// Correlation id of the message, when the topic carries one.
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            MessagePayload::RequestProcedureCreate { request_id, .. }
            | MessagePayload::RequestProcedureStart { request_id, .. }
            | MessagePayload::RequestProcedureStop { request_id, .. }
            | MessagePayload::RequestProcedureList { request_id, .. }
            | MessagePayload::RequestActivityRun { request_id, .. }
            | MessagePayload::RequestActivityList { request_id, .. } => Some(*request_id),
            MessagePayload::ProcedureCreated { request_id, .. }
            | MessagePayload::ProcedureStarted { request_id, .. }
            | MessagePayload::ProcedureComplete { request_id, .. }
            | MessagePayload::ProcedureFailed { request_id, .. }
            | MessagePayload::ProcedureStopped { request_id, .. }
            | MessagePayload::ProcedurePoolList { request_id, .. }
            | MessagePayload::ActivityRunning { request_id, .. }
            | MessagePayload::ActivityPoolList { request_id, .. } => *request_id,
            MessagePayload::ProcedureStateChange { .. }
            | MessagePayload::ProcedureStacktrace { .. }
            | MessagePayload::SbStarted { .. }
            | MessagePayload::SbFinishedSucceeded { .. }
            | MessagePayload::SbFinishedFailed { .. }
            | MessagePayload::UserScriptAnnounce { .. } => None,
        }
    }

    /// The command result on response topics, if this payload carries one.
    pub fn command_result(&self) -> Option<&CommandResult> {
        match self {
            MessagePayload::ProcedureCreated { result, .. }
            | MessagePayload::ProcedureStarted { result, .. }
            | MessagePayload::ProcedureComplete { result, .. }
            | MessagePayload::ProcedureFailed { result, .. }
            | MessagePayload::ProcedureStopped { result, .. }
            | MessagePayload::ProcedurePoolList { result, .. } => Some(result),
            _ => None,
        }
    }
}

/// Intra-worker pub/sub message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    /// Originating worker or procedure id; `None` until the bus bridge
    /// stamps the local worker's name on outbound republish.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_src: Option<String>,
    pub payload: MessagePayload,
}

impl BusMessage {
    /// A message originated by the publishing worker.
    pub fn local(payload: MessagePayload) -> Self {
        Self { msg_src: None, payload }
    }

    /// A message republished on behalf of another source.
    pub fn from_source(msg_src: impl Into<String>, payload: MessagePayload) -> Self {
        Self { msg_src: Some(msg_src.into()), payload }
    }

    pub fn topic(&self) -> Topic {
        self.payload.topic()
    }

    pub fn request_id(&self) -> Option<RequestId> {
        self.payload.request_id()
    }
}

/// Kinds of inter-worker queue traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    PubSub(MessagePayload),
    Fatal { error: String },
    Shutdown { reason: String },
    End,
}

/// Item exchanged on the inter-worker event queues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub msg_src: String,
    pub content: MessageContent,
}

impl EventMessage {
    pub fn pubsub(msg_src: impl Into<String>, payload: MessagePayload) -> Self {
        Self { msg_src: msg_src.into(), content: MessageContent::PubSub(payload) }
    }

    pub fn fatal(msg_src: impl Into<String>, error: impl Into<String>) -> Self {
        Self { msg_src: msg_src.into(), content: MessageContent::Fatal { error: error.into() } }
    }

    pub fn shutdown(msg_src: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            msg_src: msg_src.into(),
            content: MessageContent::Shutdown { reason: reason.into() },
        }
    }

    pub fn end(msg_src: impl Into<String>) -> Self {
        Self { msg_src: msg_src.into(), content: MessageContent::End }
    }

    /// The payload, when this is a PUBSUB message.
    pub fn payload(&self) -> Option<&MessagePayload> {
        match &self.content {
            MessageContent::PubSub(payload) => Some(payload),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
