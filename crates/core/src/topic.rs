// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The closed topic tree.
//!
//! Every message on the bus names one of these dotted topics. Publishing is
//! only possible through [`crate::event::MessagePayload`], whose serde tag is
//! the topic string, so a payload for an unknown topic cannot be constructed
//! or deserialised.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("'{0}' is not a topic in the topic tree")]
pub struct UnknownTopic(pub String);

/// Dotted-path topic identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    RequestProcedureCreate,
    RequestProcedureStart,
    RequestProcedureStop,
    RequestProcedureList,
    RequestActivityRun,
    RequestActivityList,
    ProcedureLifecycleStatechange,
    ProcedureLifecycleStacktrace,
    ProcedureLifecycleCreated,
    ProcedureLifecycleStarted,
    ProcedureLifecycleComplete,
    ProcedureLifecycleFailed,
    ProcedureLifecycleStopped,
    ProcedurePoolList,
    ActivityLifecycleRunning,
    ActivityPoolList,
    SbLifecycleStarted,
    SbLifecycleFinishedSucceeded,
    SbLifecycleFinishedFailed,
    UserScriptAnnounce,
}

impl Topic {
    /// Every topic in the tree, for exhaustiveness checks.
    pub const ALL: [Topic; 20] = [
        Topic::RequestProcedureCreate,
        Topic::RequestProcedureStart,
        Topic::RequestProcedureStop,
        Topic::RequestProcedureList,
        Topic::RequestActivityRun,
        Topic::RequestActivityList,
        Topic::ProcedureLifecycleStatechange,
        Topic::ProcedureLifecycleStacktrace,
        Topic::ProcedureLifecycleCreated,
        Topic::ProcedureLifecycleStarted,
        Topic::ProcedureLifecycleComplete,
        Topic::ProcedureLifecycleFailed,
        Topic::ProcedureLifecycleStopped,
        Topic::ProcedurePoolList,
        Topic::ActivityLifecycleRunning,
        Topic::ActivityPoolList,
        Topic::SbLifecycleStarted,
        Topic::SbLifecycleFinishedSucceeded,
        Topic::SbLifecycleFinishedFailed,
        Topic::UserScriptAnnounce,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::RequestProcedureCreate => "request.procedure.create",
            Topic::RequestProcedureStart => "request.procedure.start",
            Topic::RequestProcedureStop => "request.procedure.stop",
            Topic::RequestProcedureList => "request.procedure.list",
            Topic::RequestActivityRun => "request.activity.run",
            Topic::RequestActivityList => "request.activity.list",
            Topic::ProcedureLifecycleStatechange => "procedure.lifecycle.statechange",
            Topic::ProcedureLifecycleStacktrace => "procedure.lifecycle.stacktrace",
            Topic::ProcedureLifecycleCreated => "procedure.lifecycle.created",
            Topic::ProcedureLifecycleStarted => "procedure.lifecycle.started",
            Topic::ProcedureLifecycleComplete => "procedure.lifecycle.complete",
            Topic::ProcedureLifecycleFailed => "procedure.lifecycle.failed",
            Topic::ProcedureLifecycleStopped => "procedure.lifecycle.stopped",
            Topic::ProcedurePoolList => "procedure.pool.list",
            Topic::ActivityLifecycleRunning => "activity.lifecycle.running",
            Topic::ActivityPoolList => "activity.pool.list",
            Topic::SbLifecycleStarted => "sb.lifecycle.started",
            Topic::SbLifecycleFinishedSucceeded => "sb.lifecycle.finished.succeeded",
            Topic::SbLifecycleFinishedFailed => "sb.lifecycle.finished.failed",
            Topic::UserScriptAnnounce => "user.script.announce",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownTopic(s.to_string()))
    }
}

#[cfg(test)]
#[path = "topic_tests.rs"]
mod tests;
