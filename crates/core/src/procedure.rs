// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Procedure identity, lifecycle states, and execution history.
//!
//! A procedure is one user script loaded for execution. Its state follows a
//! fixed machine: CREATING → LOADING → IDLE → READY → RUNNING and from there
//! to one of the terminal states. STOPPED and UNKNOWN are reachable from any
//! live state; UNKNOWN records a script worker that exited without
//! publishing a terminal state of its own.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::script::ExecutableScript;

/// Identifier of one prepared procedure.
///
/// Allocated by the process manager from a monotonically increasing counter
/// and never reused within a process lifetime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ProcedureId(pub u32);

impl std::fmt::Display for ProcedureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ProcedureId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u32>().map(ProcedureId)
    }
}

impl From<u32> for ProcedureId {
    fn from(id: u32) -> Self {
        ProcedureId(id)
    }
}

/// Lifecycle state of a procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcedureState {
    Creating,
    Loading,
    Idle,
    Ready,
    Running,
    Complete,
    Failed,
    Stopped,
    Unknown,
}

impl ProcedureState {
    /// State name as rendered in REST payloads and event frames.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcedureState::Creating => "CREATING",
            ProcedureState::Loading => "LOADING",
            ProcedureState::Idle => "IDLE",
            ProcedureState::Ready => "READY",
            ProcedureState::Running => "RUNNING",
            ProcedureState::Complete => "COMPLETE",
            ProcedureState::Failed => "FAILED",
            ProcedureState::Stopped => "STOPPED",
            ProcedureState::Unknown => "UNKNOWN",
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcedureState::Complete
                | ProcedureState::Failed
                | ProcedureState::Stopped
                | ProcedureState::Unknown
        )
    }

    /// A procedure record may only be evicted from history in these states.
    pub fn is_deletable(&self) -> bool {
        self.is_terminal()
    }
}

impl std::fmt::Display for ProcedureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `from` → `to` is a legal lifecycle transition.
///
/// READY is the alias published after the implicit `init` callable returns,
/// so RUNNING → READY stands in for the second IDLE of the init triple.
/// Scripts without an `init` callable go straight from IDLE to READY.
pub fn valid_transition(from: ProcedureState, to: ProcedureState) -> bool {
    use ProcedureState::*;
    if matches!(to, Stopped | Unknown) {
        // stop requests and silent worker exits are honoured from any live state
        return !from.is_terminal();
    }
    matches!(
        (from, to),
        (Creating, Loading)
            | (Loading, Idle)
            | (Loading, Failed)
            | (Idle, Running)
            | (Idle, Ready)
            | (Ready, Running)
            | (Running, Idle)
            | (Running, Ready)
            | (Running, Complete)
            | (Running, Failed)
    )
}

/// Arguments passed to a script callable: ordered positional values plus a
/// mapping of named values. Immutable once captured.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcedureInput {
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
    #[serde(default)]
    pub kwargs: IndexMap<String, serde_json::Value>,
}

impl ProcedureInput {
    pub fn new(
        args: Vec<serde_json::Value>,
        kwargs: IndexMap<String, serde_json::Value>,
    ) -> Self {
        Self { args, kwargs }
    }

    /// Input with a single named value.
    pub fn with_kwarg(name: impl Into<String>, value: serde_json::Value) -> Self {
        let mut kwargs = IndexMap::new();
        kwargs.insert(name.into(), value);
        Self { args: Vec::new(), kwargs }
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }

    /// The well-known `subarray_id` named value, threaded through every
    /// observing script.
    pub fn subarray_id(&self) -> Option<&serde_json::Value> {
        self.kwargs.get("subarray_id")
    }
}

/// Record of one callable invocation: name, arguments, and wall-clock time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgCapture {
    #[serde(rename = "fn")]
    pub fn_name: String,
    pub fn_args: ProcedureInput,
    pub time: f64,
}

impl ArgCapture {
    pub fn new(fn_name: impl Into<String>, fn_args: ProcedureInput, time: f64) -> Self {
        Self { fn_name: fn_name.into(), fn_args, time }
    }
}

/// Execution history of a procedure: every state transition with its
/// timestamp, and the stacktrace captured if the script failed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcedureHistory {
    pub process_states: Vec<(ProcedureState, f64)>,
    pub stacktrace: Option<String>,
}

impl ProcedureHistory {
    /// Append a transition. History is append-only.
    pub fn record(&mut self, state: ProcedureState, time: f64) {
        self.process_states.push((state, time));
    }

    pub fn last_state(&self) -> Option<ProcedureState> {
        self.process_states.last().map(|(s, _)| *s)
    }
}

/// Value snapshot of a procedure, exchanged on the bus and rendered by the
/// REST layer. Holders never observe later mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureSummary {
    pub id: ProcedureId,
    pub script: ExecutableScript,
    pub script_args: Vec<ArgCapture>,
    pub history: ProcedureHistory,
    pub state: ProcedureState,
}

#[cfg(test)]
#[path = "procedure_tests.rs"]
mod tests;
