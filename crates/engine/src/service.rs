// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Script execution service: system of record for procedures.
//!
//! Translates prepare/start/stop commands into process manager calls, keeps
//! every procedure's history current from lifecycle events, republishes
//! summary lifecycle topics for downstream consumers, and implements the
//! two-phase abort. All record maps live behind one mutex; summaries handed
//! to callers are value copies.

use crate::environment::EnvironmentManager;
use crate::launcher::WorkerLauncher;
use crate::manager::{EventCallback, ManagerError, ProcessManager};
use oet_bus::LocalBus;
use oet_core::{
    ArgCapture, BusMessage, Clock, CommandResult, ErrorDetail, ErrorKind, EventMessage,
    ExecutableScript, FileSystemScript, MessagePayload, PrepareCommand, ProcedureHistory,
    ProcedureId, ProcedureInput, ProcedureState, ProcedureSummary, StartCommand, StopCommand,
    SystemClock,
};
use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Retained procedure records. On overflow the oldest deletable records are
/// evicted; records in a live state are never evicted.
pub const HISTORY_MAX: usize = 10;

/// Deadline for the abort procedure to reach READY before it is started.
pub const ABORT_READY_TIMEOUT: Duration = Duration::from_secs(1);

/// Environment variable naming the directory of the canned scripts.
pub const SCRIPTS_LOCATION_ENV: &str = "OET_SCRIPTS_LOCATION";

const DEFAULT_SCRIPTS_LOCATION: &str = "/scripts";

#[derive(Debug, Error)]
pub enum SesError {
    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error("process IDs not found: {0:?}")]
    UnknownProcedures(Vec<ProcedureId>),

    #[error("subarray ID not specified")]
    SubarrayMissing(ProcedureId),

    #[error("multiple subarray IDs found")]
    SubarrayAmbiguous(ProcedureId),
}

impl SesError {
    /// Classified detail for the bus error payload.
    pub fn error_detail(&self) -> ErrorDetail {
        match self {
            SesError::Manager(inner) => inner.error_detail(),
            SesError::UnknownProcedures(_) => {
                ErrorDetail::new(ErrorKind::ResourceNotFound, self.to_string())
            }
            SesError::SubarrayMissing(_) | SesError::SubarrayAmbiguous(_) => {
                ErrorDetail::new(ErrorKind::StateConflict, self.to_string())
            }
        }
    }
}

/// Service configuration.
#[derive(Clone)]
pub struct SesConfig {
    /// Script prepared and started after a stop with `run_abort`.
    pub abort_script: ExecutableScript,
}

impl SesConfig {
    /// Abort script from `OET_SCRIPTS_LOCATION` (default `/scripts`).
    pub fn from_env() -> Self {
        let base = std::env::var(SCRIPTS_LOCATION_ENV)
            .unwrap_or_else(|_| DEFAULT_SCRIPTS_LOCATION.to_string());
        Self {
            abort_script: ExecutableScript::Filesystem(FileSystemScript {
                script_uri: format!("file://{base}/abort.lua"),
            }),
        }
    }
}

#[derive(Default)]
struct SesState {
    /// Insertion-ordered so pruning evicts the oldest records first.
    states: IndexMap<ProcedureId, ProcedureState>,
    scripts: HashMap<ProcedureId, ExecutableScript>,
    script_args: HashMap<ProcedureId, Vec<ArgCapture>>,
    history: HashMap<ProcedureId, ProcedureHistory>,
}

impl SesState {
    fn summarise(&self, pid: ProcedureId) -> Option<ProcedureSummary> {
        Some(ProcedureSummary {
            id: pid,
            script: self.scripts.get(&pid)?.clone(),
            script_args: self.script_args.get(&pid)?.clone(),
            history: self.history.get(&pid).cloned().unwrap_or_default(),
            state: *self.states.get(&pid)?,
        })
    }

    fn prune(&mut self) {
        if self.states.len() <= HISTORY_MAX {
            return;
        }
        let excess = self.states.len() - HISTORY_MAX;
        let candidates: Vec<ProcedureId> =
            self.states.iter().take(excess).map(|(pid, _)| *pid).collect();
        for pid in candidates {
            if self.states.get(&pid).is_some_and(|s| s.is_deletable()) {
                self.states.shift_remove(&pid);
                self.scripts.remove(&pid);
                self.script_args.remove(&pid);
                self.history.remove(&pid);
            }
        }
    }
}

struct SesShared<C: Clock> {
    state: Mutex<SesState>,
    state_changed: Condvar,
    bus: LocalBus,
    clock: C,
}

/// Summary lifecycle topic announced for a new state, if any.
fn lifecycle_payload(state: ProcedureState, summary: ProcedureSummary) -> Option<MessagePayload> {
    let result = CommandResult::from_summary(summary);
    match state {
        ProcedureState::Running => {
            Some(MessagePayload::ProcedureStarted { request_id: None, result })
        }
        ProcedureState::Complete => {
            Some(MessagePayload::ProcedureComplete { request_id: None, result })
        }
        ProcedureState::Failed => {
            Some(MessagePayload::ProcedureFailed { request_id: None, result })
        }
        ProcedureState::Stopped => {
            Some(MessagePayload::ProcedureStopped { request_id: None, result })
        }
        _ => None,
    }
}

/// State-updater installed into the process manager's callback list.
fn on_event<C: Clock>(shared: &SesShared<C>, evt: &EventMessage) {
    let Some(payload) = evt.payload() else { return };
    match payload {
        MessagePayload::ProcedureStateChange { new_state } => {
            let Ok(pid) = evt.msg_src.parse::<ProcedureId>() else { return };
            let now = shared.clock.epoch_secs();
            let (previous, summary) = {
                let mut state = shared.state.lock();
                let known = state.states.contains_key(&pid);
                if !known && *new_state != ProcedureState::Creating {
                    // late event for an evicted procedure
                    return;
                }
                let previous = state.states.insert(pid, *new_state);
                state.history.entry(pid).or_default().record(*new_state, now);
                (previous, state.summarise(pid))
            };
            shared.state_changed.notify_all();

            if let Some(summary) = summary {
                if let Some(announcement) = lifecycle_payload(*new_state, summary.clone()) {
                    shared.bus.publish(&BusMessage::local(announcement));
                }
                // no unique state signifies loading complete
                if previous == Some(ProcedureState::Loading) && *new_state == ProcedureState::Idle
                {
                    shared.bus.publish(&BusMessage::local(MessagePayload::ProcedureCreated {
                        request_id: None,
                        result: CommandResult::from_summary(summary),
                    }));
                }
            }
        }
        MessagePayload::ProcedureStacktrace { stacktrace } => {
            let Ok(pid) = evt.msg_src.parse::<ProcedureId>() else { return };
            let mut state = shared.state.lock();
            let history = state.history.entry(pid).or_default();
            if history.stacktrace.is_none() {
                history.stacktrace = Some(stacktrace.clone());
            }
        }
        _ => {}
    }
}

/// High-level interface and facade for the script execution domain.
pub struct ScriptExecutionService<C: Clock = SystemClock> {
    manager: Arc<ProcessManager>,
    abort_script: ExecutableScript,
    shared: Arc<SesShared<C>>,
}

impl<C: Clock + 'static> ScriptExecutionService<C> {
    /// Create a new service. Lifecycle topics are published on `bus`;
    /// `extra_callbacks` observe every raw worker event after the service's
    /// own state updater.
    pub fn new(
        config: SesConfig,
        launcher: Box<dyn WorkerLauncher>,
        environments: EnvironmentManager,
        bus: LocalBus,
        clock: C,
        extra_callbacks: Vec<EventCallback>,
    ) -> Self {
        let shared = Arc::new(SesShared {
            state: Mutex::new(SesState::default()),
            state_changed: Condvar::new(),
            bus,
            clock,
        });

        let mut callbacks: Vec<EventCallback> = Vec::with_capacity(extra_callbacks.len() + 1);
        {
            let shared = Arc::clone(&shared);
            callbacks.push(Arc::new(move |evt: &EventMessage| on_event(&shared, evt)));
        }
        callbacks.extend(extra_callbacks);

        let manager = Arc::new(ProcessManager::new(launcher, environments, callbacks));
        Self { manager, abort_script: config.abort_script, shared }
    }

    /// Load and prepare a script for execution without starting it.
    pub fn prepare(&self, cmd: PrepareCommand) -> Result<ProcedureSummary, SesError> {
        let shared = Arc::clone(&self.shared);
        let script = cmd.script.clone();
        let init_args = cmd.init_args.clone();

        // The record is registered between the CREATING emission and the
        // INIT dispatch, so every later lifecycle event finds it.
        let pid = self.manager.create(&cmd.script, cmd.init_args, move |pid| {
            let now = shared.clock.epoch_secs();
            let mut state = shared.state.lock();
            state.states.entry(pid).or_insert(ProcedureState::Creating);
            state.history.entry(pid).or_default();
            state.scripts.insert(pid, script);
            state.script_args.insert(pid, vec![ArgCapture::new("init", init_args, now)]);
            state.prune();
        })?;

        self.shared
            .state
            .lock()
            .summarise(pid)
            .ok_or(SesError::UnknownProcedures(vec![pid]))
    }

    /// Start execution of a prepared procedure.
    pub fn start(&self, cmd: StartCommand) -> Result<ProcedureSummary, SesError> {
        self.manager.run(cmd.process_uid, &cmd.fn_name, cmd.run_args.clone(), cmd.force_start)?;
        let now = self.shared.clock.epoch_secs();

        let mut state = self.shared.state.lock();
        match state.script_args.get_mut(&cmd.process_uid) {
            Some(captures) => captures.push(ArgCapture::new(&cmd.fn_name, cmd.run_args, now)),
            None => return Err(SesError::UnknownProcedures(vec![cmd.process_uid])),
        }
        state
            .summarise(cmd.process_uid)
            .ok_or(SesError::UnknownProcedures(vec![cmd.process_uid]))
    }

    /// Atomic snapshot of the requested procedures (all when `pids` is
    /// None). Unknown ids fail the whole call.
    pub fn summarise(
        &self,
        pids: Option<&[ProcedureId]>,
    ) -> Result<Vec<ProcedureSummary>, SesError> {
        let state = self.shared.state.lock();
        let targets: Vec<ProcedureId> = match pids {
            Some(pids) => pids.to_vec(),
            None => state.states.keys().copied().collect(),
        };
        let missing: Vec<ProcedureId> =
            targets.iter().copied().filter(|pid| !state.states.contains_key(pid)).collect();
        if !missing.is_empty() {
            return Err(SesError::UnknownProcedures(missing));
        }
        Ok(targets.iter().filter_map(|pid| state.summarise(*pid)).collect())
    }

    /// Stop a procedure and, when requested, run the canned abort script
    /// against the same subarray. Returns summaries of any procedure
    /// created by the abort phase. A stop of an already-terminal procedure
    /// is a no-op.
    pub fn stop(&self, cmd: StopCommand) -> Result<Vec<ProcedureSummary>, SesError> {
        let pid = cmd.process_uid;
        {
            let state = self.shared.state.lock();
            let current = state
                .states
                .get(&pid)
                .copied()
                .ok_or_else(|| SesError::UnknownProcedures(vec![pid]))?;
            if current.is_terminal() {
                return Ok(Vec::new());
            }
        }

        self.manager.stop(pid)?;

        if !cmd.run_abort {
            return Ok(Vec::new());
        }

        // the abort script targets the subarray the stopped script controlled
        let subarray_id = {
            let state = self.shared.state.lock();
            subarray_id_of(&state, pid)?
        };

        let prepared = self.prepare(PrepareCommand {
            script: self.abort_script.clone(),
            init_args: ProcedureInput::with_kwarg("subarray_id", subarray_id),
        })?;

        self.wait_for_state(prepared.id, ProcedureState::Ready, ABORT_READY_TIMEOUT);
        let summary = self.start(StartCommand::main(prepared.id, ProcedureInput::default()))?;
        Ok(vec![summary])
    }

    /// Forward shutdown to the process manager.
    pub fn shutdown(&self) {
        self.manager.shutdown();
    }

    /// Event-driven wait for a procedure to reach the requested state,
    /// bounded by the timeout. Returns whether the state was reached.
    pub fn wait_for_state(
        &self,
        pid: ProcedureId,
        target: ProcedureState,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while state.states.get(&pid) != Some(&target) {
            if self.shared.state_changed.wait_until(&mut state, deadline).timed_out() {
                return state.states.get(&pid) == Some(&target);
            }
        }
        true
    }
}

fn subarray_id_of(state: &SesState, pid: ProcedureId) -> Result<serde_json::Value, SesError> {
    let captures =
        state.script_args.get(&pid).ok_or_else(|| SesError::UnknownProcedures(vec![pid]))?;
    let mut values: Vec<serde_json::Value> = Vec::new();
    for capture in captures {
        if let Some(value) = capture.fn_args.subarray_id() {
            if !values.contains(value) {
                values.push(value.clone());
            }
        }
    }
    match values.len() {
        0 => Err(SesError::SubarrayMissing(pid)),
        1 => Ok(values.remove(0)),
        _ => Err(SesError::SubarrayAmbiguous(pid)),
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
