// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process manager: creates, runs, stops, and supervises script workers.
//!
//! Every inbound worker event is delivered to a caller-supplied callback
//! list as an [`EventMessage`] whose source is the procedure id. A worker
//! that never signals startup is terminated and reported as a startup
//! failure; a worker that exits without a terminal state is recorded as
//! STOPPED when a stop was requested and UNKNOWN otherwise.

use crate::control::{ControlError, ControlMsg, ControlSink, WorkerEvent};
use crate::environment::{EnvError, EnvironmentManager, resolve_search_path};
use crate::launcher::{LaunchError, ProcessHandle, WorkerLauncher};
use oet_bus::Signal;
use oet_core::{
    ErrorDetail, ErrorKind, EventMessage, ExecutableScript, MessagePayload, ProcedureId,
    ProcedureInput, ProcedureState,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Grace period for a worker's startup signal.
pub const STARTUP_WAIT: Duration = Duration::from_secs(3);

/// Grace period between a stop request and forcible termination.
pub const SHUTDOWN_WAIT: Duration = Duration::from_secs(3);

/// Forced-termination retry attempts.
pub const MAX_TERMINATE: u32 = 3;

const TERMINATE_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("no procedure with id {0}")]
    UnknownProcedure(ProcedureId),

    #[error("procedure {pid} is {state}: {reason}")]
    StateConflict { pid: ProcedureId, state: ProcedureState, reason: String },

    #[error("script worker for procedure {pid} failed to start within {STARTUP_WAIT:?}")]
    StartupFailure { pid: ProcedureId },

    #[error("script file not found: {0}")]
    ScriptMissing(PathBuf),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("control channel for procedure {pid} failed: {source}")]
    Control { pid: ProcedureId, source: ControlError },

    #[error(transparent)]
    Environment(#[from] EnvError),
}

impl ManagerError {
    /// Classified detail for the bus error payload.
    pub fn error_detail(&self) -> ErrorDetail {
        let kind = match self {
            ManagerError::UnknownProcedure(_) => ErrorKind::ResourceNotFound,
            ManagerError::StateConflict { .. } => ErrorKind::StateConflict,
            ManagerError::StartupFailure { .. } | ManagerError::Launch(_) => {
                ErrorKind::StartupFailure
            }
            ManagerError::ScriptMissing(_) => ErrorKind::MalformedRequest,
            ManagerError::Control { .. } => ErrorKind::Fatal,
            ManagerError::Environment(_) => ErrorKind::EnvPreparationFailure,
        };
        ErrorDetail::new(kind, self.to_string())
    }
}

/// Callback invoked with every inbound worker event.
pub type EventCallback = Arc<dyn Fn(&EventMessage) + Send + Sync>;

struct ProcEntry {
    control: Mutex<Box<dyn ControlSink>>,
    process: Mutex<Box<dyn ProcessHandle>>,
    stop_requested: Arc<AtomicBool>,
}

struct Shared {
    states: Mutex<HashMap<ProcedureId, ProcedureState>>,
    callbacks: Vec<EventCallback>,
}

impl Shared {
    /// Record state changes and deliver the event to every callback.
    fn dispatch(&self, evt: EventMessage) {
        if let Some(MessagePayload::ProcedureStateChange { new_state }) = evt.payload() {
            if let Ok(pid) = evt.msg_src.parse::<ProcedureId>() {
                self.states.lock().insert(pid, *new_state);
            }
        }
        for callback in &self.callbacks {
            callback(&evt);
        }
    }

    fn emit_state(&self, pid: ProcedureId, state: ProcedureState) {
        self.dispatch(EventMessage::pubsub(
            pid.to_string(),
            MessagePayload::ProcedureStateChange { new_state: state },
        ));
    }
}

struct ResolvedScript {
    file: PathBuf,
    search_path: Vec<PathBuf>,
}

/// Owns the script worker children and their control channels.
pub struct ProcessManager {
    next_id: AtomicU32,
    entries: Mutex<HashMap<ProcedureId, Arc<ProcEntry>>>,
    shared: Arc<Shared>,
    environments: EnvironmentManager,
    launcher: Box<dyn WorkerLauncher>,
}

impl ProcessManager {
    pub fn new(
        launcher: Box<dyn WorkerLauncher>,
        environments: EnvironmentManager,
        callbacks: Vec<EventCallback>,
    ) -> Self {
        Self {
            next_id: AtomicU32::new(1),
            entries: Mutex::new(HashMap::new()),
            shared: Arc::new(Shared { states: Mutex::new(HashMap::new()), callbacks }),
            environments,
            launcher,
        }
    }

    /// Create a new procedure: spawn a script worker, wait for its startup
    /// signal, emit CREATING, and dispatch the INIT message. The transition
    /// to READY is observed asynchronously through the callbacks.
    ///
    /// `before_init` runs after CREATING is emitted and before the INIT
    /// message goes out, so callers can register their record for the new
    /// id before the first load event can arrive.
    pub fn create(
        &self,
        script: &ExecutableScript,
        init_args: ProcedureInput,
        before_init: impl FnOnce(ProcedureId),
    ) -> Result<ProcedureId, ManagerError> {
        let pid = ProcedureId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let resolved = self.resolve_script(script)?;

        let launched = self.launcher.launch(pid)?;
        let startup = Signal::new();
        let stop_requested = Arc::new(AtomicBool::new(false));

        let entry = Arc::new(ProcEntry {
            control: Mutex::new(launched.control),
            process: Mutex::new(launched.process),
            stop_requested: Arc::clone(&stop_requested),
        });

        {
            let shared = Arc::clone(&self.shared);
            let startup = startup.clone();
            let events = launched.events;
            std::thread::Builder::new()
                .name(format!("procedure-{pid}-intake"))
                .spawn(move || intake_loop(pid, events, shared, startup, stop_requested))
                .map_err(LaunchError::Io)?;
        }

        if !startup.wait(STARTUP_WAIT) {
            tracing::error!(procedure = %pid, "no startup signal, terminating worker");
            entry.stop_requested.store(true, Ordering::SeqCst);
            terminate(&mut **entry.process.lock());
            return Err(ManagerError::StartupFailure { pid });
        }

        self.entries.lock().insert(pid, Arc::clone(&entry));
        self.shared.emit_state(pid, ProcedureState::Creating);
        before_init(pid);

        entry
            .control
            .lock()
            .send(&ControlMsg::Init {
                script_file: resolved.file,
                search_path: resolved.search_path,
                init_args,
            })
            .map_err(|source| {
                entry.stop_requested.store(true, Ordering::SeqCst);
                terminate(&mut **entry.process.lock());
                ManagerError::Control { pid, source }
            })?;

        Ok(pid)
    }

    /// Dispatch a named callable to a prepared procedure. Completion is
    /// observed via lifecycle events; at most one invocation is in flight.
    pub fn run(
        &self,
        pid: ProcedureId,
        fn_name: &str,
        run_args: ProcedureInput,
        force_start: bool,
    ) -> Result<(), ManagerError> {
        let entry =
            self.entries.lock().get(&pid).cloned().ok_or(ManagerError::UnknownProcedure(pid))?;
        let state = self
            .shared
            .states
            .lock()
            .get(&pid)
            .copied()
            .ok_or(ManagerError::UnknownProcedure(pid))?;

        match state {
            ProcedureState::Running => Err(ManagerError::StateConflict {
                pid,
                state,
                reason: "a callable is already running".into(),
            }),
            ProcedureState::Ready | ProcedureState::Idle => {
                entry
                    .control
                    .lock()
                    .send(&ControlMsg::Run { fn_name: fn_name.to_string(), run_args })
                    .map_err(|source| ManagerError::Control { pid, source })?;
                Ok(())
            }
            ProcedureState::Complete | ProcedureState::Failed | ProcedureState::Stopped
                if force_start =>
            {
                // Eligible under force_start, but the hosting worker has
                // already exited; a fresh procedure must be prepared.
                Err(ManagerError::StateConflict {
                    pid,
                    state,
                    reason: "script worker has exited; prepare a new procedure to re-run".into(),
                })
            }
            _ => Err(ManagerError::StateConflict {
                pid,
                state,
                reason: "procedure is not ready to run (use force_start to re-run a finished \
                         procedure)"
                    .into(),
            }),
        }
    }

    /// Stop a procedure. Idempotent when the worker is already dead. The
    /// worker gets [`SHUTDOWN_WAIT`] to honour the request before forcible
    /// termination.
    pub fn stop(&self, pid: ProcedureId) -> Result<(), ManagerError> {
        let entry =
            self.entries.lock().get(&pid).cloned().ok_or(ManagerError::UnknownProcedure(pid))?;
        let state = self.shared.states.lock().get(&pid).copied();
        if state.is_some_and(|s| s.is_terminal()) {
            return Ok(());
        }

        tracing::info!(procedure = %pid, "stopping script worker");
        entry.stop_requested.store(true, Ordering::SeqCst);
        // Unblock an idle worker first, then interrupt a running callable.
        let _ = entry.control.lock().send(&ControlMsg::Stop);
        let mut process = entry.process.lock();
        process.request_stop();
        if !process.wait_timeout(SHUTDOWN_WAIT) {
            terminate(&mut **process);
        }
        Ok(())
    }

    /// Stop every managed procedure and drop the control channels.
    pub fn shutdown(&self) {
        let pids: Vec<ProcedureId> = self.entries.lock().keys().copied().collect();
        for pid in pids {
            if let Err(e) = self.stop(pid) {
                tracing::warn!(procedure = %pid, error = %e, "stop during shutdown failed");
            }
        }
        self.entries.lock().clear();
    }

    /// Current state of one procedure, if known.
    pub fn state(&self, pid: ProcedureId) -> Option<ProcedureState> {
        self.shared.states.lock().get(&pid).copied()
    }

    fn resolve_script(&self, script: &ExecutableScript) -> Result<ResolvedScript, ManagerError> {
        match script {
            ExecutableScript::Filesystem(fs) => {
                let file = fs.path();
                if !file.is_file() {
                    return Err(ManagerError::ScriptMissing(file));
                }
                let search_path =
                    file.parent().map(|dir| vec![dir.to_path_buf()]).unwrap_or_default();
                Ok(ResolvedScript { file, search_path })
            }
            ExecutableScript::Git(git) => {
                let (root, search_path) = if git.create_env {
                    let env = self.environments.prepare(&git.git_args)?;
                    (env.path, env.site_packages)
                } else {
                    let checkout = self.environments.checkout(&git.git_args)?;
                    let search_path =
                        resolve_search_path(&checkout).map_err(ManagerError::Environment)?;
                    (checkout, search_path)
                };
                let file = root.join(git.relative_path());
                if !file.is_file() {
                    return Err(ManagerError::ScriptMissing(file));
                }
                Ok(ResolvedScript { file, search_path })
            }
        }
    }
}

/// Per-procedure intake: translate worker events into callback deliveries
/// and synthesise the terminal sink state when the worker disappears.
fn intake_loop(
    pid: ProcedureId,
    events: crossbeam_channel::Receiver<WorkerEvent>,
    shared: Arc<Shared>,
    startup: Signal,
    stop_requested: Arc<AtomicBool>,
) {
    let src = pid.to_string();
    for evt in events.iter() {
        match evt {
            WorkerEvent::Started => startup.set(),
            WorkerEvent::StateChange { new_state } => {
                shared.dispatch(EventMessage::pubsub(
                    src.clone(),
                    MessagePayload::ProcedureStateChange { new_state },
                ));
            }
            WorkerEvent::Stacktrace { stacktrace } => {
                shared.dispatch(EventMessage::pubsub(
                    src.clone(),
                    MessagePayload::ProcedureStacktrace { stacktrace },
                ));
            }
            WorkerEvent::Announce { msg } => {
                shared.dispatch(EventMessage::pubsub(
                    src.clone(),
                    MessagePayload::UserScriptAnnounce { msg },
                ));
            }
        }
    }

    // Event stream closed: the worker exited. Without a terminal state of
    // its own the procedure sinks to STOPPED (stop was requested) or
    // UNKNOWN.
    let last = shared.states.lock().get(&pid).copied();
    if !last.is_some_and(|s| s.is_terminal()) {
        let sink_state = if stop_requested.load(Ordering::SeqCst) {
            ProcedureState::Stopped
        } else {
            ProcedureState::Unknown
        };
        tracing::warn!(procedure = %pid, state = %sink_state, "worker exited without a terminal state");
        shared.emit_state(pid, sink_state);
    }
}

/// Forcible termination with bounded retries.
fn terminate(process: &mut dyn ProcessHandle) -> bool {
    let mut attempt = 0;
    while process.is_alive() && attempt < MAX_TERMINATE {
        process.kill();
        process.wait_timeout(TERMINATE_TIMEOUT);
        attempt += 1;
    }
    let dead = !process.is_alive();
    if !dead {
        tracing::error!(attempts = attempt, "script worker survived forced termination");
    }
    dead
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
