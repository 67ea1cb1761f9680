// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The script worker body.
//!
//! Runs in the child process (and, for tests, on an in-process thread):
//! publish the startup signal, then block on the control channel and act on
//! INIT/RUN/STOP/END, publishing every lifecycle transition. A callable that
//! raises ends the procedure in FAILED with its stacktrace captured; the
//! interpreter is not trusted for further invocations afterwards.

use crate::control::{ControlMsg, ControlSource, EventSink, WorkerEvent};
use crate::host::{HostError, ScriptHost};
use oet_bus::ShutdownFlag;
use oet_core::{ProcedureInput, ProcedureState};
use std::sync::Arc;

enum Step {
    Continue,
    Exit,
}

struct WorkerLoop {
    sink: Arc<dyn EventSink>,
    stop: ShutdownFlag,
    host: Option<ScriptHost>,
    terminal_sent: bool,
}

impl WorkerLoop {
    fn send_state(&mut self, state: ProcedureState) {
        if state.is_terminal() {
            self.terminal_sent = true;
        }
        if self.sink.send(&WorkerEvent::StateChange { new_state: state }).is_err() {
            tracing::warn!("event channel closed while publishing {state}");
        }
    }

    fn send_stacktrace(&mut self, stacktrace: String) {
        let _ = self.sink.send(&WorkerEvent::Stacktrace { stacktrace });
    }

    /// Publish FAILED with the stacktrace of the raised error.
    fn fail(&mut self, err: &HostError) -> Step {
        let stacktrace = match err {
            HostError::Script { stacktrace } | HostError::Load(stacktrace) => stacktrace.clone(),
            other => other.to_string(),
        };
        tracing::error!(error = %err, "script raised");
        self.send_stacktrace(stacktrace);
        self.send_state(ProcedureState::Failed);
        Step::Exit
    }

    fn handle_init(
        &mut self,
        script_file: std::path::PathBuf,
        search_path: Vec<std::path::PathBuf>,
        init_args: ProcedureInput,
    ) -> Step {
        if self.host.is_some() {
            tracing::warn!("ignoring duplicate init message");
            return Step::Continue;
        }
        self.send_state(ProcedureState::Loading);

        let announce_sink = Arc::clone(&self.sink);
        let host = match ScriptHost::new(
            &search_path,
            self.stop.clone(),
            Arc::new(move |msg: &str| {
                let _ = announce_sink.send(&WorkerEvent::Announce { msg: msg.to_string() });
            }),
        ) {
            Ok(host) => host,
            Err(e) => return self.fail(&e),
        };

        match host.load(&script_file) {
            Ok(()) => {}
            Err(HostError::Stopped) => {
                self.send_state(ProcedureState::Stopped);
                return Step::Exit;
            }
            Err(e) => return self.fail(&e),
        }
        self.send_state(ProcedureState::Idle);

        if host.has_callable("init") {
            self.send_state(ProcedureState::Running);
            match host.call("init", &init_args) {
                Ok(()) => {}
                Err(HostError::Stopped) => {
                    self.send_state(ProcedureState::Stopped);
                    return Step::Exit;
                }
                Err(e) => return self.fail(&e),
            }
        }
        self.send_state(ProcedureState::Ready);
        self.host = Some(host);
        Step::Continue
    }

    fn handle_run(&mut self, fn_name: String, run_args: ProcedureInput) -> Step {
        let Some(host) = self.host.take() else {
            tracing::warn!(fn_name = %fn_name, "run received before a script was loaded");
            return Step::Continue;
        };

        if !host.has_callable(&fn_name) {
            return self.fail(&HostError::UnsupportedCallable(fn_name));
        }

        self.send_state(ProcedureState::Running);
        let outcome = host.call(&fn_name, &run_args);
        match outcome {
            Ok(()) => {
                if fn_name == "main" {
                    // The script's work is done; terminate the procedure.
                    self.send_state(ProcedureState::Complete);
                    Step::Exit
                } else {
                    self.send_state(ProcedureState::Idle);
                    self.host = Some(host);
                    Step::Continue
                }
            }
            Err(HostError::Stopped) => {
                self.send_state(ProcedureState::Stopped);
                Step::Exit
            }
            Err(e) => self.fail(&e),
        }
    }
}

/// Run the script worker until a terminal state, an END message, or channel
/// close. Returns the process exit code.
pub fn run_worker_loop(
    control: &mut dyn ControlSource,
    sink: Arc<dyn EventSink>,
    stop: &ShutdownFlag,
) -> i32 {
    if sink.send(&WorkerEvent::Started).is_err() {
        // Without the startup signal the parent reports a startup failure;
        // nothing more can be published.
        tracing::error!("failed to publish startup event");
        return 2;
    }

    let mut worker =
        WorkerLoop { sink, stop: stop.clone(), host: None, terminal_sent: false };

    let code = loop {
        if stop.is_set() {
            break 0;
        }
        let msg = match control.recv() {
            Ok(Some(msg)) => msg,
            Ok(None) => break 0,
            Err(e) => {
                tracing::error!(error = %e, "control channel failed");
                break 2;
            }
        };
        let step = match msg {
            ControlMsg::Init { script_file, search_path, init_args } => {
                worker.handle_init(script_file, search_path, init_args)
            }
            ControlMsg::Run { fn_name, run_args } => worker.handle_run(fn_name, run_args),
            ControlMsg::Stop => {
                worker.send_state(ProcedureState::Stopped);
                Step::Exit
            }
            ControlMsg::End => break 0,
        };
        if matches!(step, Step::Exit) {
            break 0;
        }
    };

    if stop.is_set() && !worker.terminal_sent {
        worker.send_state(ProcedureState::Stopped);
    }
    code
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
