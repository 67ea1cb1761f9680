// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Script worker launchers.
//!
//! [`SpawnedLauncher`] runs the `oet-worker` binary as a child OS process
//! with the control channel over its stdio, giving each procedure full
//! process isolation. [`ThreadLauncher`] (test support) runs the same worker
//! loop on an in-process thread over channels, with the cooperative stop
//! flag standing in for SIGTERM.

use crate::control::{read_frame, write_frame, ControlError, ControlMsg, ControlSink, WorkerEvent};
use crossbeam_channel::Receiver;
use oet_core::ProcedureId;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Environment variable naming the worker binary explicitly.
pub const WORKER_BINARY_ENV: &str = "OET_WORKER_BINARY";

/// Default worker binary name, looked up next to the running executable.
pub const WORKER_BINARY_NAME: &str = "oet-worker";

const WAIT_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to launch script worker: {0}")]
    Io(#[from] std::io::Error),

    #[error("script worker binary not found at {0}")]
    MissingBinary(PathBuf),

    #[error("script worker spawned without piped stdio")]
    MissingPipe,
}

/// Handle over the worker's OS process (or stand-in thread).
pub trait ProcessHandle: Send {
    fn is_alive(&mut self) -> bool;

    /// Request cooperative shutdown (SIGTERM for child processes).
    fn request_stop(&mut self);

    /// Force termination (SIGKILL for child processes).
    fn kill(&mut self);

    /// Wait for exit up to the timeout. Returns whether the worker exited.
    fn wait_timeout(&mut self, timeout: Duration) -> bool;
}

/// A launched script worker: its control channel, its event stream, and the
/// process handle used for supervision.
pub struct LaunchedWorker {
    pub control: Box<dyn ControlSink>,
    pub events: Receiver<WorkerEvent>,
    pub process: Box<dyn ProcessHandle>,
}

/// Creates script workers on behalf of the process manager.
pub trait WorkerLauncher: Send + Sync {
    fn launch(&self, id: ProcedureId) -> Result<LaunchedWorker, LaunchError>;
}

/// Launcher spawning the `oet-worker` binary.
pub struct SpawnedLauncher {
    binary: PathBuf,
}

impl SpawnedLauncher {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    /// Resolve the worker binary from `OET_WORKER_BINARY`, falling back to
    /// `oet-worker` next to the current executable.
    pub fn from_env() -> Result<Self, LaunchError> {
        let binary = match std::env::var_os(WORKER_BINARY_ENV) {
            Some(path) => PathBuf::from(path),
            None => {
                let exe = std::env::current_exe()?;
                exe.parent()
                    .map(|dir| dir.join(WORKER_BINARY_NAME))
                    .ok_or_else(|| LaunchError::MissingBinary(exe.clone()))?
            }
        };
        if !binary.is_file() {
            return Err(LaunchError::MissingBinary(binary));
        }
        Ok(Self::new(binary))
    }
}

impl WorkerLauncher for SpawnedLauncher {
    fn launch(&self, id: ProcedureId) -> Result<LaunchedWorker, LaunchError> {
        let mut child = Command::new(&self.binary)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let stdin = child.stdin.take().ok_or(LaunchError::MissingPipe)?;
        let stdout = child.stdout.take().ok_or(LaunchError::MissingPipe)?;

        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        std::thread::Builder::new()
            .name(format!("script-worker-{id}-reader"))
            .spawn(move || {
                let mut reader = BufReader::new(stdout);
                loop {
                    match read_frame::<_, WorkerEvent>(&mut reader) {
                        Ok(Some(evt)) => {
                            if event_tx.send(evt).is_err() {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!(procedure = %id, error = %e, "event stream failed");
                            break;
                        }
                    }
                }
            })?;

        tracing::info!(procedure = %id, pid = child.id(), "script worker spawned");
        Ok(LaunchedWorker {
            control: Box::new(PipeControlSink { stdin }),
            events: event_rx,
            process: Box::new(ChildHandle { child }),
        })
    }
}

struct PipeControlSink {
    stdin: ChildStdin,
}

impl ControlSink for PipeControlSink {
    fn send(&mut self, msg: &ControlMsg) -> Result<(), ControlError> {
        write_frame(&mut self.stdin, msg)
    }
}

struct ChildHandle {
    child: Child,
}

impl ChildHandle {
    fn pid(&self) -> nix::unistd::Pid {
        nix::unistd::Pid::from_raw(self.child.id() as i32)
    }
}

impl ProcessHandle for ChildHandle {
    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn request_stop(&mut self) {
        if self.is_alive() {
            if let Err(e) = nix::sys::signal::kill(self.pid(), nix::sys::signal::Signal::SIGTERM)
            {
                tracing::warn!(pid = self.child.id(), error = %e, "SIGTERM failed");
            }
        }
    }

    fn kill(&mut self) {
        if let Err(e) = self.child.kill() {
            tracing::warn!(pid = self.child.id(), error = %e, "SIGKILL failed");
        }
    }

    fn wait_timeout(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_alive() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(WAIT_POLL);
        }
    }
}

/// Launcher running the worker loop on an in-process thread.
#[cfg(any(test, feature = "test-support"))]
pub struct ThreadLauncher;

#[cfg(any(test, feature = "test-support"))]
impl WorkerLauncher for ThreadLauncher {
    fn launch(&self, id: ProcedureId) -> Result<LaunchedWorker, LaunchError> {
        use crate::control::{ChannelControlSource, ChannelEventSink};

        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let stop = oet_bus::ShutdownFlag::new();

        let loop_stop = stop.clone();
        let handle = std::thread::Builder::new()
            .name(format!("script-worker-{id}"))
            .spawn(move || {
                let mut source = ChannelControlSource::new(control_rx, loop_stop.clone());
                crate::worker::run_worker_loop(
                    &mut source,
                    std::sync::Arc::new(ChannelEventSink::new(event_tx)),
                    &loop_stop,
                )
            })?;

        Ok(LaunchedWorker {
            control: Box::new(ChannelControlSink { tx: control_tx }),
            events: event_rx,
            process: Box::new(ThreadHandle { handle: Some(handle), stop }),
        })
    }
}

#[cfg(any(test, feature = "test-support"))]
struct ChannelControlSink {
    tx: crossbeam_channel::Sender<ControlMsg>,
}

#[cfg(any(test, feature = "test-support"))]
impl ControlSink for ChannelControlSink {
    fn send(&mut self, msg: &ControlMsg) -> Result<(), ControlError> {
        self.tx.send(msg.clone()).map_err(|_| ControlError::Closed)
    }
}

#[cfg(any(test, feature = "test-support"))]
struct ThreadHandle {
    handle: Option<std::thread::JoinHandle<i32>>,
    stop: oet_bus::ShutdownFlag,
}

#[cfg(any(test, feature = "test-support"))]
impl ProcessHandle for ThreadHandle {
    fn is_alive(&mut self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn request_stop(&mut self) {
        self.stop.set();
    }

    fn kill(&mut self) {
        // Threads cannot be force-killed; the stop flag is the only lever.
        self.stop.set();
    }

    fn wait_timeout(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_alive() {
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}
