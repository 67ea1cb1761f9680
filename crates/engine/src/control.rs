// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control channel between the process manager and a script worker.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload, carried
//! over the child's stdin (control messages in) and stdout (worker events
//! out). The logging of the child goes to stderr so frames stay clean.

use oet_core::{ProcedureInput, ProcedureState};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use thiserror::Error;

/// Upper bound on a single frame. Procedure arguments are small; anything
/// larger indicates a corrupt stream.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("control channel io error: {0}")]
    Io(#[from] io::Error),

    #[error("control frame codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("control frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    Oversize(usize),

    #[error("control channel closed")]
    Closed,
}

/// Messages from the process manager to a script worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMsg {
    /// Load the script and run its `init` callable.
    Init {
        script_file: PathBuf,
        /// Directories prepended to the interpreter's module search path.
        search_path: Vec<PathBuf>,
        init_args: ProcedureInput,
    },
    /// Run a named callable with the given arguments.
    Run { fn_name: String, run_args: ProcedureInput },
    /// Stop cooperatively, publishing the STOPPED state.
    Stop,
    /// Exit without publishing a state.
    End,
}

/// Events from a script worker to the process manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerEvent {
    /// Startup signal; always the first frame a healthy worker sends.
    Started,
    StateChange { new_state: ProcedureState },
    Stacktrace { stacktrace: String },
    /// Free-form announcement published by the user script.
    Announce { msg: String },
}

/// Write one length-prefixed JSON frame.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, msg: &T) -> Result<(), ControlError> {
    let body = serde_json::to_vec(msg)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(ControlError::Oversize(body.len()));
    }
    writer.write_all(&(body.len() as u32).to_be_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed JSON frame. Returns None on a clean end of
/// stream; end of stream inside a frame is an error.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>, ControlError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ControlError::Oversize(len));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(Some(serde_json::from_slice(&body)?))
}

/// Parent-side sender of control messages.
pub trait ControlSink: Send {
    fn send(&mut self, msg: &ControlMsg) -> Result<(), ControlError>;
}

/// Worker-side receiver of control messages.
pub trait ControlSource: Send {
    /// Blocks for the next message; None means the channel closed.
    fn recv(&mut self) -> Result<Option<ControlMsg>, ControlError>;
}

/// Worker-side publisher of events. Shared so the script host can publish
/// announcements while a callable is executing.
pub trait EventSink: Send + Sync {
    fn send(&self, evt: &WorkerEvent) -> Result<(), ControlError>;
}

/// Control source reading frames from the worker's stdin.
pub struct StdioControlSource {
    stdin: io::Stdin,
}

impl StdioControlSource {
    pub fn new() -> Self {
        Self { stdin: io::stdin() }
    }
}

impl Default for StdioControlSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlSource for StdioControlSource {
    fn recv(&mut self) -> Result<Option<ControlMsg>, ControlError> {
        read_frame(&mut self.stdin)
    }
}

/// Event sink writing frames to the worker's stdout.
pub struct StdioEventSink {
    stdout: parking_lot::Mutex<io::Stdout>,
}

impl StdioEventSink {
    pub fn new() -> Self {
        Self { stdout: parking_lot::Mutex::new(io::stdout()) }
    }
}

impl Default for StdioEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for StdioEventSink {
    fn send(&self, evt: &WorkerEvent) -> Result<(), ControlError> {
        write_frame(&mut *self.stdout.lock(), evt)
    }
}

/// Channel-backed control source for in-process workers; observes the
/// cooperative stop flag while idle.
#[cfg(any(test, feature = "test-support"))]
pub struct ChannelControlSource {
    rx: crossbeam_channel::Receiver<ControlMsg>,
    stop: oet_bus::ShutdownFlag,
}

#[cfg(any(test, feature = "test-support"))]
impl ChannelControlSource {
    pub fn new(rx: crossbeam_channel::Receiver<ControlMsg>, stop: oet_bus::ShutdownFlag) -> Self {
        Self { rx, stop }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl ControlSource for ChannelControlSource {
    fn recv(&mut self) -> Result<Option<ControlMsg>, ControlError> {
        use crossbeam_channel::RecvTimeoutError;
        loop {
            match self.rx.recv_timeout(oet_bus::SHUTDOWN_CHECK_INTERVAL) {
                Ok(msg) => return Ok(Some(msg)),
                Err(RecvTimeoutError::Timeout) => {
                    if self.stop.is_set() {
                        return Ok(None);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(None),
            }
        }
    }
}

/// Channel-backed event sink for in-process workers.
#[cfg(any(test, feature = "test-support"))]
pub struct ChannelEventSink {
    tx: crossbeam_channel::Sender<WorkerEvent>,
}

#[cfg(any(test, feature = "test-support"))]
impl ChannelEventSink {
    pub fn new(tx: crossbeam_channel::Sender<WorkerEvent>) -> Self {
        Self { tx }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl EventSink for ChannelEventSink {
    fn send(&self, evt: &WorkerEvent) -> Result<(), ControlError> {
        self.tx.send(evt.clone()).map_err(|_| ControlError::Closed)
    }
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
