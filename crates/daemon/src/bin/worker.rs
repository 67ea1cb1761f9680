// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `oet-worker`: child process hosting one user script.
//!
//! Control messages arrive on stdin, worker events leave on stdout, and
//! logs go to stderr. SIGTERM requests cooperative shutdown through the
//! stop flag the interpreter hook observes; repeated signals hard-exit.

use oet_bus::ShutdownFlag;
use oet_daemon::spawn_signal_watcher;
use oet_engine::control::{StdioControlSource, StdioEventSink};
use oet_engine::run_worker_loop;
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    oet_daemon::init_tracing(true);

    let stop = ShutdownFlag::new();
    if let Err(e) = spawn_signal_watcher(stop.clone(), 1) {
        tracing::error!(error = %e, "signal watcher failed to start");
        return ExitCode::from(2);
    }

    let mut control = StdioControlSource::new();
    let sink = Arc::new(StdioEventSink::new());
    let code = run_worker_loop(&mut control, sink, &stop);
    ExitCode::from(code.clamp(0, 255) as u8)
}
