// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signal-handling thread shared by the daemon and worker binaries.
//!
//! Each SIGINT/SIGTERM requests cooperative shutdown through the shared
//! flag; the third signal abandons cooperation and hard-exits.

use oet_bus::{ShutdownFlag, SignalAction, SignalState};
use tokio::signal::unix::{signal, SignalKind};

/// Spawn the signal-handling thread. Received signals set the shutdown
/// flag; the escalation limit forces an exit with the given code.
pub fn spawn_signal_watcher(
    shutdown: ShutdownFlag,
    hard_exit_code: i32,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new().name("signal-watcher".into()).spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!(error = %e, "signal watcher runtime failed; signals disabled");
                return;
            }
        };
        runtime.block_on(async move {
            let (mut interrupt, mut terminate) =
                match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                    (Ok(int), Ok(term)) => (int, term),
                    _ => {
                        tracing::error!("signal handler installation failed; signals disabled");
                        return;
                    }
                };
            let state = SignalState::new(shutdown);
            loop {
                tokio::select! {
                    _ = interrupt.recv() => {}
                    _ = terminate.recv() => {}
                }
                tracing::info!(calls = state.calls() + 1, "termination signal received");
                if state.on_signal() == SignalAction::HardExit {
                    tracing::error!("signal limit exceeded, forcing exit");
                    std::process::exit(hard_exit_code);
                }
            }
        });
    })
}
