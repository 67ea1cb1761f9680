// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `oetd`: the Observation Execution Tool server.
//!
//! Creates the main context, the execution worker, and the API worker, then
//! routes events between them until shutdown is requested.

use oet_bus::{LocalBus, MainContext, WorkerError};
use oet_daemon::{
    spawn_signal_watcher, ApiConfig, ApiWorker, ExecutionWorker, Features, API_WORKER_NAME,
    EXEC_WORKER_NAME,
};
use oet_engine::{EnvironmentManager, GitCli, LaunchError, SesConfig, SpawnedLauncher};
use std::process::ExitCode;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
enum DaemonError {
    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn main() -> ExitCode {
    oet_daemon::init_tracing(false);

    let features = Features::from_env();
    tracing::info!(
        discard_first_event = features.discard_first_event(),
        "feature flags loaded"
    );

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "daemon failed");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), DaemonError> {
    let mut ctx = MainContext::new();
    spawn_signal_watcher(ctx.shutdown_flag(), 1)?;

    let launcher = SpawnedLauncher::from_env()?;
    let environments = EnvironmentManager::from_env(Arc::new(GitCli));

    let exec_inbox = ctx.queue();
    ctx.spawn_worker(
        EXEC_WORKER_NAME,
        Box::new(ExecutionWorker::new(SesConfig::from_env(), Box::new(launcher), environments)),
        exec_inbox,
        LocalBus::new(),
    )?;

    let api_inbox = ctx.queue();
    ctx.spawn_worker(
        API_WORKER_NAME,
        Box::new(ApiWorker::new(ApiConfig::from_env())),
        api_inbox,
        LocalBus::new(),
    )?;

    ctx.dispatch_loop();

    let stats = ctx.shutdown();
    tracing::info!(
        failed = stats.failed_workers,
        stuck = stats.stuck_workers,
        drained = stats.drained_messages,
        "daemon stopped"
    );
    Ok(())
}
