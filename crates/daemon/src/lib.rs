// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observation Execution Tool daemon.
//!
//! Wires the event fabric together: the execution worker hosting the script
//! execution service, the API worker serving REST + SSE, feature flags, and
//! the signal handling shared by the `oetd` and `oet-worker` binaries.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod api;
pub mod exec_worker;
pub mod features;
pub mod signal_watcher;

pub use api::{ApiConfig, ApiWorker};
pub use exec_worker::{ExecutionWorker, API_WORKER_NAME, EXEC_WORKER_NAME};
pub use features::Features;
pub use signal_watcher::spawn_signal_watcher;

use tracing_subscriber::EnvFilter;

/// Initialise process-wide tracing. Script workers log to stderr so the
/// control frames on stdout stay clean.
pub fn init_tracing(to_stderr: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if to_stderr {
        builder.with_writer(std::io::stderr).try_init()
    } else {
        builder.try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing already initialised");
    }
}
