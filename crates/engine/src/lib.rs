// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Script execution engine.
//!
//! Hosts one user script per child OS process. The [`manager::ProcessManager`]
//! creates and supervises the children, the
//! [`service::ScriptExecutionService`] keeps the procedure records and
//! publishes lifecycle topics, and the [`environment::EnvironmentManager`]
//! prepares per-revision sandboxes for repo-sourced scripts.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod control;
pub mod environment;
pub mod git;
pub mod host;
pub mod launcher;
pub mod manager;
pub mod service;
pub mod worker;

pub use control::{ControlError, ControlMsg, WorkerEvent};
pub use environment::{EnvError, EnvironmentManager, EnvironmentRecord};
pub use git::{GitCli, GitError, GitOps};
pub use launcher::{LaunchError, LaunchedWorker, ProcessHandle, SpawnedLauncher, WorkerLauncher};
pub use manager::{EventCallback, ManagerError, ProcessManager};
pub use service::{ScriptExecutionService, SesConfig, SesError, HISTORY_MAX};
pub use worker::run_worker_loop;

#[cfg(any(test, feature = "test-support"))]
pub use launcher::ThreadLauncher;
