// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Commands accepted by the script execution service.
//!
//! These ride inside `request.procedure.*` bus messages, so they live in the
//! domain crate rather than with the service that executes them.

use serde::{Deserialize, Serialize};

use crate::procedure::{ProcedureId, ProcedureInput};
use crate::script::ExecutableScript;

/// Load and prepare a script for execution without starting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepareCommand {
    pub script: ExecutableScript,
    pub init_args: ProcedureInput,
}

/// Start execution of a prepared procedure by dispatching a named callable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartCommand {
    pub process_uid: ProcedureId,
    pub fn_name: String,
    pub run_args: ProcedureInput,
    #[serde(default)]
    pub force_start: bool,
}

impl StartCommand {
    /// Start the conventional `main` callable.
    pub fn main(process_uid: ProcedureId, run_args: ProcedureInput) -> Self {
        Self { process_uid, fn_name: "main".to_string(), run_args, force_start: false }
    }
}

/// Stop a procedure, optionally following up with the canned abort script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopCommand {
    pub process_uid: ProcedureId,
    pub run_abort: bool,
}
