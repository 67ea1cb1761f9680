// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared across the bus and the HTTP boundary.
//!
//! Components never raise across the bus; they publish a lifecycle event
//! carrying an [`ErrorDetail`]. The request bridge converts those payloads
//! back into errors at the HTTP layer, which maps each kind to a status.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classified error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or ill-typed request field.
    MalformedRequest,
    /// Unknown procedure id.
    ResourceNotFound,
    /// script_type outside the supported set.
    UnsupportedScriptType,
    /// Mutually exclusive arguments supplied together.
    ConflictingArgs,
    /// Operation not allowed in the procedure's current state.
    StateConflict,
    /// Script worker failed to signal readiness within the grace period.
    StartupFailure,
    /// User code raised; the stacktrace is stored on the procedure.
    ScriptFailure,
    /// Request bridge timed out waiting for a reply.
    Timeout,
    /// Sandbox clone or dependency resolution failed.
    EnvPreparationFailure,
    /// Queue closed or unrecoverable worker exit.
    Fatal,
}

impl ErrorKind {
    /// Human-facing `type` string used in REST error documents.
    pub fn type_label(&self) -> &'static str {
        match self {
            ErrorKind::MalformedRequest => "Malformed Request",
            ErrorKind::ResourceNotFound => "ResourceNotFound",
            ErrorKind::UnsupportedScriptType => "Unsupported Script Type",
            ErrorKind::ConflictingArgs => "Conflicting Args",
            ErrorKind::StateConflict => "State Conflict",
            ErrorKind::StartupFailure => "Startup Failure",
            ErrorKind::ScriptFailure => "Script Failure",
            ErrorKind::Timeout => "Timeout Error",
            ErrorKind::EnvPreparationFailure => "Environment Preparation Failure",
            ErrorKind::Fatal => "Fatal Error",
        }
    }

    /// HTTP status the kind maps to at the REST boundary.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::MalformedRequest
            | ErrorKind::UnsupportedScriptType
            | ErrorKind::ConflictingArgs => 400,
            ErrorKind::ResourceNotFound => 404,
            ErrorKind::Timeout => 504,
            ErrorKind::StateConflict
            | ErrorKind::StartupFailure
            | ErrorKind::ScriptFailure
            | ErrorKind::EnvPreparationFailure
            | ErrorKind::Fatal => 500,
        }
    }
}

/// Classified error value carried on response topics.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
