// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Executable script references.
//!
//! A script is either a file on the local filesystem (`file://` uri) or a
//! path inside a git repository (`git://` uri), optionally executed inside a
//! prepared per-revision sandbox.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Default repository for observing scripts when a git script omits one.
pub const DEFAULT_GIT_REPO: &str =
    "https://gitlab.com/ska-telescope/oso/ska-oso-scripting.git";

/// Branch used when neither a branch nor a commit is given.
pub const DEFAULT_GIT_BRANCH: &str = "master";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("script uri '{uri}' does not carry the {expected} scheme")]
    UnsupportedScheme { uri: String, expected: &'static str },
}

/// Identity of a script in a remote git repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitArgs {
    #[serde(default = "GitArgs::default_repo")]
    pub git_repo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
}

impl GitArgs {
    fn default_repo() -> String {
        DEFAULT_GIT_REPO.to_string()
    }

    /// Branch to clone, defaulting only when no commit pins the revision.
    /// A bare commit hash may come from a feature branch, so the default
    /// must not override it.
    pub fn branch_or_default(&self) -> Option<&str> {
        match (&self.git_branch, &self.git_commit) {
            (Some(branch), _) => Some(branch),
            (None, None) => Some(DEFAULT_GIT_BRANCH),
            (None, Some(_)) => None,
        }
    }
}

impl Default for GitArgs {
    fn default() -> Self {
        Self { git_repo: Self::default_repo(), git_branch: None, git_commit: None }
    }
}

/// Script on the local filesystem, addressed by a `file://` uri.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSystemScript {
    pub script_uri: String,
}

impl FileSystemScript {
    pub fn new(script_uri: impl Into<String>) -> Result<Self, ScriptError> {
        let script_uri = script_uri.into();
        if !script_uri.starts_with("file://") {
            return Err(ScriptError::UnsupportedScheme { uri: script_uri, expected: "file://" });
        }
        Ok(Self { script_uri })
    }

    /// Filesystem path addressed by the uri.
    pub fn path(&self) -> PathBuf {
        PathBuf::from(self.script_uri.trim_start_matches("file://"))
    }
}

/// Script inside a git repository, addressed by a `git://` uri relative to
/// the repository root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitScript {
    pub script_uri: String,
    #[serde(default)]
    pub git_args: GitArgs,
    #[serde(default)]
    pub create_env: bool,
}

impl GitScript {
    pub fn new(
        script_uri: impl Into<String>,
        git_args: GitArgs,
        create_env: bool,
    ) -> Result<Self, ScriptError> {
        let script_uri = script_uri.into();
        if !script_uri.starts_with("git://") {
            return Err(ScriptError::UnsupportedScheme { uri: script_uri, expected: "git://" });
        }
        Ok(Self { script_uri, git_args, create_env })
    }

    /// Path of the script relative to the repository root.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.script_uri.trim_start_matches("git://").trim_start_matches('/'))
    }
}

/// A script prepared for execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "script_type", rename_all = "lowercase")]
pub enum ExecutableScript {
    Filesystem(FileSystemScript),
    Git(GitScript),
}

impl ExecutableScript {
    pub fn script_uri(&self) -> &str {
        match self {
            ExecutableScript::Filesystem(s) => &s.script_uri,
            ExecutableScript::Git(s) => &s.script_uri,
        }
    }

    pub fn script_type(&self) -> &'static str {
        match self {
            ExecutableScript::Filesystem(_) => "filesystem",
            ExecutableScript::Git(_) => "git",
        }
    }
}

#[cfg(test)]
#[path = "script_tests.rs"]
mod tests;
