// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git operations for repo-sourced scripts.
//!
//! Shells out to the `git` CLI. When no commit pins the revision a shallow
//! single-branch clone minimises transfer; a pinned commit needs the full
//! history cloned first because git cannot clone a bare commit.

use oet_core::GitArgs;
use std::ffi::OsStr;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git {op} failed: {stderr}")]
    CommandFailed { op: String, stderr: String },

    #[error("git io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not resolve a revision for {0}")]
    NoSuchRevision(String),
}

/// Seam over the git CLI so environment preparation is testable without a
/// remote.
pub trait GitOps: Send + Sync {
    /// Resolve the commit hash the script arguments point at.
    fn remote_commit(&self, args: &GitArgs) -> Result<String, GitError>;

    /// Materialise the revision at `dest`. A pre-existing destination is
    /// reused untouched.
    fn clone_into(&self, args: &GitArgs, dest: &Path) -> Result<(), GitError>;
}

/// Git project name including the full folder tree, avoiding clashes
/// between repositories with the same final component.
pub fn project_name(git_repo: &str) -> String {
    let path = match git_repo.split_once("://") {
        Some((_, rest)) => match rest.split_once('/') {
            Some((_, path)) => path,
            None => rest,
        },
        None => git_repo,
    };
    let flattened = path.trim_start_matches('/').replace('/', "-");
    flattened.split('.').next().unwrap_or(&flattened).to_string()
}

/// Production [`GitOps`] backed by the `git` binary.
#[derive(Default, Clone)]
pub struct GitCli;

impl GitCli {
    fn run(&self, op: &str, args: &[&OsStr]) -> Result<String, GitError> {
        let output = Command::new("git").args(args).output()?;
        if !output.status.success() {
            return Err(GitError::CommandFailed {
                op: op.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl GitOps for GitCli {
    fn remote_commit(&self, args: &GitArgs) -> Result<String, GitError> {
        if let Some(commit) = &args.git_commit {
            return Ok(commit.clone());
        }
        let listing = match args.branch_or_default() {
            Some(branch) if branch != oet_core::script::DEFAULT_GIT_BRANCH => self.run(
                "ls-remote",
                &[
                    OsStr::new("ls-remote"),
                    OsStr::new("-h"),
                    OsStr::new(&args.git_repo),
                    OsStr::new(branch),
                ],
            )?,
            _ => self.run(
                "ls-remote",
                &[OsStr::new("ls-remote"), OsStr::new(&args.git_repo), OsStr::new("HEAD")],
            )?,
        };
        if listing.len() < 40 {
            return Err(GitError::NoSuchRevision(args.git_repo.clone()));
        }
        Ok(listing[..40].to_string())
    }

    fn clone_into(&self, args: &GitArgs, dest: &Path) -> Result<(), GitError> {
        if dest.exists() {
            return Ok(());
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match &args.git_commit {
            None => {
                let branch =
                    args.branch_or_default().unwrap_or(oet_core::script::DEFAULT_GIT_BRANCH);
                self.run(
                    "clone",
                    &[
                        OsStr::new("clone"),
                        OsStr::new("--depth"),
                        OsStr::new("1"),
                        OsStr::new("--single-branch"),
                        OsStr::new("--branch"),
                        OsStr::new(branch),
                        OsStr::new(&args.git_repo),
                        dest.as_os_str(),
                    ],
                )?;
            }
            Some(commit) => {
                self.run(
                    "clone",
                    &[OsStr::new("clone"), OsStr::new(&args.git_repo), dest.as_os_str()],
                )?;
                self.run(
                    "checkout",
                    &[
                        OsStr::new("-C"),
                        dest.as_os_str(),
                        OsStr::new("checkout"),
                        OsStr::new(commit),
                    ],
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "git_tests.rs"]
mod tests;
