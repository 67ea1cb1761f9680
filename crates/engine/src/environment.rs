// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-revision script sandboxes.
//!
//! The environment id is the commit hash. Concurrent prepares of the same
//! revision converge on a single clone: the first caller sets the creating
//! signal and builds; later callers wait on the created signal and read the
//! finished record. Script projects vendor their Lua dependencies in-repo,
//! so installing them means resolving the final module search path from the
//! checkout and its manifest.

use crate::git::{project_name, GitError, GitOps};
use oet_bus::Signal;
use oet_core::GitArgs;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Maximum wait for another caller's in-flight environment build.
pub const ENV_CREATE_WAIT: Duration = Duration::from_secs(300);

/// Environment variable overriding the sandbox base directory.
pub const ENV_DIR_ENV: &str = "OET_ENV_DIR";

const DEFAULT_ENV_DIR: &str = "/tmp/environments";

/// Manifest file a script project may carry to extend its module path.
const SCRIPTING_MANIFEST: &str = "oet.toml";

#[derive(Debug, Error)]
pub enum EnvError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error("environment {0} was not created within the wait period")]
    CreationTimedOut(String),

    #[error("environment {0} creation failed in a concurrent caller")]
    CreationFailed(String),

    #[error("environment io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid {SCRIPTING_MANIFEST}: {0}")]
    Manifest(String),
}

/// One prepared sandbox.
#[derive(Clone)]
pub struct EnvironmentRecord {
    /// Commit hash the sandbox was built from.
    pub env_id: String,
    /// Checkout directory.
    pub path: PathBuf,
    /// Directories forming the interpreter's module search path.
    pub site_packages: Vec<PathBuf>,
    pub creating: Signal,
    pub created: Signal,
}

/// Prepares and caches sandboxes keyed by commit hash.
pub struct EnvironmentManager {
    base_dir: PathBuf,
    git: Arc<dyn GitOps>,
    envs: Mutex<HashMap<String, EnvironmentRecord>>,
}

impl EnvironmentManager {
    pub fn new(base_dir: PathBuf, git: Arc<dyn GitOps>) -> Self {
        Self { base_dir, git, envs: Mutex::new(HashMap::new()) }
    }

    /// Base directory from `OET_ENV_DIR`, defaulting to `/tmp/environments`.
    pub fn from_env(git: Arc<dyn GitOps>) -> Self {
        let base_dir = std::env::var_os(ENV_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_DIR));
        Self::new(base_dir, git)
    }

    /// Prepare (or reuse) the sandbox for the given revision.
    pub fn prepare(&self, git_args: &GitArgs) -> Result<EnvironmentRecord, EnvError> {
        let env_id = self.resolve_env_id(git_args)?;

        let (record, is_creator) = {
            let mut envs = self.envs.lock();
            match envs.get(&env_id) {
                Some(record) => (record.clone(), false),
                None => {
                    let record = EnvironmentRecord {
                        env_id: env_id.clone(),
                        path: self.checkout_dir(git_args, &env_id),
                        site_packages: Vec::new(),
                        creating: Signal::new(),
                        created: Signal::new(),
                    };
                    record.creating.set();
                    envs.insert(env_id.clone(), record.clone());
                    (record, true)
                }
            }
        };

        if !is_creator {
            if !record.created.wait(ENV_CREATE_WAIT) {
                return Err(EnvError::CreationTimedOut(env_id));
            }
            return self
                .envs
                .lock()
                .get(&env_id)
                .cloned()
                .ok_or(EnvError::CreationFailed(env_id));
        }

        match self.build(&record, git_args) {
            Ok(site_packages) => {
                let finished = {
                    let mut envs = self.envs.lock();
                    if let Some(entry) = envs.get_mut(&env_id) {
                        entry.site_packages = site_packages;
                    }
                    envs.get(&env_id).cloned()
                };
                record.created.set();
                finished.ok_or(EnvError::CreationFailed(env_id))
            }
            Err(e) => {
                self.envs.lock().remove(&env_id);
                // wake waiters so they observe the failure
                record.created.set();
                Err(e)
            }
        }
    }

    /// Clone the revision without recording a sandbox; used for git scripts
    /// that run in the default environment.
    pub fn checkout(&self, git_args: &GitArgs) -> Result<PathBuf, EnvError> {
        let env_id = self.resolve_env_id(git_args)?;
        let dest = self.checkout_dir(git_args, &env_id);
        GitOps::clone_into(&*self.git, git_args, &dest)?;
        Ok(dest)
    }

    /// Remove a sandbox directory and forget its record.
    pub fn delete_env(&self, env_id: &str) -> Result<(), EnvError> {
        if let Some(record) = self.envs.lock().remove(env_id) {
            if record.path.exists() {
                std::fs::remove_dir_all(&record.path)?;
            }
        }
        Ok(())
    }

    /// Records currently held, for inspection.
    pub fn env_ids(&self) -> Vec<String> {
        self.envs.lock().keys().cloned().collect()
    }

    fn resolve_env_id(&self, git_args: &GitArgs) -> Result<String, EnvError> {
        match &git_args.git_commit {
            Some(commit) => Ok(commit.clone()),
            None => Ok(self.git.remote_commit(git_args)?),
        }
    }

    fn checkout_dir(&self, git_args: &GitArgs, env_id: &str) -> PathBuf {
        self.base_dir.join(project_name(&git_args.git_repo)).join(env_id)
    }

    fn build(
        &self,
        record: &EnvironmentRecord,
        git_args: &GitArgs,
    ) -> Result<Vec<PathBuf>, EnvError> {
        tracing::info!(env_id = %record.env_id, path = %record.path.display(), "building environment");
        GitOps::clone_into(&*self.git, git_args, &record.path)?;
        resolve_search_path(&record.path)
    }
}

/// Resolve the module search path of a checkout: the checkout root, its
/// `lib/` directory when present, and any `module_dirs` declared under
/// `[scripting]` in the project manifest.
pub fn resolve_search_path(checkout: &Path) -> Result<Vec<PathBuf>, EnvError> {
    let mut paths = vec![checkout.to_path_buf()];

    let lib = checkout.join("lib");
    if lib.is_dir() {
        paths.push(lib);
    }

    let manifest_path = checkout.join(SCRIPTING_MANIFEST);
    if manifest_path.is_file() {
        let raw = std::fs::read_to_string(&manifest_path)?;
        let manifest: toml::Value =
            raw.parse().map_err(|e: toml::de::Error| EnvError::Manifest(e.to_string()))?;
        if let Some(dirs) = manifest
            .get("scripting")
            .and_then(|s| s.get("module_dirs"))
            .and_then(|d| d.as_array())
        {
            for dir in dirs {
                let dir = dir
                    .as_str()
                    .ok_or_else(|| EnvError::Manifest("module_dirs entries must be strings".into()))?;
                paths.push(checkout.join(dir));
            }
        }
    }

    Ok(paths)
}

#[cfg(test)]
#[path = "environment_tests.rs"]
mod tests;
