// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Feature flags, configured once at deployment time.
//!
//! Flag values are resolved from, in order: environment variables, a TOML
//! configuration file, and compiled defaults. The engine never changes its
//! behaviour on these; they exist for the external collaborators.

use std::path::{Path, PathBuf};

/// Environment variable overriding the `discard_first_event` flag.
pub const DISCARD_FIRST_EVENT_ENV: &str = "OET_DISCARD_FIRST_EVENT";

/// Environment variable naming the feature flag configuration file.
pub const FEATURES_FILE_ENV: &str = "OET_FEATURES_FILE";

/// Flags for features that can be toggled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Features {
    discard_first_event: bool,
}

impl Features {
    /// True if the device-control subscription manager should discard the
    /// first event received from a new subscription.
    pub fn discard_first_event(&self) -> bool {
        self.discard_first_event
    }

    /// Resolve flags from the environment and the file named by
    /// `OET_FEATURES_FILE`.
    pub fn from_env() -> Self {
        let paths: Vec<PathBuf> =
            std::env::var_os(FEATURES_FILE_ENV).map(PathBuf::from).into_iter().collect();
        Self::create_from_config_files(&paths)
    }

    /// Resolve flags, preferring the environment over the given files over
    /// the compiled defaults.
    pub fn create_from_config_files(paths: &[PathBuf]) -> Self {
        let discard_first_event = std::env::var(DISCARD_FIRST_EVENT_ENV)
            .ok()
            .and_then(|raw| parse_bool(&raw))
            .or_else(|| paths.iter().find_map(|path| file_flag(path, "discard_first_event")))
            .unwrap_or(true);
        Self { discard_first_event }
    }
}

impl Default for Features {
    fn default() -> Self {
        Self { discard_first_event: true }
    }
}

fn file_flag(path: &Path, flag: &str) -> Option<bool> {
    let raw = std::fs::read_to_string(path).ok()?;
    let doc: toml::Value = raw.parse().ok()?;
    doc.get("tango")?.get(flag)?.as_bool()
}

/// Lenient boolean parsing for environment variable values.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "y" | "t" => Some(true),
        "0" | "false" | "no" | "off" | "n" | "f" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "features_tests.rs"]
mod tests;
