// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON representations of procedures for client consumption.
//!
//! The main job is replacing the internal procedure id with the resource
//! uri and flattening the argument captures into a per-callable mapping.

use indexmap::IndexMap;
use oet_core::{ExecutableScript, GitArgs, ProcedureSummary};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptJson {
    pub script_type: String,
    pub script_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_args: Option<GitArgs>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FnArgsJson {
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
    #[serde(default)]
    pub kwargs: IndexMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryJson {
    pub process_states: Vec<(String, f64)>,
    pub stacktrace: Option<String>,
}

/// Public JSON rendering of a [`ProcedureSummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureSummaryJson {
    pub uri: String,
    pub script: ScriptJson,
    pub script_args: IndexMap<String, FnArgsJson>,
    pub history: HistoryJson,
    pub state: String,
}

/// Convert a summary into its public JSON form.
pub fn make_public_summary(public_url: &str, summary: &ProcedureSummary) -> ProcedureSummaryJson {
    let script = match &summary.script {
        ExecutableScript::Filesystem(fs) => ScriptJson {
            script_type: "filesystem".into(),
            script_uri: fs.script_uri.clone(),
            git_args: None,
        },
        ExecutableScript::Git(git) => ScriptJson {
            script_type: "git".into(),
            script_uri: git.script_uri.clone(),
            git_args: Some(git.git_args.clone()),
        },
    };

    // latest capture wins per callable, first-capture order preserved
    let mut script_args = IndexMap::new();
    for capture in &summary.script_args {
        script_args.insert(
            capture.fn_name.clone(),
            FnArgsJson {
                args: capture.fn_args.args.clone(),
                kwargs: capture.fn_args.kwargs.clone(),
            },
        );
    }

    ProcedureSummaryJson {
        uri: format!("{public_url}/procedures/{}", summary.id),
        script,
        script_args,
        history: HistoryJson {
            process_states: summary
                .history
                .process_states
                .iter()
                .map(|(state, time)| (state.as_str().to_string(), *time))
                .collect(),
            stacktrace: summary.history.stacktrace.clone(),
        },
        state: summary.state.as_str().to_string(),
    }
}

#[cfg(test)]
#[path = "dto_tests.rs"]
mod tests;
