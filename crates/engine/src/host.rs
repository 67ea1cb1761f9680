// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Embedded interpreter hosting one user script.
//!
//! The host wraps a single Lua state. Loading a script executes its top
//! level, which registers the named callables (`init`, `main`, extras) as
//! globals. An instruction-count hook observes the cooperative stop flag so
//! a long-running callable can be interrupted, and an `announce` builtin
//! lets scripts publish free-form events.

use mlua::{Function, HookTriggers, Lua, LuaSerdeExt, MultiValue, Value as LuaValue};
use oet_bus::ShutdownFlag;
use oet_core::ProcedureInput;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Instructions executed between stop-flag checks.
const HOOK_INSTRUCTION_COUNT: u32 = 1_000;

const STOP_SENTINEL: &str = "script stop requested";

#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to read script {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("script load failed: {0}")]
    Load(String),

    #[error("unsupported callable '{0}'")]
    UnsupportedCallable(String),

    #[error("script execution stopped")]
    Stopped,

    #[error("script raised: {stacktrace}")]
    Script { stacktrace: String },

    #[error("interpreter error: {0}")]
    Lua(#[from] mlua::Error),
}

/// Callback invoked when the script calls `announce(msg)`.
pub type AnnounceFn = Arc<dyn Fn(&str) + Send + Sync>;

/// One loaded user script and its callable registry.
pub struct ScriptHost {
    lua: Lua,
    stop: ShutdownFlag,
}

impl ScriptHost {
    /// Create an interpreter with the given module search path and builtins
    /// installed. No script is loaded yet.
    pub fn new(
        search_path: &[PathBuf],
        stop: ShutdownFlag,
        announce: AnnounceFn,
    ) -> Result<Self, HostError> {
        let lua = Lua::new();

        if !search_path.is_empty() {
            let package: mlua::Table = lua.globals().get("package")?;
            let current: String = package.get("path")?;
            let mut extended = String::new();
            for dir in search_path {
                extended.push_str(&format!("{0}/?.lua;{0}/?/init.lua;", dir.display()));
            }
            extended.push_str(&current);
            package.set("path", extended)?;
        }

        let announce_fn = lua.create_function(move |_, msg: String| {
            announce(&msg);
            Ok(())
        })?;
        lua.globals().set("announce", announce_fn)?;

        let hook_stop = stop.clone();
        lua.set_hook(
            HookTriggers { every_nth_instruction: Some(HOOK_INSTRUCTION_COUNT), ..Default::default() },
            move |_lua, _debug| {
                if hook_stop.is_set() {
                    Err(mlua::Error::RuntimeError(STOP_SENTINEL.to_string()))
                } else {
                    Ok(())
                }
            },
        );

        Ok(Self { lua, stop })
    }

    /// Load the script file and execute its top level, registering the
    /// callables it defines.
    pub fn load(&self, script_file: &Path) -> Result<(), HostError> {
        let source = std::fs::read_to_string(script_file)
            .map_err(|source| HostError::Read { path: script_file.to_path_buf(), source })?;
        self.lua
            .load(&source)
            .set_name(script_file.to_string_lossy())
            .exec()
            .map_err(|e| {
                if self.stop.is_set() {
                    HostError::Stopped
                } else {
                    HostError::Load(stacktrace_of(&e))
                }
            })
    }

    /// Whether the loaded script defines the named callable.
    pub fn has_callable(&self, fn_name: &str) -> bool {
        matches!(
            self.lua.globals().get::<_, Option<Function>>(fn_name),
            Ok(Some(_))
        )
    }

    /// Invoke a named callable with positional arguments followed by a table
    /// of named arguments.
    pub fn call(&self, fn_name: &str, args: &ProcedureInput) -> Result<(), HostError> {
        let function: Function = self
            .lua
            .globals()
            .get::<_, Option<Function>>(fn_name)?
            .ok_or_else(|| HostError::UnsupportedCallable(fn_name.to_string()))?;

        let mut values: Vec<LuaValue> = Vec::with_capacity(args.args.len() + 1);
        for arg in &args.args {
            values.push(self.lua.to_value(arg)?);
        }
        let kwargs = self.lua.create_table()?;
        for (name, value) in &args.kwargs {
            kwargs.set(name.as_str(), self.lua.to_value(value)?)?;
        }
        values.push(LuaValue::Table(kwargs));

        function.call::<_, ()>(MultiValue::from_vec(values)).map_err(|e| {
            if self.stop.is_set() || is_stop_error(&e) {
                HostError::Stopped
            } else {
                HostError::Script { stacktrace: stacktrace_of(&e) }
            }
        })
    }
}

fn is_stop_error(err: &mlua::Error) -> bool {
    err.to_string().contains(STOP_SENTINEL)
}

/// Render an interpreter error with its traceback as the stored stacktrace.
fn stacktrace_of(err: &mlua::Error) -> String {
    match err {
        mlua::Error::CallbackError { traceback, cause } => format!("{cause}\n{traceback}"),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
