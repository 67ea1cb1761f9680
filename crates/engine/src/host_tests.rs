// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use oet_core::ProcedureInput;
use parking_lot::Mutex;
use std::fs;

struct Fixture {
    _dir: tempfile::TempDir,
    host: ScriptHost,
    script: PathBuf,
    announcements: Arc<Mutex<Vec<String>>>,
    stop: ShutdownFlag,
}

fn fixture(source: &str) -> Fixture {
    fixture_with_search(source, &[])
}

fn fixture_with_search(source: &str, extra_search: &[PathBuf]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("script.lua");
    fs::write(&script, source).unwrap();

    let announcements = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&announcements);
    let stop = ShutdownFlag::new();
    let mut search = vec![dir.path().to_path_buf()];
    search.extend_from_slice(extra_search);
    let host = ScriptHost::new(
        &search,
        stop.clone(),
        Arc::new(move |msg: &str| sink.lock().push(msg.to_string())),
    )
    .unwrap();
    Fixture { _dir: dir, host, script, announcements, stop }
}

#[test]
fn load_registers_callables() {
    let f = fixture("function init(kwargs) end\nfunction main(kwargs) end");
    f.host.load(&f.script).unwrap();
    assert!(f.host.has_callable("init"));
    assert!(f.host.has_callable("main"));
    assert!(!f.host.has_callable("teardown"));
}

#[test]
fn syntax_error_fails_load() {
    let f = fixture("function init( this is not lua");
    let err = f.host.load(&f.script).unwrap_err();
    assert!(matches!(err, HostError::Load(_)));
}

#[test]
fn missing_file_fails_load() {
    let f = fixture("");
    let err = f.host.load(&f.script.with_file_name("absent.lua")).unwrap_err();
    assert!(matches!(err, HostError::Read { .. }));
}

#[test]
fn call_passes_positional_args_and_kwargs_table() {
    let f = fixture(
        "function main(a, b, kwargs)\n\
         announce(a .. ':' .. b .. ':' .. tostring(kwargs.subarray_id))\n\
         end",
    );
    f.host.load(&f.script).unwrap();
    let mut args = ProcedureInput::new(
        vec![serde_json::json!("x"), serde_json::json!("y")],
        Default::default(),
    );
    args.kwargs.insert("subarray_id".into(), serde_json::json!(3));
    f.host.call("main", &args).unwrap();
    assert_eq!(f.announcements.lock().as_slice(), &["x:y:3".to_string()]);
}

#[test]
fn unknown_callable_is_rejected() {
    let f = fixture("function main(kwargs) end");
    f.host.load(&f.script).unwrap();
    let err = f.host.call("observe", &ProcedureInput::default()).unwrap_err();
    assert!(matches!(err, HostError::UnsupportedCallable(name) if name == "observe"));
}

#[test]
fn raised_error_captures_stacktrace() {
    let f = fixture("function main(kwargs) error('boom') end");
    f.host.load(&f.script).unwrap();
    let err = f.host.call("main", &ProcedureInput::default()).unwrap_err();
    match err {
        HostError::Script { stacktrace } => assert!(stacktrace.contains("boom")),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn stop_flag_interrupts_a_running_callable() {
    let f = fixture("function main(kwargs)\nwhile true do end\nend");
    f.host.load(&f.script).unwrap();
    // the hook observes the flag within one instruction window
    f.stop.set();
    let err = f.host.call("main", &ProcedureInput::default()).unwrap_err();
    assert!(matches!(err, HostError::Stopped));
}

#[test]
fn search_path_resolves_vendored_modules() {
    let dir = tempfile::tempdir().unwrap();
    let lib = dir.path().join("lib");
    fs::create_dir_all(&lib).unwrap();
    fs::write(lib.join("telescope.lua"), "return { greet = function() return 'pointed' end }")
        .unwrap();

    let f = fixture_with_search(
        "local telescope = require('telescope')\n\
         function main(kwargs) announce(telescope.greet()) end",
        &[lib],
    );
    f.host.load(&f.script).unwrap();
    f.host.call("main", &ProcedureInput::default()).unwrap();
    assert_eq!(f.announcements.lock().as_slice(), &["pointed".to_string()]);
}

#[test]
fn state_persists_between_callables() {
    let f = fixture(
        "local bound\n\
         function init(kwargs) bound = kwargs.subarray_id end\n\
         function main(kwargs) announce('subarray ' .. tostring(bound)) end",
    );
    f.host.load(&f.script).unwrap();
    f.host
        .call("init", &ProcedureInput::with_kwarg("subarray_id", serde_json::json!(2)))
        .unwrap();
    f.host.call("main", &ProcedureInput::default()).unwrap();
    assert_eq!(f.announcements.lock().as_slice(), &["subarray 2".to_string()]);
}
