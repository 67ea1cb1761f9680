// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn shutdown_flag_shared_between_clones() {
    let flag = ShutdownFlag::new();
    let other = flag.clone();
    assert!(!flag.is_set());
    other.set();
    assert!(flag.is_set());
}

#[test]
fn signal_wait_times_out_when_unset() {
    let signal = Signal::new();
    assert!(!signal.wait(Duration::from_millis(30)));
    assert!(!signal.is_set());
}

#[test]
fn signal_wait_returns_after_set_from_other_thread() {
    let signal = Signal::new();
    let setter = signal.clone();
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        setter.set();
    });
    assert!(signal.wait(Duration::from_secs(1)));
    handle.join().unwrap();
}

#[test]
fn signal_wait_on_already_set_returns_immediately() {
    let signal = Signal::new();
    signal.set();
    assert!(signal.wait(Duration::ZERO));
}

#[test]
fn first_two_signals_are_cooperative() {
    let flag = ShutdownFlag::new();
    let state = SignalState::new(flag.clone());
    assert_eq!(state.on_signal(), SignalAction::Cooperative);
    assert!(flag.is_set());
    assert_eq!(state.on_signal(), SignalAction::Cooperative);
    assert_eq!(state.calls(), 2);
}

#[test]
fn third_signal_triggers_hard_exit() {
    let state = SignalState::new(ShutdownFlag::new());
    state.on_signal();
    state.on_signal();
    assert_eq!(state.on_signal(), SignalAction::HardExit);
    // any further signal keeps escalating
    assert_eq!(state.on_signal(), SignalAction::HardExit);
}
