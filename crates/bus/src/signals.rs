// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cooperative shutdown primitives.
//!
//! One shared [`ShutdownFlag`] is the sole cancel signal; every loop in the
//! system checks it within [`SHUTDOWN_CHECK_INTERVAL`]. [`SignalState`]
//! records how many termination signals have arrived so that a process which
//! ignores cooperative requests can be escalated to a hard exit.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Interval within which all loops must observe the shutdown flag.
pub const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_millis(20);

/// Number of termination signals tolerated before the hard exit path.
pub const MAX_TERMINATE_CALLED: u32 = 3;

/// Shared cooperative-cancel flag.
#[derive(Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One-shot latch: set exactly once, waited on with a timeout.
///
/// Used for worker startup signalling and the environment manager's
/// creating/created handshake.
#[derive(Clone, Default)]
pub struct Signal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        let (lock, cvar) = &*self.inner;
        let mut set = lock.lock();
        *set = true;
        cvar.notify_all();
    }

    pub fn is_set(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Wait until the signal is set or the timeout elapses. Returns whether
    /// the signal was set.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut set = lock.lock();
        while !*set {
            if cvar.wait_until(&mut set, deadline).timed_out() {
                return *set;
            }
        }
        true
    }
}

/// What the signal handler should do after recording a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// Request cooperative shutdown and keep running.
    Cooperative,
    /// The call limit is exceeded; terminate the process immediately.
    HardExit,
}

/// State shared with the signal-handling thread.
///
/// Every received SIGINT/SIGTERM sets the shutdown flag; the decision to
/// escalate is pure so it can be tested without delivering real signals.
pub struct SignalState {
    terminate_called: AtomicU32,
    shutdown: ShutdownFlag,
}

impl SignalState {
    pub fn new(shutdown: ShutdownFlag) -> Self {
        Self { terminate_called: AtomicU32::new(0), shutdown }
    }

    /// Record one received termination signal.
    pub fn on_signal(&self) -> SignalAction {
        let calls = self.terminate_called.fetch_add(1, Ordering::SeqCst) + 1;
        self.shutdown.set();
        if calls >= MAX_TERMINATE_CALLED {
            SignalAction::HardExit
        } else {
            SignalAction::Cooperative
        }
    }

    pub fn calls(&self) -> u32 {
        self.terminate_called.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "signals_tests.rs"]
mod tests;
