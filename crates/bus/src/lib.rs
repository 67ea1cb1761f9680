// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event fabric for the Observation Execution Tool.
//!
//! Two layers: a per-worker topic bus delivering synchronous callbacks, and
//! bounded inter-worker event queues routed by the main context's dispatch
//! loop. The request bridge turns asynchronous bus traffic into synchronous
//! calls for the HTTP layer.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod bridge;
pub mod context;
pub mod local;
pub mod queue;
pub mod signals;

pub use bridge::{BridgeError, RequestBridge, REQUEST_TIMEOUT};
pub use context::{ContextStats, MainContext, Worker, WorkerBody, WorkerCtx, WorkerError};
pub use local::{LocalBus, SubscriptionId};
pub use queue::{EventQueue, DEFAULT_CAPACITY, MPQUEUE_TIMEOUT};
pub use signals::{
    Signal, SignalAction, SignalState, ShutdownFlag, MAX_TERMINATE_CALLED,
    SHUTDOWN_CHECK_INTERVAL,
};
