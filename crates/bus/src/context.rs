// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker supervision and the main dispatch loop.
//!
//! A [`Worker`] runs a [`WorkerBody`] on its own named thread and bridges
//! the worker's local topic bus onto the inter-worker queues: locally
//! originated publishes are wrapped as PUBSUB events and put on the central
//! event queue, and inbox items from other workers are republished locally
//! with their original source preserved. A worker never redelivers its own
//! messages to itself.
//!
//! [`MainContext`] owns the shutdown flag, the central event queue, the
//! worker inboxes and the workers themselves. Its dispatch loop fans PUBSUB
//! events out to every inbox and breaks on FATAL or END.

use crate::local::LocalBus;
use crate::queue::EventQueue;
use crate::signals::{Signal, ShutdownFlag};
use oet_core::{BusMessage, EventMessage, MessageContent, MessagePayload};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Grace period for a worker to signal startup before boot is abandoned.
pub const STARTUP_WAIT: Duration = Duration::from_secs(3);

/// Grace period between requesting shutdown and declaring a worker stuck.
pub const SHUTDOWN_WAIT: Duration = Duration::from_secs(3);

const JOIN_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker '{name}' failed to signal startup within the grace period")]
    StartupTimeout { name: String },

    #[error("worker '{name}' startup failed: {reason}")]
    Startup { name: String, reason: String },

    #[error("worker '{name}' body failed: {reason}")]
    Body { name: String, reason: String },

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Everything a worker body needs from its hosting worker.
#[derive(Clone)]
pub struct WorkerCtx {
    name: String,
    bus: LocalBus,
    event_queue: EventQueue,
    shutdown: ShutdownFlag,
}

impl WorkerCtx {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bus(&self) -> &LocalBus {
        &self.bus
    }

    pub fn event_queue(&self) -> &EventQueue {
        &self.event_queue
    }

    pub fn shutdown(&self) -> &ShutdownFlag {
        &self.shutdown
    }

    /// Publish a message originated by this worker on the local bus. The
    /// outbound bridge forwards it to the central event queue.
    pub fn send_message(&self, payload: MessagePayload) {
        self.bus.publish(&BusMessage::local(payload));
    }
}

/// Business logic hosted by a [`Worker`].
///
/// The hosting worker provides the event-bus bridging; bodies only react to
/// local subscriptions made in `startup` and, optionally, to raw inbox
/// items through `main_func`.
pub trait WorkerBody: Send + 'static {
    fn startup(&mut self, ctx: &WorkerCtx) -> Result<(), WorkerError>;

    /// Called with every inbox item after inbound republishing.
    fn main_func(&mut self, _ctx: &WorkerCtx, _evt: &EventMessage) -> Result<(), WorkerError> {
        Ok(())
    }

    fn shutdown(&mut self, _ctx: &WorkerCtx) {}
}

/// Supervisor for one worker thread.
pub struct Worker {
    name: String,
    handle: Option<JoinHandle<i32>>,
}

impl Worker {
    /// Spawn a worker thread and wait for its startup signal.
    ///
    /// On startup timeout the shutdown flag is set so the rest of the
    /// context unwinds; the stuck thread exits with it.
    pub fn spawn(
        name: &str,
        body: Box<dyn WorkerBody>,
        shutdown: ShutdownFlag,
        event_queue: EventQueue,
        inbox: EventQueue,
        bus: LocalBus,
    ) -> Result<Worker, WorkerError> {
        let boot_shutdown = shutdown.clone();
        let ctx = WorkerCtx { name: name.to_string(), bus, event_queue, shutdown };
        let startup = Signal::new();
        let thread_startup = startup.clone();
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_worker(body, ctx, inbox, thread_startup))?;

        if !startup.wait(STARTUP_WAIT) {
            tracing::error!(worker = name, "startup signal not received, aborting boot");
            // The shutdown flag is shared; the stuck thread observes it
            // within one check interval and exits.
            boot_shutdown.set();
            drop(handle);
            return Err(WorkerError::StartupTimeout { name: name.to_string() });
        }
        Ok(Worker { name: name.to_string(), handle: Some(handle) })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_alive(&self) -> bool {
        match &self.handle {
            Some(handle) => !handle.is_finished(),
            None => false,
        }
    }

    /// Join the worker thread, polling until the deadline. Returns the exit
    /// code, or None if the thread is still running at the deadline.
    pub fn join_deadline(&mut self, deadline: Instant) -> Option<i32> {
        loop {
            let finished = match &self.handle {
                Some(handle) => handle.is_finished(),
                None => return Some(0),
            };
            if finished {
                return match self.handle.take() {
                    // A panicking body counts as an abnormal exit.
                    Some(handle) => Some(handle.join().unwrap_or(2)),
                    None => Some(0),
                };
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(JOIN_POLL);
        }
    }
}

/// Worker thread template: bridge installation, startup, inbox loop,
/// shutdown announcement.
fn run_worker(
    mut body: Box<dyn WorkerBody>,
    ctx: WorkerCtx,
    inbox: EventQueue,
    startup: Signal,
) -> i32 {
    tracing::debug!(worker = ctx.name(), "worker thread starting");

    // Outbound bridge: every locally-originated publish is wrapped as a
    // PUBSUB event and queued for routing to the other workers.
    let outbound = {
        let name = ctx.name.clone();
        let event_queue = ctx.event_queue.clone();
        ctx.bus.subscribe_all(move |msg: &BusMessage| {
            if msg.msg_src.is_none() {
                let evt = EventMessage::pubsub(name.clone(), msg.payload.clone());
                if !event_queue.safe_put(evt) {
                    tracing::error!(
                        worker = %name,
                        topic = %msg.topic(),
                        "event queue full, outbound message dropped"
                    );
                }
            }
        })
    };

    if let Err(e) = body.startup(&ctx) {
        tracing::error!(worker = ctx.name(), error = %e, "worker startup failed");
        ctx.event_queue.safe_put(EventMessage::fatal(ctx.name(), e.to_string()));
        ctx.bus.unsubscribe(outbound);
        body.shutdown(&ctx);
        return 2;
    }
    startup.set();

    let code = loop {
        if ctx.shutdown.is_set() {
            break 0;
        }
        let Some(evt) = inbox.safe_get() else {
            continue;
        };
        match &evt.content {
            MessageContent::End => break 0,
            MessageContent::PubSub(payload) => {
                if evt.msg_src == ctx.name {
                    // Loop guard: never redeliver our own messages.
                    tracing::trace!(worker = ctx.name(), "discarding internal event");
                } else {
                    tracing::trace!(
                        worker = ctx.name(),
                        source = %evt.msg_src,
                        topic = %payload.topic(),
                        "republishing external event"
                    );
                    let msg = BusMessage::from_source(evt.msg_src.clone(), payload.clone());
                    ctx.bus.publish(&msg);
                }
                if let Err(e) = body.main_func(&ctx, &evt) {
                    tracing::error!(worker = ctx.name(), error = %e, "worker body failed");
                    ctx.event_queue.safe_put(EventMessage::fatal(ctx.name(), e.to_string()));
                    break 2;
                }
            }
            MessageContent::Fatal { .. } | MessageContent::Shutdown { .. } => {
                tracing::warn!(worker = ctx.name(), "unexpected control message on inbox");
            }
        }
    };

    ctx.bus.unsubscribe(outbound);
    body.shutdown(&ctx);
    if code == 0 {
        tracing::info!(worker = ctx.name(), "normal shutdown");
        ctx.event_queue.safe_put(EventMessage::shutdown(ctx.name(), "Normal"));
    }
    code
}

/// Outcome of a context shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContextStats {
    /// Workers that exited with a non-zero code.
    pub failed_workers: usize,
    /// Workers still running at the end of the grace period.
    pub stuck_workers: usize,
    /// Messages drained from the queues.
    pub drained_messages: usize,
}

/// Parent context owning the workers and queues of one engine instance.
pub struct MainContext {
    shutdown: ShutdownFlag,
    event_queue: EventQueue,
    queues: Vec<EventQueue>,
    workers: Vec<Worker>,
    inboxes: Vec<EventQueue>,
}

impl MainContext {
    pub fn new() -> Self {
        let event_queue = EventQueue::new();
        Self {
            shutdown: ShutdownFlag::new(),
            queues: vec![event_queue.clone()],
            event_queue,
            workers: Vec::new(),
            inboxes: Vec::new(),
        }
    }

    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.shutdown.clone()
    }

    pub fn event_queue(&self) -> EventQueue {
        self.event_queue.clone()
    }

    /// Create a new queue managed (and drained at shutdown) by this context.
    pub fn queue(&mut self) -> EventQueue {
        let queue = EventQueue::new();
        self.queues.push(queue.clone());
        queue
    }

    /// Spawn a worker whose inbox receives every routed PUBSUB event.
    pub fn spawn_worker(
        &mut self,
        name: &str,
        body: Box<dyn WorkerBody>,
        inbox: EventQueue,
        bus: LocalBus,
    ) -> Result<(), WorkerError> {
        let worker = Worker::spawn(
            name,
            body,
            self.shutdown.clone(),
            self.event_queue.clone(),
            inbox.clone(),
            bus,
        )?;
        self.workers.push(worker);
        self.inboxes.push(inbox);
        Ok(())
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    /// Route events between workers until shutdown, FATAL, or END.
    pub fn dispatch_loop(&self) {
        tracing::debug!("dispatch loop running");
        while !self.shutdown.is_set() {
            let Some(evt) = self.event_queue.safe_get() else {
                continue;
            };
            match &evt.content {
                MessageContent::PubSub(_) => {
                    for inbox in &self.inboxes {
                        if !inbox.safe_put(evt.clone()) {
                            tracing::warn!(
                                source = %evt.msg_src,
                                "worker inbox full, dropping routed event"
                            );
                        }
                    }
                }
                MessageContent::Fatal { error } => {
                    tracing::error!(source = %evt.msg_src, error = %error, "fatal event received");
                    break;
                }
                MessageContent::End => {
                    tracing::info!(source = %evt.msg_src, "end sentinel received");
                    break;
                }
                MessageContent::Shutdown { reason } => {
                    tracing::info!(source = %evt.msg_src, reason = %reason, "worker shut down");
                }
            }
        }
    }

    /// Stop all workers: post the END sentinel, set the shutdown flag, and
    /// join each worker within the shared grace period.
    pub fn stop_workers(&mut self) -> (usize, usize) {
        self.event_queue.safe_put(EventMessage::end("stop-workers"));
        self.shutdown.set();

        let deadline = Instant::now() + SHUTDOWN_WAIT;
        let mut failed = 0;
        let mut stuck = 0;
        for worker in &mut self.workers {
            match worker.join_deadline(deadline) {
                Some(0) => tracing::debug!(worker = worker.name(), "worker stopped"),
                Some(code) => {
                    tracing::error!(worker = worker.name(), code, "worker exited abnormally");
                    failed += 1;
                }
                None => {
                    tracing::error!(worker = worker.name(), "worker did not stop in time");
                    stuck += 1;
                }
            }
        }
        (failed, stuck)
    }

    /// Drain every managed queue, returning the number of items removed.
    pub fn stop_queues(&mut self) -> usize {
        let mut drained = 0;
        for queue in &self.queues {
            drained += queue.drain().len();
        }
        drained
    }

    /// Orderly shutdown: stop workers first, then drain the queues.
    pub fn shutdown(&mut self) -> ContextStats {
        let (failed_workers, stuck_workers) = self.stop_workers();
        let drained_messages = self.stop_queues();
        ContextStats { failed_workers, stuck_workers, drained_messages }
    }
}

impl Default for MainContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
