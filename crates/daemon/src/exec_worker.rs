// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution worker: hosts the script execution service.
//!
//! Listens for user request topics, calls the matching service function,
//! and broadcasts its response on the lifecycle topics. Raw script-worker
//! events are forwarded onto the central event queue so every other worker
//! observes them.

use oet_bus::{EventQueue, LocalBus, SubscriptionId, WorkerBody, WorkerCtx, WorkerError};
use oet_core::{
    BusMessage, CommandResult, EventMessage, MessagePayload, SystemClock, Topic,
};
use oet_engine::manager::EventCallback;
use oet_engine::{EnvironmentManager, ScriptExecutionService, SesConfig, SesError, WorkerLauncher};
use std::sync::Arc;

/// Worker name of the execution worker.
pub const EXEC_WORKER_NAME: &str = "exec-worker";

/// Worker name of the API worker.
pub const API_WORKER_NAME: &str = "api-worker";

type Ses = ScriptExecutionService<SystemClock>;

/// Worker body wiring request topics to the script execution service.
pub struct ExecutionWorker {
    ses_config: SesConfig,
    launcher: Option<Box<dyn WorkerLauncher>>,
    environments: Option<EnvironmentManager>,
    ses: Option<Arc<Ses>>,
    subscriptions: Vec<SubscriptionId>,
}

impl ExecutionWorker {
    pub fn new(
        ses_config: SesConfig,
        launcher: Box<dyn WorkerLauncher>,
        environments: EnvironmentManager,
    ) -> Self {
        Self {
            ses_config,
            launcher: Some(launcher),
            environments: Some(environments),
            ses: None,
            subscriptions: Vec::new(),
        }
    }
}

impl WorkerBody for ExecutionWorker {
    fn startup(&mut self, ctx: &WorkerCtx) -> Result<(), WorkerError> {
        let launcher = self.launcher.take().ok_or_else(|| WorkerError::Startup {
            name: ctx.name().to_string(),
            reason: "launcher already consumed".into(),
        })?;
        let environments = self.environments.take().ok_or_else(|| WorkerError::Startup {
            name: ctx.name().to_string(),
            reason: "environment manager already consumed".into(),
        })?;

        // Forward raw script-worker events (state changes, stacktraces,
        // announcements) to the central queue for the other workers.
        let forwarder: EventCallback = {
            let event_queue: EventQueue = ctx.event_queue().clone();
            Arc::new(move |evt: &EventMessage| {
                if !event_queue.safe_put(evt.clone()) {
                    tracing::error!(source = %evt.msg_src, "event queue full, script event dropped");
                }
            })
        };

        let ses = Arc::new(Ses::new(
            self.ses_config.clone(),
            launcher,
            environments,
            ctx.bus().clone(),
            SystemClock,
            vec![forwarder],
        ));

        let bus = ctx.bus().clone();
        self.subscriptions.push(subscribe_prepare(&bus, Arc::clone(&ses)));
        self.subscriptions.push(subscribe_start(&bus, Arc::clone(&ses)));
        self.subscriptions.push(subscribe_stop(&bus, Arc::clone(&ses)));
        self.subscriptions.push(subscribe_list(&bus, Arc::clone(&ses)));
        self.ses = Some(ses);
        Ok(())
    }

    fn shutdown(&mut self, ctx: &WorkerCtx) {
        for subscription in self.subscriptions.drain(..) {
            ctx.bus().unsubscribe(subscription);
        }
        if let Some(ses) = self.ses.take() {
            ses.shutdown();
        }
    }
}

fn reply(bus: &LocalBus, payload: MessagePayload) {
    bus.publish(&BusMessage::local(payload));
}

fn subscribe_prepare(bus: &LocalBus, ses: Arc<Ses>) -> SubscriptionId {
    let responder = bus.clone();
    bus.subscribe(Topic::RequestProcedureCreate, move |msg: &BusMessage| {
        let MessagePayload::RequestProcedureCreate { request_id, cmd } = &msg.payload else {
            return;
        };
        tracing::debug!(request_id = *request_id, "prepare procedure request");
        let result = match ses.prepare(cmd.clone()) {
            Ok(summary) => CommandResult::from_summary(summary),
            Err(e) => {
                tracing::info!(request_id = *request_id, error = %e, "prepare procedure failed");
                CommandResult::from_error(e.error_detail())
            }
        };
        reply(
            &responder,
            MessagePayload::ProcedureCreated { request_id: Some(*request_id), result },
        );
    })
}

fn subscribe_start(bus: &LocalBus, ses: Arc<Ses>) -> SubscriptionId {
    let responder = bus.clone();
    bus.subscribe(Topic::RequestProcedureStart, move |msg: &BusMessage| {
        let MessagePayload::RequestProcedureStart { request_id, cmd } = &msg.payload else {
            return;
        };
        tracing::debug!(request_id = *request_id, "start procedure request");
        let result = match ses.start(cmd.clone()) {
            Ok(summary) => CommandResult::from_summary(summary),
            Err(e) => {
                tracing::info!(request_id = *request_id, error = %e, "start procedure failed");
                CommandResult::from_error(e.error_detail())
            }
        };
        reply(
            &responder,
            MessagePayload::ProcedureStarted { request_id: Some(*request_id), result },
        );
    })
}

fn subscribe_stop(bus: &LocalBus, ses: Arc<Ses>) -> SubscriptionId {
    let responder = bus.clone();
    bus.subscribe(Topic::RequestProcedureStop, move |msg: &BusMessage| {
        let MessagePayload::RequestProcedureStop { request_id, cmd } = &msg.payload else {
            return;
        };
        tracing::debug!(request_id = *request_id, "stop procedure request");
        let result = match ses.stop(*cmd) {
            Ok(summaries) => CommandResult::Summaries { summaries },
            Err(e) => {
                tracing::info!(request_id = *request_id, error = %e, "stop procedure failed");
                CommandResult::from_error(e.error_detail())
            }
        };
        reply(
            &responder,
            MessagePayload::ProcedureStopped { request_id: Some(*request_id), result },
        );
    })
}

fn subscribe_list(bus: &LocalBus, ses: Arc<Ses>) -> SubscriptionId {
    let responder = bus.clone();
    bus.subscribe(Topic::RequestProcedureList, move |msg: &BusMessage| {
        let MessagePayload::RequestProcedureList { request_id, pids } = &msg.payload else {
            return;
        };
        tracing::debug!(request_id = *request_id, "list procedures request");
        let result = match ses.summarise(pids.as_deref()) {
            Ok(summaries) => CommandResult::Summaries { summaries },
            // unknown ids list as empty; the REST layer maps this to 404
            Err(SesError::UnknownProcedures(_)) => CommandResult::Summaries { summaries: vec![] },
            Err(e) => CommandResult::from_error(e.error_detail()),
        };
        reply(
            &responder,
            MessagePayload::ProcedurePoolList { request_id: Some(*request_id), result },
        );
    })
}

#[cfg(test)]
#[path = "exec_worker_tests.rs"]
mod tests;
