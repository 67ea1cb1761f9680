// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for the integration specs.

use oet_bus::{
    BridgeError, EventQueue, LocalBus, MainContext, RequestBridge, ShutdownFlag, WorkerBody,
    WorkerCtx, WorkerError,
};
use oet_core::{
    BusMessage, CommandResult, EventMessage, ExecutableScript, FileSystemScript, MessagePayload,
    PrepareCommand, ProcedureId, ProcedureInput, ProcedureState, ProcedureSummary, RequestId,
    StartCommand, StopCommand, Topic,
};
use oet_daemon::{ExecutionWorker, API_WORKER_NAME, EXEC_WORKER_NAME};
use oet_engine::{EnvironmentManager, GitCli, SesConfig, ThreadLauncher};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(10);

pub const HAPPY_SCRIPT: &str = "local subarray\n\
    function init(kwargs) subarray = kwargs.subarray_id end\n\
    function main(kwargs) announce('observing subarray ' .. tostring(subarray)) end";

pub const FAILING_SCRIPT: &str =
    "function init(kwargs) end\nfunction main(kwargs) error('boom') end";

pub const LOOPING_SCRIPT: &str = "function init(kwargs) end\n\
    function main(kwargs)\n\
    local i = 0\n\
    while true do i = i + 1 end\n\
    end";

const ABORT_SCRIPT: &str = "local subarray\n\
    function init(kwargs) subarray = kwargs.subarray_id end\n\
    function main(kwargs) announce('aborting subarray ' .. tostring(subarray)) end";

/// Stub API worker body: the hosting worker provides all the bridging the
/// request bridge and stream recorder need.
struct StubApiBody;

impl WorkerBody for StubApiBody {
    fn startup(&mut self, _ctx: &WorkerCtx) -> Result<(), WorkerError> {
        Ok(())
    }
}

/// A recorded bus message on the API side, as the SSE stream would see it.
#[derive(Debug, Clone)]
pub struct StreamedMessage {
    pub topic: Topic,
    pub msg_src: Option<String>,
    pub request_id: Option<RequestId>,
    pub payload: MessagePayload,
}

pub struct Harness {
    dir: tempfile::TempDir,
    pub bridge: RequestBridge,
    pub stream: Arc<Mutex<Vec<StreamedMessage>>>,
    events: EventQueue,
    shutdown: ShutdownFlag,
    dispatch: Option<JoinHandle<MainContext>>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("abort.lua"), ABORT_SCRIPT).expect("abort fixture");

        let mut ctx = MainContext::new();
        let exec_bus = LocalBus::new();
        let api_bus = LocalBus::new();

        let config = SesConfig {
            abort_script: ExecutableScript::Filesystem(FileSystemScript {
                script_uri: format!("file://{}/abort.lua", dir.path().display()),
            }),
        };
        let environments =
            EnvironmentManager::new(dir.path().join("environments"), Arc::new(GitCli));

        let exec_inbox = ctx.queue();
        ctx.spawn_worker(
            EXEC_WORKER_NAME,
            Box::new(ExecutionWorker::new(config, Box::new(ThreadLauncher), environments)),
            exec_inbox,
            exec_bus,
        )
        .expect("spawn exec worker");

        let api_inbox = ctx.queue();
        ctx.spawn_worker(API_WORKER_NAME, Box::new(StubApiBody), api_inbox, api_bus.clone())
            .expect("spawn api worker");

        // everything the API bus sees, in arrival order
        let stream = Arc::new(Mutex::new(Vec::new()));
        {
            let sink = Arc::clone(&stream);
            api_bus.subscribe_all(move |msg: &BusMessage| {
                sink.lock().push(StreamedMessage {
                    topic: msg.topic(),
                    msg_src: msg.msg_src.clone(),
                    request_id: msg.request_id(),
                    payload: msg.payload.clone(),
                });
            });
        }

        let events = ctx.event_queue();
        let shutdown = ctx.shutdown_flag();
        let dispatch = std::thread::spawn(move || {
            ctx.dispatch_loop();
            ctx
        });

        Self {
            dir,
            bridge: RequestBridge::with_timeout(api_bus, WAIT),
            stream,
            events,
            shutdown,
            dispatch: Some(dispatch),
        }
    }

    /// Write a script fixture and return its filesystem reference.
    pub fn script(&self, name: &str, source: &str) -> ExecutableScript {
        let path = self.dir.path().join(name);
        std::fs::write(&path, source).expect("script fixture");
        ExecutableScript::Filesystem(FileSystemScript {
            script_uri: format!("file://{}", path.display()),
        })
    }

    pub fn prepare(
        &self,
        script: ExecutableScript,
        init_args: ProcedureInput,
    ) -> Result<ProcedureSummary, BridgeError> {
        let cmd = PrepareCommand { script, init_args };
        match self.bridge.call(Topic::ProcedureLifecycleCreated, |request_id| {
            MessagePayload::RequestProcedureCreate { request_id, cmd }
        })? {
            CommandResult::Summary { summary } => Ok(summary),
            other => panic!("unexpected prepare reply {other:?}"),
        }
    }

    pub fn start_main(&self, pid: ProcedureId) -> Result<ProcedureSummary, BridgeError> {
        match self.bridge.call(Topic::ProcedureLifecycleStarted, |request_id| {
            MessagePayload::RequestProcedureStart {
                request_id,
                cmd: StartCommand::main(pid, ProcedureInput::default()),
            }
        })? {
            CommandResult::Summary { summary } => Ok(summary),
            other => panic!("unexpected start reply {other:?}"),
        }
    }

    pub fn stop(
        &self,
        pid: ProcedureId,
        run_abort: bool,
    ) -> Result<Vec<ProcedureSummary>, BridgeError> {
        match self.bridge.call(Topic::ProcedureLifecycleStopped, |request_id| {
            MessagePayload::RequestProcedureStop {
                request_id,
                cmd: StopCommand { process_uid: pid, run_abort },
            }
        })? {
            CommandResult::Summaries { summaries } => Ok(summaries),
            other => panic!("unexpected stop reply {other:?}"),
        }
    }

    pub fn list(&self, pids: Option<Vec<ProcedureId>>) -> Vec<ProcedureSummary> {
        match self
            .bridge
            .call(Topic::ProcedurePoolList, |request_id| MessagePayload::RequestProcedureList {
                request_id,
                pids,
            })
            .expect("list reply")
        {
            CommandResult::Summaries { summaries } => summaries,
            other => panic!("unexpected list reply {other:?}"),
        }
    }

    /// Poll the pool until the procedure reaches the wanted state.
    pub fn wait_for_state(&self, pid: ProcedureId, state: ProcedureState) -> ProcedureSummary {
        let deadline = Instant::now() + WAIT;
        loop {
            let summaries = self.list(Some(vec![pid]));
            if let Some(summary) = summaries.first() {
                if summary.state == state {
                    return summary.clone();
                }
            }
            if Instant::now() >= deadline {
                panic!("procedure {pid} never reached {state}");
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Wait until the stream contains a message matching the predicate.
    pub fn wait_for_stream(
        &self,
        mut predicate: impl FnMut(&StreamedMessage) -> bool,
    ) -> StreamedMessage {
        let deadline = Instant::now() + WAIT;
        loop {
            if let Some(found) = self.stream.lock().iter().find(|m| predicate(m)) {
                return found.clone();
            }
            if Instant::now() >= deadline {
                panic!("stream never carried the expected message");
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Orderly teardown; returns the final context stats holder for asserts.
    pub fn finish(mut self) -> MainContext {
        self.events.safe_put(EventMessage::end("specs"));
        self.shutdown.set();
        let mut ctx = match self.dispatch.take() {
            Some(handle) => handle.join().expect("dispatch thread"),
            None => unreachable!("finish called twice"),
        };
        ctx.shutdown();
        ctx
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.set();
        if let Some(handle) = self.dispatch.take() {
            self.events.safe_put(EventMessage::end("specs-drop"));
            let _ = handle.join();
        }
    }
}
