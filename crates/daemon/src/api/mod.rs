// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! API worker: REST + server-sent events over the bus.
//!
//! The axum server runs on a tokio runtime owned by this worker's thread.
//! Request handlers convert HTTP calls into bus requests through the
//! request bridge; an all-topics subscription feeds every bus message into
//! the broadcast channel behind `/stream`.

pub mod dto;
pub mod routes;

use oet_bus::{RequestBridge, SubscriptionId, WorkerBody, WorkerCtx, WorkerError};
use oet_core::BusMessage;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Environment variable overriding the HTTP port.
pub const HTTP_PORT_ENV: &str = "OET_HTTP_PORT";

const DEFAULT_HTTP_PORT: u16 = 5000;

/// Buffered bus messages per SSE client before it is considered lagged.
const SSE_BUFFER: usize = 256;

/// API worker configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub port: u16,
    /// Base of the resource uris rendered in summaries.
    pub public_url: String,
}

impl ApiConfig {
    pub fn new(port: u16) -> Self {
        Self { port, public_url: format!("http://localhost:{port}") }
    }

    /// Port from `OET_HTTP_PORT`, defaulting to 5000.
    pub fn from_env() -> Self {
        let port = std::env::var(HTTP_PORT_ENV)
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_HTTP_PORT);
        Self::new(port)
    }
}

/// One bus message rendered for the SSE stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    pub topic: String,
    pub id: Option<String>,
    pub data: String,
}

impl SseMessage {
    pub fn from_bus(msg: &BusMessage) -> Self {
        let mut data = serde_json::to_value(&msg.payload).unwrap_or_default();
        if let (serde_json::Value::Object(fields), Some(src)) = (&mut data, &msg.msg_src) {
            fields.insert("msg_src".to_string(), serde_json::Value::String(src.clone()));
        }
        Self {
            topic: msg.topic().as_str().to_string(),
            id: msg.request_id().map(|id| id.to_string()),
            data: data.to_string(),
        }
    }
}

/// State shared with the axum handlers.
pub struct ApiState {
    pub bridge: RequestBridge,
    pub sse: broadcast::Sender<SseMessage>,
    pub public_url: String,
}

/// Worker body running the HTTP server.
pub struct ApiWorker {
    config: ApiConfig,
    subscription: Option<SubscriptionId>,
    http: Option<std::thread::JoinHandle<()>>,
}

impl ApiWorker {
    pub fn new(config: ApiConfig) -> Self {
        Self { config, subscription: None, http: None }
    }
}

impl WorkerBody for ApiWorker {
    fn startup(&mut self, ctx: &WorkerCtx) -> Result<(), WorkerError> {
        let (sse_tx, _) = broadcast::channel(SSE_BUFFER);

        // every bus message becomes one SSE frame for connected clients
        let stream_tx = sse_tx.clone();
        self.subscription = Some(ctx.bus().subscribe_all(move |msg: &BusMessage| {
            let _ = stream_tx.send(SseMessage::from_bus(msg));
        }));

        let state = Arc::new(ApiState {
            bridge: RequestBridge::new(ctx.bus().clone()),
            sse: sse_tx,
            public_url: self.config.public_url.clone(),
        });
        let app = routes::router(state);
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let shutdown = ctx.shutdown().clone();

        let handle = std::thread::Builder::new().name("oet-api-http".into()).spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::error!(error = %e, "http runtime failed to build");
                    return;
                }
            };
            runtime.block_on(async move {
                let listener = match tokio::net::TcpListener::bind(addr).await {
                    Ok(listener) => listener,
                    Err(e) => {
                        tracing::error!(%addr, error = %e, "http bind failed");
                        return;
                    }
                };
                tracing::info!(%addr, "REST API listening");
                let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                    while !shutdown.is_set() {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                });
                if let Err(e) = server.await {
                    tracing::error!(error = %e, "http server failed");
                }
            });
        })?;
        self.http = Some(handle);
        Ok(())
    }

    fn shutdown(&mut self, ctx: &WorkerCtx) {
        if let Some(subscription) = self.subscription.take() {
            ctx.bus().unsubscribe(subscription);
        }
        if let Some(handle) = self.http.take() {
            // the shared shutdown flag has been set by the context
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
