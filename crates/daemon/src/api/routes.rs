// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST routes.
//!
//! Handlers translate HTTP requests into bus requests through the request
//! bridge and map classified error payloads onto status codes with the
//! `{error, type, Message}` document.

use super::dto::make_public_summary;
use super::ApiState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use oet_bus::BridgeError;
use oet_core::{
    CommandResult, ErrorDetail, ExecutableScript, FileSystemScript, GitScript, MessagePayload,
    PrepareCommand, ProcedureId, ProcedureInput, ProcedureState, ProcedureSummary, StartCommand,
    StopCommand, Topic,
};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/procedures", get(get_procedures).post(create_procedure))
        .route("/procedures/:procedure_id", get(get_procedure).put(update_procedure))
        .route("/stream", get(stream))
        .with_state(state)
}

/// Classified API failure rendered as the error document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ApiError {
    status: StatusCode,
    type_label: String,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, type_label: impl Into<String>, message: impl Into<String>) -> Self {
        Self { status, type_label: type_label.into(), message: message.into() }
    }

    fn malformed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Malformed Request", message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Fatal Error", message)
    }

    fn not_found(pid: u32) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "ResourceNotFound",
            format!("No information available for PID={pid}"),
        )
    }

    fn from_detail(detail: &ErrorDetail) -> Self {
        let status = StatusCode::from_u16(detail.kind.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, detail.kind.type_label(), detail.message.clone())
    }

    fn from_bridge(err: &BridgeError) -> Self {
        Self::from_detail(&err.error_detail())
    }

    /// The `{error, type, Message}` document body.
    pub(crate) fn document(&self) -> Value {
        json!({
            "error": format!(
                "{} {}",
                self.status.as_u16(),
                self.status.canonical_reason().unwrap_or("Error")
            ),
            "type": self.type_label,
            "Message": self.message,
        })
    }

    #[cfg(test)]
    pub(crate) fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.document())).into_response()
    }
}

/// Script description from a create request body.
pub(crate) fn parse_script(body: &Value) -> Result<ExecutableScript, ApiError> {
    let Some(script) = body.get("script") else {
        return Err(ApiError::malformed("Script missing"));
    };
    if !script.is_object() || script.get("script_uri").is_none() || script.get("script_type").is_none()
    {
        return Err(ApiError::malformed("Malformed script in request"));
    }
    let (Some(script_type), Some(script_uri)) = (
        script.get("script_type").and_then(Value::as_str),
        script.get("script_uri").and_then(Value::as_str),
    ) else {
        return Err(ApiError::malformed("Malformed script in request"));
    };

    match script_type {
        "filesystem" => {
            if script.get("git_args").is_some() {
                return Err(ApiError::new(
                    StatusCode::BAD_REQUEST,
                    "Conflicting Args",
                    "git_args supplied for a filesystem script",
                ));
            }
            FileSystemScript::new(script_uri)
                .map(ExecutableScript::Filesystem)
                .map_err(|e| ApiError::malformed(e.to_string()))
        }
        "git" => {
            let git_args = match script.get("git_args") {
                None => Default::default(),
                Some(raw) => serde_json::from_value(raw.clone())
                    .map_err(|_| ApiError::malformed("Malformed git_args in request"))?,
            };
            let create_env =
                script.get("create_env").and_then(Value::as_bool).unwrap_or(false);
            GitScript::new(script_uri, git_args, create_env)
                .map(ExecutableScript::Git)
                .map_err(|e| ApiError::malformed(e.to_string()))
        }
        other => Err(ApiError::malformed(format!("Script type {other} not supported"))),
    }
}

/// Arguments for one callable from the request's `script_args` mapping.
pub(crate) fn parse_fn_args(body: &Value, fn_name: &str) -> Result<ProcedureInput, ApiError> {
    let Some(script_args) = body.get("script_args") else {
        return Ok(ProcedureInput::default());
    };
    if !script_args.is_object() {
        return Err(ApiError::malformed("Malformed script_args in request"));
    }
    let Some(entry) = script_args.get(fn_name) else {
        return Ok(ProcedureInput::default());
    };
    if !entry.is_object() {
        return Err(ApiError::malformed("Malformed script_args in request"));
    }
    let args = match entry.get("args") {
        None => Vec::new(),
        Some(Value::Array(args)) => args.clone(),
        Some(_) => return Err(ApiError::malformed("Malformed script_args in request")),
    };
    let kwargs = match entry.get("kwargs") {
        None => Default::default(),
        Some(Value::Object(kwargs)) => {
            kwargs.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        }
        Some(_) => return Err(ApiError::malformed("Malformed script_args in request")),
    };
    Ok(ProcedureInput::new(args, kwargs))
}

/// Requested procedure state from an update body.
pub(crate) fn parse_state(
    body: &Value,
    current: ProcedureState,
) -> Result<ProcedureState, ApiError> {
    match body.get("state") {
        None => Ok(current),
        Some(Value::String(name)) => serde_json::from_value(json!(name))
            .map_err(|_| ApiError::malformed(format!("state {name} not recognised"))),
        Some(_) => Err(ApiError::malformed("Malformed state in request")),
    }
}

async fn list_procedures(
    state: &Arc<ApiState>,
    pids: Option<Vec<ProcedureId>>,
) -> Result<Vec<ProcedureSummary>, ApiError> {
    let bridge = state.bridge.clone();
    let reply = tokio::task::spawn_blocking(move || {
        bridge.call(Topic::ProcedurePoolList, |request_id| MessagePayload::RequestProcedureList {
            request_id,
            pids,
        })
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))?;

    match reply {
        Ok(CommandResult::Summaries { summaries }) => Ok(summaries),
        Ok(_) => Err(ApiError::internal("unexpected reply to list request")),
        Err(e) => Err(ApiError::from_bridge(&e)),
    }
}

async fn fetch_summary(state: &Arc<ApiState>, pid: u32) -> Result<ProcedureSummary, ApiError> {
    let summaries = list_procedures(state, Some(vec![ProcedureId(pid)])).await?;
    summaries.into_iter().next().ok_or_else(|| ApiError::not_found(pid))
}

async fn get_procedures(State(state): State<Arc<ApiState>>) -> Response {
    match list_procedures(&state, None).await {
        Ok(summaries) => {
            let procedures: Vec<_> =
                summaries.iter().map(|s| make_public_summary(&state.public_url, s)).collect();
            Json(json!({ "procedures": procedures })).into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn get_procedure(
    State(state): State<Arc<ApiState>>,
    Path(procedure_id): Path<u32>,
) -> Response {
    match fetch_summary(&state, procedure_id).await {
        Ok(summary) => {
            Json(json!({ "procedure": make_public_summary(&state.public_url, &summary) }))
                .into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn create_procedure(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<Value>,
) -> Response {
    let cmd = match parse_script(&body).and_then(|script| {
        parse_fn_args(&body, "init").map(|init_args| PrepareCommand { script, init_args })
    }) {
        Ok(cmd) => cmd,
        Err(e) => return e.into_response(),
    };

    let bridge = state.bridge.clone();
    let reply = tokio::task::spawn_blocking(move || {
        bridge.call(Topic::ProcedureLifecycleCreated, |request_id| {
            MessagePayload::RequestProcedureCreate { request_id, cmd }
        })
    })
    .await;

    match reply {
        Ok(Ok(CommandResult::Summary { summary })) => (
            StatusCode::CREATED,
            Json(json!({ "procedure": make_public_summary(&state.public_url, &summary) })),
        )
            .into_response(),
        Ok(Ok(_)) => ApiError::internal("unexpected reply to create request").into_response(),
        Ok(Err(e)) => ApiError::from_bridge(&e).into_response(),
        Err(e) => ApiError::internal(e.to_string()).into_response(),
    }
}

async fn update_procedure(
    State(state): State<Arc<ApiState>>,
    Path(procedure_id): Path<u32>,
    Json(body): Json<Value>,
) -> Response {
    let summary = match fetch_summary(&state, procedure_id).await {
        Ok(summary) => summary,
        Err(e) => return e.into_response(),
    };
    let new_state = match parse_state(&body, summary.state) {
        Ok(new_state) => new_state,
        Err(e) => return e.into_response(),
    };

    if new_state == ProcedureState::Stopped {
        if summary.state != ProcedureState::Running {
            return Json(json!({
                "abort_message":
                    format!("Cannot stop script with ID {procedure_id}: Script is not running")
            }))
            .into_response();
        }
        let run_abort = body.get("abort").and_then(Value::as_bool).unwrap_or(false);
        let bridge = state.bridge.clone();
        let reply = tokio::task::spawn_blocking(move || {
            bridge.call(Topic::ProcedureLifecycleStopped, |request_id| {
                MessagePayload::RequestProcedureStop {
                    request_id,
                    cmd: StopCommand { process_uid: ProcedureId(procedure_id), run_abort },
                }
            })
        })
        .await;
        return match reply {
            Ok(Ok(CommandResult::Summaries { summaries })) => {
                let mut msg = format!("Successfully stopped script with ID {procedure_id}");
                if !summaries.is_empty() {
                    msg.push_str(" and aborted subarray activity");
                }
                Json(json!({ "abort_message": msg })).into_response()
            }
            Ok(Ok(_)) => ApiError::internal("unexpected reply to stop request").into_response(),
            Ok(Err(e)) => ApiError::from_bridge(&e).into_response(),
            Err(e) => ApiError::internal(e.to_string()).into_response(),
        };
    }

    if summary.state == ProcedureState::Ready && new_state == ProcedureState::Running {
        let run_args = match parse_fn_args(&body, "main") {
            Ok(run_args) => run_args,
            Err(e) => return e.into_response(),
        };
        let bridge = state.bridge.clone();
        let reply = tokio::task::spawn_blocking(move || {
            bridge.call(Topic::ProcedureLifecycleStarted, |request_id| {
                MessagePayload::RequestProcedureStart {
                    request_id,
                    cmd: StartCommand {
                        process_uid: ProcedureId(procedure_id),
                        fn_name: "main".into(),
                        run_args,
                        force_start: false,
                    },
                }
            })
        })
        .await;
        return match reply {
            Ok(Ok(CommandResult::Summary { summary })) => {
                Json(json!({ "procedure": make_public_summary(&state.public_url, &summary) }))
                    .into_response()
            }
            Ok(Ok(_)) => ApiError::internal("unexpected reply to start request").into_response(),
            Ok(Err(e)) => ApiError::from_bridge(&e).into_response(),
            Err(e) => ApiError::internal(e.to_string()).into_response(),
        };
    }

    Json(json!({ "procedure": make_public_summary(&state.public_url, &summary) })).into_response()
}

/// One SSE frame per bus message: `event:<topic>`, `data:<json>`, and the
/// request id when the message carries one.
async fn stream(
    State(state): State<Arc<ApiState>>,
) -> Sse<impl futures_util::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.sse.subscribe();
    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    let mut event = Event::default().event(&msg.topic).data(&msg.data);
                    if let Some(id) = &msg.id {
                        event = event.id(id);
                    }
                    return Some((Ok::<_, Infallible>(event), rx));
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "sse client lagged");
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
