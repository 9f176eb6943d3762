//! Background process endpoints.

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, Sse},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};

use warden_core::ProcessId;
use warden_process::CommandOptions;

use crate::error::GatewayError;
use crate::sse::to_sse_event;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StartBody {
    pub command: String,
    #[serde(default)]
    pub options: Option<CommandOptions>,
}

#[derive(Debug, Deserialize)]
pub struct KillQuery {
    pub signal: Option<String>,
}

/// `POST /api/process/start` — launch a background process.
pub async fn start(
    State(state): State<AppState>,
    Json(body): Json<StartBody>,
) -> Result<Json<Value>, GatewayError> {
    let options = body.options.unwrap_or_default();
    let record = state.processes.start(&body.command, &options)?;
    Ok(Json(json!({ "success": true, "process": record })))
}

/// `GET /api/process/list`
pub async fn list(State(state): State<AppState>) -> Json<Value> {
    let processes = state.processes.list();
    Json(json!({ "processes": processes, "count": processes.len() }))
}

/// `GET /api/process/{id}` — `process` is null for unknown ids.
pub async fn get_one(State(state): State<AppState>, Path(id): Path<String>) -> Json<Value> {
    Json(json!({ "process": state.processes.get(&ProcessId::new(id)) }))
}

/// `DELETE /api/process/{id}` — deliver a signal (default SIGTERM).
pub async fn kill(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<KillQuery>,
) -> Result<Json<Value>, GatewayError> {
    state.processes.kill(&ProcessId::new(id), query.signal.as_deref())?;
    Ok(Json(json!({ "success": true })))
}

/// `DELETE /api/process/kill-all`
pub async fn kill_all(State(state): State<AppState>) -> Json<Value> {
    let killed = state.processes.kill_all();
    Json(json!({ "success": true, "killedCount": killed }))
}

/// `GET /api/process/{id}/logs` — accumulated output.
pub async fn logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    let (stdout, stderr) = state.processes.logs(&ProcessId::new(id))?;
    Ok(Json(json!({ "stdout": stdout, "stderr": stderr })))
}

/// `GET /api/process/{id}/stream` — live log events over SSE.
///
/// The subscriber is removed automatically when the client disconnects:
/// dropping the stream drops the channel receiver, and the next dispatch
/// prunes the dead sender.
pub async fn stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, GatewayError> {
    let rx = state.processes.subscribe(&ProcessId::new(id))?;
    let stream = UnboundedReceiverStream::new(rx).map(|event| Ok(to_sse_event(&event)));
    Ok(Sse::new(stream))
}
