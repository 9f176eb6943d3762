//! Execution context endpoints and code execution streaming.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use warden_core::{ApiError, ContextId, Domain, ErrorCode, Language};

use crate::error::GatewayError;
use crate::sse::to_sse_event;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateContextBody {
    pub language: Option<String>,
    pub cwd: Option<String>,
}

/// The execute-code body keeps the original snake_case field names.
#[derive(Debug, Deserialize)]
pub struct ExecuteCodeBody {
    pub context_id: String,
    pub code: String,
    pub language: Option<String>,
    pub timeout_ms: Option<u64>,
}

fn parse_language(name: &str) -> Result<Language, GatewayError> {
    name.parse::<Language>().map_err(|e| {
        GatewayError(ApiError::new(Domain::Interpreter, ErrorCode::InvalidRequest, e.to_string()))
    })
}

/// `POST /api/contexts`
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateContextBody>,
) -> Result<Json<Value>, GatewayError> {
    let language = body.language.as_deref().map(parse_language).transpose()?;
    let context = state.interpreter.create_context(language, body.cwd);
    Ok(Json(json!({ "success": true, "context": context })))
}

/// `GET /api/contexts`
pub async fn list(State(state): State<AppState>) -> Json<Value> {
    let contexts = state.interpreter.list_contexts();
    Json(json!({ "contexts": contexts, "count": contexts.len() }))
}

/// `DELETE /api/contexts/{id}`
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    let id = ContextId::new(id);
    if state.interpreter.delete_context(&id) {
        Ok(Json(json!({ "success": true })))
    } else {
        Err(GatewayError(ApiError::new(
            Domain::Interpreter,
            ErrorCode::ContextNotFound,
            format!("context not found: {id}"),
        )))
    }
}

/// `POST /api/execute/code` — run code in a context, streaming stdout,
/// stderr, rich results, and a terminal event over SSE.
///
/// An unknown context fails here with a 404 before any streaming begins.
/// Without `timeout_ms` the execution is unlimited from the control
/// plane's side.
pub async fn execute_code(
    State(state): State<AppState>,
    Json(body): Json<ExecuteCodeBody>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, GatewayError> {
    let language = body.language.as_deref().map(parse_language).transpose()?;
    let timeout = body.timeout_ms.map(Duration::from_millis);
    let rx = state.interpreter.execute(
        &ContextId::new(body.context_id),
        body.code,
        language,
        timeout,
    )?;
    let stream = ReceiverStream::new(rx).map(|event| Ok(to_sse_event(&event)));
    Ok(Sse::new(stream))
}
