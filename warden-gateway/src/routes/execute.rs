//! Foreground command execution endpoints.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, Sse},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use warden_process::CommandOptions;

use crate::error::GatewayError;
use crate::sse::to_sse_event;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteBody {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub session_id: Option<String>,
    #[serde(default)]
    pub background: bool,
    pub cwd: Option<String>,
    pub env: Option<HashMap<String, String>>,
}

impl ExecuteBody {
    fn full_command(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            let mut command = self.command.clone();
            for arg in &self.args {
                command.push(' ');
                command.push_str(arg);
            }
            command
        }
    }

    fn options(&self) -> CommandOptions {
        let mut options = CommandOptions::default();
        options.cwd = self.cwd.clone();
        options.env = self.env.clone();
        options.session_id = self.session_id.clone();
        options.process_id = None;
        options
    }
}

/// `POST /api/execute` — run a command and wait for it. With
/// `background: true` the command is registered instead and the record
/// returned immediately.
pub async fn execute(
    State(state): State<AppState>,
    Json(body): Json<ExecuteBody>,
) -> Result<Response, GatewayError> {
    let command = body.full_command();
    if body.background {
        let record = state.processes.start(&command, &body.options())?;
        return Ok(Json(json!({ "success": true, "process": record })).into_response());
    }
    let result = state
        .processes
        .execute(&command, &body.options(), CancellationToken::new())
        .await?;
    Ok(Json(result).into_response())
}

/// Cancels the command when the SSE stream is dropped (client
/// disconnect included).
struct CancelOnDrop(CancellationToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// `POST /api/execute/stream` — run a command, streaming
/// `command_start` / `output` / `command_complete` events.
pub async fn execute_stream(
    State(state): State<AppState>,
    Json(body): Json<ExecuteBody>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, GatewayError> {
    let cancel = CancellationToken::new();
    let rx = state
        .processes
        .execute_stream(body.full_command(), body.options(), cancel.clone())?;
    let guard = CancelOnDrop(cancel);
    let stream = ReceiverStream::new(rx).map(move |event| {
        let _ = &guard;
        Ok(to_sse_event(&event))
    });
    Ok(Sse::new(stream))
}
