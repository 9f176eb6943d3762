//! Axum route handlers for the Warden control plane API.

pub mod contexts;
pub mod execute;
pub mod ports;
pub mod process;
pub mod proxy;

use axum::{
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{any, delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::GatewayError;
use crate::state::AppState;
use crate::{files, git};

/// Builds the application router over the shared state.
///
/// The subdomain middleware runs ahead of path routing so proxy hosts
/// short-circuit; CORS is outermost so every response, proxied or not,
/// carries permissive headers.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/ping", get(ping))
        .route("/api/execute", post(execute::execute))
        .route("/api/execute/stream", post(execute::execute_stream))
        .route("/api/execute/code", post(contexts::execute_code))
        .route("/api/contexts", post(contexts::create).get(contexts::list))
        .route("/api/contexts/{id}", delete(contexts::remove))
        .route("/api/process/start", post(process::start))
        .route("/api/process/list", get(process::list))
        .route("/api/process/kill-all", delete(process::kill_all))
        .route("/api/process/{id}", get(process::get_one).delete(process::kill))
        .route("/api/process/{id}/logs", get(process::logs))
        .route("/api/process/{id}/stream", get(process::stream))
        .route("/api/mkdir", post(mkdir))
        .route("/api/write", post(write))
        .route("/api/read", post(read))
        .route("/api/delete", post(delete_entry))
        .route("/api/rename", post(rename))
        .route("/api/move", post(move_entry))
        .route("/api/git/checkout", post(git_checkout))
        .route("/api/expose-port", post(ports::expose))
        .route("/api/unexpose-port", delete(ports::unexpose))
        .route("/api/exposed-ports", get(ports::list))
        .route("/proxy/{port}", any(proxy::direct_root))
        .route("/proxy/{port}/{*path}", any(proxy::direct_path))
        .layer(middleware::from_fn_with_state(state.clone(), proxy::subdomain_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// `GET /api/ping` — liveness probe.
pub async fn ping() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "timestamp": chrono::Utc::now() })),
    )
}

// ── Filesystem collaborators ─────────────────────────────────────────────────

async fn mkdir(Json(body): Json<files::MkdirBody>) -> Result<Json<Value>, GatewayError> {
    files::mkdir(body).await.map(Json)
}

async fn write(Json(body): Json<files::WriteBody>) -> Result<Json<Value>, GatewayError> {
    files::write(body).await.map(Json)
}

async fn read(Json(body): Json<files::PathBody>) -> Result<Json<Value>, GatewayError> {
    files::read(body).await.map(Json)
}

async fn delete_entry(Json(body): Json<files::PathBody>) -> Result<Json<Value>, GatewayError> {
    files::delete(body).await.map(Json)
}

async fn rename(Json(body): Json<files::RenameBody>) -> Result<Json<Value>, GatewayError> {
    files::rename(body).await.map(Json)
}

async fn move_entry(Json(body): Json<files::MoveBody>) -> Result<Json<Value>, GatewayError> {
    files::move_entry(body).await.map(Json)
}

async fn git_checkout(
    axum::extract::State(state): axum::extract::State<AppState>,
    Json(body): Json<git::CheckoutBody>,
) -> Result<Json<Value>, GatewayError> {
    git::checkout(body, &state.config.workspace_dir).await.map(Json)
}
