//! Port exposure endpoints.

use axum::{
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use warden_proxy::preview_url;

use crate::error::GatewayError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ExposeBody {
    pub port: u16,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnexposeBody {
    pub port: u16,
}

/// `POST /api/expose-port` — register a port and mint its token. The
/// response includes a preview URL derived from the request host when
/// one can be built.
pub async fn expose(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ExposeBody>,
) -> Result<Json<Value>, GatewayError> {
    let entry = state.ports.expose(body.port, body.name)?;
    let url = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .and_then(|host| preview_url(entry.port, &state.config.sandbox_id, host).ok());
    Ok(Json(json!({
        "success": true,
        "port": entry.port,
        "name": entry.name,
        "token": entry.token,
        "exposedAt": entry.exposed_at,
        "url": url,
    })))
}

/// `DELETE /api/unexpose-port`
pub async fn unexpose(
    State(state): State<AppState>,
    Json(body): Json<UnexposeBody>,
) -> Result<Json<Value>, GatewayError> {
    let removed = state.ports.unexpose(body.port)?;
    Ok(Json(json!({ "success": true, "port": removed.port })))
}

/// `GET /api/exposed-ports`
pub async fn list(State(state): State<AppState>) -> Json<Value> {
    let ports = state.ports.list();
    Json(json!({ "ports": ports, "count": ports.len() }))
}
