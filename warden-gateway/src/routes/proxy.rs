//! Proxy routing: subdomain hosts and the direct `/proxy/{port}` path.

use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::Full;

use warden_core::validate_port;
use warden_proxy::{parse_subdomain_host, ProxyError};

use crate::error::GatewayError;
use crate::state::AppState;

/// Largest request body the proxy will buffer before forwarding.
const MAX_PROXY_BODY: usize = 32 * 1024 * 1024;

/// Intercepts requests whose Host is a `<port>-<sandboxId>-<token>`
/// subdomain and proxies them; everything else continues to the router.
pub async fn subdomain_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    if !looks_like_proxy_host(&host) {
        return next.run(request).await;
    }
    match handle_subdomain(&state, &host, request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

/// A host is a proxy candidate when its first label starts with a port
/// number and has at least the three `port-id-token` segments. Anything
/// else (e.g. `localhost:3000`) belongs to the API router.
fn looks_like_proxy_host(host: &str) -> bool {
    let label = host.split(':').next().unwrap_or(host);
    let label = label.split('.').next().unwrap_or(label);
    let mut segments = label.split('-');
    let leading_digits = segments
        .next()
        .is_some_and(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()));
    leading_digits && segments.count() >= 2
}

async fn handle_subdomain(
    state: &AppState,
    host: &str,
    request: Request,
) -> Result<Response, GatewayError> {
    let route = parse_subdomain_host(host).map_err(|e| {
        tracing::warn!(target: "security", host, "rejected proxy subdomain: {e}");
        e
    })?;
    state.ports.verify_token(route.port, &route.token)?;

    let is_upgrade = request
        .headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));

    let original_uri = request.uri().clone();
    let (mut parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_PROXY_BODY)
        .await
        .map_err(|e| GatewayError::bad_request(format!("unreadable request body: {e}")))?;

    let response = if is_upgrade {
        // The upgrade path forwards the original request untouched apart
        // from the target-port marker.
        insert_header(&mut parts.headers, "cf-container-target-port", &route.port.to_string());
        let forwarded = axum::http::Request::from_parts(parts, Full::new(bytes));
        warden_proxy::forward_upgrade(route.port, forwarded).await?
    } else {
        let original_url = format!("https://{host}{original_uri}");
        insert_header(&mut parts.headers, "x-original-url", &original_url);
        insert_header(&mut parts.headers, "x-forwarded-host", host);
        insert_header(&mut parts.headers, "x-forwarded-proto", "https");
        insert_header(&mut parts.headers, "x-sandbox-name", &state.config.sandbox_id);
        let forwarded = axum::http::Request::from_parts(parts, Full::new(bytes));
        warden_proxy::forward(route.port, forwarded).await?
    };
    Ok(response.map(Body::new))
}

/// `ANY /proxy/{port}` — direct-path proxy to the port root.
pub async fn direct_root(
    Path(port): Path<u16>,
    request: Request,
) -> Result<Response, GatewayError> {
    direct(port, String::new(), request).await
}

/// `ANY /proxy/{port}/{*path}` — direct-path proxy.
pub async fn direct_path(
    Path((port, path)): Path<(u16, String)>,
    request: Request,
) -> Result<Response, GatewayError> {
    direct(port, path, request).await
}

/// The in-sandbox proxy path: port rules apply, but no token is
/// required; the caller is already inside the trust boundary.
async fn direct(port: u16, path: String, request: Request) -> Result<Response, GatewayError> {
    validate_port(port)?;
    let path_and_query = match request.uri().query() {
        Some(query) => format!("/{path}?{query}"),
        None => format!("/{path}"),
    };
    let (mut parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_PROXY_BODY)
        .await
        .map_err(|e| GatewayError::bad_request(format!("unreadable request body: {e}")))?;
    parts.uri = warden_proxy::loopback_uri(port, &path_and_query)?;
    let forwarded = axum::http::Request::from_parts(parts, Full::new(bytes));
    let response = warden_proxy::forward(port, forwarded).await?;
    Ok(response.map(Body::new))
}

fn insert_header(headers: &mut axum::http::HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
