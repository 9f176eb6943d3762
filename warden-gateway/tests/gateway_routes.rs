//! Router-level tests for the control-plane HTTP surface.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use warden_gateway::{create_router, sse, AppState, GatewayConfig};

fn test_app() -> Router {
    create_router(AppState::new(GatewayConfig::for_tests()))
}

fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
    match Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
    {
        Ok(r) => r,
        Err(e) => panic!("failed to build request: {e}"),
    }
}

fn get_request(uri: &str) -> Request<Body> {
    match Request::builder().uri(uri).body(Body::empty()) {
        Ok(r) => r,
        Err(e) => panic!("failed to build request: {e}"),
    }
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = match app.oneshot(request).await {
        Ok(r) => r,
        Err(e) => panic!("handler error: {e}"),
    };
    let status = response.status();
    let bytes = match axum::body::to_bytes(response.into_body(), 16 * 1024 * 1024).await {
        Ok(b) => b,
        Err(e) => panic!("failed to read body: {e}"),
    };
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn send_raw(app: Router, request: Request<Body>) -> (StatusCode, String) {
    let response = match app.oneshot(request).await {
        Ok(r) => r,
        Err(e) => panic!("handler error: {e}"),
    };
    let status = response.status();
    let bytes = match axum::body::to_bytes(response.into_body(), 16 * 1024 * 1024).await {
        Ok(b) => b,
        Err(e) => panic!("failed to read body: {e}"),
    };
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

#[tokio::test]
async fn ping_returns_ok_status() {
    let (status, body) = send(test_app(), get_request("/api/ping")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn execute_echo_returns_stdout() {
    let (status, body) = send(
        test_app(),
        json_request(Method::POST, "/api/execute", &json!({ "command": "echo hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["exitCode"], 0);
    assert_eq!(body["stdout"], "hi\n");
    assert_eq!(body["stderr"], "");
}

#[tokio::test]
async fn execute_dangerous_command_is_rejected() {
    let (status, body) = send(
        test_app(),
        json_request(Method::POST, "/api/execute", &json!({ "command": "rm -rf /" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Dangerous command not allowed");
}

#[tokio::test]
async fn execute_with_args_joins_the_command_line() {
    let (status, body) = send(
        test_app(),
        json_request(
            Method::POST,
            "/api/execute",
            &json!({ "command": "echo", "args": ["alpha", "beta"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stdout"], "alpha beta\n");
}

#[tokio::test]
async fn execute_stream_events_arrive_in_order() {
    let request = json_request(
        Method::POST,
        "/api/execute/stream",
        &json!({ "command": "echo streamed" }),
    );
    let (status, body) = send_raw(test_app(), request).await;
    assert_eq!(status, StatusCode::OK);

    let events = sse::parse_events(&body);
    assert!(events.len() >= 3, "expected start, output, complete: {events:?}");
    assert_eq!(events[0]["type"], "command_start");
    let last = &events[events.len() - 1];
    assert_eq!(last["type"], "command_complete", "terminal event must be command_complete");
    assert_eq!(last["exitCode"], 0);
    assert_eq!(last["stdout"], "streamed\n");
    let trailing_output = events
        .iter()
        .skip_while(|e| e["type"] != "command_complete")
        .skip(1)
        .any(|e| e["type"] == "output");
    assert!(!trailing_output, "no output event may follow command_complete");
}

#[tokio::test]
async fn background_process_lifecycle_over_http() {
    let app = test_app();

    let (status, body) = send(
        app.clone(),
        json_request(
            Method::POST,
            "/api/process/start",
            &json!({ "command": "sleep 5", "options": { "processId": "http-bg" } }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let reported = body["process"]["status"].as_str().unwrap_or_default();
    assert!(
        reported == "starting" || reported == "running",
        "fresh process is starting or running, got {reported}"
    );

    let (status, body) = send(app.clone(), get_request("/api/process/http-bg")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["process"]["id"], "http-bg");

    // Duplicate id conflicts.
    let (status, _) = send(
        app.clone(),
        json_request(
            Method::POST,
            "/api/process/start",
            &json!({ "command": "sleep 5", "options": { "processId": "http-bg" } }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let kill = match Request::builder()
        .method(Method::DELETE)
        .uri("/api/process/http-bg")
        .body(Body::empty())
    {
        Ok(r) => r,
        Err(e) => panic!("failed to build request: {e}"),
    };
    let (status, body) = send(app.clone(), kill).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    // The record stays retrievable after the kill.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    let (_, body) = send(app, get_request("/api/process/http-bg")).await;
    assert_eq!(body["process"]["status"], "killed");
}

#[tokio::test]
async fn unknown_process_reads_as_null() {
    let (status, body) = send(test_app(), get_request("/api/process/nope")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["process"].is_null(), "unknown record must be null: {body}");
}

#[tokio::test]
async fn kill_all_reports_count() {
    let app = test_app();
    for id in ["ka-a", "ka-b"] {
        let (status, _) = send(
            app.clone(),
            json_request(
                Method::POST,
                "/api/process/start",
                &json!({ "command": "sleep 10", "options": { "processId": id } }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
    let request = match Request::builder()
        .method(Method::DELETE)
        .uri("/api/process/kill-all")
        .body(Body::empty())
    {
        Ok(r) => r,
        Err(e) => panic!("failed to build request: {e}"),
    };
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["killedCount"], 2);
}

#[tokio::test]
async fn expose_unexpose_round_trip() {
    let app = test_app();

    let (status, body) = send(
        app.clone(),
        json_request(Method::POST, "/api/expose-port", &json!({ "port": 8080, "name": "web" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["port"], 8080);
    let token = body["token"].as_str().unwrap_or_default();
    assert!(!token.is_empty(), "exposure must mint a token");

    let (_, body) = send(app.clone(), get_request("/api/exposed-ports")).await;
    assert_eq!(body["count"], 1);

    // Duplicate exposure conflicts.
    let (status, body) = send(
        app.clone(),
        json_request(Method::POST, "/api/expose-port", &json!({ "port": 8080 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "PORT_ALREADY_EXPOSED");

    let (status, _) = send(
        app.clone(),
        json_request(Method::DELETE, "/api/unexpose-port", &json!({ "port": 8080 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(app, get_request("/api/exposed-ports")).await;
    assert_eq!(body["count"], 0, "unexposed port must leave the listing");
}

#[tokio::test]
async fn reserved_and_invalid_ports_are_rejected() {
    let app = test_app();
    let (status, body) = send(
        app.clone(),
        json_request(Method::POST, "/api/expose-port", &json!({ "port": 3000 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "PORT_RESERVED");

    let (status, body) =
        send(app, json_request(Method::POST, "/api/expose-port", &json!({ "port": 80 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_PORT");
}

#[tokio::test]
async fn subdomain_with_wrong_token_is_404_invalid_token() {
    let app = test_app();
    let (status, body) = send(
        app.clone(),
        json_request(Method::POST, "/api/expose-port", &json!({ "port": 8080 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let minted = body["token"].as_str().unwrap_or_default().to_owned();

    let request = match Request::builder()
        .uri("/")
        .header(header::HOST, "8080-test-sandbox-0000000000000000.example.com")
        .body(Body::empty())
    {
        Ok(r) => r,
        Err(e) => panic!("failed to build request: {e}"),
    };
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "INVALID_TOKEN");
    assert_ne!(minted, "0000000000000000");
}

#[tokio::test]
async fn subdomain_for_unexposed_port_is_404() {
    let request = match Request::builder()
        .uri("/")
        .header(header::HOST, "9999-test-sandbox-deadbeef.example.com")
        .body(Body::empty())
    {
        Ok(r) => r,
        Err(e) => panic!("failed to build request: {e}"),
    };
    let (status, body) = send(test_app(), request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "PORT_NOT_EXPOSED");
}

#[tokio::test]
async fn context_create_delete_recreate_yields_fresh_id() {
    let app = test_app();

    let (status, body) = send(
        app.clone(),
        json_request(Method::POST, "/api/contexts", &json!({ "language": "python" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let first_id = body["context"]["id"].as_str().unwrap_or_default().to_owned();
    assert!(first_id.starts_with("ctx-"));
    assert_eq!(body["context"]["language"], "python");
    assert_eq!(body["context"]["cwd"], "/tmp");

    let request = match Request::builder()
        .method(Method::DELETE)
        .uri(format!("/api/contexts/{first_id}"))
        .body(Body::empty())
    {
        Ok(r) => r,
        Err(e) => panic!("failed to build request: {e}"),
    };
    let (status, _) = send(app.clone(), request).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        app.clone(),
        json_request(Method::POST, "/api/contexts", &json!({ "language": "python" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let second_id = body["context"]["id"].as_str().unwrap_or_default();
    assert_ne!(first_id, second_id, "recreated context must get a fresh id");

    let (_, body) = send(app, get_request("/api/contexts")).await;
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn deleting_unknown_context_is_404() {
    let request = match Request::builder()
        .method(Method::DELETE)
        .uri("/api/contexts/ctx-missing")
        .body(Body::empty())
    {
        Ok(r) => r,
        Err(e) => panic!("failed to build request: {e}"),
    };
    let (status, body) = send(test_app(), request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "CONTEXT_NOT_FOUND");
}

#[tokio::test]
async fn execute_code_with_unknown_context_is_404_before_streaming() {
    let (status, body) = send(
        test_app(),
        json_request(
            Method::POST,
            "/api/execute/code",
            &json!({ "context_id": "ctx-missing", "code": "print(1)" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "CONTEXT_NOT_FOUND");
}

#[tokio::test]
async fn unsupported_language_is_rejected() {
    let (status, _) = send(
        test_app(),
        json_request(Method::POST, "/api/contexts", &json!({ "language": "cobol" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn filesystem_guard_rejects_system_paths_with_400() {
    let app = test_app();
    for (uri, body) in [
        ("/api/read", json!({ "path": "/etc/passwd" })),
        ("/api/write", json!({ "path": "/etc/cron.d/x", "content": "boom" })),
        ("/api/mkdir", json!({ "path": "/tmp/.." })),
        ("/api/delete", json!({ "path": "/workspace/../etc" })),
    ] {
        let (status, response) = send(app.clone(), json_request(Method::POST, uri, &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri} must reject: {response}");
        assert_eq!(response["code"], "INVALID_PATH", "{uri}: {response}");
    }
}

#[tokio::test]
async fn git_checkout_traversal_target_is_400() {
    let (status, _) = send(
        test_app(),
        json_request(
            Method::POST,
            "/api/git/checkout",
            &json!({ "repoUrl": "https://example.com/r.git", "targetDir": "/tmp/../etc/x" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cors_headers_are_present() {
    let request = match Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/ping")
        .header(header::ORIGIN, "https://example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .body(Body::empty())
    {
        Ok(r) => r,
        Err(e) => panic!("failed to build request: {e}"),
    };
    let response = match test_app().oneshot(request).await {
        Ok(r) => r,
        Err(e) => panic!("handler error: {e}"),
    };
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN),
        "preflight response must carry CORS headers"
    );
}

/// End-to-end interpreter execution; needs python3 and the executor
/// programs on disk.
#[tokio::test]
#[ignore = "requires python3 and WARDEN_EXECUTOR_DIR pointing at executors/"]
async fn python_execution_streams_stdout_then_complete() {
    let app = test_app();
    let (status, body) = send(
        app.clone(),
        json_request(Method::POST, "/api/contexts", &json!({ "language": "python" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let context_id = body["context"]["id"].as_str().unwrap_or_default().to_owned();

    let request = json_request(
        Method::POST,
        "/api/execute/code",
        &json!({ "context_id": context_id, "code": "print(2+2)" }),
    );
    let (status, body) = send_raw(app, request).await;
    assert_eq!(status, StatusCode::OK);

    let events = sse::parse_events(&body);
    assert_eq!(events[0]["type"], "stdout");
    assert_eq!(events[0]["text"], "4\n");
    let last = &events[events.len() - 1];
    assert_eq!(last["type"], "execution_complete");
}
