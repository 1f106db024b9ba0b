//! API integration tests for perfwarden.
//!
//! These tests exercise the HTTP API through axum's tower service interface
//! (no TCP).  The external measurement tools are stand-ins: `echo` turns a
//! test run into an exact assertion on the built argument list, and a tiny
//! shell script plays the long-running measurement server.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use perfwarden::api::state::AppState;
use perfwarden::config::ToolsConfig;
use perfwarden::orchestrator::Orchestrator;

/// Build a test app wired to the given stand-in tools.
fn test_app(iperf3: &str, ping: &str, public_dir: &Path) -> Router {
    let tools = ToolsConfig {
        iperf3_path: iperf3.to_string(),
        ping_path: ping.to_string(),
    };
    let state = AppState {
        orchestrator: Arc::new(Orchestrator::new(tools)),
    };
    perfwarden::api::router(state, public_dir)
}

/// Write an executable script standing in for a measurement tool.
#[cfg(unix)]
fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Helper: parse JSON response body.
async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap_or_else(|_| {
        let text = String::from_utf8_lossy(&bytes);
        panic!("not valid JSON: {text}");
    })
}

/// Helper: build a JSON POST request.
fn json_post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

/// Helper: build a bodyless POST request.
fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("POST")
        .body(Body::empty())
        .unwrap()
}

/// Helper: build a GET request.
fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Poll /health until the server slot reports empty.
async fn wait_until_server_stopped(app: &Router) {
    for _ in 0..200 {
        let resp = app.clone().oneshot(get("/health")).await.unwrap();
        let body = json_body(resp).await;
        if body["server_running"] == false {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("server slot never cleared");
}

// ── Health ──────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_status_and_slot() {
    let dir = tempfile::TempDir::new().unwrap();
    let app = test_app("echo", "echo", dir.path());

    let resp = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(resp.status(), 200);
    let body = json_body(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["server_running"], false);
    assert!(!body["version"].as_str().unwrap().is_empty());
}

// ── Server lifecycle ────────────────────────────────────────────────

#[cfg(unix)]
#[tokio::test]
async fn server_lifecycle_over_http() {
    let dir = tempfile::TempDir::new().unwrap();
    let fake_iperf3 = write_script(dir.path(), "fake-iperf3", "#!/bin/sh\nexec sleep 60\n");
    let app = test_app(fake_iperf3.to_str().unwrap(), "echo", dir.path());

    // Start.
    let resp = app.clone().oneshot(post("/start-server")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body = json_body(resp).await;
    assert_eq!(body["message"], "iperf3 server started successfully");

    // Second start conflicts.
    let resp = app.clone().oneshot(post("/start-server")).await.unwrap();
    assert_eq!(resp.status(), 400);
    let body = json_body(resp).await;
    assert_eq!(body["error"], "Server already running");

    // Stop.
    let resp = app.clone().oneshot(post("/stop-server")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body = json_body(resp).await;
    assert_eq!(body["message"], "iperf3 server stopped");

    // The slot clears once the process is gone; only then does another
    // stop become a conflict.
    wait_until_server_stopped(&app).await;
    let resp = app.clone().oneshot(post("/stop-server")).await.unwrap();
    assert_eq!(resp.status(), 400);
    let body = json_body(resp).await;
    assert_eq!(body["error"], "Server is not running");

    // And the slot is free for a new server.
    let resp = app.clone().oneshot(post("/start-server")).await.unwrap();
    assert_eq!(resp.status(), 200);
    app.clone().oneshot(post("/stop-server")).await.unwrap();
    wait_until_server_stopped(&app).await;
}

#[tokio::test]
async fn stop_without_start_conflicts() {
    let dir = tempfile::TempDir::new().unwrap();
    let app = test_app("echo", "echo", dir.path());

    let resp = app.oneshot(post("/stop-server")).await.unwrap();
    assert_eq!(resp.status(), 400);
    let body = json_body(resp).await;
    assert_eq!(body["error"], "Server is not running");
}

// ── Test runs ───────────────────────────────────────────────────────

#[tokio::test]
async fn advanced_test_builds_expected_args() {
    let dir = tempfile::TempDir::new().unwrap();
    // echo as the tool: the response body is exactly the argument list.
    let app = test_app("echo", "echo", dir.path());

    let resp = app
        .oneshot(json_post(
            "/run-test",
            json!({
                "serverIP": "10.0.0.1",
                "protocol": "UDP",
                "time": "5",
                "parallel": "4"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body = json_body(resp).await;
    assert_eq!(body["raw"], "-c 10.0.0.1 -u -t 5 -P 4\n");
}

#[tokio::test]
async fn basic_test_builds_expected_args() {
    let dir = tempfile::TempDir::new().unwrap();
    let app = test_app("echo", "echo", dir.path());

    let resp = app
        .oneshot(json_post(
            "/run-basic-test",
            json!({ "serverIP": "1.2.3.4", "type": "UDP" }),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body = json_body(resp).await;
    assert_eq!(body["raw"], "-c 1.2.3.4 -i 1 -u -l 1400 -b 1200M -t 10\n");
}

#[tokio::test]
async fn reverse_flag_requires_the_exact_string_true() {
    let dir = tempfile::TempDir::new().unwrap();
    let app = test_app("echo", "echo", dir.path());

    // Boolean true is ignored.
    let resp = app
        .clone()
        .oneshot(json_post(
            "/run-basic-test",
            json!({ "serverIP": "1.2.3.4", "reverse": true }),
        ))
        .await
        .unwrap();
    let body = json_body(resp).await;
    assert_eq!(body["raw"], "-c 1.2.3.4 -i 1 -t 10 -w 256K\n");

    // The string "true" is honored.
    let resp = app
        .oneshot(json_post(
            "/run-basic-test",
            json!({ "serverIP": "1.2.3.4", "reverse": "true" }),
        ))
        .await
        .unwrap();
    let body = json_body(resp).await;
    assert_eq!(body["raw"], "-c 1.2.3.4 -i 1 -t 10 -w 256K -R\n");
}

#[tokio::test]
async fn ping_test_counts_from_duration() {
    let dir = tempfile::TempDir::new().unwrap();
    let app = test_app("echo", "echo", dir.path());

    // No duration: default count.
    let resp = app
        .clone()
        .oneshot(json_post("/run-ping-test", json!({ "serverIP": "8.8.8.8" })))
        .await
        .unwrap();
    let body = json_body(resp).await;
    assert_eq!(body["raw"], "-c 5 8.8.8.8\n");

    // Fractional duration rounds up.
    let resp = app
        .oneshot(json_post(
            "/run-ping-test",
            json!({ "serverIP": "8.8.8.8", "duration": "2.2" }),
        ))
        .await
        .unwrap();
    let body = json_body(resp).await;
    assert_eq!(body["raw"], "-c 3 8.8.8.8\n");
}

// ── Error paths ─────────────────────────────────────────────────────

#[tokio::test]
async fn missing_target_is_rejected_with_400() {
    let dir = tempfile::TempDir::new().unwrap();
    let app = test_app("echo", "echo", dir.path());

    for uri in ["/run-test", "/run-basic-test", "/run-ping-test"] {
        let resp = app
            .clone()
            .oneshot(json_post(uri, json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "{uri} must reject a missing target");
        let body = json_body(resp).await;
        assert_eq!(body["error"], "invalid request: target address is required");
    }
}

#[tokio::test]
async fn broken_tool_is_a_server_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let app = test_app("/nonexistent/iperf3", "/nonexistent/ping", dir.path());

    let resp = app
        .clone()
        .oneshot(json_post("/run-basic-test", json!({ "serverIP": "1.2.3.4" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body = json_body(resp).await;
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .contains("failed to launch /nonexistent/iperf3"),
        "unexpected error body: {body}"
    );

    // A failed server spawn is reported the same way and leaves no slot.
    let resp = app.clone().oneshot(post("/start-server")).await.unwrap();
    assert_eq!(resp.status(), 500);
    let resp = app.oneshot(get("/health")).await.unwrap();
    let body = json_body(resp).await;
    assert_eq!(body["server_running"], false);
}

// ── Static frontend ─────────────────────────────────────────────────

#[tokio::test]
async fn static_assets_are_served_from_public_dir() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>perfwarden</h1>").unwrap();
    let app = test_app("echo", "echo", dir.path());

    let resp = app.oneshot(get("/index.html")).await.unwrap();

    assert_eq!(resp.status(), 200);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"<h1>perfwarden</h1>");
}

#[tokio::test]
async fn cors_headers_are_present() {
    let dir = tempfile::TempDir::new().unwrap();
    let app = test_app("echo", "echo", dir.path());

    let request = Request::builder()
        .uri("/health")
        .header("origin", "http://example.com")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(request).await.unwrap();

    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .map(|v| v.to_str().unwrap()),
        Some("*")
    );
}
