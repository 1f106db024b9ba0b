//! API route definitions and handlers.
//!
//! POST /start-server   — launch the measurement server
//! POST /stop-server    — signal the measurement server to exit
//! POST /run-test       — advanced throughput test
//! POST /run-basic-test — preset throughput test
//! POST /run-ping-test  — latency test
//! GET  /health         — liveness and slot status

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::orchestrator::invocation::{
    AdvancedTestRequest, BasicTestRequest, LatencyTestRequest,
};
use crate::orchestrator::OrchestratorError;

use super::state::AppState;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/start-server", post(start_server))
        .route("/stop-server", post(stop_server))
        .route("/run-test", post(run_test))
        .route("/run-basic-test", post(run_basic_test))
        .route("/run-ping-test", post(run_ping_test))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "server_running": state.orchestrator.server_running().await,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn start_server(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.orchestrator.start_server().await?;
    Ok(Json(json!({ "message": "iperf3 server started successfully" })))
}

async fn stop_server(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.orchestrator.stop_server().await?;
    Ok(Json(json!({ "message": "iperf3 server stopped" })))
}

async fn run_test(
    State(state): State<AppState>,
    Json(body): Json<AdvancedTestRequest>,
) -> Result<Json<Value>, ApiError> {
    let result = state.orchestrator.run_advanced(&body).await?;
    Ok(Json(json!({ "raw": result.raw })))
}

async fn run_basic_test(
    State(state): State<AppState>,
    Json(body): Json<BasicTestRequest>,
) -> Result<Json<Value>, ApiError> {
    let result = state.orchestrator.run_basic(&body).await?;
    Ok(Json(json!({ "raw": result.raw })))
}

async fn run_ping_test(
    State(state): State<AppState>,
    Json(body): Json<LatencyTestRequest>,
) -> Result<Json<Value>, ApiError> {
    let result = state.orchestrator.run_latency(&body).await?;
    Ok(Json(json!({ "raw": result.raw })))
}

// ── Error type ──────────────────────────────────────────────────────

/// HTTP projection of an orchestration failure.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        let status = match &err {
            OrchestratorError::Conflict(_) | OrchestratorError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            OrchestratorError::Spawn { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}
