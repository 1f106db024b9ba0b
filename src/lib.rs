//! Perfwarden -- remote-controlled network performance testing.
//!
//! This crate wraps the iperf3 and ping command-line tools in a small HTTP
//! control plane: a singleton long-running measurement server plus on-demand
//! throughput and latency test runs whose raw tool output is returned to the
//! caller verbatim.

pub mod api;
pub mod config;
pub mod orchestrator;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::state::AppState;
use crate::config::WardenConfig;
use crate::orchestrator::Orchestrator;

/// Start the perfwarden daemon: orchestrator and HTTP API server.
pub async fn serve(config: WardenConfig) -> Result<()> {
    let orchestrator = Arc::new(Orchestrator::new(config.tools.clone()));
    let state = AppState { orchestrator };
    let app = api::router(state, &config.http.public_dir);

    let addr: std::net::SocketAddr = config
        .http
        .listen_address
        .parse()
        .with_context(|| format!("invalid listen address: {}", config.http.listen_address))?;

    tracing::info!(%addr, "perfwarden listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
