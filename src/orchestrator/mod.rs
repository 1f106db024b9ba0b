//! Test-process orchestration core.
//!
//! Everything stateful about perfwarden lives here: the singleton slot for
//! the long-running measurement server, the spawning and supervision of
//! ad-hoc measurement client processes, and the pure translation of test
//! requests into tool argument lists.  The HTTP layer and the CLI are thin
//! callers of the five operations exposed by [`Orchestrator`].

pub mod invocation;
pub mod runner;
pub mod server;

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ToolsConfig;

use self::invocation::{AdvancedTestRequest, BasicTestRequest, LatencyTestRequest};
use self::runner::{CaptureMode, TestResult};
use self::server::ServerManager;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Pause between accepting an advanced throughput request and launching its
/// process, so a measurement server started just beforehand has time to
/// begin listening.  This delay is deliberate behavior of the advanced path,
/// not incidental request latency; it blocks only the requesting task.
pub const ADVANCED_PRELAUNCH_DELAY: Duration = Duration::from_secs(1);

/// Fixed argument list that puts the throughput tool into server mode.
const SERVER_MODE_ARGS: &[&str] = &["-s"];

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error taxonomy for orchestration operations.
///
/// A non-zero exit or stderr output from a measurement tool is *not* an
/// error here: both are folded into the returned [`TestResult`] text and
/// left for the caller to interpret.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Start requested while the server is running, or stop requested while
    /// it is stopped.  No process action was taken.
    #[error("{0}")]
    Conflict(&'static str),

    /// The request was rejected before any process was spawned.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The external program could not be launched or supervised.  The
    /// server slot, if involved, is left in its pre-call state.
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Front door for the five orchestration operations: start/stop of the
/// singleton measurement server and the three test invocations.
///
/// Test invocations are independent and may run concurrently without limit;
/// only the server slot is shared state.
pub struct Orchestrator {
    server: ServerManager,
    tools: ToolsConfig,
}

impl Orchestrator {
    /// Create an orchestrator that launches the given external tools.
    pub fn new(tools: ToolsConfig) -> Self {
        let server_args = SERVER_MODE_ARGS.iter().map(|s| s.to_string()).collect();
        Self {
            server: ServerManager::new(&tools.iperf3_path, server_args),
            tools,
        }
    }

    /// Launch the long-running measurement server (`iperf3 -s`).
    ///
    /// Returns as soon as the process is spawned; "started" means spawned,
    /// not yet listening.
    pub async fn start_server(&self) -> Result<(), OrchestratorError> {
        self.server.start().await
    }

    /// Signal the measurement server to terminate.
    ///
    /// Returns immediately; the slot transitions back to stopped once the
    /// process has actually exited.
    pub async fn stop_server(&self) -> Result<(), OrchestratorError> {
        self.server.stop().await
    }

    /// Whether the server slot currently holds a process.
    pub async fn server_running(&self) -> bool {
        self.server.is_running().await
    }

    /// Run an advanced throughput test with the full knob set.
    ///
    /// The result text is the process's stdout followed by its stderr.
    pub async fn run_advanced(
        &self,
        request: &AdvancedTestRequest,
    ) -> Result<TestResult, OrchestratorError> {
        let args = invocation::advanced_args(request)?;
        let test_id = Uuid::new_v4();

        debug!(
            %test_id,
            delay_ms = ADVANCED_PRELAUNCH_DELAY.as_millis() as u64,
            "waiting before advanced test launch"
        );
        tokio::time::sleep(ADVANCED_PRELAUNCH_DELAY).await;

        info!(%test_id, ?args, "launching advanced throughput test");
        let result = runner::run(&self.tools.iperf3_path, &args, CaptureMode::Split).await?;
        info!(%test_id, exit_code = ?result.exit_code, "advanced throughput test finished");
        Ok(result)
    }

    /// Run a preset throughput test (TCP or UDP profile plus an optional
    /// reverse flag).
    pub async fn run_basic(
        &self,
        request: &BasicTestRequest,
    ) -> Result<TestResult, OrchestratorError> {
        let args = invocation::basic_args(request)?;
        let test_id = Uuid::new_v4();

        info!(%test_id, ?args, "launching basic throughput test");
        let result = runner::run(&self.tools.iperf3_path, &args, CaptureMode::Split).await?;
        info!(%test_id, exit_code = ?result.exit_code, "basic throughput test finished");
        Ok(result)
    }

    /// Run a latency test against a target.
    ///
    /// Unlike the throughput kinds, latency output merges stdout and stderr
    /// chunks in arrival order.
    pub async fn run_latency(
        &self,
        request: &LatencyTestRequest,
    ) -> Result<TestResult, OrchestratorError> {
        let args = invocation::latency_args(request)?;
        let test_id = Uuid::new_v4();

        info!(%test_id, ?args, "launching latency test");
        let result = runner::run(&self.tools.ping_path, &args, CaptureMode::Merged).await?;
        info!(%test_id, exit_code = ?result.exit_code, "latency test finished");
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
