//! One-shot execution of a measurement process with full output capture.
//!
//! A test invocation spawns the tool, drains stdout and stderr concurrently,
//! and waits for exit.  There is no timeout: measurement tools are trusted
//! to terminate on their own, and a hung process simply keeps its requesting
//! task pending.

use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::info;

use super::OrchestratorError;

/// Read size for draining the child's pipes.
const CHUNK_SIZE: usize = 4096;

/// How the two output streams are assembled into the result text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// All of stdout first, then all of stderr.  Used for throughput tests,
    /// where diagnostics should trail the report.
    Split,
    /// Chunks appended in arrival order, interleaved.  Used for latency
    /// tests, whose per-probe lines and errors read best chronologically.
    Merged,
}

/// Captured outcome of a finished test process.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Combined output text, lossily decoded as UTF-8.
    pub raw: String,
    /// Exit code, or `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
}

/// Spawn `program` with `args`, drain both pipes to completion, and wait
/// for exit.
///
/// Output from a failed run is still returned: error text and a non-zero
/// exit code are data for the caller, not a failure of the orchestration.
pub async fn run(
    program: &str,
    args: &[String],
    mode: CaptureMode,
) -> Result<TestResult, OrchestratorError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| OrchestratorError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let mut stdout = child.stdout.take().expect("stdout requested as piped");
    let mut stderr = child.stderr.take().expect("stderr requested as piped");

    let mut out_buf: Vec<u8> = Vec::new();
    let mut err_buf: Vec<u8> = Vec::new();
    let mut out_open = true;
    let mut err_open = true;
    let mut out_chunk = [0u8; CHUNK_SIZE];
    let mut err_chunk = [0u8; CHUNK_SIZE];

    // Drain both pipes before waiting so a chatty child can never block on
    // a full pipe.  read() is cancel-safe, making it fine to race the two
    // streams in one select loop.
    while out_open || err_open {
        tokio::select! {
            read = stdout.read(&mut out_chunk), if out_open => {
                match read {
                    Ok(0) => out_open = false,
                    Ok(n) => out_buf.extend_from_slice(&out_chunk[..n]),
                    Err(source) => {
                        return Err(OrchestratorError::Spawn {
                            program: program.to_string(),
                            source,
                        })
                    }
                }
            }
            read = stderr.read(&mut err_chunk), if err_open => {
                match read {
                    Ok(0) => err_open = false,
                    Ok(n) => match mode {
                        CaptureMode::Split => err_buf.extend_from_slice(&err_chunk[..n]),
                        CaptureMode::Merged => out_buf.extend_from_slice(&err_chunk[..n]),
                    },
                    Err(source) => {
                        return Err(OrchestratorError::Spawn {
                            program: program.to_string(),
                            source,
                        })
                    }
                }
            }
        }
    }

    let status = child
        .wait()
        .await
        .map_err(|source| OrchestratorError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let raw = match mode {
        CaptureMode::Split => {
            out_buf.extend_from_slice(&err_buf);
            String::from_utf8_lossy(&out_buf).into_owned()
        }
        CaptureMode::Merged => String::from_utf8_lossy(&out_buf).into_owned(),
    };

    info!(program, exit_code = ?status.code(), "test process exited");

    Ok(TestResult {
        raw,
        exit_code: status.code(),
    })
}
