//! Singleton measurement-server lifecycle.
//!
//! At most one server process exists at a time.  The slot is a mutex over an
//! optional handle: `start` fills it, the monitor task empties it when the
//! process exits, and `stop` only signals.  Holding the lock across the
//! whole check-spawn-install sequence is what makes concurrent starts safe.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, warn};

use super::OrchestratorError;

/// How long a signalled server gets to exit before it is killed outright.
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Live server bookkeeping while the slot is occupied.
struct ServerHandle {
    pid: Option<u32>,
    /// Consumed by the first stop; a second stop while the process is still
    /// dying finds `None` and succeeds as a no-op.
    shutdown_tx: Option<oneshot::Sender<()>>,
}

/// Owner of the singleton server slot.
pub struct ServerManager {
    program: String,
    args: Vec<String>,
    slot: Arc<Mutex<Option<ServerHandle>>>,
}

impl ServerManager {
    /// A manager that launches `program args..` when started.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Whether the slot currently holds a process.
    pub async fn is_running(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Spawn the server process and install its handle in the slot.
    ///
    /// Succeeds as soon as the spawn does; readiness of whatever the server
    /// listens on is not awaited.  A failed spawn leaves the slot empty.
    pub async fn start(&self) -> Result<(), OrchestratorError> {
        let mut slot = self.slot.lock().await;
        if slot.is_some() {
            return Err(OrchestratorError::Conflict("Server already running"));
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| OrchestratorError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let pid = child.id();
        info!(program = %self.program, ?pid, "measurement server started");

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(log_server_output(stdout, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_server_output(stderr, "stderr"));
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(monitor(child, shutdown_rx, Arc::clone(&self.slot)));

        *slot = Some(ServerHandle {
            pid,
            shutdown_tx: Some(shutdown_tx),
        });
        Ok(())
    }

    /// Ask the running server to terminate.
    ///
    /// Returns once the signal is handed to the monitor task; the slot is
    /// cleared later, when the monitor observes the exit.
    pub async fn stop(&self) -> Result<(), OrchestratorError> {
        let mut slot = self.slot.lock().await;
        let handle = slot
            .as_mut()
            .ok_or(OrchestratorError::Conflict("Server is not running"))?;

        match handle.shutdown_tx.take() {
            Some(tx) => {
                // The monitor only drops its receiver after leaving the
                // select, and the slot still holds this handle, so the send
                // cannot fail while the process is alive.
                let _ = tx.send(());
                info!(pid = ?handle.pid, "measurement server stop requested");
            }
            None => {
                debug!(pid = ?handle.pid, "stop requested again while server is shutting down");
            }
        }
        Ok(())
    }
}

/// Wait for either a shutdown request or a self-exit, then clear the slot.
async fn monitor(
    mut child: Child,
    shutdown_rx: oneshot::Receiver<()>,
    slot: Arc<Mutex<Option<ServerHandle>>>,
) {
    let pid = child.id();

    tokio::select! {
        // A closed channel means the manager itself is gone; take the
        // process down in that case too.
        _ = shutdown_rx => {
            terminate(&mut child).await;
        }
        status = child.wait() => {
            match status {
                Ok(status) => info!(?pid, exit_code = ?status.code(), "measurement server exited"),
                Err(err) => error!(?pid, %err, "failed waiting on measurement server"),
            }
        }
    }

    // Only this task clears the slot, and start refuses while it is
    // occupied, so the handle in there is still ours to remove.
    *slot.lock().await = None;
    info!(?pid, "measurement server slot cleared");
}

/// Graceful termination: SIGTERM, a grace period, then SIGKILL.
async fn terminate(child: &mut Child) {
    let pid = child.id();

    #[cfg(unix)]
    if let Some(pid) = pid {
        // SAFETY: plain kill(2) on a pid we just read from our own child.
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(err) = child.start_kill() {
            warn!(?pid, %err, "failed to signal measurement server");
        }
    }

    match tokio::time::timeout(STOP_GRACE_PERIOD, child.wait()).await {
        Ok(Ok(status)) => {
            info!(?pid, exit_code = ?status.code(), "measurement server stopped");
        }
        Ok(Err(err)) => {
            error!(?pid, %err, "failed waiting on measurement server during stop");
        }
        Err(_) => {
            warn!(?pid, "measurement server ignored the stop signal, killing it");
            if let Err(err) = child.kill().await {
                error!(?pid, %err, "failed to kill measurement server");
            }
        }
    }
}

/// Forward one of the server's output streams into the log.
async fn log_server_output<R>(stream: R, stream_name: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match stream_name {
            "stderr" => warn!(target: "perfwarden::server_output", "{line}"),
            _ => info!(target: "perfwarden::server_output", "{line}"),
        }
    }
}
