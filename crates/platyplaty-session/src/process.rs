//! Renderer subprocess supervision
//!
//! Spawns the renderer, waits for its `SOCKET READY` line and exposes
//! liveness. Stdout is drained for the life of the process so the renderer
//! never blocks on a full pipe; stderr is handed to the event stream.

use crate::error::{Result, SessionError, StartupStage};
use crate::protocol::SOCKET_READY;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;

/// Environment variable naming the renderer binary.
pub const RENDERER_ENV: &str = "PLATYPLATY_RENDERER";

/// File name looked up next to the current executable.
pub const RENDERER_BINARY_NAME: &str = "platyplaty-renderer";

/// Find the renderer binary.
///
/// Order: `explicit`, then `$PLATYPLATY_RENDERER`, then
/// `platyplaty-renderer` beside the running executable.
pub fn locate_renderer(explicit: Option<&Path>) -> Result<PathBuf> {
    let candidate = match explicit {
        Some(path) => path.to_path_buf(),
        None => match std::env::var_os(RENDERER_ENV) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => std::env::current_exe()?
                .parent()
                .map(|dir| dir.join(RENDERER_BINARY_NAME))
                .ok_or_else(|| SessionError::RendererNotFound(PathBuf::from(RENDERER_BINARY_NAME)))?,
        },
    };

    if !candidate.is_file() {
        return Err(SessionError::RendererNotFound(candidate));
    }
    Ok(candidate)
}

/// A running renderer that has completed its handshake
pub struct RendererProcess {
    child: Child,
    stderr: Option<ChildStderr>,
    stdout_task: JoinHandle<()>,
}

impl RendererProcess {
    /// Spawn `binary --socket-path <socket_path>` and wait for the handshake.
    ///
    /// The renderer gets its own process group so terminal signals aimed at
    /// the controller do not reach it. Lines before `SOCKET READY` are
    /// logged and skipped. If stdout closes first the error carries the exit
    /// code; if `handshake_timeout` passes the renderer is killed.
    pub async fn start(
        binary: &Path,
        socket_path: &Path,
        handshake_timeout: Duration,
    ) -> Result<Self> {
        let mut child = Command::new(binary)
            .arg("--socket-path")
            .arg(socket_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SessionError::Startup {
                stage: StartupStage::Spawning,
                exit_code: None,
                reason: format!("{}: {}", binary.display(), e),
            })?;

        tracing::info!(pid = child.id(), "Spawned renderer {}", binary.display());

        let stdout = child.stdout.take().ok_or_else(|| SessionError::Startup {
            stage: StartupStage::Spawning,
            exit_code: None,
            reason: "renderer stdout not captured".to_string(),
        })?;
        let stderr = child.stderr.take();
        let mut lines = BufReader::new(stdout).lines();

        match tokio::time::timeout(handshake_timeout, wait_for_ready(&mut lines)).await {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => {
                let exit_code = match tokio::time::timeout(Duration::from_secs(1), child.wait()).await
                {
                    Ok(Ok(status)) => status.code(),
                    _ => None,
                };
                return Err(SessionError::Startup {
                    stage: StartupStage::Handshake,
                    exit_code,
                    reason: "renderer exited before becoming ready".to_string(),
                });
            }
            Ok(Err(e)) => {
                return Err(SessionError::Startup {
                    stage: StartupStage::Handshake,
                    exit_code: None,
                    reason: format!("reading renderer stdout: {e}"),
                });
            }
            Err(_) => {
                let _ = child.start_kill();
                return Err(SessionError::Timeout {
                    operation: "renderer handshake".to_string(),
                    duration_ms: handshake_timeout.as_millis() as u64,
                });
            }
        }

        tracing::debug!("Renderer handshake complete");
        let stdout_task = tokio::spawn(drain_stdout(lines));

        Ok(Self {
            child,
            stderr,
            stdout_task,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Hand the stderr pipe to whoever decodes events from it.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    /// Non-blocking check of the exit status
    pub fn has_exited(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("Failed to poll renderer status: {}", e);
                true
            }
        }
    }

    /// Wait up to `limit` for the renderer to exit on its own.
    pub async fn wait_timeout(&mut self, limit: Duration) -> Option<ExitStatus> {
        match tokio::time::timeout(limit, self.child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                tracing::warn!("Failed to wait for renderer: {}", e);
                None
            }
            Err(_) => None,
        }
    }

    /// Kill the renderer and reap it.
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!("Renderer kill: {}", e);
        }
    }
}

impl Drop for RendererProcess {
    fn drop(&mut self) {
        self.stdout_task.abort();
    }
}

async fn wait_for_ready(lines: &mut Lines<BufReader<ChildStdout>>) -> std::io::Result<bool> {
    while let Some(line) = lines.next_line().await? {
        if line == SOCKET_READY {
            return Ok(true);
        }
        tracing::debug!("Renderer stdout before ready: {}", line);
    }
    Ok(false)
}

async fn drain_stdout(mut lines: Lines<BufReader<ChildStdout>>) {
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::debug!("renderer stdout: {}", line),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("renderer stdout read failed: {}", e);
                break;
            }
        }
    }
}
