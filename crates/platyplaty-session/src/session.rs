//! One renderer session: the subprocess, its connection and its stderr reader
//!
//! A session is either absent or fully started. [`RendererSession::start`]
//! runs the whole spawn, handshake, connect, `CHANGE AUDIO SOURCE`, `INIT`
//! sequence and leaves nothing behind when any step fails.

use crate::client::WireClient;
use crate::error::{Result, SessionError, StartupStage};
use crate::process::{locate_renderer, RendererProcess};
use crate::protocol::{Command, Preset, SessionConfig};
use crate::socket_path::check_stale_socket;
use crate::stderr::{monitor_stderr, StderrContext};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

struct LiveSession {
    process: RendererProcess,
    client: WireClient,
    stderr_task: Option<JoinHandle<()>>,
    quit_announced: Arc<AtomicBool>,
}

pub struct RendererSession {
    config: Arc<SessionConfig>,
    live: Option<LiveSession>,
    ready: Arc<AtomicBool>,
    generation: u64,
    preset_sent: Option<Preset>,
    stderr_ctx: StderrContext,
    /// Readers of torn-down renderers, joined at shutdown.
    retired: Vec<JoinHandle<()>>,
}

impl RendererSession {
    pub fn new(config: Arc<SessionConfig>, ready: Arc<AtomicBool>, stderr_ctx: StderrContext) -> Self {
        Self {
            config,
            live: None,
            ready,
            generation: 0,
            preset_sent: None,
            stderr_ctx,
            retired: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.live.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Increments on every successful start.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The preset most recently sent with `LOAD PRESET`.
    pub fn preset_sent(&self) -> Option<&Preset> {
        self.preset_sent.as_ref()
    }

    /// Whether the renderer said it was quitting on purpose.
    pub fn quit_announced(&self) -> bool {
        self.live
            .as_ref()
            .is_some_and(|live| live.quit_announced.load(Ordering::Acquire))
    }

    /// Non-blocking: has the live renderer process exited?
    pub fn process_exited(&mut self) -> bool {
        match self.live.as_mut() {
            Some(live) => live.process.has_exited(),
            None => false,
        }
    }

    pub fn process_id(&self) -> Option<u32> {
        self.live.as_ref().and_then(|live| live.process.id())
    }

    /// Spawn and initialise a renderer. Does nothing if one is running.
    pub async fn start(&mut self) -> Result<()> {
        if self.live.is_some() {
            return Ok(());
        }

        let binary = locate_renderer(self.config.renderer_binary.as_deref())?;
        let socket_path = &self.config.socket_path;

        check_stale_socket(socket_path).await.map_err(|e| match e {
            SessionError::AlreadyRunning => e,
            other => SessionError::Startup {
                stage: StartupStage::SocketCheck,
                exit_code: None,
                reason: other.to_string(),
            },
        })?;

        let mut process = RendererProcess::start(
            &binary,
            socket_path,
            Duration::from_millis(self.config.handshake_timeout_ms),
        )
        .await?;

        let client = match WireClient::connect(socket_path).await {
            Ok(client) => client,
            Err(e) => {
                process.kill().await;
                return Err(SessionError::Startup {
                    stage: StartupStage::Connecting,
                    exit_code: None,
                    reason: e.to_string(),
                });
            }
        };

        let init = [
            (
                StartupStage::AudioSource,
                Command::change_audio_source(&self.config.audio_source),
            ),
            (StartupStage::Initialization, Command::init()),
        ];
        for (stage, cmd) in init {
            if let Err(e) = client.send(&cmd).await {
                client.close().await;
                process.kill().await;
                return Err(SessionError::Startup {
                    stage,
                    exit_code: None,
                    reason: e.to_string(),
                });
            }
        }

        self.generation += 1;
        let quit_announced = Arc::new(AtomicBool::new(false));
        let stderr_task = process.take_stderr().map(|stderr| {
            tokio::spawn(monitor_stderr(
                stderr,
                self.generation,
                quit_announced.clone(),
                self.stderr_ctx.clone(),
            ))
        });

        tracing::info!(
            generation = self.generation,
            pid = process.id(),
            "Renderer ready"
        );

        self.live = Some(LiveSession {
            process,
            client,
            stderr_task,
            quit_announced,
        });
        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Send a command over the live connection.
    pub async fn send(&mut self, command: &Command) -> Result<Option<Map<String, Value>>> {
        let live = self.live.as_ref().ok_or(SessionError::NotRunning)?;
        if let Some(preset) = command.preset() {
            self.preset_sent = Some(preset.clone());
        }
        live.client.send(command).await
    }

    /// Give the stderr reader of an exited renderer up to `limit` to reach
    /// end of stream, so events written just before the exit are handled.
    pub async fn drain_stderr(&mut self, limit: Duration) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        if !live.process.has_exited() {
            return;
        }
        if let Some(task) = live.stderr_task.as_mut() {
            if tokio::time::timeout(limit, task).await.is_ok() {
                live.stderr_task = None;
            }
        }
    }

    /// Drop the renderer without talking to it.
    ///
    /// Used after a crash or protocol failure. The process is killed if it
    /// is somehow still alive; its stderr reader finishes on its own.
    pub async fn teardown(&mut self) {
        self.ready.store(false, Ordering::Release);
        self.preset_sent = None;
        if let Some(mut live) = self.live.take() {
            live.client.close().await;
            if !live.process.has_exited() {
                live.process.kill().await;
            }
            if let Some(task) = live.stderr_task.take() {
                self.retired.push(task);
            }
            self.retired.retain(|task| !task.is_finished());
        }
    }

    /// Graceful stop: best-effort `QUIT`, close, wait for exit, kill if it lingers.
    ///
    /// Never fails; a renderer that is already gone is fine.
    pub async fn shutdown(&mut self) {
        self.ready.store(false, Ordering::Release);
        let limit = Duration::from_millis(self.config.quit_timeout_ms);

        if let Some(mut live) = self.live.take() {
            if !live.process.has_exited() {
                match tokio::time::timeout(limit, live.client.send(&Command::quit())).await {
                    Ok(Ok(_)) => tracing::debug!("Renderer acknowledged QUIT"),
                    Ok(Err(e)) => tracing::debug!("QUIT not delivered: {}", e),
                    Err(_) => tracing::debug!("QUIT timed out"),
                }
            }
            live.client.close().await;

            if live.process.wait_timeout(limit).await.is_none() {
                tracing::warn!("Renderer did not exit after QUIT, killing it");
                live.process.kill().await;
            }
            if let Some(task) = live.stderr_task.take() {
                self.retired.push(task);
            }
        }

        for mut task in self.retired.drain(..) {
            if tokio::time::timeout(limit, &mut task).await.is_err() {
                task.abort();
            }
        }
        tracing::info!("Renderer session shut down");
    }
}
