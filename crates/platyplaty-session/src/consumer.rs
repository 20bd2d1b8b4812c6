//! The command queue consumer
//!
//! One task owns the renderer session. It sends queued commands strictly one
//! at a time, starts the renderer on demand for `LOAD PRESET`, reacts to
//! stderr events, notices a dead renderer, and replays keys that arrived
//! while a command was in flight.

use crate::crash::{handle_renderer_crash, CrashContext, CrashReport};
use crate::dispatch::KeyHandler;
use crate::error::SessionError;
use crate::protocol::LOAD_PRESET;
use crate::queue::{PendingKeys, QueueItem, ShutdownSignal};
use crate::session::RendererSession;
use crate::stderr::SessionEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const START_FAILED_MESSAGE: &str = "Failed to start renderer.";

const STDERR_DRAIN: Duration = Duration::from_millis(250);

pub struct CommandConsumer {
    session: RendererSession,
    commands: mpsc::UnboundedReceiver<QueueItem>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    pending: Arc<PendingKeys>,
    keys: Arc<dyn KeyHandler>,
    crash: CrashContext,
    shutdown: ShutdownSignal,
    poll: Duration,
    crashes: mpsc::UnboundedSender<CrashReport>,
}

impl CommandConsumer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: RendererSession,
        commands: mpsc::UnboundedReceiver<QueueItem>,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        pending: Arc<PendingKeys>,
        keys: Arc<dyn KeyHandler>,
        crash: CrashContext,
        shutdown: ShutdownSignal,
        poll: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<CrashReport>) {
        let (crashes, crash_rx) = mpsc::unbounded_channel();
        (
            Self {
                session,
                commands,
                events,
                pending,
                keys,
                crash,
                shutdown,
                poll,
                crashes,
            },
            crash_rx,
        )
    }

    /// Run until shutdown is signalled or every producer is gone, then stop
    /// the renderer gracefully.
    pub async fn run(mut self) {
        let shutdown = self.shutdown.clone();
        let mut tick = tokio::time::interval(self.poll.max(Duration::from_millis(1)));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                item = self.commands.recv() => match item {
                    Some(item) => self.execute(item).await,
                    None => break,
                },
                Some(event) = self.events.recv() => self.on_event(event).await,
                _ = tick.tick() => self.check_liveness().await,
            }
        }

        tracing::debug!("Command consumer stopping");
        self.session.shutdown().await;
    }

    async fn execute(&mut self, item: QueueItem) {
        self.pending.begin();

        let (command, reply) = match item {
            QueueItem::Fire(cmd) => (cmd, None),
            QueueItem::Request(cmd, reply) => (cmd, Some(reply)),
        };

        if self.session.is_running() && self.session.process_exited() {
            self.renderer_gone().await;
        }

        let result = if self.session.is_running() {
            Ok(())
        } else if command.name == LOAD_PRESET {
            tracing::info!("Starting renderer");
            self.session.start().await.inspect_err(|e| {
                tracing::error!("Renderer start failed: {}", e);
                self.crash.status.persistent_message(START_FAILED_MESSAGE);
            })
        } else {
            Err(SessionError::NotRunning)
        };

        let result = match result {
            Ok(()) => {
                let sent = self.session.send(&command).await;
                if let Err(e) = &sent {
                    if e.is_connection_fatal() {
                        tracing::warn!("Command {} lost the renderer: {}", command.name, e);
                        self.renderer_gone().await;
                    }
                }
                sent
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            tracing::warn!("Command {} failed: {}", command.name, e);
        }

        match reply {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => {
                if let Err(SessionError::Renderer { message, .. }) = &result {
                    self.crash.status.transient_error(message);
                }
            }
        }

        let replayed = self.pending.finish(self.keys.as_ref());
        if replayed > 0 {
            tracing::debug!(replayed, "Replayed keys after {}", command.name);
        }
    }

    async fn on_event(&mut self, event: SessionEvent) {
        if event.generation() != self.session.generation() {
            tracing::trace!(?event, "ignoring event from an old renderer");
            return;
        }
        match event {
            // May arrive after the exit was already noticed; still ours.
            SessionEvent::RendererQuit { .. } => {
                tracing::info!("Renderer quit, shutting down");
                self.shutdown.trigger();
            }
            // Informational; already logged by the stderr reader.
            SessionEvent::Disconnect { .. } => {}
            SessionEvent::StreamClosed { .. } => self.check_liveness().await,
        }
    }

    async fn check_liveness(&mut self) {
        if self.session.is_running() && self.session.process_exited() {
            self.renderer_gone().await;
        }
    }

    async fn renderer_gone(&mut self) {
        self.session.drain_stderr(STDERR_DRAIN).await;
        if self.session.quit_announced() {
            tracing::info!("Renderer exited after announcing QUIT");
            self.session.teardown().await;
            return;
        }
        let report = handle_renderer_crash(&mut self.session, &self.crash).await;
        let _ = self.crashes.send(report);
    }
}
