//! Platyplaty controller that coordinates the renderer session tasks

use crate::{PlatyplatyBuilder, Result};
use platyplaty_session::{
    build_renderer_dispatch_table, command_queue, is_playable, Autoplay, BadPresetRegistry,
    Command, CommandConsumer, CommandQueue, CrashContext, CrashReport, KeyHandler, KeyRouter,
    PendingKeys, Playlist, PresetLoader, RendererKeyHandler, RendererSession, SessionConfig,
    SessionError, SharedPlaylist, ShutdownSignal, StatusSink, StderrContext,
};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What the startup sequence ended up showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupOutcome {
    /// The playlist entry at this index loaded.
    Preset(usize),
    /// Nothing in the playlist loaded; the renderer shows `idle://`.
    Idle,
}

/// Controller that owns the playlist, the command queue and the background
/// tasks talking to the renderer.
///
/// Every renderer command goes through one queue consumer task; this type
/// only ever enqueues. Clones of the shared handles it exposes
/// ([`playlist`](Self::playlist), [`autoplay`](Self::autoplay)) see the
/// same state.
///
/// # Example
///
/// ```ignore
/// use platyplaty::prelude::*;
///
/// let app = Platyplaty::builder().playlist(presets).build()?;
/// match app.start().await? {
///     StartupOutcome::Preset(i) => println!("playing #{i}"),
///     StartupOutcome::Idle => println!("nothing playable"),
/// }
/// app.handle_key("n");
/// app.shutdown().await;
/// ```
pub struct Platyplaty {
    config: Arc<SessionConfig>,
    queue: CommandQueue,
    playlist: SharedPlaylist,
    registry: BadPresetRegistry,
    autoplay: Autoplay,
    router: KeyRouter,
    ready: Arc<AtomicBool>,
    shutdown: ShutdownSignal,
    status: Arc<dyn StatusSink>,
    crashes: tokio::sync::Mutex<mpsc::UnboundedReceiver<CrashReport>>,
    consumer: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Platyplaty {
    /// Create a new controller builder
    pub fn builder() -> PlatyplatyBuilder {
        PlatyplatyBuilder::default()
    }

    pub(crate) fn from_parts(
        runtime: tokio::runtime::Handle,
        config: SessionConfig,
        presets: Vec<PathBuf>,
        loop_playlist: bool,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        let config = Arc::new(config);
        let registry = BadPresetRegistry::new();
        let playlist = Playlist::new(presets, loop_playlist).shared();
        let ready = Arc::new(AtomicBool::new(false));
        let shutdown = ShutdownSignal::new();
        let (queue, commands) = command_queue();
        let (events_tx, events) = mpsc::unbounded_channel();
        let pending = Arc::new(PendingKeys::new());

        let handler: Arc<dyn KeyHandler> = Arc::new(RendererKeyHandler::new(
            build_renderer_dispatch_table(&config.keybindings),
            playlist.clone(),
            queue.clone(),
            ready.clone(),
            shutdown.clone(),
            config.transition_type,
        ));
        let router = KeyRouter::new(pending.clone(), handler.clone());

        let autoplay = Autoplay::new(
            PresetLoader {
                playlist: playlist.clone(),
                registry: registry.clone(),
                queue: queue.clone(),
                status: status.clone(),
                transition: config.transition_type,
            },
            Duration::from_secs(config.preset_duration),
        );

        let session = RendererSession::new(
            config.clone(),
            ready.clone(),
            StderrContext {
                events: events_tx,
                keys: router.clone(),
                status: status.clone(),
            },
        );
        let (consumer, crashes) = CommandConsumer::new(
            session,
            commands,
            events,
            pending,
            handler,
            CrashContext {
                registry: registry.clone(),
                playlist: playlist.clone(),
                autoplay: autoplay.clone(),
                status: status.clone(),
            },
            shutdown.clone(),
            Duration::from_millis(config.queue_poll_ms),
        );
        let consumer = runtime.spawn(consumer.run());

        Self {
            config,
            queue,
            playlist,
            registry,
            autoplay,
            router,
            ready,
            shutdown,
            status,
            crashes: tokio::sync::Mutex::new(crashes),
            consumer: parking_lot::Mutex::new(Some(consumer)),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn playlist(&self) -> &SharedPlaylist {
        &self.playlist
    }

    pub fn registry(&self) -> &BadPresetRegistry {
        &self.registry
    }

    pub fn autoplay(&self) -> &Autoplay {
        &self.autoplay
    }

    /// True while a renderer has finished `INIT` and has not crashed or quit.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Startup sequence: load the first playlist entry that works (the first
    /// load spawns the renderer), fall back to `idle://`, then show the
    /// window and go fullscreen if configured.
    ///
    /// Entries that are missing or refused are marked broken along the way.
    /// A renderer that cannot be started at all fails the whole sequence.
    pub async fn start(&self) -> Result<StartupOutcome> {
        let outcome = self.load_initial_preset().await?;

        self.queue.request(Command::show_window()).await?;
        if self.config.fullscreen {
            self.queue.request(Command::set_fullscreen(true)).await?;
        }

        tracing::info!(?outcome, "Startup complete");
        Ok(outcome)
    }

    async fn load_initial_preset(&self) -> Result<StartupOutcome> {
        let loader = self.autoplay.loader();
        let len = self.playlist.lock().len();

        for index in 0..len {
            let path = {
                let mut playlist = self.playlist.lock();
                let Some(path) = playlist.get(index).map(Path::to_path_buf) else {
                    break;
                };
                if !is_playable(&path, &self.registry) {
                    playlist.mark_broken(index);
                    continue;
                }
                path
            };

            match loader.load(&path).await {
                Ok(()) => {
                    let mut playlist = self.playlist.lock();
                    playlist.set_playing(Some(index));
                    playlist.set_selection(index);
                    return Ok(StartupOutcome::Preset(index));
                }
                Err(SessionError::Renderer { message, .. }) => {
                    tracing::warn!("Initial preset {} refused: {}", path.display(), message);
                    self.playlist.lock().mark_broken(index);
                }
                // The crash handler has already quarantined it; the next
                // load starts a fresh renderer.
                Err(e) if e.is_connection_fatal() => {
                    tracing::warn!("Renderer died on {}: {}", path.display(), e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!("No playable preset, starting idle");
        loader.load_idle().await?;
        Ok(StartupOutcome::Idle)
    }

    /// Play playlist entry `index`.
    ///
    /// A refusal marks the entry broken and shows a transient error.
    pub async fn play(&self, index: usize) -> Result<()> {
        let path = {
            let mut playlist = self.playlist.lock();
            let Some(path) = playlist.get(index).map(Path::to_path_buf) else {
                return Ok(());
            };
            playlist.set_playing(Some(index));
            playlist.set_selection(index);
            path
        };

        match self.autoplay.loader().load(&path).await {
            Err(SessionError::Renderer { message, command }) => {
                self.playlist.lock().mark_broken(index);
                self.status
                    .transient_error(&format!("Failed to load {}: {}", path.display(), message));
                Err(SessionError::Renderer { command, message }.into())
            }
            other => other.map_err(Into::into),
        }
    }

    /// Load an arbitrary preset file, starting the renderer if needed.
    pub async fn load_preset(&self, path: &Path) -> Result<()> {
        Ok(self.autoplay.loader().load(path).await?)
    }

    /// Turn autoplay on or off. Returns whether it is now on.
    pub async fn toggle_autoplay(&self) -> bool {
        self.autoplay.toggle().await
    }

    /// `GET STATUS` from the running renderer.
    pub async fn renderer_status(&self) -> Result<Map<String, Value>> {
        let data = self.queue.request(Command::get_status()).await?;
        Ok(data.unwrap_or_default())
    }

    /// Feed a key press from the renderer window or the terminal.
    pub fn handle_key(&self, key: &str) {
        self.router.handle_key(key);
    }

    /// Wait for the next renderer crash. `None` once the controller stopped.
    pub async fn next_crash(&self) -> Option<CrashReport> {
        self.crashes.lock().await.recv().await
    }

    /// SIGINT and SIGTERM request shutdown.
    pub fn install_signal_handlers(&self) {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut terminate =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(signal) => signal,
                    Err(e) => {
                        tracing::warn!("Cannot listen for SIGTERM: {}", e);
                        return;
                    }
                };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
                _ = terminate.recv() => tracing::info!("Terminated"),
                _ = shutdown.wait() => return,
            }
            shutdown.trigger();
        });
    }

    /// Block until something requests shutdown, then perform it.
    pub async fn wait_for_shutdown(&self) {
        self.shutdown.wait().await;
        self.shutdown().await;
    }

    /// Stop autoplay, quit the renderer and wait for the consumer to finish.
    pub async fn shutdown(&self) {
        if self.autoplay.is_enabled() {
            self.autoplay.stop();
        }
        self.shutdown.trigger();

        let consumer = self.consumer.lock().take();
        if let Some(consumer) = consumer {
            if let Err(e) = consumer.await {
                tracing::warn!("Command consumer ended abnormally: {}", e);
            }
        }
        tracing::info!("Platyplaty shut down");
    }
}

impl Drop for Platyplaty {
    fn drop(&mut self) {
        // The consumer stops the renderer on its own once signalled.
        if self.autoplay.is_enabled() {
            self.autoplay.stop();
        }
        self.shutdown.trigger();
    }
}
