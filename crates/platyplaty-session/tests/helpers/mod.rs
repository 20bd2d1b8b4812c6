//! Fixtures for the session integration tests
//!
//! [`Harness`] wires a command queue, consumer, key dispatch, autoplay and
//! crash handling around the `mock-renderer` binary, the same way the
//! application does, with a [`MemoryStatusSink`] capturing what the user
//! would see.

#![allow(dead_code)]

use platyplaty_session::{
    build_renderer_dispatch_table, command_queue, Autoplay, BadPresetRegistry, Command,
    CommandConsumer, CommandQueue, CrashContext, CrashReport, KeyHandler, KeyRouter,
    MemoryStatusSink, PendingKeys, Playlist, Preset, PresetLoader, RendererKeyHandler,
    RendererSession, Result, SessionConfig, SharedPlaylist, ShutdownSignal, StderrContext,
};
use serde_json::{Map, Value};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const MOCK_RENDERER: &str = env!("CARGO_BIN_EXE_mock-renderer");

/// Payload the noisy renderer writes to stderr after connecting.
pub const NOISE: &str = "mock renderer noise";

/// Key the slow-key renderer reports while a `slow` preset loads.
pub const SLOW_KEY: &str = "n";

/// How long any single wait in a test may take.
pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renderer {
    Plain,
    ExitBeforeReady,
    Noisy,
    SlowKey,
}

/// Wrapper scripts that start the mock renderer with its knobs set.
///
/// All of them are written before the first renderer is spawned so no
/// forked child can hold one open for writing ("text file busy").
fn wrapper(renderer: Renderer) -> PathBuf {
    static WRAPPERS: OnceLock<TempDir> = OnceLock::new();
    let dir = WRAPPERS.get_or_init(|| {
        let dir = TempDir::new().unwrap();
        let variants = [
            ("plain.sh", String::new()),
            ("exit-before-ready.sh", "MOCK_RENDERER_EXIT_BEFORE_READY=1 ".to_string()),
            ("noisy.sh", format!("MOCK_RENDERER_NOISE='{NOISE}' ")),
            ("slow-key.sh", format!("MOCK_RENDERER_SLOW_KEY='{SLOW_KEY}' ")),
        ];
        for (file, env) in variants {
            let path = dir.path().join(file);
            let body = format!("#!/bin/sh\nexec env {env}'{MOCK_RENDERER}' \"$@\"\n");
            std::fs::write(&path, body).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        dir
    });
    let file = match renderer {
        Renderer::Plain => "plain.sh",
        Renderer::ExitBeforeReady => "exit-before-ready.sh",
        Renderer::Noisy => "noisy.sh",
        Renderer::SlowKey => "slow-key.sh",
    };
    dir.path().join(file)
}

pub struct Harness {
    pub dir: TempDir,
    pub config: Arc<SessionConfig>,
    pub presets: Vec<PathBuf>,
    pub queue: CommandQueue,
    pub playlist: SharedPlaylist,
    pub registry: BadPresetRegistry,
    pub autoplay: Autoplay,
    pub status: Arc<MemoryStatusSink>,
    pub ready: Arc<AtomicBool>,
    pub shutdown: ShutdownSignal,
    pub router: KeyRouter,
    pub crashes: mpsc::UnboundedReceiver<CrashReport>,
    consumer: Option<JoinHandle<()>>,
}

impl Harness {
    /// Preset files named `presets` are created in a fresh directory and
    /// become the playlist, in order. Autoplay never ticks on its own.
    pub fn new(renderer: Renderer, presets: &[&str]) -> Self {
        Self::with_preset_duration(renderer, presets, 3600)
    }

    /// Like [`new`](Self::new), with autoplay advancing every `seconds`.
    pub fn with_preset_duration(renderer: Renderer, presets: &[&str], seconds: u64) -> Self {
        let dir = TempDir::new().unwrap();
        let presets: Vec<PathBuf> = presets
            .iter()
            .map(|name| {
                let path = dir.path().join(name);
                std::fs::write(&path, "[preset00]\n").unwrap();
                path
            })
            .collect();

        let config = Arc::new(SessionConfig {
            socket_path: dir.path().join("renderer.sock"),
            renderer_binary: Some(wrapper(renderer)),
            audio_source: "test.monitor".to_string(),
            preset_duration: seconds,
            handshake_timeout_ms: 5_000,
            queue_poll_ms: 20,
            quit_timeout_ms: 2_000,
            ..SessionConfig::default()
        });

        let status = Arc::new(MemoryStatusSink::new());
        let registry = BadPresetRegistry::new();
        let playlist = Playlist::new(presets.clone(), false).shared();
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
        let crash = CrashContext {
            registry: registry.clone(),
            playlist: playlist.clone(),
            autoplay: autoplay.clone(),
            status: status.clone(),
        };

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
            crash,
            shutdown.clone(),
            Duration::from_millis(config.queue_poll_ms),
        );
        let consumer = tokio::spawn(consumer.run());

        Self {
            dir,
            config,
            presets,
            queue,
            playlist,
            registry,
            autoplay,
            status,
            ready,
            shutdown,
            router,
            crashes,
            consumer: Some(consumer),
        }
    }

    pub fn preset(&self, index: usize) -> &Path {
        &self.presets[index]
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Load playlist entry `index` and mark it playing.
    pub async fn play(&self, index: usize) -> Result<()> {
        {
            let mut playlist = self.playlist.lock();
            playlist.set_playing(Some(index));
            playlist.set_selection(index);
        }
        self.load(self.preset(index)).await
    }

    pub async fn load(&self, path: &Path) -> Result<()> {
        let cmd = Command::load_preset(&Preset::file(path), self.config.transition_type);
        self.queue.request(cmd).await.map(|_| ())
    }

    pub async fn renderer_status(&self) -> Map<String, Value> {
        self.queue
            .request(Command::get_status())
            .await
            .unwrap()
            .unwrap_or_default()
    }

    /// Poll `GET STATUS` until `check` accepts it.
    pub async fn wait_for_status<F>(&self, check: F) -> Map<String, Value>
    where
        F: Fn(&Map<String, Value>) -> bool,
    {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let status = self.renderer_status().await;
            if check(&status) {
                return status;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "renderer status never matched: {:?}",
                status
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Wait for the consumer to finish after shutdown was triggered elsewhere.
    pub async fn join(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            tokio::time::timeout(WAIT, consumer)
                .await
                .expect("consumer did not stop")
                .unwrap();
        }
    }

    /// Trigger shutdown and wait for the renderer to be stopped.
    pub async fn shutdown(&mut self) {
        self.autoplay.stop();
        self.shutdown.trigger();
        self.join().await;
    }
}

/// Poll `check` until it holds.
pub async fn eventually<F>(what: &str, check: F)
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
