//! Builder for configuring and constructing a `Platyplaty` controller.

use crate::{Error, Platyplaty, Result};
use platyplaty_session::{
    compute_socket_path, RendererKeybindings, SessionConfig, StatusSink, TracingStatusSink,
    TransitionType,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// The socket path is computed from the environment unless set explicitly.
///
/// `build` spawns the command consumer, so it must run inside a Tokio
/// runtime. No renderer is started until the first preset load.
///
/// # Example
///
/// ```ignore
/// use platyplaty::prelude::*;
///
/// let app = Platyplaty::builder()
///     .audio_source("alsa_output.monitor")
///     .transition_type(TransitionType::Soft)
///     .playlist(presets)
///     .build()?;
/// ```
pub struct PlatyplatyBuilder {
    config: SessionConfig,
    socket_path: Option<PathBuf>,
    presets: Vec<PathBuf>,
    loop_playlist: bool,
    status: Option<Arc<dyn StatusSink>>,
}

impl Default for PlatyplatyBuilder {
    fn default() -> Self {
        Self {
            config: SessionConfig::default(),
            socket_path: None,
            presets: Vec::new(),
            loop_playlist: true,
            status: None,
        }
    }
}

impl PlatyplatyBuilder {
    /// Start from a complete configuration. Its `socket_path` is used as is.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.socket_path = Some(config.socket_path.clone());
        self.config = config;
        self
    }

    pub fn socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = Some(path.into());
        self
    }

    /// Default: `$PLATYPLATY_RENDERER`, then `platyplaty-renderer` next to
    /// the running executable.
    pub fn renderer_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.renderer_binary = Some(path.into());
        self
    }

    /// Default: `@DEFAULT_SINK@.monitor`
    pub fn audio_source(mut self, source: impl Into<String>) -> Self {
        self.config.audio_source = source.into();
        self
    }

    /// Default: hard
    pub fn transition_type(mut self, transition: TransitionType) -> Self {
        self.config.transition_type = transition;
        self
    }

    /// Seconds each preset plays under autoplay. Default: 30
    pub fn preset_duration(mut self, seconds: u64) -> Self {
        self.config.preset_duration = seconds;
        self
    }

    pub fn fullscreen(mut self, enabled: bool) -> Self {
        self.config.fullscreen = enabled;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn quit_timeout(mut self, timeout: Duration) -> Self {
        self.config.quit_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// How often the consumer checks whether the renderer is still alive.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.queue_poll_ms = interval.as_millis() as u64;
        self
    }

    pub fn keybindings(mut self, bindings: RendererKeybindings) -> Self {
        self.config.keybindings = bindings;
        self
    }

    pub fn playlist(mut self, presets: Vec<PathBuf>) -> Self {
        self.presets = presets;
        self
    }

    /// Default: true
    pub fn loop_playlist(mut self, enabled: bool) -> Self {
        self.loop_playlist = enabled;
        self
    }

    /// Where crash notices, transient errors and renderer output go.
    /// Default: [`TracingStatusSink`].
    pub fn status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.status = Some(sink);
        self
    }

    pub fn build(self) -> Result<Platyplaty> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::NoRuntime(e.to_string()))?;

        let mut config = self.config;
        config.socket_path = match self.socket_path {
            Some(path) => path,
            None => compute_socket_path()?,
        };
        tracing::debug!(socket = %config.socket_path.display(), "Building controller");

        let status = self
            .status
            .unwrap_or_else(|| Arc::new(TracingStatusSink) as Arc<dyn StatusSink>);

        Ok(Platyplaty::from_parts(
            runtime,
            config,
            self.presets,
            self.loop_playlist,
            status,
        ))
    }
}
