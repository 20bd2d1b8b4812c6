//! Recovery after the renderer dies unexpectedly

use crate::autoplay::Autoplay;
use crate::playlist::SharedPlaylist;
use crate::protocol::Preset;
use crate::registry::BadPresetRegistry;
use crate::session::RendererSession;
use crate::status::StatusSink;
use std::sync::Arc;

pub const CRASH_MESSAGE: &str = "Renderer crashed. Load a preset to restart it.";

/// What crash handling touches besides the session itself.
#[derive(Clone)]
pub struct CrashContext {
    pub registry: BadPresetRegistry,
    pub playlist: SharedPlaylist,
    pub autoplay: Autoplay,
    pub status: Arc<dyn StatusSink>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashReport {
    /// The preset that was loaded when the renderer died.
    pub preset: Option<Preset>,
    /// Playlist entries newly marked broken.
    pub broken: Vec<usize>,
    pub autoplay_stopped: bool,
}

/// Quarantine the preset that was playing, stop autoplay and drop the
/// session.
///
/// The application keeps running; the next `LOAD PRESET` starts a fresh
/// renderer.
pub async fn handle_renderer_crash(
    session: &mut RendererSession,
    ctx: &CrashContext,
) -> CrashReport {
    let preset = session.preset_sent().cloned();
    tracing::error!(
        generation = session.generation(),
        preset = ?preset,
        "Renderer crashed"
    );

    let mut broken = Vec::new();
    if let Some(Preset::File(path)) = &preset {
        ctx.registry.mark_bad(path);
        broken = ctx.playlist.lock().mark_all_matching_as_broken(path);
    }

    let autoplay_stopped = ctx.autoplay.is_enabled();
    if autoplay_stopped {
        ctx.autoplay.stop();
    }

    session.teardown().await;

    ctx.status.persistent_message(CRASH_MESSAGE);

    CrashReport {
        preset,
        broken,
        autoplay_stopped,
    }
}
