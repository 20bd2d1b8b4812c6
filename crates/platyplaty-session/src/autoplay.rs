//! Timer-driven autoplay through the playlist
//!
//! Advancing walks forward from the playing index with wraparound, skipping
//! anything that cannot play and marking it broken on the way. A preset the
//! renderer refuses is marked broken and the walk continues from it, until
//! something loads or nothing is left.

use crate::error::{Result, SessionError};
use crate::playlist::{Playlist, SharedPlaylist};
use crate::protocol::{Command, Preset, TransitionType};
use crate::queue::CommandQueue;
use crate::registry::BadPresetRegistry;
use crate::status::StatusSink;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const NO_PLAYABLE_MESSAGE: &str = "No playable presets in playlist. Stopping autoplay.";
pub const EMPTY_PLAYLIST_MESSAGE: &str = "Playlist is empty";

/// Can `path` be handed to the renderer right now?
///
/// False for presets in the bad registry, missing files, broken symlinks,
/// non-files and files we cannot open.
pub fn is_playable(path: &Path, registry: &BadPresetRegistry) -> bool {
    if registry.is_bad(path) {
        return false;
    }
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => std::fs::File::open(path).is_ok(),
        _ => false,
    }
}

/// Index of the next playable preset after `start`, wrapping around.
///
/// `None` as `start` searches from the top. Each index is visited at most
/// once and `start` itself comes last, so it is returned only when it is the
/// sole playable entry. Every unplayable index visited is marked broken.
pub fn find_next_playable(
    playlist: &mut Playlist,
    start: Option<usize>,
    registry: &BadPresetRegistry,
) -> Option<usize> {
    find_next_playable_skipping(playlist, start, registry, &HashSet::new())
}

fn find_next_playable_skipping(
    playlist: &mut Playlist,
    start: Option<usize>,
    registry: &BadPresetRegistry,
    skip: &HashSet<usize>,
) -> Option<usize> {
    let len = playlist.len();
    if len == 0 {
        return None;
    }
    // Searching from "before index 0" visits 0..len in order.
    let base = start.map(|s| s % len).unwrap_or(len - 1);

    for offset in 1..=len {
        let index = (base + offset) % len;
        if skip.contains(&index) {
            continue;
        }
        let playable = playlist
            .get(index)
            .is_some_and(|path| is_playable(path, registry));
        if playable {
            return Some(index);
        }
        playlist.mark_broken(index);
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// A different preset was loaded.
    Loaded(usize),
    /// The playing preset is the only playable one; nothing was sent.
    AlreadyPlaying(usize),
    NoPlayable,
}

/// Loads playlist entries through the command queue.
#[derive(Clone)]
pub struct PresetLoader {
    pub playlist: SharedPlaylist,
    pub registry: BadPresetRegistry,
    pub queue: CommandQueue,
    pub status: Arc<dyn StatusSink>,
    pub transition: TransitionType,
}

impl PresetLoader {
    /// Move to the next playable preset after the playing one and load it.
    ///
    /// Renderer refusals mark the entry broken and move on. Any other error
    /// means the renderer is gone and is returned without marking anything;
    /// crash handling deals with the culprit.
    pub async fn advance(&self) -> Result<AdvanceOutcome> {
        let mut refused = HashSet::new();

        loop {
            let (index, path) = {
                let mut playlist = self.playlist.lock();
                let current = playlist.playing();
                let found =
                    find_next_playable_skipping(&mut playlist, current, &self.registry, &refused);
                match found {
                    None => return Ok(AdvanceOutcome::NoPlayable),
                    Some(i) if Some(i) == current => return Ok(AdvanceOutcome::AlreadyPlaying(i)),
                    Some(i) => {
                        playlist.set_playing(Some(i));
                        playlist.set_selection(i);
                        (i, playlist.presets()[i].clone())
                    }
                }
            };

            match self.load(&path).await {
                Ok(()) => return Ok(AdvanceOutcome::Loaded(index)),
                Err(SessionError::Renderer { message, .. }) => {
                    tracing::warn!("Renderer refused {}: {}", path.display(), message);
                    self.status
                        .transient_error(&format!("Failed to load {}: {}", path.display(), message));
                    self.playlist.lock().mark_broken(index);
                    refused.insert(index);
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn load(&self, path: &Path) -> Result<()> {
        let cmd = Command::load_preset(&Preset::File(path.to_path_buf()), self.transition);
        self.queue.request(cmd).await.map(|_| ())
    }

    pub async fn load_idle(&self) -> Result<()> {
        let cmd = Command::load_preset(&Preset::Idle, self.transition);
        self.queue.request(cmd).await.map(|_| ())
    }
}

struct AutoplayInner {
    enabled: AtomicBool,
    duration: Duration,
    loader: PresetLoader,
    timer: Mutex<Option<JoinHandle<()>>>,
}

/// Autoplay state machine: stopped, or running with a timer task.
///
/// Clones share state.
#[derive(Clone)]
pub struct Autoplay {
    inner: Arc<AutoplayInner>,
}

impl Autoplay {
    pub fn new(loader: PresetLoader, duration: Duration) -> Self {
        Self {
            inner: Arc::new(AutoplayInner {
                enabled: AtomicBool::new(false),
                duration,
                loader,
                timer: Mutex::new(None),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    pub fn loader(&self) -> &PresetLoader {
        &self.inner.loader
    }

    /// Turn autoplay on or off. Returns whether it is now on.
    pub async fn toggle(&self) -> bool {
        if self.is_enabled() {
            self.stop();
            return false;
        }
        self.start().await
    }

    /// Start autoplay if anything is playable. Returns whether it is running.
    pub async fn start(&self) -> bool {
        if self.is_enabled() {
            return true;
        }
        let loader = &self.inner.loader;

        enum Plan {
            Empty,
            NothingPlayable,
            Continue(usize),
            LoadFirst,
        }

        let plan = {
            let mut playlist = loader.playlist.lock();
            if playlist.is_empty() {
                Plan::Empty
            } else if let Some(playing) = playlist.playing() {
                match find_next_playable(&mut playlist, Some(playing), &loader.registry) {
                    Some(_) => {
                        playlist.set_selection(playing);
                        Plan::Continue(playing)
                    }
                    None => Plan::NothingPlayable,
                }
            } else {
                Plan::LoadFirst
            }
        };

        match plan {
            Plan::Empty => {
                loader.status.transient_error(EMPTY_PLAYLIST_MESSAGE);
                return false;
            }
            Plan::NothingPlayable => {
                loader.status.transient_error(NO_PLAYABLE_MESSAGE);
                return false;
            }
            Plan::Continue(index) => {
                tracing::debug!(index, "Autoplay continuing from playing preset");
            }
            Plan::LoadFirst => match loader.advance().await {
                Ok(AdvanceOutcome::Loaded(_)) | Ok(AdvanceOutcome::AlreadyPlaying(_)) => {}
                Ok(AdvanceOutcome::NoPlayable) => {
                    loader.status.transient_error(NO_PLAYABLE_MESSAGE);
                    return false;
                }
                Err(e) => {
                    tracing::warn!("Autoplay could not load its first preset: {}", e);
                    return false;
                }
            },
        }

        self.inner.enabled.store(true, Ordering::Release);
        self.start_timer();
        tracing::info!("Autoplay started");
        true
    }

    /// Stop autoplay and cancel the timer.
    pub fn stop(&self) {
        self.inner.enabled.store(false, Ordering::Release);
        if let Some(timer) = self.inner.timer.lock().take() {
            timer.abort();
        }
        tracing::info!("Autoplay stopped");
    }

    /// One timer tick's worth of work, without the wait.
    pub async fn advance(&self) -> Result<AdvanceOutcome> {
        self.inner.loader.advance().await
    }

    fn start_timer(&self) {
        let this = self.clone();
        let handle = tokio::spawn(async move { this.run_timer().await });
        if let Some(old) = self.inner.timer.lock().replace(handle) {
            old.abort();
        }
    }

    async fn run_timer(self) {
        loop {
            tokio::time::sleep(self.inner.duration).await;
            if !self.is_enabled() {
                break;
            }
            match self.advance().await {
                Ok(AdvanceOutcome::Loaded(index)) => {
                    tracing::debug!(index, "Autoplay advanced");
                }
                Ok(AdvanceOutcome::AlreadyPlaying(_)) => {}
                Ok(AdvanceOutcome::NoPlayable) => {
                    self.stop_from_timer();
                    self.inner
                        .loader
                        .status
                        .transient_error(NO_PLAYABLE_MESSAGE);
                    break;
                }
                Err(e) => {
                    tracing::warn!("Autoplay advance failed: {}", e);
                    if !self.is_enabled() {
                        break;
                    }
                }
            }
        }
    }

    /// Like [`stop`](Self::stop) but callable from the timer task itself.
    fn stop_from_timer(&self) {
        self.inner.enabled.store(false, Ordering::Release);
        // Dropping our own handle detaches it; the loop exits right after.
        self.inner.timer.lock().take();
        tracing::info!("Autoplay stopped: nothing playable");
    }
}
