//! Playlist state shared between the UI, autoplay and the crash handler

use crate::registry::resolve_preset_path;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub type SharedPlaylist = Arc<Mutex<Playlist>>;

/// Ordered presets plus what is playing, what is selected and which entries
/// are known not to play.
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    presets: Vec<PathBuf>,
    playing: Option<usize>,
    selection: usize,
    broken: BTreeSet<usize>,
    pub loop_enabled: bool,
}

impl Playlist {
    /// Build a playlist; entries that are not readable files start out broken.
    pub fn new(presets: Vec<PathBuf>, loop_enabled: bool) -> Self {
        let broken = broken_on_disk(&presets);
        Self {
            presets,
            playing: None,
            selection: 0,
            broken,
            loop_enabled,
        }
    }

    pub fn shared(self) -> SharedPlaylist {
        Arc::new(Mutex::new(self))
    }

    pub fn presets(&self) -> &[PathBuf] {
        &self.presets
    }

    pub fn get(&self, index: usize) -> Option<&Path> {
        self.presets.get(index).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    /// `None` means idle.
    pub fn playing(&self) -> Option<usize> {
        self.playing
    }

    pub fn set_playing(&mut self, index: Option<usize>) {
        self.playing = index;
    }

    pub fn selection(&self) -> usize {
        self.selection
    }

    pub fn set_selection(&mut self, index: usize) {
        self.selection = index;
    }

    pub fn broken_indices(&self) -> &BTreeSet<usize> {
        &self.broken
    }

    pub fn is_broken(&self, index: usize) -> bool {
        self.broken.contains(&index)
    }

    pub fn mark_broken(&mut self, index: usize) {
        self.broken.insert(index);
    }

    /// Mark every entry resolving to the same file as `path`. Returns the indices marked.
    pub fn mark_all_matching_as_broken(&mut self, path: &Path) -> Vec<usize> {
        let target = resolve_preset_path(path);
        let matching: Vec<usize> = self
            .presets
            .iter()
            .enumerate()
            .filter(|(_, p)| resolve_preset_path(p) == target)
            .map(|(i, _)| i)
            .collect();
        self.broken.extend(matching.iter().copied());
        matching
    }

    pub fn add_preset(&mut self, path: PathBuf) {
        if !path.is_file() {
            self.broken.insert(self.presets.len());
        }
        self.presets.push(path);
    }

    /// Remove one entry, shifting later broken, playing and selection indices down.
    pub fn remove(&mut self, index: usize) -> Option<PathBuf> {
        if index >= self.presets.len() {
            return None;
        }
        let removed = self.presets.remove(index);

        self.broken = self
            .broken
            .iter()
            .filter(|&&i| i != index)
            .map(|&i| if i > index { i - 1 } else { i })
            .collect();

        if self.presets.is_empty() {
            self.playing = None;
            self.selection = 0;
            return Some(removed);
        }

        self.playing = match self.playing {
            Some(p) if p == index => Some(index.min(self.presets.len() - 1)),
            Some(p) if p > index => Some(p - 1),
            other => other,
        };
        if self.selection > index || self.selection >= self.presets.len() {
            self.selection = self.selection.saturating_sub(1);
        }
        Some(removed)
    }

    /// Swap in a whole new list, as a playlist load does.
    ///
    /// The playing index is kept (clamped to the new length), so a running
    /// autoplay moves on from the same position at its next tick.
    pub fn replace(&mut self, presets: Vec<PathBuf>) {
        self.broken = broken_on_disk(&presets);
        self.playing = match self.playing {
            Some(p) if !presets.is_empty() => Some(p.min(presets.len() - 1)),
            _ => None,
        };
        self.presets = presets;
        self.selection = 0;
    }

    pub fn clear(&mut self) {
        self.replace(Vec::new());
    }

    /// Move the playing index forward; wraps only when looping.
    pub fn next(&mut self) -> Option<(usize, PathBuf)> {
        let current = self.playing?;
        if self.presets.is_empty() {
            return None;
        }
        let at_end = current + 1 >= self.presets.len();
        if at_end && !self.loop_enabled {
            return None;
        }
        let index = if at_end { 0 } else { current + 1 };
        self.playing = Some(index);
        Some((index, self.presets[index].clone()))
    }

    /// Move the playing index back; wraps only when looping.
    pub fn previous(&mut self) -> Option<(usize, PathBuf)> {
        let current = self.playing?;
        if self.presets.is_empty() {
            return None;
        }
        let index = match current.checked_sub(1) {
            Some(i) => i.min(self.presets.len() - 1),
            None if self.loop_enabled => self.presets.len() - 1,
            None => return None,
        };
        self.playing = Some(index);
        Some((index, self.presets[index].clone()))
    }
}

fn broken_on_disk(presets: &[PathBuf]) -> BTreeSet<usize> {
    presets
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.is_file())
        .map(|(i, _)| i)
        .collect()
}
