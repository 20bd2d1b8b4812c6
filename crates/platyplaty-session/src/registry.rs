//! Bad-preset registry
//!
//! Presets that crashed the renderer during this process lifetime, keyed by
//! resolved path so that symlinks to the same file share one entry. Nothing
//! ever clears it; a renderer upgrade takes effect after an application
//! restart without any extra bookkeeping.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolve symlinks and relative components of `path`.
///
/// Falls back to resolving the parent directory when the file itself is
/// gone, then to the path as given when nothing on disk can be resolved.
pub fn resolve_preset_path(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }

    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if let Ok(dir) = std::fs::canonicalize(parent) {
            return dir.join(name);
        }
    }

    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Shared set of presets known to crash the renderer.
///
/// Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct BadPresetRegistry {
    bad: Arc<Mutex<HashSet<PathBuf>>>,
}

impl BadPresetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_bad(&self, path: &Path) {
        let resolved = resolve_preset_path(path);
        tracing::warn!("Marking preset as bad: {}", resolved.display());
        self.bad.lock().insert(resolved);
    }

    pub fn is_bad(&self, path: &Path) -> bool {
        self.bad.lock().contains(&resolve_preset_path(path))
    }

    pub fn len(&self) -> usize {
        self.bad.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bad.lock().is_empty()
    }
}
