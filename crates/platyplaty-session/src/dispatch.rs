//! Key dispatch for renderer-window key presses
//!
//! The renderer reports key presses on stderr. They are looked up in a
//! dispatch table and run as synchronous actions that only enqueue
//! commands. While a command is in flight keys are buffered by
//! [`PendingKeys`] and replayed once it completes.

use crate::playlist::SharedPlaylist;
use crate::protocol::{Command, Preset, TransitionType};
use crate::queue::{CommandQueue, PendingKeys, ShutdownSignal};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Something that reacts to a key press. Returns whether the key was bound.
pub trait KeyHandler: Send + Sync {
    fn handle_key(&self, key: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    NextPreset,
    PreviousPreset,
    Quit,
}

/// Keys for the renderer window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererKeybindings {
    pub next_preset: String,
    pub previous_preset: String,
    pub quit: String,
}

impl Default for RendererKeybindings {
    fn default() -> Self {
        Self {
            next_preset: "n".to_string(),
            previous_preset: "p".to_string(),
            quit: "q".to_string(),
        }
    }
}

pub type DispatchTable = HashMap<String, KeyAction>;

pub fn build_renderer_dispatch_table(bindings: &RendererKeybindings) -> DispatchTable {
    let mut table = DispatchTable::new();
    table.insert(bindings.next_preset.clone(), KeyAction::NextPreset);
    table.insert(bindings.previous_preset.clone(), KeyAction::PreviousPreset);
    table.insert(bindings.quit.clone(), KeyAction::Quit);
    table
}

/// Runs renderer-window actions against the playlist and command queue.
pub struct RendererKeyHandler {
    table: DispatchTable,
    playlist: SharedPlaylist,
    queue: CommandQueue,
    ready: Arc<AtomicBool>,
    shutdown: ShutdownSignal,
    transition: TransitionType,
}

impl RendererKeyHandler {
    pub fn new(
        table: DispatchTable,
        playlist: SharedPlaylist,
        queue: CommandQueue,
        ready: Arc<AtomicBool>,
        shutdown: ShutdownSignal,
        transition: TransitionType,
    ) -> Self {
        Self {
            table,
            playlist,
            queue,
            ready,
            shutdown,
            transition,
        }
    }

    fn run(&self, action: KeyAction) {
        match action {
            KeyAction::Quit => {
                tracing::info!("Quit requested from renderer window");
                self.shutdown.trigger();
            }
            KeyAction::NextPreset | KeyAction::PreviousPreset => {
                // Nothing to navigate until the renderer is up.
                if !self.ready.load(Ordering::Acquire) {
                    return;
                }
                let moved = {
                    let mut playlist = self.playlist.lock();
                    if action == KeyAction::NextPreset {
                        playlist.next()
                    } else {
                        playlist.previous()
                    }
                };
                if let Some((_, path)) = moved {
                    let cmd = Command::load_preset(&Preset::File(path), self.transition);
                    if let Err(e) = self.queue.enqueue(cmd) {
                        tracing::warn!("Dropping {:?}: {}", action, e);
                    }
                }
            }
        }
    }
}

impl KeyHandler for RendererKeyHandler {
    fn handle_key(&self, key: &str) -> bool {
        match self.table.get(key) {
            Some(&action) => {
                self.run(action);
                true
            }
            None => false,
        }
    }
}

/// Entry point for key presses: buffers while a command is pending,
/// dispatches immediately otherwise.
#[derive(Clone)]
pub struct KeyRouter {
    pending: Arc<PendingKeys>,
    handler: Arc<dyn KeyHandler>,
}

impl KeyRouter {
    pub fn new(pending: Arc<PendingKeys>, handler: Arc<dyn KeyHandler>) -> Self {
        Self { pending, handler }
    }

    pub fn handle_key(&self, key: &str) {
        if self.pending.buffer_if_busy(key) {
            tracing::trace!(key, "buffered key during pending command");
            return;
        }
        self.handler.handle_key(key);
    }

    pub fn handler(&self) -> &Arc<dyn KeyHandler> {
        &self.handler
    }

    pub fn pending(&self) -> &Arc<PendingKeys> {
        &self.pending
    }
}
