//! Command queue between synchronous callers and the consumer task
//!
//! Key actions and UI callbacks cannot await, so they push commands here and
//! the single consumer sends them one at a time. Callers that need the
//! outcome use [`CommandQueue::request`].

use crate::dispatch::KeyHandler;
use crate::error::{Result, SessionError};
use crate::protocol::Command;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

pub type Reply = oneshot::Sender<Result<Option<Map<String, Value>>>>;

pub enum QueueItem {
    /// Failures are logged by the consumer and go no further.
    Fire(Command),
    /// The outcome is sent back on the reply channel.
    Request(Command, Reply),
}

impl QueueItem {
    pub fn command(&self) -> &Command {
        match self {
            QueueItem::Fire(cmd) | QueueItem::Request(cmd, _) => cmd,
        }
    }
}

/// Producer side of the command queue. Cheap to clone.
#[derive(Clone)]
pub struct CommandQueue {
    tx: mpsc::UnboundedSender<QueueItem>,
}

pub fn command_queue() -> (CommandQueue, mpsc::UnboundedReceiver<QueueItem>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CommandQueue { tx }, rx)
}

impl CommandQueue {
    /// Queue a command without waiting for it.
    pub fn enqueue(&self, command: Command) -> Result<()> {
        self.tx
            .send(QueueItem::Fire(command))
            .map_err(|_| SessionError::QueueClosed)
    }

    /// Queue a command and wait for the renderer's answer.
    pub async fn request(&self, command: Command) -> Result<Option<Map<String, Value>>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(QueueItem::Request(command, reply_tx))
            .map_err(|_| SessionError::QueueClosed)?;
        reply_rx.await.map_err(|_| SessionError::QueueClosed)?
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug, Default)]
struct PendingState {
    pending: bool,
    keys: VecDeque<String>,
}

/// Keys that arrived while a command was in flight.
///
/// The pending flag is only cleared once the buffer is empty, so a key that
/// arrives during replay queues up behind the older ones instead of jumping
/// ahead of them.
#[derive(Debug, Default)]
pub struct PendingKeys {
    state: Mutex<PendingState>,
}

impl PendingKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a command as in flight.
    pub fn begin(&self) {
        self.state.lock().pending = true;
    }

    pub fn is_pending(&self) -> bool {
        self.state.lock().pending
    }

    /// Buffer `key` if a command is in flight. Returns whether it was buffered.
    pub fn buffer_if_busy(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        if state.pending || !state.keys.is_empty() {
            state.keys.push_back(key.to_string());
            true
        } else {
            false
        }
    }

    /// End the in-flight command and replay buffered keys, oldest first.
    ///
    /// Returns how many keys were replayed.
    pub fn finish(&self, handler: &dyn KeyHandler) -> usize {
        let mut replayed = 0;
        loop {
            let next = {
                let mut state = self.state.lock();
                match state.keys.pop_front() {
                    Some(key) => key,
                    None => {
                        state.pending = false;
                        return replayed;
                    }
                }
            };
            handler.handle_key(&next);
            replayed += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().keys.is_empty()
    }
}

/// Cooperative shutdown flag every background task watches.
#[derive(Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Resolves once [`trigger`](Self::trigger) has been called.
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        // The sender lives in self, so this cannot fail.
        let _ = rx.wait_for(|&stop| stop).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
