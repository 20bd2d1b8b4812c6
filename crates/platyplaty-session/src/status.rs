//! User-facing status output
//!
//! The session never draws anything itself. Crash notices, short-lived
//! errors and raw renderer output go through a [`StatusSink`] that the UI
//! layer supplies.

use parking_lot::Mutex;
use std::io::Write;

pub trait StatusSink: Send + Sync {
    /// A message that stays until the user acts on it.
    fn persistent_message(&self, message: &str);

    /// A short-lived error.
    fn transient_error(&self, message: &str);

    /// Renderer diagnostic text, written through unmodified.
    fn renderer_output(&self, text: &str);
}

/// Logs messages with `tracing` and copies renderer output to our stderr.
#[derive(Debug, Default)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn persistent_message(&self, message: &str) {
        tracing::warn!("{}", message);
    }

    fn transient_error(&self, message: &str) {
        tracing::warn!("{}", message);
    }

    fn renderer_output(&self, text: &str) {
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(text.as_bytes());
        let _ = stderr.flush();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMessage {
    Persistent(String),
    Transient(String),
    Output(String),
}

/// Keeps everything it is given, in order.
#[derive(Debug, Default)]
pub struct MemoryStatusSink {
    messages: Mutex<Vec<StatusMessage>>,
}

impl MemoryStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<StatusMessage> {
        self.messages.lock().clone()
    }

    /// All renderer output received so far, concatenated.
    pub fn output(&self) -> String {
        self.messages
            .lock()
            .iter()
            .filter_map(|m| match m {
                StatusMessage::Output(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages.lock().iter().any(|m| match m {
            StatusMessage::Persistent(s) | StatusMessage::Transient(s) => s.contains(needle),
            StatusMessage::Output(_) => false,
        })
    }
}

impl StatusSink for MemoryStatusSink {
    fn persistent_message(&self, message: &str) {
        self.messages
            .lock()
            .push(StatusMessage::Persistent(message.to_string()));
    }

    fn transient_error(&self, message: &str) {
        self.messages
            .lock()
            .push(StatusMessage::Transient(message.to_string()));
    }

    fn renderer_output(&self, text: &str) {
        self.messages
            .lock()
            .push(StatusMessage::Output(text.to_string()));
    }
}
