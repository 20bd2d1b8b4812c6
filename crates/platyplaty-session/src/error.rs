//! Error types for the renderer session

use crate::netstring::NetstringError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupStage {
    Locating,
    SocketCheck,
    Spawning,
    Handshake,
    Connecting,
    AudioSource,
    Initialization,
}

impl std::fmt::Display for StartupStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupStage::Locating => write!(f, "locating renderer"),
            StartupStage::SocketCheck => write!(f, "checking socket"),
            StartupStage::Spawning => write!(f, "spawning renderer"),
            StartupStage::Handshake => write!(f, "waiting for SOCKET READY"),
            StartupStage::Connecting => write!(f, "connecting"),
            StartupStage::AudioSource => write!(f, "setting audio source"),
            StartupStage::Initialization => write!(f, "initializing renderer"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Renderer binary not found at {}", .0.display())]
    RendererNotFound(PathBuf),

    #[error("Renderer startup failed at {stage} stage (exit code {exit_code:?}): {reason}")]
    Startup {
        stage: StartupStage,
        exit_code: Option<i32>,
        reason: String,
    },

    #[error("Renderer connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed by renderer")]
    ConnectionClosed,

    #[error("Not connected to renderer")]
    NotConnected,

    #[error("Renderer is not running")]
    NotRunning,

    #[error("Response ID {actual:?} doesn't match command ID {expected}")]
    ResponseIdMismatch { expected: u64, actual: Option<u64> },

    #[error("Invalid response frame: {0}")]
    InvalidResponse(String),

    #[error("Command '{command}' failed: {message}")]
    Renderer { command: String, message: String },

    #[error("Timeout after {duration_ms}ms: {operation}")]
    Timeout { operation: String, duration_ms: u64 },

    #[error("Socket path error: {0}")]
    SocketPath(String),

    #[error("Another instance of platyplaty is already running")]
    AlreadyRunning,

    #[error("Command queue closed")]
    QueueClosed,

    #[error("Netstring error: {0}")]
    Netstring(#[from] NetstringError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SessionError {
    /// Whether the connection that produced this error can no longer be used.
    ///
    /// Protocol and transport errors qualify; a renderer answering
    /// `success: false` does not.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::ConnectionClosed
                | SessionError::ConnectionFailed(_)
                | SessionError::ResponseIdMismatch { .. }
                | SessionError::InvalidResponse(_)
                | SessionError::Netstring(_)
                | SessionError::Io(_)
                | SessionError::Json(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
