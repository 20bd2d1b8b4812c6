//! IPC transport layer
//!
//! Netstring frames over a Unix domain socket, with a receive buffer so that
//! frames split across reads, or several frames in one read, come out whole.

use crate::error::{Result, SessionError};
use crate::netstring::{self, NetstringError};
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

const READ_CHUNK: usize = 4096;

/// One framed connection
pub struct MessageTransport {
    stream: UnixStream,
    recv_buf: Vec<u8>,
}

impl MessageTransport {
    /// Create transport from existing Unix stream
    pub fn new(stream: UnixStream) -> Self {
        Self {
            stream,
            recv_buf: Vec::new(),
        }
    }

    /// Connect to the renderer's socket
    pub async fn connect(socket_path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket_path).await.map_err(|e| {
            SessionError::ConnectionFailed(format!("{}: {}", socket_path.display(), e))
        })?;
        Ok(Self::new(stream))
    }

    /// Write one frame and flush it
    pub async fn send_frame(&mut self, payload: &str) -> Result<()> {
        let data = netstring::encode(payload);
        self.stream.write_all(&data).await?;
        self.stream.flush().await?;
        tracing::trace!(bytes = data.len(), "sent frame");
        Ok(())
    }

    /// Read until one full frame is buffered and return its payload.
    ///
    /// Bytes past the frame stay buffered for the next call.
    pub async fn recv_frame(&mut self) -> Result<String> {
        loop {
            let decoded = match netstring::decode(&self.recv_buf) {
                Ok((payload, rest)) => Ok((payload, rest.len())),
                Err(e) => Err(e),
            };

            match decoded {
                Ok((payload, remaining)) => {
                    let consumed = self.recv_buf.len() - remaining;
                    self.recv_buf.drain(..consumed);
                    return Ok(payload);
                }
                Err(NetstringError::Incomplete) => {
                    let mut chunk = [0u8; READ_CHUNK];
                    let n = self.stream.read(&mut chunk).await?;
                    if n == 0 {
                        return Err(SessionError::ConnectionClosed);
                    }
                    self.recv_buf.extend_from_slice(&chunk[..n]);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Shut the socket down and drop anything still buffered
    pub async fn shutdown(&mut self) {
        self.recv_buf.clear();
        if let Err(e) = self.stream.shutdown().await {
            tracing::trace!("socket shutdown: {}", e);
        }
    }
}

/// Server-side transport listener
pub struct TransportListener {
    listener: UnixListener,
}

impl TransportListener {
    /// Bind to socket path
    pub async fn bind(socket_path: &Path) -> Result<Self> {
        // Remove existing socket if it exists
        let _ = std::fs::remove_file(socket_path);
        let listener = UnixListener::bind(socket_path)?;
        Ok(Self { listener })
    }

    /// Accept a connection
    pub async fn accept(&self) -> Result<MessageTransport> {
        let (stream, _) = self.listener.accept().await?;
        Ok(MessageTransport::new(stream))
    }
}
