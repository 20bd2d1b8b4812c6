//! Wire client: framed JSON requests with single-flight response matching

use crate::error::{Result, SessionError};
use crate::protocol::{Command, CommandResponse};
use crate::transport::MessageTransport;
use serde_json::{Map, Value};
use std::path::Path;
use tokio::sync::Mutex;

struct Connection {
    transport: Option<MessageTransport>,
    next_id: u64,
}

/// Client for the renderer's command socket.
///
/// Responses carry no routing beyond the id echo, so the lock covers the whole
/// write-then-read exchange and only one command is ever in flight.
pub struct WireClient {
    conn: Mutex<Connection>,
}

impl WireClient {
    pub async fn connect(socket_path: &Path) -> Result<Self> {
        let transport = MessageTransport::connect(socket_path).await?;
        tracing::debug!("Connected to renderer at {}", socket_path.display());
        Ok(Self::from_transport(transport))
    }

    pub fn from_transport(transport: MessageTransport) -> Self {
        Self {
            conn: Mutex::new(Connection {
                transport: Some(transport),
                next_id: 1,
            }),
        }
    }

    /// Send one command and wait for its response.
    ///
    /// Returns the response `data` on success. An id mismatch or a frame that
    /// is not a response means the connection is out of step and should be
    /// dropped; a `success: false` answer is returned as
    /// [`SessionError::Renderer`].
    pub async fn send(&self, command: &Command) -> Result<Option<Map<String, Value>>> {
        let mut guard = self.conn.lock().await;
        let conn = &mut *guard;

        let id = conn.next_id;
        let transport = conn.transport.as_mut().ok_or(SessionError::NotConnected)?;
        conn.next_id += 1;

        let request = command.to_request(id).to_string();
        tracing::debug!(id, command = %command.name, "sending command");
        transport.send_frame(&request).await?;

        let frame = transport.recv_frame().await?;
        let response: CommandResponse = serde_json::from_str(&frame)
            .map_err(|e| SessionError::InvalidResponse(format!("{e}: {frame}")))?;

        if response.id != Some(id) {
            return Err(SessionError::ResponseIdMismatch {
                expected: id,
                actual: response.id,
            });
        }

        if !response.success {
            return Err(SessionError::Renderer {
                command: command.name.clone(),
                message: response
                    .error
                    .unwrap_or_else(|| "Unknown error".to_string()),
            });
        }

        Ok(response.data)
    }

    /// Shut the socket down. Safe to call more than once.
    pub async fn close(&self) {
        let mut conn = self.conn.lock().await;
        if let Some(mut transport) = conn.transport.take() {
            transport.shutdown().await;
            tracing::debug!("Renderer connection closed");
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.conn.lock().await.transport.is_some()
    }
}
