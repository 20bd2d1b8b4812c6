//! Renderer stderr: framed diagnostic events mixed with plain output
//!
//! The stream is expected to be a sequence of netstrings. Once a malformed
//! frame shows up the reader stops decoding for good: that frame and every
//! later byte go to the status sink as raw renderer output, and no further
//! events (QUIT included) are recognised for that renderer.

use crate::dispatch::KeyRouter;
use crate::netstring::{self, NetstringError};
use crate::protocol::{parse_stderr_event, StderrEvent};
use crate::status::StatusSink;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

/// Signals from a renderer's stderr that the session owner acts on.
///
/// `generation` identifies the renderer instance so that events from a
/// torn-down renderer are ignored after a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Disconnect { generation: u64, reason: String },
    RendererQuit { generation: u64, reason: String },
    StreamClosed { generation: u64 },
}

impl SessionEvent {
    pub fn generation(&self) -> u64 {
        match self {
            SessionEvent::Disconnect { generation, .. }
            | SessionEvent::RendererQuit { generation, .. }
            | SessionEvent::StreamClosed { generation } => *generation,
        }
    }
}

/// Everything the stderr reader hands its output to.
#[derive(Clone)]
pub struct StderrContext {
    pub events: mpsc::UnboundedSender<SessionEvent>,
    pub keys: KeyRouter,
    pub status: Arc<dyn StatusSink>,
}

/// Read one renderer's stderr to the end.
///
/// Frames that decode to a `PLATYPLATY` event are acted on; every other
/// payload is written through unmodified. After a malformed frame the
/// stream is no longer trusted to be framed and the rest of it is passed
/// through raw.
pub async fn monitor_stderr<R>(
    mut reader: R,
    generation: u64,
    quit_announced: Arc<AtomicBool>,
    ctx: StderrContext,
) where
    R: AsyncRead + Unpin,
{
    let mut buffer: Vec<u8> = Vec::new();
    let mut raw = false;
    let mut chunk = [0u8; 4096];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!("renderer stderr read failed: {}", e);
                break;
            }
        };

        if raw {
            ctx.status
                .renderer_output(&String::from_utf8_lossy(&chunk[..n]));
            continue;
        }

        buffer.extend_from_slice(&chunk[..n]);
        loop {
            let decoded = match netstring::decode(&buffer) {
                Ok((payload, rest)) => Ok((payload, rest.len())),
                Err(e) => Err(e),
            };
            match decoded {
                Ok((payload, remaining)) => {
                    let consumed = buffer.len() - remaining;
                    buffer.drain(..consumed);
                    handle_payload(&payload, generation, &quit_announced, &ctx);
                }
                Err(NetstringError::Incomplete) => break,
                Err(e) => {
                    tracing::warn!("Malformed renderer stderr, passing the rest through: {}", e);
                    ctx.status
                        .renderer_output(&String::from_utf8_lossy(&buffer));
                    buffer.clear();
                    raw = true;
                    break;
                }
            }
        }
    }

    if !buffer.is_empty() {
        ctx.status
            .renderer_output(&String::from_utf8_lossy(&buffer));
    }

    tracing::debug!(generation, "renderer stderr closed");
    let _ = ctx.events.send(SessionEvent::StreamClosed { generation });
}

fn handle_payload(
    payload: &str,
    generation: u64,
    quit_announced: &AtomicBool,
    ctx: &StderrContext,
) {
    let Some(event) = parse_stderr_event(payload) else {
        ctx.status.renderer_output(payload);
        return;
    };

    match event {
        StderrEvent::KeyPressed { key } => {
            tracing::trace!(key = %key, "renderer key");
            ctx.keys.handle_key(&key);
        }
        StderrEvent::AudioError { reason } => {
            tracing::warn!("Renderer audio error, continuing without audio: {}", reason);
        }
        StderrEvent::Disconnect { reason } => {
            tracing::info!("Renderer disconnected: {}", reason);
            let _ = ctx
                .events
                .send(SessionEvent::Disconnect { generation, reason });
        }
        StderrEvent::Quit { reason } => {
            tracing::info!("Renderer quitting: {}", reason);
            quit_announced.store(true, Ordering::Release);
            let _ = ctx
                .events
                .send(SessionEvent::RendererQuit { generation, reason });
        }
    }
}
