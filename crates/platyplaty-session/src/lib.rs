//! Renderer session controller for platyplaty
//!
//! Drives an external visualizer renderer over a Unix socket: spawns it,
//! waits for its `SOCKET READY` handshake, sends netstring-framed JSON
//! commands strictly one at a time, reads diagnostic events off its stderr,
//! and recovers when it crashes by quarantining the preset that was loaded.
//!
//! ## Pieces
//!
//! - [`WireClient`]: single-flight request/response over one connection
//! - [`RendererSession`]: subprocess, connection and stderr reader as a unit
//! - [`CommandConsumer`]: the one task allowed to talk to the renderer
//! - [`Autoplay`]: timed playlist advance that skips unplayable presets
//! - [`handle_renderer_crash`]: quarantine and teardown after a crash
//!
//! ## Usage
//!
//! ```ignore
//! use platyplaty_session::{command_queue, Command, Preset, TransitionType};
//!
//! let (queue, rx) = command_queue();
//! // hand `rx` to a CommandConsumer, then:
//! queue
//!     .request(Command::load_preset(&Preset::file("/p/a.milk"), TransitionType::Soft))
//!     .await?;
//! ```

pub mod error;
pub use error::{Result, SessionError, StartupStage};

pub mod netstring;
pub use netstring::{NetstringError, MAX_PAYLOAD_SIZE};

pub mod protocol;
pub use protocol::{
    Command, CommandResponse, Preset, SessionConfig, StderrEvent, TransitionType, IDLE_URL,
};

mod transport;
pub use transport::{MessageTransport, TransportListener};

mod client;
pub use client::WireClient;

mod process;
pub use process::{locate_renderer, RendererProcess, RENDERER_BINARY_NAME, RENDERER_ENV};

mod socket_path;
pub use socket_path::{check_stale_socket, compute_socket_path, compute_socket_path_with};

mod stderr;
pub use stderr::{monitor_stderr, SessionEvent, StderrContext};

mod registry;
pub use registry::{resolve_preset_path, BadPresetRegistry};

mod status;
pub use status::{MemoryStatusSink, StatusMessage, StatusSink, TracingStatusSink};

mod playlist;
pub use playlist::{Playlist, SharedPlaylist};

mod dispatch;
pub use dispatch::{
    build_renderer_dispatch_table, DispatchTable, KeyAction, KeyHandler, KeyRouter,
    RendererKeyHandler, RendererKeybindings,
};

mod queue;
pub use queue::{command_queue, CommandQueue, PendingKeys, QueueItem, Reply, ShutdownSignal};

mod session;
pub use session::RendererSession;

mod crash;
pub use crash::{handle_renderer_crash, CrashContext, CrashReport, CRASH_MESSAGE};

mod autoplay;
pub use autoplay::{
    find_next_playable, is_playable, AdvanceOutcome, Autoplay, PresetLoader,
    EMPTY_PLAYLIST_MESSAGE, NO_PLAYABLE_MESSAGE,
};

mod consumer;
pub use consumer::{CommandConsumer, START_FAILED_MESSAGE};

#[doc(hidden)]
pub mod server;
