//! # Platyplaty - Music Visualizer Controller
//!
//! Drives an external visualizer renderer: starts it on demand, feeds it
//! presets from a playlist, and keeps going when a preset crashes it.
//!
//! ## Architecture
//!
//! Platyplaty is an umbrella crate over:
//! - **platyplaty-session** - Renderer session controller (wire protocol,
//!   subprocess supervision, command queue, crash recovery, autoplay)
//!
//! [`Platyplaty`] wires the session pieces into running background tasks
//! and owns the startup and shutdown sequences.
//!
//! ## Quick Start
//!
//! ```ignore
//! use platyplaty::prelude::*;
//!
//! let app = Platyplaty::builder()
//!     .playlist(vec!["/presets/a.milk".into(), "/presets/b.milk".into()])
//!     .preset_duration(20)
//!     .fullscreen(true)
//!     .build()?;
//!
//! app.install_signal_handlers();
//! app.start().await?;
//! app.toggle_autoplay().await;
//! app.wait_for_shutdown().await;
//! ```

/// Re-export of platyplaty-session for direct access
pub use platyplaty_session as session;

pub use platyplaty_session::{
    AdvanceOutcome, BadPresetRegistry, Command, CrashReport, KeyAction, Playlist, Preset,
    RendererKeybindings, SessionConfig, SessionError, SharedPlaylist, StatusSink,
    TracingStatusSink, TransitionType, IDLE_URL,
};

mod error;
pub use error::{Error, Result};

mod builder;
mod engine;

pub use builder::PlatyplatyBuilder;
pub use engine::{Platyplaty, StartupOutcome};

/// Convenience prelude for common imports
pub mod prelude {
    // Main engine
    pub use crate::{Platyplaty, PlatyplatyBuilder, StartupOutcome};

    // Essential types
    pub use crate::session::{Preset, SessionConfig, TransitionType};

    // Errors
    pub use crate::{Error, Result, SessionError};
}
