//! Centralized error type for the platyplaty umbrella crate.
//!
//! Wraps the session errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Session(#[from] platyplaty_session::SessionError),

    #[error("No Tokio runtime: {0}")]
    NoRuntime(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
