//! Integration test modules for the session controller

pub mod keys;
pub mod recovery;
pub mod session;
