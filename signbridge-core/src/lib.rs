//! Signbridge Core - shared foundation for the Signbridge CMS client
//!
//! This crate defines the error model, configuration loading and logging
//! bootstrap used by every other Signbridge crate.

pub mod config;
pub mod error;
pub mod logging;

pub use config::*;
pub use error::*;
pub use logging::*;

// Re-export commonly used external types
pub use tracing;
