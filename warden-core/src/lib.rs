//! Warden Core - shared data structures for the Warden identity service
//!
//! Defines the user/token records, the error taxonomy, configuration and
//! logging setup used by the other crates in the workspace.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use types::*;

// Re-export commonly used external types
pub use tracing;
