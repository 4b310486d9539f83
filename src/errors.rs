//! Status Stream Error Hierarchy
//!
//! Errors are grouped by the layer that produces them. Only configuration,
//! startup and I/O errors ever reach the caller as [`Error`]; probe and
//! session failures have their own types and are absorbed at their boundary.

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Filesystem and socket failures
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Event payload encoding failures
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// File change notification backend failures
    #[error(transparent)]
    Watch(#[from] notify::Error),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// HTTP transport or status failures
    #[error("HTTP probe request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Child process could not be spawned or exited with failure
    #[error("Command `{program}` failed: {reason}")]
    Command { program: String, reason: String },

    /// The backing service answered, but not with the expected marker
    #[error("Unexpected probe response, expected `{expected}`")]
    UnexpectedResponse { expected: String },

    /// The probe did not answer in time
    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Operation attempted on a session that already left `Active`
    #[error("Session {0} is closed")]
    Closed(u64),
}
