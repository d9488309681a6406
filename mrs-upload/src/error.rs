//! Error types for file selection
//!
//! Network and remote-service failures live with the HTTP client
//! ([`crate::services::pipeline_client::ClientError`]).

use std::path::PathBuf;
use thiserror::Error;

/// File selection error
#[derive(Debug, Error)]
pub enum SelectionError {
    /// The platform offers no folder picker; fall back to a flat selection
    #[error("Folder picker not available on this platform")]
    UnsupportedOperation,

    /// The user dismissed the folder picker
    #[error("Folder selection cancelled")]
    Cancelled,

    /// Picked path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Reading the folder tree failed (permission denied, I/O failure)
    #[error("Failed to read {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file does not match the type expected for its field
    #[error("Validation error: {0}")]
    Validation(String),

    /// Background walk task panicked or was aborted
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for selection operations
pub type SelectionResult<T> = Result<T, SelectionError>;
