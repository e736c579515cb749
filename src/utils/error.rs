//! Error handling for Recorder

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Recorder
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Failed to move {path:?} after {attempts} attempt(s): {reason}")]
    MoveFailed {
        path: PathBuf,
        attempts: usize,
        reason: String,
    },

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Copy of {path:?} incomplete: expected {expected} bytes, wrote {actual}")]
    CopyIncomplete {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("Source file missing: {0:?}")]
    SourceMissing(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Event dispatcher is not running")]
    DispatcherClosed,
}
