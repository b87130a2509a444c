//! Error types for prdloop
//!
//! Centralized error handling using thiserror.
//!
//! Fatal classes (`PrdNotFound`, `Parse`, `Launch`, `Io`) unwind to the top of
//! the loop controller and end the run. A non-zero agent exit is not an error
//! here; it is recorded on the iteration and the loop continues.

use std::path::PathBuf;
use thiserror::Error;

/// All error types that can occur in prdloop
#[derive(Debug, Error)]
pub enum PrdloopError {
    /// The backlog file does not exist
    #[error("PRD file not found: {}", .0.display())]
    PrdNotFound(PathBuf),

    /// The backlog (or completed log) contains malformed JSON
    #[error("Malformed JSON in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The agent binary could not be launched at all
    #[error("Failed to launch agent '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The agent supervisor task failed (panic or runtime shutdown)
    #[error("Agent supervision error: {0}")]
    Agent(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for prdloop operations
pub type Result<T> = std::result::Result<T, PrdloopError>;
