//! Error types for Proptrack.

use std::time::Duration;
use thiserror::Error;

/// Main error type for Proptrack operations.
#[derive(Error, Debug)]
pub enum ProptrackError {
    /// Wrong corner count, unreadable image or video, out-of-range parameter.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Collinear or duplicate points fed to a geometric solver.
    #[error("Degenerate configuration: {0}")]
    DegenerateConfiguration(String),

    #[error("Tracker unavailable: {0}")]
    TrackerUnavailable(String),

    #[error("Tracker timed out after {0:?}")]
    TrackerTimeout(Duration),

    /// An external decode/encode/probe process exited unsuccessfully.
    #[error("{tool} failed (exit code {status:?}): {stderr}")]
    CodecToolFailure {
        tool: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProptrackError {
    /// Shorthand for a codec tool failure.
    pub fn codec(tool: impl Into<String>, status: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::CodecToolFailure {
            tool: tool.into(),
            status,
            stderr: stderr.into(),
        }
    }

    /// Errors that only affect a single frame; the job continues with a pass-through.
    pub fn is_frame_recoverable(&self) -> bool {
        matches!(self, Self::DegenerateConfiguration(_))
    }
}

/// Result type alias for Proptrack operations.
pub type Result<T> = std::result::Result<T, ProptrackError>;
