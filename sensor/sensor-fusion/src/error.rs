//! Error types for sensor-fusion crate.

use thiserror::Error;

/// Errors that can occur in transform lookups.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FusionError {
    /// No transform has ever mentioned this frame.
    #[error("frame not found: {0}")]
    FrameNotFound(String),

    /// Both frames are known but live in disconnected trees.
    #[error("no transform path from {source_frame} to {target_frame}")]
    NoPath {
        /// Frame the data is expressed in.
        source_frame: String,
        /// Frame the data is requested in.
        target_frame: String,
    },

    /// A transform could not be inserted.
    #[error("invalid transform: {0}")]
    InvalidTransform(String),
}

impl FusionError {
    /// Creates a frame not found error.
    #[must_use]
    pub fn frame_not_found(frame: impl Into<String>) -> Self {
        Self::FrameNotFound(frame.into())
    }

    /// Creates a no path error.
    #[must_use]
    pub fn no_path(source_frame: impl Into<String>, target_frame: impl Into<String>) -> Self {
        Self::NoPath {
            source_frame: source_frame.into(),
            target_frame: target_frame.into(),
        }
    }

    /// Creates an invalid transform error.
    #[must_use]
    pub fn invalid_transform(reason: impl Into<String>) -> Self {
        Self::InvalidTransform(reason.into())
    }
}

/// Result type for sensor fusion operations.
pub type Result<T> = std::result::Result<T, FusionError>;
