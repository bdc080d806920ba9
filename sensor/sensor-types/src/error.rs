//! Error types for sensor operations.

use thiserror::Error;

/// Errors that can occur when working with sensor data.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SensorError {
    /// Buffer size mismatch (e.g., depth buffer wrong size).
    #[error("buffer size mismatch: expected {expected}, got {actual}")]
    BufferSizeMismatch {
        /// Expected buffer size.
        expected: usize,
        /// Actual buffer size.
        actual: usize,
    },

    /// Row stride shorter than one row of pixels, or too large to address
    /// the whole image.
    #[error("row step {step} is invalid for rows of {row_bytes} bytes")]
    InvalidStep {
        /// Declared row step in bytes.
        step: usize,
        /// Bytes needed for one row.
        row_bytes: usize,
    },

    /// Image has a zero dimension.
    #[error("invalid image dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
    },

    /// The encoding name cannot be interpreted as depth.
    #[error("unsupported depth encoding: {0}")]
    UnsupportedEncoding(String),

    /// Calibration is internally inconsistent.
    #[error("invalid calibration: {0}")]
    InvalidCalibration(String),
}

impl SensorError {
    /// Creates a buffer size mismatch error.
    #[must_use]
    pub const fn buffer_mismatch(expected: usize, actual: usize) -> Self {
        Self::BufferSizeMismatch { expected, actual }
    }

    /// Creates an invalid calibration error.
    #[must_use]
    pub fn invalid_calibration(reason: impl Into<String>) -> Self {
        Self::InvalidCalibration(reason.into())
    }
}

/// Result type for sensor operations.
pub type Result<T> = std::result::Result<T, SensorError>;
