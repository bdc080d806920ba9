//! Error types for the depth layer.
//!
//! Every variant drops at most the current frame (or, for
//! [`DepthLayerError::SinkConversion`], one observation set of it).

use sensor_types::SensorError;
use thiserror::Error;

use crate::ground::EstimationError;
use crate::sink::ObservationKind;

/// Errors produced while turning depth frames into observations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DepthLayerError {
    /// A calibration update was rejected; the previous intrinsics remain.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A depth frame arrived before any usable calibration.
    #[error("camera intrinsics not yet received")]
    NotReady,

    /// The depth buffer could not be interpreted.
    #[error("failed to decode depth frame: {0}")]
    Decode(#[from] SensorError),

    /// No usable ground plane for this frame.
    #[error("ground plane not found: {0}")]
    GroundPlaneNotFound(#[from] EstimationError),

    /// One observation set could not be converted to its outbound form.
    #[error("failed to convert {kind} observations: {reason}")]
    SinkConversion {
        /// Which set was dropped.
        kind: ObservationKind,
        /// Why the conversion failed.
        reason: String,
    },

    /// The layer configuration is inconsistent.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl DepthLayerError {
    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    /// Creates a sink conversion error.
    #[must_use]
    pub fn sink_conversion(kind: ObservationKind, reason: impl Into<String>) -> Self {
        Self::SinkConversion {
            kind,
            reason: reason.into(),
        }
    }

    /// Creates an invalid config error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Returns true for drops that are part of normal operation.
    ///
    /// Missing intrinsics at startup and frames without a visible floor
    /// are expected and logged at debug level.
    #[must_use]
    pub const fn is_expected(&self) -> bool {
        matches!(self, Self::NotReady | Self::GroundPlaneNotFound(_))
    }
}

/// Result type for depth layer operations.
pub type Result<T> = std::result::Result<T, DepthLayerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_wraps_sensor_error() {
        let err: DepthLayerError = SensorError::buffer_mismatch(16, 10).into();
        assert!(err.to_string().starts_with("failed to decode depth frame"));
        assert!(!err.is_expected());
    }

    #[test]
    fn ground_plane_errors_are_expected() {
        let err: DepthLayerError = EstimationError::NoMatchingCandidate.into();
        assert!(err.is_expected());
        assert!(DepthLayerError::NotReady.is_expected());
    }

    #[test]
    fn sink_conversion_names_the_set() {
        let err = DepthLayerError::sink_conversion(ObservationKind::Marking, "non-finite point");
        assert_eq!(
            err.to_string(),
            "failed to convert marking observations: non-finite point"
        );
    }

    #[test]
    fn configuration_message() {
        let err = DepthLayerError::configuration("binning_x (2) is not equal to binning_y (1)");
        assert!(err.to_string().contains("binning_x (2)"));
    }
}
