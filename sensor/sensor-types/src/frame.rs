//! Coordinate frame identifiers for sensor data.
//!
//! All sensor readings name the frame their data is expressed in, enabling
//! pose lookups in `sensor-fusion`.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Name of a coordinate frame (e.g., `base_link`, `head_camera_depth_optical_frame`).
///
/// # Example
///
/// ```
/// use sensor_types::FrameId;
///
/// let frame = FrameId::new("head_camera_depth_optical_frame");
/// assert_eq!(frame.as_str(), "head_camera_depth_optical_frame");
/// assert!(!frame.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct FrameId(String);

impl FrameId {
    /// Creates a frame identifier.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the frame name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if no frame name was set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FrameId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for FrameId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for FrameId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_id_display() {
        let frame = FrameId::from("base_link");
        assert_eq!(frame.to_string(), "base_link");
    }

    #[test]
    fn frame_id_default_is_empty() {
        assert!(FrameId::default().is_empty());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn frame_id_serializes_as_string() {
        let json = serde_json::to_string(&FrameId::new("camera")).ok();
        assert_eq!(json.as_deref(), Some("\"camera\""));
    }
}
