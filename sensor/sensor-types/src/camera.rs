//! Camera calibration types.
//!
//! Provides the calibration event published next to a depth stream and the
//! pinhole intrinsics derived from it.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{FrameId, Result, SensorError, Timestamp};

/// Camera intrinsic parameters (pinhole model, no distortion).
///
/// Projects a 3D point `[X, Y, Z]` in the optical frame to pixel coordinates:
/// ```text
/// u = fx * X/Z + cx
/// v = fy * Y/Z + cy
/// ```
///
/// # Example
///
/// ```
/// use sensor_types::CameraIntrinsics;
///
/// let intrinsics = CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0);
/// let p = intrinsics.unproject_depth(420.0, 240.0, 2.0);
/// assert!((p[0] - 0.4).abs() < 1e-12);
/// assert!(p[1].abs() < 1e-12);
/// assert!((p[2] - 2.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CameraIntrinsics {
    /// Focal length in pixels (x direction).
    pub fx: f64,
    /// Focal length in pixels (y direction).
    pub fy: f64,
    /// Principal point x-coordinate in pixels.
    pub cx: f64,
    /// Principal point y-coordinate in pixels.
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Creates intrinsics from explicit parameters.
    #[must_use]
    pub const fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Creates intrinsics from a single focal length and principal point
    /// reported for a sensor running with hardware binning.
    ///
    /// A positive binning factor divides focal length and principal point,
    /// restoring per-pixel units of the binned image. A factor of zero means
    /// "no binning" and the raw values are used unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::InvalidCalibration`] if the two binning axes differ.
    ///
    /// # Example
    ///
    /// ```
    /// use sensor_types::CameraIntrinsics;
    ///
    /// let k = CameraIntrinsics::from_binned(1000.0, 640.0, 480.0, 2, 2).unwrap();
    /// assert_eq!(k, CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0));
    ///
    /// assert!(CameraIntrinsics::from_binned(1000.0, 640.0, 480.0, 2, 1).is_err());
    /// ```
    pub fn from_binned(
        focal_pixels: f64,
        center_x: f64,
        center_y: f64,
        binning_x: u32,
        binning_y: u32,
    ) -> Result<Self> {
        if binning_x != binning_y {
            return Err(SensorError::invalid_calibration(format!(
                "binning_x ({binning_x}) is not equal to binning_y ({binning_y})"
            )));
        }

        if binning_x > 0 {
            let binning = f64::from(binning_x);
            let focal = focal_pixels / binning;
            Ok(Self::new(
                focal,
                focal,
                center_x / binning,
                center_y / binning,
            ))
        } else {
            Ok(Self::new(focal_pixels, focal_pixels, center_x, center_y))
        }
    }

    /// Projects a 3D point to 2D pixel coordinates.
    ///
    /// Returns `None` if the point is behind the camera (Z <= 0).
    #[must_use]
    pub fn project(&self, point: [f64; 3]) -> Option<[f64; 2]> {
        let [x, y, z] = point;
        if z <= 0.0 {
            return None;
        }
        Some([self.fx * x / z + self.cx, self.fy * y / z + self.cy])
    }

    /// Back-projects pixel `(u, v)` at depth `z` into the optical frame.
    ///
    /// A zero focal length or a non-finite depth yields `[NaN; 3]`.
    #[must_use]
    pub fn unproject_depth(&self, u: f64, v: f64, z: f64) -> [f64; 3] {
        if self.fx == 0.0 || self.fy == 0.0 || !z.is_finite() {
            return [f64::NAN; 3];
        }
        [(u - self.cx) * z / self.fx, (v - self.cy) * z / self.fy, z]
    }
}

/// Calibration event published alongside a depth stream.
///
/// Mirrors the layout of a ROS `CameraInfo`: the 3x4 projection matrix is
/// row-major, so focal length is `projection[0]` and the principal point is
/// `(projection[2], projection[6])`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CameraInfo {
    /// Optical frame of the camera.
    pub frame: FrameId,
    /// Time the calibration was published.
    pub timestamp: Timestamp,
    /// Full-resolution image width in pixels.
    pub width: u32,
    /// Full-resolution image height in pixels.
    pub height: u32,
    /// Row-major 3x4 projection matrix.
    pub projection: [f64; 12],
    /// Horizontal binning factor (0 or 1 means none).
    pub binning_x: u32,
    /// Vertical binning factor (0 or 1 means none).
    pub binning_y: u32,
}

impl CameraInfo {
    /// Builds a calibration event for an unbinned pinhole camera.
    #[must_use]
    pub fn pinhole(frame: FrameId, width: u32, height: u32, focal: f64, cx: f64, cy: f64) -> Self {
        Self {
            frame,
            timestamp: Timestamp::zero(),
            width,
            height,
            projection: [
                focal, 0.0, cx, 0.0, //
                0.0, focal, cy, 0.0, //
                0.0, 0.0, 1.0, 0.0,
            ],
            binning_x: 0,
            binning_y: 0,
        }
    }

    /// Sets the binning factors.
    #[must_use]
    pub const fn with_binning(mut self, binning_x: u32, binning_y: u32) -> Self {
        self.binning_x = binning_x;
        self.binning_y = binning_y;
        self
    }

    /// Focal length in pixels, before binning is applied.
    #[must_use]
    pub const fn focal_pixels(&self) -> f64 {
        self.projection[0]
    }

    /// Principal point `(cx, cy)` in pixels, before binning is applied.
    #[must_use]
    pub const fn principal_point(&self) -> (f64, f64) {
        (self.projection[2], self.projection[6])
    }

    /// Derives per-pixel intrinsics, applying binning.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::InvalidCalibration`] if the binning axes differ.
    pub fn intrinsics(&self) -> Result<CameraIntrinsics> {
        let (cx, cy) = self.principal_point();
        CameraIntrinsics::from_binned(
            self.focal_pixels(),
            cx,
            cy,
            self.binning_x,
            self.binning_y,
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn binning_divides_parameters() {
        let k = CameraIntrinsics::from_binned(525.0, 319.5, 239.5, 4, 4).unwrap();
        assert_relative_eq!(k.fx, 131.25);
        assert_relative_eq!(k.fy, 131.25);
        assert_relative_eq!(k.cx, 79.875);
        assert_relative_eq!(k.cy, 59.875);
    }

    #[test]
    fn zero_binning_keeps_raw_values() {
        let k = CameraIntrinsics::from_binned(525.0, 319.5, 239.5, 0, 0).unwrap();
        assert_eq!(k, CameraIntrinsics::new(525.0, 525.0, 319.5, 239.5));
    }

    #[test]
    fn unequal_binning_rejected() {
        let err = CameraIntrinsics::from_binned(525.0, 319.5, 239.5, 2, 1).unwrap_err();
        assert!(matches!(err, SensorError::InvalidCalibration(_)));
    }

    #[test]
    fn project_round_trips_unproject() {
        let k = CameraIntrinsics::new(500.0, 480.0, 320.0, 240.0);
        let p = k.unproject_depth(100.0, 50.0, 3.0);
        let pixel = k.project(p).unwrap();
        assert_relative_eq!(pixel[0], 100.0, epsilon = 1e-9);
        assert_relative_eq!(pixel[1], 50.0, epsilon = 1e-9);
        assert!(k.project([0.0, 0.0, -1.0]).is_none());
    }

    #[test]
    fn unproject_invalid_inputs() {
        let k = CameraIntrinsics::new(0.0, 0.0, 2.0, 2.0);
        assert!(k.unproject_depth(1.0, 1.0, 1.0)[0].is_nan());

        let k = CameraIntrinsics::new(500.0, 500.0, 2.0, 2.0);
        assert!(k.unproject_depth(1.0, 1.0, f64::NAN)[2].is_nan());
        assert!(k.unproject_depth(1.0, 1.0, f64::INFINITY)[2].is_nan());
    }

    #[test]
    fn camera_info_reads_projection() {
        let info = CameraInfo::pinhole(FrameId::new("cam"), 640, 480, 570.0, 320.0, 240.0)
            .with_binning(2, 2);
        assert_eq!(info.focal_pixels(), 570.0);
        assert_eq!(info.principal_point(), (320.0, 240.0));
        let k = info.intrinsics().unwrap();
        assert_relative_eq!(k.fx, 285.0);
        assert_relative_eq!(k.cy, 120.0);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn intrinsics_serialization() {
        let k = CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0);
        let json = serde_json::to_string(&k).ok();
        assert!(json.is_some());
    }
}
