//! Layer configuration.

use sensor_types::FrameId;
use serde::{Deserialize, Serialize};

use crate::error::{DepthLayerError, Result};

/// Plane segmentation tunables for the clustering ground estimator.
///
/// The sensor noise model is `error(z) = a*z + b*z^2 + c` meters at depth `z`.
///
/// # Example
///
/// ```
/// use depth_layer::PlaneSegmentationParams;
///
/// let params = PlaneSegmentationParams::default();
/// assert_eq!(params.block_size, 40);
/// assert!((params.sensor_error(2.0) - 0.015).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaneSegmentationParams {
    /// Linear noise coefficient.
    pub sensor_error_a: f64,
    /// Quadratic noise coefficient.
    pub sensor_error_b: f64,
    /// Constant noise term.
    pub sensor_error_c: f64,
    /// Side of the square blocks regions grow by, in pixels.
    pub block_size: usize,
    /// Smallest region kept as a plane candidate, in pixels.
    pub min_cluster_size: usize,
    /// Minimum |cos| between a pixel normal and the region normal.
    pub min_normal_cosine: f64,
}

impl Default for PlaneSegmentationParams {
    fn default() -> Self {
        Self {
            sensor_error_a: 0.0075,
            sensor_error_b: 0.0,
            sensor_error_c: 0.0,
            block_size: 40,
            min_cluster_size: 1000,
            min_normal_cosine: 0.8,
        }
    }
}

impl PlaneSegmentationParams {
    /// Expected depth noise at `depth` meters.
    #[must_use]
    pub fn sensor_error(&self, depth: f64) -> f64 {
        self.sensor_error_a * depth + self.sensor_error_b * depth * depth + self.sensor_error_c
    }

    /// Set the block size.
    #[must_use]
    pub const fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the minimum cluster size.
    #[must_use]
    pub const fn min_cluster_size(mut self, pixels: usize) -> Self {
        self.min_cluster_size = pixels;
        self
    }

    /// Set the noise model coefficients.
    #[must_use]
    pub const fn sensor_error_model(mut self, a: f64, b: f64, c: f64) -> Self {
        self.sensor_error_a = a;
        self.sensor_error_b = b;
        self.sensor_error_c = c;
        self
    }
}

/// Immutable configuration of a [`DepthLayer`](crate::DepthLayer).
///
/// Missing fields deserialize to their defaults.
///
/// # Example
///
/// ```
/// use depth_layer::DepthLayerConfig;
///
/// let config = DepthLayerConfig::default()
///     .with_skip_rays(10, 10, 5, 5)
///     .with_find_ground_plane(false);
/// assert_eq!(config.skip_rays_top, 10);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthLayerConfig {
    /// Forward observation sets to the visualization publisher.
    pub publish_observations: bool,
    /// Ground inlier distance and plane growing threshold (m).
    pub observations_separation_threshold: f64,
    /// Estimate the floor from the image instead of the robot pose.
    pub find_ground_plane: bool,
    /// Per-axis tolerance between a candidate normal and (0, -1, 0).
    pub ground_orientation_threshold: f64,
    /// Replace NaN depth with a far sentinel before reprojection.
    pub clear_nans: bool,
    /// Lowest height kept for marking, applied downstream (m).
    pub min_obstacle_height: f64,
    /// Highest height kept for marking, applied downstream (m).
    pub max_obstacle_height: f64,
    /// Lowest height kept for clearing, applied downstream (m).
    #[serde(with = "lower_bound")]
    pub min_clearing_height: f64,
    /// Highest height kept for clearing, applied downstream (m).
    #[serde(with = "upper_bound")]
    pub max_clearing_height: f64,
    /// Rows at the top excluded from marking.
    pub skip_rays_top: usize,
    /// Rows at the bottom excluded from marking.
    pub skip_rays_bottom: usize,
    /// Columns at the left excluded from marking.
    pub skip_rays_left: usize,
    /// Columns at the right excluded from marking.
    pub skip_rays_right: usize,
    /// Let border rays contribute to clearing.
    pub clear_with_skipped_rays: bool,
    /// Depth image stream name.
    pub depth_topic: String,
    /// Calibration stream name.
    pub info_topic: String,
    /// Robot frame whose +z axis points up.
    pub base_frame: FrameId,
    /// Maximum range for marking, applied downstream (m).
    pub obstacle_range: f64,
    /// Maximum range for clearing, applied downstream (m).
    pub raytrace_range: f64,
    /// Clustering estimator tunables.
    pub segmentation: PlaneSegmentationParams,
}

impl Default for DepthLayerConfig {
    fn default() -> Self {
        Self {
            publish_observations: false,
            observations_separation_threshold: 0.06,
            find_ground_plane: true,
            ground_orientation_threshold: 0.9,
            clear_nans: false,
            min_obstacle_height: 0.0,
            max_obstacle_height: 2.0,
            min_clearing_height: f64::NEG_INFINITY,
            max_clearing_height: f64::INFINITY,
            skip_rays_top: 20,
            skip_rays_bottom: 20,
            skip_rays_left: 20,
            skip_rays_right: 20,
            clear_with_skipped_rays: false,
            depth_topic: "/head_camera/depth_downsample/image_raw".to_string(),
            info_topic: "/head_camera/depth_downsample/camera_info".to_string(),
            base_frame: FrameId::new("base_link"),
            obstacle_range: 2.5,
            raytrace_range: 3.0,
            segmentation: PlaneSegmentationParams::default(),
        }
    }
}

impl DepthLayerConfig {
    /// Set whether observations are published for visualization.
    #[must_use]
    pub fn with_publish_observations(mut self, enabled: bool) -> Self {
        self.publish_observations = enabled;
        self
    }

    /// Set the ground separation threshold.
    #[must_use]
    pub fn with_observations_threshold(mut self, meters: f64) -> Self {
        self.observations_separation_threshold = meters;
        self
    }

    /// Choose the clustering (`true`) or pose-lookup (`false`) ground estimator.
    #[must_use]
    pub fn with_find_ground_plane(mut self, enabled: bool) -> Self {
        self.find_ground_plane = enabled;
        self
    }

    /// Set the ground orientation tolerance.
    #[must_use]
    pub fn with_ground_orientation_threshold(mut self, threshold: f64) -> Self {
        self.ground_orientation_threshold = threshold;
        self
    }

    /// Set whether NaN depth is replaced before reprojection.
    #[must_use]
    pub fn with_clear_nans(mut self, enabled: bool) -> Self {
        self.clear_nans = enabled;
        self
    }

    /// Set the border margins excluded from marking.
    #[must_use]
    pub fn with_skip_rays(
        mut self,
        top: usize,
        bottom: usize,
        left: usize,
        right: usize,
    ) -> Self {
        self.skip_rays_top = top;
        self.skip_rays_bottom = bottom;
        self.skip_rays_left = left;
        self.skip_rays_right = right;
        self
    }

    /// Set whether border rays contribute to clearing.
    #[must_use]
    pub fn with_clear_with_skipped_rays(mut self, enabled: bool) -> Self {
        self.clear_with_skipped_rays = enabled;
        self
    }

    /// Set the obstacle height bounds.
    #[must_use]
    pub fn with_obstacle_heights(mut self, min: f64, max: f64) -> Self {
        self.min_obstacle_height = min;
        self.max_obstacle_height = max;
        self
    }

    /// Set the clearing height bounds.
    #[must_use]
    pub fn with_clearing_heights(mut self, min: f64, max: f64) -> Self {
        self.min_clearing_height = min;
        self.max_clearing_height = max;
        self
    }

    /// Set the robot base frame.
    #[must_use]
    pub fn with_base_frame(mut self, frame: impl Into<FrameId>) -> Self {
        self.base_frame = frame.into();
        self
    }

    /// Set the plane segmentation parameters.
    #[must_use]
    pub fn with_segmentation(mut self, params: PlaneSegmentationParams) -> Self {
        self.segmentation = params;
        self
    }

    /// Checks the configuration for inconsistent values.
    ///
    /// # Errors
    ///
    /// Returns [`DepthLayerError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.observations_separation_threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(DepthLayerError::invalid_config(format!(
                "observations_separation_threshold must be finite and non-negative, got {threshold}"
            )));
        }
        if self.ground_orientation_threshold.is_nan() || self.ground_orientation_threshold < 0.0 {
            return Err(DepthLayerError::invalid_config(
                "ground_orientation_threshold must be non-negative",
            ));
        }
        if self.min_obstacle_height > self.max_obstacle_height {
            return Err(DepthLayerError::invalid_config(format!(
                "min_obstacle_height ({}) exceeds max_obstacle_height ({})",
                self.min_obstacle_height, self.max_obstacle_height
            )));
        }
        if self.min_clearing_height > self.max_clearing_height {
            return Err(DepthLayerError::invalid_config(format!(
                "min_clearing_height ({}) exceeds max_clearing_height ({})",
                self.min_clearing_height, self.max_clearing_height
            )));
        }
        for (name, range) in [
            ("obstacle_range", self.obstacle_range),
            ("raytrace_range", self.raytrace_range),
        ] {
            if range.is_nan() || range <= 0.0 {
                return Err(DepthLayerError::invalid_config(format!(
                    "{name} must be positive, got {range}"
                )));
            }
        }
        if self.base_frame.is_empty() {
            return Err(DepthLayerError::invalid_config("base_frame must not be empty"));
        }
        if self.segmentation.block_size == 0 || self.segmentation.min_cluster_size == 0 {
            return Err(DepthLayerError::invalid_config(
                "segmentation block_size and min_cluster_size must be positive",
            ));
        }
        Ok(())
    }
}

// JSON has no infinity; unbounded heights travel as `null`.
mod lower_bound {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(v: &f64, s: S) -> std::result::Result<S::Ok, S::Error> {
        v.is_finite().then_some(*v).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::NEG_INFINITY))
    }
}

mod upper_bound {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(v: &f64, s: S) -> std::result::Result<S::Ok, S::Error> {
        v.is_finite().then_some(*v).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::INFINITY))
    }
}
