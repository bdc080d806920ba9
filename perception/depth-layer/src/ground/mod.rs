//! Ground plane estimation.
//!
//! Two interchangeable strategies produce a [`GroundPlane`] in the camera's
//! optical frame:
//!
//! - [`ClusteringStrategy`] segments the point grid into planar regions and
//!   picks the first one facing up
//! - [`PoseLookupStrategy`] derives the floor from the robot's current
//!   base-to-camera transform
//!
//! The strategy is fixed when the [`GroundPlaneEstimator`] is built.

mod normals;
mod pose;
mod segment;

pub use normals::estimate_normals;
pub use pose::{PoseSource, StaticPose};
pub use segment::{PlaneCandidate, PlaneSegmenter};

use std::fmt;
use std::sync::Arc;

use glam::Vec3;
use sensor_fusion::FusionError;
use sensor_types::FrameId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::{DepthLayerConfig, PlaneSegmentationParams};
use crate::reproject::PointGrid;

/// Expected floor normal in optical coordinates (y points down).
pub const FLOOR_NORMAL: Vec3 = Vec3::new(0.0, -1.0, 0.0);

/// Plane `a*x + b*y + c*z + d = 0` in the camera frame.
///
/// The all-zero plane is a sentinel meaning "no plane".
///
/// # Example
///
/// ```
/// use depth_layer::GroundPlane;
/// use glam::Vec3;
///
/// // Floor 1.5 m below the camera.
/// let floor = GroundPlane::new(0.0, -1.0, 0.0, 1.5);
/// assert!(floor.distance(Vec3::new(0.3, 1.5, 2.0)) < 1e-6);
/// assert!(GroundPlane::NULL.is_null());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GroundPlane {
    /// Normal x component.
    pub a: f32,
    /// Normal y component.
    pub b: f32,
    /// Normal z component.
    pub c: f32,
    /// Offset.
    pub d: f32,
}

impl GroundPlane {
    /// The "no plane found" sentinel.
    pub const NULL: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    /// Creates a plane from its coefficients.
    #[must_use]
    pub const fn new(a: f32, b: f32, c: f32, d: f32) -> Self {
        Self { a, b, c, d }
    }

    /// Creates a plane from a normal and offset.
    #[must_use]
    pub const fn from_normal(normal: Vec3, d: f32) -> Self {
        Self::new(normal.x, normal.y, normal.z, d)
    }

    /// Returns `(a, b, c)`.
    #[must_use]
    pub const fn normal(&self) -> Vec3 {
        Vec3::new(self.a, self.b, self.c)
    }

    /// Returns true for the exact all-zero sentinel.
    #[must_use]
    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    /// Returns `|a*x + b*y + c*z + d|`.
    ///
    /// Equal to the perpendicular distance when the normal is unit length.
    #[must_use]
    pub fn distance(&self, p: Vec3) -> f32 {
        (self.normal().dot(p) + self.d).abs()
    }

    /// Returns true if each normal component is within `threshold` of `expected`.
    #[must_use]
    pub fn is_oriented(&self, expected: Vec3, threshold: f64) -> bool {
        let diff = (self.normal() - expected).abs();
        [diff.x, diff.y, diff.z]
            .into_iter()
            .all(|d| f64::from(d) <= threshold)
    }
}

impl fmt::Display for GroundPlane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}, {})", self.a, self.b, self.c, self.d)
    }
}

/// Reasons a frame has no usable ground plane.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EstimationError {
    /// No segmented region faces up within the orientation threshold.
    #[error("no planar region matches the floor orientation")]
    NoMatchingCandidate,

    /// The base-to-camera transform is not available.
    #[error("pose unavailable: {0}")]
    PoseUnavailable(#[from] FusionError),

    /// The estimate collapsed to the all-zero plane.
    #[error("estimated plane is degenerate")]
    DegeneratePlane,

    /// Image dimensions are not multiples of the segmentation block size.
    #[error("{rows}x{cols} image is not divisible into {block_size}px blocks")]
    UnalignedImage {
        /// Image rows.
        rows: usize,
        /// Image columns.
        cols: usize,
        /// Segmentation block size.
        block_size: usize,
    },

    /// The normal grid does not match the point grid.
    #[error("normal grid has {actual} entries, expected {expected}")]
    NormalsMismatch {
        /// Pixels in the point grid.
        expected: usize,
        /// Entries in the normal grid.
        actual: usize,
    },
}

/// Finds the floor among planar regions of the image.
#[derive(Debug, Clone, Copy)]
pub struct ClusteringStrategy {
    segmenter: PlaneSegmenter,
    orientation_threshold: f64,
}

impl ClusteringStrategy {
    /// Creates the strategy.
    ///
    /// `distance_threshold` bounds how far a pixel may lie from its region's
    /// plane; `orientation_threshold` is the per-axis tolerance against
    /// [`FLOOR_NORMAL`].
    #[must_use]
    pub const fn new(
        params: PlaneSegmentationParams,
        distance_threshold: f64,
        orientation_threshold: f64,
    ) -> Self {
        Self {
            segmenter: PlaneSegmenter::new(params, distance_threshold),
            orientation_threshold,
        }
    }

    /// Returns the first segmented plane facing up.
    ///
    /// # Errors
    ///
    /// Returns [`EstimationError::UnalignedImage`] for grids the segmenter
    /// cannot tile and [`EstimationError::NoMatchingCandidate`] when no
    /// region is oriented like a floor.
    pub fn estimate(&self, grid: &PointGrid) -> Result<GroundPlane, EstimationError> {
        let normals = estimate_normals(grid);
        let candidates = self.segmenter.segment(grid, &normals)?;

        let ground = candidates
            .iter()
            .find(|c| c.plane.is_oriented(FLOOR_NORMAL, self.orientation_threshold))
            .ok_or(EstimationError::NoMatchingCandidate)?;

        debug!(
            candidates = candidates.len(),
            pixels = ground.pixel_count,
            plane = %ground.plane,
            "selected ground candidate"
        );
        Ok(ground.plane)
    }
}

/// Derives the floor from the robot's current pose.
///
/// The base frame's +z axis, rotated into the camera frame, is the plane
/// normal; the camera's height above the base origin is the offset. Both
/// come from one lookup of the latest transform.
#[derive(Clone)]
pub struct PoseLookupStrategy {
    poses: Arc<dyn PoseSource>,
    base_frame: FrameId,
}

impl fmt::Debug for PoseLookupStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoseLookupStrategy")
            .field("base_frame", &self.base_frame)
            .finish_non_exhaustive()
    }
}

impl PoseLookupStrategy {
    /// Creates the strategy.
    #[must_use]
    pub fn new(poses: Arc<dyn PoseSource>, base_frame: impl Into<FrameId>) -> Self {
        Self {
            poses,
            base_frame: base_frame.into(),
        }
    }

    /// Returns the floor plane in the grid's frame.
    ///
    /// # Errors
    ///
    /// Returns [`EstimationError::PoseUnavailable`] if the lookup fails.
    pub fn estimate(&self, grid: &PointGrid) -> Result<GroundPlane, EstimationError> {
        let base_from_camera = self.poses.latest_transform(&self.base_frame, &grid.frame)?;
        let up = base_from_camera.inverse().apply_direction(Vec3::Z);
        Ok(GroundPlane::from_normal(up, base_from_camera.translation.z))
    }
}

/// Ground plane estimator with a strategy chosen at construction.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use depth_layer::{DepthLayerConfig, GroundPlaneEstimator, StaticPose};
/// use sensor_fusion::Transform3D;
///
/// let poses = Arc::new(StaticPose::new("base_link", "cam", Transform3D::identity()));
/// let config = DepthLayerConfig::default().with_find_ground_plane(false);
/// let estimator = GroundPlaneEstimator::from_config(&config, poses);
/// assert!(matches!(estimator, GroundPlaneEstimator::PoseLookup(_)));
/// ```
#[derive(Debug, Clone)]
pub enum GroundPlaneEstimator {
    /// Planar segmentation of the depth image.
    Clustering(ClusteringStrategy),
    /// Transform lookup against the robot base.
    PoseLookup(PoseLookupStrategy),
}

impl GroundPlaneEstimator {
    /// Selects the strategy from `find_ground_plane`.
    #[must_use]
    pub fn from_config(config: &DepthLayerConfig, poses: Arc<dyn PoseSource>) -> Self {
        if config.find_ground_plane {
            Self::Clustering(ClusteringStrategy::new(
                config.segmentation,
                config.observations_separation_threshold,
                config.ground_orientation_threshold,
            ))
        } else {
            Self::PoseLookup(PoseLookupStrategy::new(poses, config.base_frame.clone()))
        }
    }

    /// Estimates the ground plane for one frame.
    ///
    /// # Errors
    ///
    /// Propagates strategy failures, and returns
    /// [`EstimationError::DegeneratePlane`] for an all-zero result so it can
    /// never reach classification.
    pub fn estimate(&self, grid: &PointGrid) -> Result<GroundPlane, EstimationError> {
        let plane = match self {
            Self::Clustering(strategy) => strategy.estimate(grid)?,
            Self::PoseLookup(strategy) => strategy.estimate(grid)?,
        };
        if plane.is_null() {
            return Err(EstimationError::DegeneratePlane);
        }
        Ok(plane)
    }
}
