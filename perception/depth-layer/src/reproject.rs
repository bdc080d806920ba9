//! Depth to 3D point reprojection.

use glam::Vec3;
use rayon::prelude::*;
use sensor_types::{CameraIntrinsics, DepthMap, FrameId, SensorError, Timestamp};

use crate::error::{DepthLayerError, Result};

/// Depth assigned to missing returns when NaN clearing is enabled.
///
/// Far enough to read as free space along the whole ray.
pub const NAN_FILL_DEPTH: f32 = 25.0;

/// Returns true if every coordinate is non-zero and not NaN.
#[must_use]
pub fn is_valid_point(p: Vec3) -> bool {
    !p.is_nan() && p.x != 0.0 && p.y != 0.0 && p.z != 0.0
}

/// Row-major grid of points in the camera optical frame.
///
/// Has the same shape as the depth image it came from; invalid pixels keep
/// their slot so neighbourhoods stay addressable.
#[derive(Debug, Clone, PartialEq)]
pub struct PointGrid {
    rows: usize,
    cols: usize,
    /// Optical frame of the source camera.
    pub frame: FrameId,
    /// Acquisition time of the source frame.
    pub timestamp: Timestamp,
    points: Vec<Vec3>,
}

impl PointGrid {
    /// Builds a grid from row-major points.
    ///
    /// # Errors
    ///
    /// Returns [`DepthLayerError::Decode`] if `points.len() != rows * cols`.
    pub fn new(
        rows: usize,
        cols: usize,
        frame: FrameId,
        timestamp: Timestamp,
        points: Vec<Vec3>,
    ) -> Result<Self> {
        let expected = rows * cols;
        if points.len() != expected {
            return Err(SensorError::buffer_mismatch(expected, points.len()).into());
        }
        Ok(Self {
            rows,
            cols,
            frame,
            timestamp,
            points,
        })
    }

    /// Number of rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// All points, row-major.
    #[must_use]
    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    /// Point at `(row, col)`, or `None` outside the grid.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<Vec3> {
        if row < self.rows && col < self.cols {
            Some(self.points[row * self.cols + col])
        } else {
            None
        }
    }

    /// Point at a signed offset from `(row, col)` if it is inside the grid and valid.
    #[must_use]
    pub fn valid_at(&self, row: usize, col: usize, d_row: isize, d_col: isize) -> Option<Vec3> {
        let r = row.checked_add_signed(d_row)?;
        let c = col.checked_add_signed(d_col)?;
        self.get(r, c).filter(|p| is_valid_point(*p))
    }

    /// Counts valid points.
    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.points.iter().filter(|p| is_valid_point(**p)).count()
    }
}

/// Reprojects a decoded depth frame through the pinhole model.
///
/// With `clear_nans`, NaN depth is first replaced by [`NAN_FILL_DEPTH`].
/// Pixel `(u, v)` is column `u`, row `v`.
///
/// # Errors
///
/// Returns [`DepthLayerError::NotReady`] when `intrinsics` is `None`, and
/// [`DepthLayerError::Decode`] when `depth` does not hold one value per pixel.
///
/// # Example
///
/// ```
/// use depth_layer::convert;
/// use sensor_types::{CameraIntrinsics, DepthMap, FrameId, SensorError, Timestamp};
///
/// let depth = DepthMap::new(FrameId::new("cam"), Timestamp::zero(), 2, 1, vec![2.0, f32::NAN]);
/// let k = CameraIntrinsics::new(500.0, 500.0, 0.5, 0.5);
///
/// let grid = convert(depth.clone(), Some(&k), false).unwrap();
/// assert_eq!(grid.valid_count(), 1);
///
/// let grid = convert(depth, Some(&k), true).unwrap();
/// assert_eq!(grid.get(0, 1).map(|p| p.z), Some(25.0));
/// ```
pub fn convert(
    mut depth: DepthMap,
    intrinsics: Option<&CameraIntrinsics>,
    clear_nans: bool,
) -> Result<PointGrid> {
    let intrinsics = intrinsics.ok_or(DepthLayerError::NotReady)?;
    if clear_nans {
        depth.fill_nans(NAN_FILL_DEPTH);
    }
    reproject(&depth, intrinsics)
}

/// Back-projects every pixel of `depth` into the optical frame.
///
/// # Errors
///
/// Returns [`DepthLayerError::Decode`] if `depth.depths` is not
/// `width * height` long.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn reproject(depth: &DepthMap, intrinsics: &CameraIntrinsics) -> Result<PointGrid> {
    if !depth.has_valid_buffer_size() {
        return Err(SensorError::buffer_mismatch(depth.pixel_count(), depth.depths.len()).into());
    }
    let rows = depth.height as usize;
    let cols = depth.width as usize;

    let points: Vec<Vec3> = depth
        .depths
        .par_iter()
        .enumerate()
        .map(|(i, &z)| {
            let (row, col) = (i / cols.max(1), i % cols.max(1));
            let [x, y, z] = intrinsics.unproject_depth(col as f64, row as f64, f64::from(z));
            Vec3::new(x as f32, y as f32, z as f32)
        })
        .collect();

    Ok(PointGrid {
        rows,
        cols,
        frame: depth.frame.clone(),
        timestamp: depth.timestamp,
        points,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn map(width: u32, height: u32, depths: Vec<f32>) -> DepthMap {
        DepthMap::new(FrameId::new("cam"), Timestamp::from_nanos(7), width, height, depths)
    }

    #[test]
    fn validity_rule() {
        assert!(is_valid_point(Vec3::new(0.1, -0.2, 1.0)));
        assert!(!is_valid_point(Vec3::new(0.0, 0.2, 1.0)));
        assert!(!is_valid_point(Vec3::new(0.1, 0.0, 1.0)));
        assert!(!is_valid_point(Vec3::new(0.1, 0.2, 0.0)));
        assert!(!is_valid_point(Vec3::new(f32::NAN, 0.2, 1.0)));
    }

    #[test]
    fn pinhole_back_projection() {
        let k = CameraIntrinsics::new(500.0, 250.0, 1.0, 0.5);
        let grid = reproject(&map(3, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]), &k).unwrap();
        assert_eq!((grid.rows(), grid.cols()), (2, 3));
        assert_eq!(grid.frame.as_str(), "cam");
        assert_eq!(grid.timestamp, Timestamp::from_nanos(7));

        // row 1, col 2 at depth 6: x = (2 - 1) * 6 / 500, y = (1 - 0.5) * 6 / 250
        let p = grid.get(1, 2).unwrap();
        assert_relative_eq!(p.x, 0.012, epsilon = 1e-7);
        assert_relative_eq!(p.y, 0.012, epsilon = 1e-7);
        assert_relative_eq!(p.z, 6.0);
    }

    #[test]
    fn principal_axis_pixels_are_invalid() {
        let k = CameraIntrinsics::new(500.0, 500.0, 1.0, 1.0);
        let grid = reproject(&map(3, 3, vec![1.0; 9]), &k).unwrap();
        assert_eq!(grid.valid_count(), 4);
        assert!(!is_valid_point(grid.get(1, 0).unwrap()));
    }

    #[test]
    fn zero_focal_length_is_invalid() {
        let k = CameraIntrinsics::new(0.0, 0.0, 0.5, 0.5);
        let grid = reproject(&map(2, 2, vec![1.0; 4]), &k).unwrap();
        assert_eq!(grid.valid_count(), 0);
    }

    #[test]
    fn convert_requires_intrinsics() {
        let err = convert(map(2, 2, vec![1.0; 4]), None, false).unwrap_err();
        assert_eq!(err, DepthLayerError::NotReady);
    }

    #[test]
    fn mis_sized_depth_map_is_a_decode_error() {
        let k = CameraIntrinsics::new(500.0, 500.0, 0.5, 0.5);
        let err = convert(map(2, 2, vec![1.0; 9]), Some(&k), false).unwrap_err();
        assert_eq!(
            err,
            DepthLayerError::Decode(SensorError::buffer_mismatch(4, 9))
        );

        let err = reproject(&map(3, 2, vec![1.0; 5]), &k).unwrap_err();
        assert_eq!(
            err,
            DepthLayerError::Decode(SensorError::buffer_mismatch(6, 5))
        );
    }

    #[test]
    fn clear_nans_fills_sentinel() {
        let k = CameraIntrinsics::new(500.0, 500.0, 0.5, 0.5);
        let grid = convert(map(2, 2, vec![f32::NAN; 4]), Some(&k), true).unwrap();
        assert!(grid.points().iter().all(|p| p.z == NAN_FILL_DEPTH));
        assert_eq!(grid.valid_count(), 4);

        let grid = convert(map(2, 2, vec![f32::NAN; 4]), Some(&k), false).unwrap();
        assert_eq!(grid.valid_count(), 0);
    }

    #[test]
    fn neighbour_lookup_is_bounded() {
        let k = CameraIntrinsics::new(500.0, 500.0, 0.5, 0.5);
        let grid = reproject(&map(2, 2, vec![1.0; 4]), &k).unwrap();
        assert!(grid.valid_at(0, 0, -1, 0).is_none());
        assert!(grid.valid_at(0, 0, 0, -1).is_none());
        assert!(grid.valid_at(1, 1, 1, 0).is_none());
        assert!(grid.valid_at(0, 0, 1, 1).is_some());
    }

    #[test]
    fn grid_new_checks_length() {
        let err = PointGrid::new(2, 2, FrameId::new("cam"), Timestamp::zero(), vec![Vec3::ONE; 3]);
        assert!(matches!(err, Err(DepthLayerError::Decode(_))));
    }
}
