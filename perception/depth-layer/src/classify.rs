//! Per-pixel marking and clearing classification.

use glam::Vec3;
use rayon::prelude::*;

use crate::config::DepthLayerConfig;
use crate::ground::GroundPlane;
use crate::reproject::{PointGrid, is_valid_point};

/// Per-axis difference below which a neighbour agrees with the centre point (m).
pub const NEIGHBOR_TOLERANCE: f32 = 0.1;

/// Agreeing neighbours (of 8) required to keep a marking point.
pub const MIN_CONSISTENT_NEIGHBORS: usize = 7;

const NEIGHBOR_OFFSETS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Border rows and columns excluded from marking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SkipMargins {
    /// Rows from the top.
    pub top: usize,
    /// Rows from the bottom.
    pub bottom: usize,
    /// Columns from the left.
    pub left: usize,
    /// Columns from the right.
    pub right: usize,
}

impl SkipMargins {
    /// Creates margins.
    #[must_use]
    pub const fn new(top: usize, bottom: usize, left: usize, right: usize) -> Self {
        Self {
            top,
            bottom,
            left,
            right,
        }
    }

    /// Returns true if `(row, col)` lies in the margin of a `rows` x `cols` image.
    #[must_use]
    pub const fn contains(&self, row: usize, col: usize, rows: usize, cols: usize) -> bool {
        row < self.top
            || row >= rows.saturating_sub(self.bottom)
            || col < self.left
            || col >= cols.saturating_sub(self.right)
    }
}

/// Clearing and marking points of one frame, in row-major order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    /// Free-space evidence.
    pub clearing: Vec<Vec3>,
    /// Obstacle evidence.
    pub marking: Vec<Vec3>,
}

/// Splits a point grid into clearing and marking points.
///
/// For each cell, in order: invalid points are skipped; with
/// `clear_with_skipped_rays` the point is added to clearing before the
/// margin check; margin cells stop there; otherwise the point is added to
/// clearing; points within `observations_threshold` of the ground plane
/// stop there; remaining points are marked if at least
/// [`MIN_CONSISTENT_NEIGHBORS`] of their 8 neighbours agree.
///
/// # Example
///
/// ```
/// use depth_layer::{GroundPlane, PointClassifier, PointGrid, SkipMargins};
/// use glam::Vec3;
/// use sensor_types::{FrameId, Timestamp};
///
/// let points = (0..9)
///     .map(|i| Vec3::new(0.01 * (i % 3 + 1) as f32, 0.01 * (i / 3 + 1) as f32, 1.0))
///     .collect();
/// let grid = PointGrid::new(3, 3, FrameId::new("cam"), Timestamp::zero(), points).unwrap();
///
/// let classifier = PointClassifier::new(SkipMargins::default(), false, 0.05);
/// let out = classifier.classify(&grid, &GroundPlane::new(0.0, -1.0, 0.0, 1.5));
/// assert_eq!(out.clearing.len(), 9);
/// assert_eq!(out.marking.len(), 1); // only the centre has 8 neighbours
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointClassifier {
    margins: SkipMargins,
    clear_with_skipped_rays: bool,
    observations_threshold: f64,
}

impl PointClassifier {
    /// Creates a classifier.
    #[must_use]
    pub const fn new(
        margins: SkipMargins,
        clear_with_skipped_rays: bool,
        observations_threshold: f64,
    ) -> Self {
        Self {
            margins,
            clear_with_skipped_rays,
            observations_threshold,
        }
    }

    /// Creates a classifier from the layer configuration.
    #[must_use]
    pub const fn from_config(config: &DepthLayerConfig) -> Self {
        Self::new(
            SkipMargins::new(
                config.skip_rays_top,
                config.skip_rays_bottom,
                config.skip_rays_left,
                config.skip_rays_right,
            ),
            config.clear_with_skipped_rays,
            config.observations_separation_threshold,
        )
    }

    /// Classifies every cell of `grid` against `plane`.
    ///
    /// `plane` should not be [`GroundPlane::NULL`]; every point lies
    /// "on" the null plane and nothing would be marked.
    #[must_use]
    pub fn classify(&self, grid: &PointGrid, plane: &GroundPlane) -> Classification {
        let rows: Vec<Classification> = (0..grid.rows())
            .into_par_iter()
            .map(|row| self.classify_row(grid, plane, row))
            .collect();

        let mut out = Classification {
            clearing: Vec::with_capacity(rows.iter().map(|r| r.clearing.len()).sum()),
            marking: Vec::with_capacity(rows.iter().map(|r| r.marking.len()).sum()),
        };
        for row in rows {
            out.clearing.extend(row.clearing);
            out.marking.extend(row.marking);
        }
        out
    }

    fn classify_row(&self, grid: &PointGrid, plane: &GroundPlane, row: usize) -> Classification {
        let (rows, cols) = (grid.rows(), grid.cols());
        let mut out = Classification::default();

        for col in 0..cols {
            let Some(point) = grid.get(row, col).filter(|p| is_valid_point(*p)) else {
                continue;
            };

            if self.clear_with_skipped_rays {
                out.clearing.push(point);
            }
            if self.margins.contains(row, col, rows, cols) {
                continue;
            }
            if !self.clear_with_skipped_rays {
                out.clearing.push(point);
            }

            if f64::from(plane.distance(point)) <= self.observations_threshold {
                continue;
            }

            if consistent_neighbors(grid, row, col, point) >= MIN_CONSISTENT_NEIGHBORS {
                out.marking.push(point);
            }
        }
        out
    }
}

/// Counts valid neighbours within [`NEIGHBOR_TOLERANCE`] of `center` on every axis.
///
/// Neighbours outside the grid count as invalid.
#[must_use]
pub fn consistent_neighbors(grid: &PointGrid, row: usize, col: usize, center: Vec3) -> usize {
    NEIGHBOR_OFFSETS
        .iter()
        .filter_map(|&(dr, dc)| grid.valid_at(row, col, dr, dc))
        .filter(|n| (*n - center).abs().max_element() < NEIGHBOR_TOLERANCE)
        .count()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::cast_precision_loss
)]
mod tests {
    use super::*;
    use sensor_types::{FrameId, Timestamp};

    const FAR_FLOOR: GroundPlane = GroundPlane::new(0.0, -1.0, 0.0, 1.5);

    /// Flat patch at depth 1 with small, never-zero lateral coordinates.
    fn flat(rows: usize, cols: usize) -> Vec<Vec3> {
        (0..rows * cols)
            .map(|i| {
                let (r, c) = (i / cols, i % cols);
                Vec3::new(0.01 * (c + 1) as f32, 0.01 * (r + 1) as f32, 1.0)
            })
            .collect()
    }

    fn grid(rows: usize, cols: usize, points: Vec<Vec3>) -> PointGrid {
        PointGrid::new(rows, cols, FrameId::new("cam"), Timestamp::zero(), points).unwrap()
    }

    #[test]
    fn margins_contain_borders() {
        let m = SkipMargins::new(1, 2, 1, 1);
        assert!(m.contains(0, 3, 6, 6));
        assert!(m.contains(4, 3, 6, 6));
        assert!(m.contains(5, 3, 6, 6));
        assert!(m.contains(2, 0, 6, 6));
        assert!(m.contains(2, 5, 6, 6));
        assert!(!m.contains(3, 3, 6, 6));
        // Margins wider than the image cover everything.
        assert!(SkipMargins::new(0, 10, 0, 0).contains(0, 0, 4, 4));
    }

    #[test]
    fn uniform_patch_marks_interior() {
        let g = grid(5, 5, flat(5, 5));
        let out = PointClassifier::new(SkipMargins::default(), false, 0.05).classify(&g, &FAR_FLOOR);
        assert_eq!(out.clearing.len(), 25);
        assert_eq!(out.clearing, g.points());
        // Interior 3x3 has 8 neighbours; edges have 5 and corners 3.
        assert_eq!(out.marking.len(), 9);
        assert_eq!(out.marking[0], g.get(1, 1).unwrap());
        assert_eq!(out.marking[8], g.get(3, 3).unwrap());
    }

    #[test]
    fn floor_points_are_not_marked() {
        let points: Vec<Vec3> = flat(5, 5)
            .into_iter()
            .map(|p| Vec3::new(p.x, 1.5, p.y + 1.0))
            .collect();
        let g = grid(5, 5, points);
        let out = PointClassifier::new(SkipMargins::default(), false, 0.05).classify(&g, &FAR_FLOOR);
        assert_eq!(out.clearing.len(), 25);
        assert!(out.marking.is_empty());
    }

    #[test]
    fn margin_rays_clear_only_when_enabled() {
        let g = grid(5, 5, flat(5, 5));
        let margins = SkipMargins::new(1, 1, 1, 1);

        let out = PointClassifier::new(margins, false, 0.05).classify(&g, &FAR_FLOOR);
        assert_eq!(out.clearing.len(), 9);
        assert_eq!(out.marking.len(), 9);

        let out = PointClassifier::new(margins, true, 0.05).classify(&g, &FAR_FLOOR);
        assert_eq!(out.clearing.len(), 25);
        assert_eq!(out.marking.len(), 9);
    }

    #[test]
    fn isolated_point_is_noise() {
        let mut points = vec![Vec3::NAN; 9];
        points[4] = Vec3::new(0.1, 0.1, 1.0);
        let g = grid(3, 3, points);
        let out = PointClassifier::new(SkipMargins::default(), false, 0.05).classify(&g, &FAR_FLOOR);
        assert_eq!(out.clearing.len(), 1);
        assert!(out.marking.is_empty());
    }

    #[test]
    fn seven_of_eight_is_enough() {
        let mut points = flat(3, 3);
        points[0] = Vec3::new(0.01, 0.01, 1.5); // too far on z
        let g = grid(3, 3, points.clone());
        assert_eq!(consistent_neighbors(&g, 1, 1, points[4]), 7);
        let out = PointClassifier::new(SkipMargins::default(), false, 0.05).classify(&g, &FAR_FLOOR);
        assert_eq!(out.marking, vec![points[4]]);

        points[2] = Vec3::NAN;
        let g = grid(3, 3, points.clone());
        assert_eq!(consistent_neighbors(&g, 1, 1, points[4]), 6);
        let out = PointClassifier::new(SkipMargins::default(), false, 0.05).classify(&g, &FAR_FLOOR);
        assert!(out.marking.is_empty());
    }

    #[test]
    fn distant_neighbor_disagrees() {
        let center = Vec3::new(0.5, 0.5, 1.0);
        let mut points = vec![center; 9];
        points[1] = center + Vec3::new(0.0, 0.0, 0.25);
        let g = grid(3, 3, points);
        assert_eq!(consistent_neighbors(&g, 1, 1, center), 7);
    }

    #[test]
    fn from_config_reads_margins() {
        let config = DepthLayerConfig::default()
            .with_skip_rays(1, 2, 3, 4)
            .with_clear_with_skipped_rays(true);
        let classifier = PointClassifier::from_config(&config);
        assert_eq!(classifier.margins, SkipMargins::new(1, 2, 3, 4));
        assert!(classifier.clear_with_skipped_rays);
        assert_eq!(classifier.observations_threshold, 0.06);
    }
}
