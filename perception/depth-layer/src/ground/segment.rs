//! Block-wise planar region growing.
//!
//! The image is tiled into square blocks. Blocks whose points are already
//! planar within the sensor noise model seed regions; regions then grow
//! breadth-first over 4-connected blocks, keeping pixels that lie on the
//! current plane fit and share its orientation.

use std::collections::VecDeque;

use glam::Vec3;
use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use rayon::prelude::*;
use tracing::debug;

use super::{EstimationError, GroundPlane};
use crate::config::PlaneSegmentationParams;
use crate::reproject::{PointGrid, is_valid_point};

/// Running first and second moments of a point set.
#[derive(Debug, Clone)]
pub(crate) struct PlaneAccumulator {
    count: usize,
    sum: Vector3<f64>,
    sum_outer: Matrix3<f64>,
}

impl PlaneAccumulator {
    pub(crate) fn new() -> Self {
        Self {
            count: 0,
            sum: Vector3::zeros(),
            sum_outer: Matrix3::zeros(),
        }
    }

    pub(crate) fn push(&mut self, p: Vec3) {
        let v = Vector3::new(f64::from(p.x), f64::from(p.y), f64::from(p.z));
        self.count += 1;
        self.sum += v;
        self.sum_outer += v * v.transpose();
    }

    pub(crate) const fn len(&self) -> usize {
        self.count
    }

    /// Least-squares plane through the accumulated points.
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn fit(&self) -> Option<FittedPlane> {
        if self.count < 3 {
            return None;
        }
        let n = self.count as f64;
        let mean = self.sum / n;
        let cov = self.sum_outer / n - mean * mean.transpose();

        let eigen = SymmetricEigen::new(cov);
        let eigenvalues = eigen.eigenvalues;
        let min_idx = if eigenvalues[0] <= eigenvalues[1] && eigenvalues[0] <= eigenvalues[2] {
            0
        } else if eigenvalues[1] <= eigenvalues[2] {
            1
        } else {
            2
        };

        let column = eigen.eigenvectors.column(min_idx);
        let mut normal = Vector3::new(column[0], column[1], column[2]);
        let norm = normal.norm();
        if !norm.is_finite() || norm < 1e-10 {
            return None;
        }
        normal /= norm;

        // Face the sensor origin: d >= 0.
        let mut offset = -normal.dot(&mean);
        if offset < 0.0 {
            normal = -normal;
            offset = -offset;
        }

        Some(FittedPlane {
            normal,
            offset,
            rms: eigenvalues[min_idx].max(0.0).sqrt(),
            mean_depth: mean.z,
        })
    }
}

/// Plane fit with its residual.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FittedPlane {
    normal: Vector3<f64>,
    offset: f64,
    /// Root mean square point-to-plane distance.
    rms: f64,
    mean_depth: f64,
}

impl FittedPlane {
    fn distance(&self, p: Vec3) -> f64 {
        let v = Vector3::new(f64::from(p.x), f64::from(p.y), f64::from(p.z));
        (self.normal.dot(&v) + self.offset).abs()
    }

    fn normal_agreement(&self, n: Vec3) -> f64 {
        let v = Vector3::new(f64::from(n.x), f64::from(n.y), f64::from(n.z));
        self.normal.dot(&v).abs()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn to_ground_plane(self) -> GroundPlane {
        GroundPlane::new(
            self.normal.x as f32,
            self.normal.y as f32,
            self.normal.z as f32,
            self.offset as f32,
        )
    }
}

/// A planar region found by [`PlaneSegmenter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneCandidate {
    /// Unit-normal plane facing the sensor.
    pub plane: GroundPlane,
    /// Pixels assigned to the region.
    pub pixel_count: usize,
}

/// Splits an organized point grid into planar regions.
#[derive(Debug, Clone, Copy)]
pub struct PlaneSegmenter {
    params: PlaneSegmentationParams,
    distance_threshold: f64,
}

struct Seed {
    rms: f64,
    block: usize,
    fit: FittedPlane,
}

impl PlaneSegmenter {
    /// Creates a segmenter accepting pixels within `distance_threshold` of a region plane.
    #[must_use]
    pub const fn new(params: PlaneSegmentationParams, distance_threshold: f64) -> Self {
        Self {
            params,
            distance_threshold,
        }
    }

    /// Returns candidate planes in discovery order.
    ///
    /// Seeds are visited by increasing residual, ties broken by row-major
    /// block index, so the order is deterministic for a given grid.
    ///
    /// # Errors
    ///
    /// Returns [`EstimationError::UnalignedImage`] unless both grid
    /// dimensions are non-zero multiples of the block size, and
    /// [`EstimationError::NormalsMismatch`] if `normals` does not cover the grid.
    pub fn segment(
        &self,
        grid: &PointGrid,
        normals: &[Option<Vec3>],
    ) -> Result<Vec<PlaneCandidate>, EstimationError> {
        let (rows, cols) = (grid.rows(), grid.cols());
        let block = self.params.block_size;
        if block == 0 || rows == 0 || cols == 0 || rows % block != 0 || cols % block != 0 {
            return Err(EstimationError::UnalignedImage {
                rows,
                cols,
                block_size: block,
            });
        }
        if normals.len() != rows * cols {
            return Err(EstimationError::NormalsMismatch {
                expected: rows * cols,
                actual: normals.len(),
            });
        }

        let blocks = Blocks {
            size: block,
            rows: rows / block,
            cols: cols / block,
        };

        let mut seeds: Vec<Seed> = (0..blocks.count())
            .into_par_iter()
            .filter_map(|b| self.seed(grid, &blocks, b))
            .collect();
        seeds.sort_by(|a, b| a.rms.total_cmp(&b.rms).then(a.block.cmp(&b.block)));

        let mut owned = vec![false; blocks.count()];
        let mut candidates = Vec::new();
        for seed in seeds {
            if owned[seed.block] {
                continue;
            }
            if let Some(candidate) = self.grow(grid, normals, &blocks, &seed, &mut owned) {
                candidates.push(candidate);
            }
        }

        debug!(
            rows,
            cols,
            candidates = candidates.len(),
            "plane segmentation finished"
        );
        Ok(candidates)
    }

    fn seed(&self, grid: &PointGrid, blocks: &Blocks, b: usize) -> Option<Seed> {
        let mut acc = PlaneAccumulator::new();
        for p in blocks.pixels(b).filter_map(|(r, c)| grid.valid_at(r, c, 0, 0)) {
            acc.push(p);
        }
        if acc.len() * 2 < blocks.size * blocks.size {
            return None;
        }
        let fit = acc.fit()?;
        (fit.rms <= self.params.sensor_error(fit.mean_depth)).then_some(Seed {
            rms: fit.rms,
            block: b,
            fit,
        })
    }

    fn grow(
        &self,
        grid: &PointGrid,
        normals: &[Option<Vec3>],
        blocks: &Blocks,
        seed: &Seed,
        owned: &mut [bool],
    ) -> Option<PlaneCandidate> {
        let mut region = PlaneAccumulator::new();
        let mut plane = seed.fit;
        let mut claimed = Vec::new();
        let mut queued = vec![false; blocks.count()];
        let mut queue = VecDeque::from([seed.block]);
        queued[seed.block] = true;

        while let Some(b) = queue.pop_front() {
            let mut valid = 0usize;
            let mut inliers = Vec::new();
            for (r, c) in blocks.pixels(b) {
                let Some(p) = grid.get(r, c).filter(|p| is_valid_point(*p)) else {
                    continue;
                };
                valid += 1;
                let agrees = normals[r * grid.cols() + c]
                    .is_some_and(|n| plane.normal_agreement(n) >= self.params.min_normal_cosine);
                if agrees && plane.distance(p) <= self.distance_threshold {
                    inliers.push(p);
                }
            }

            let accepted = if b == seed.block {
                !inliers.is_empty()
            } else {
                valid > 0 && inliers.len() * 2 >= valid
            };
            if !accepted {
                continue;
            }

            for p in inliers {
                region.push(p);
            }
            owned[b] = true;
            claimed.push(b);
            if let Some(refit) = region.fit() {
                plane = refit;
            }

            for next in blocks.neighbours(b) {
                if !queued[next] && !owned[next] {
                    queued[next] = true;
                    queue.push_back(next);
                }
            }
        }

        if region.len() < self.params.min_cluster_size {
            for b in claimed {
                owned[b] = false;
            }
            return None;
        }

        Some(PlaneCandidate {
            plane: plane.to_ground_plane(),
            pixel_count: region.len(),
        })
    }
}

/// Block tiling of the image.
struct Blocks {
    size: usize,
    rows: usize,
    cols: usize,
}

impl Blocks {
    const fn count(&self) -> usize {
        self.rows * self.cols
    }

    fn pixels(&self, b: usize) -> impl Iterator<Item = (usize, usize)> + use<> {
        let (size, r0, c0) = (
            self.size,
            (b / self.cols) * self.size,
            (b % self.cols) * self.size,
        );
        (r0..r0 + size).flat_map(move |r| (c0..c0 + size).map(move |c| (r, c)))
    }

    fn neighbours(&self, b: usize) -> impl Iterator<Item = usize> + use<> {
        let (rows, cols) = (self.rows, self.cols);
        let (r, c) = (b / cols, b % cols);
        [
            (r > 0).then(|| b - cols),
            (r + 1 < rows).then(|| b + cols),
            (c > 0).then(|| b - 1),
            (c + 1 < cols).then(|| b + 1),
        ]
        .into_iter()
        .flatten()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
mod tests {
    use super::*;
    use crate::ground::estimate_normals;
    use approx::assert_relative_eq;
    use sensor_types::{FrameId, Timestamp};

    #[allow(clippy::cast_precision_loss)]
    fn grid(rows: usize, cols: usize, f: impl Fn(f32, f32) -> Vec3) -> PointGrid {
        let points = (0..rows)
            .flat_map(|r| (0..cols).map(move |c| (r, c)))
            .map(|(r, c)| f(r as f32, c as f32))
            .collect();
        PointGrid::new(rows, cols, FrameId::new("cam"), Timestamp::zero(), points).unwrap()
    }

    fn floor(r: f32, c: f32) -> Vec3 {
        Vec3::new(c * 0.02 - 0.795, 0.8, 0.5 + r * 0.02)
    }

    fn wall(r: f32, c: f32) -> Vec3 {
        Vec3::new(c * 0.02 - 0.795, r * 0.02 - 0.795, 2.0)
    }

    fn params() -> PlaneSegmentationParams {
        PlaneSegmentationParams::default()
            .block_size(20)
            .min_cluster_size(500)
    }

    #[test]
    fn accumulator_fits_plane_facing_origin() {
        let mut acc = PlaneAccumulator::new();
        for (x, z) in [(0.1, 1.0), (0.4, 1.2), (-0.3, 2.0), (0.2, 3.0)] {
            acc.push(Vec3::new(x, 1.5, z));
        }
        let fit = acc.fit().unwrap();
        assert_relative_eq!(fit.normal.y, -1.0, epsilon = 1e-6);
        assert_relative_eq!(fit.offset, 1.5, epsilon = 1e-6);
        assert!(fit.rms < 1e-6);
    }

    #[test]
    fn accumulator_needs_three_points() {
        let mut acc = PlaneAccumulator::new();
        acc.push(Vec3::ONE);
        acc.push(Vec3::X);
        assert!(acc.fit().is_none());
    }

    #[test]
    fn single_floor_region() {
        let g = grid(40, 40, floor);
        let normals = estimate_normals(&g);
        let candidates = PlaneSegmenter::new(params(), 0.06).segment(&g, &normals).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].pixel_count, 1600);
        let plane = candidates[0].plane;
        assert_relative_eq!(plane.b, -1.0, epsilon = 1e-4);
        assert_relative_eq!(plane.d, 0.8, epsilon = 1e-4);
    }

    #[test]
    fn wall_over_floor_gives_two_regions() {
        let g = grid(40, 40, |r, c| if r < 20.0 { wall(r, c) } else { floor(r, c) });
        let normals = estimate_normals(&g);
        let candidates = PlaneSegmenter::new(params(), 0.06).segment(&g, &normals).unwrap();
        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.pixel_count >= 500));
        assert!(candidates.iter().any(|c| c.plane.b < -0.99));
        assert!(candidates.iter().any(|c| c.plane.c < -0.99));
    }

    #[test]
    fn small_regions_are_discarded() {
        let g = grid(40, 40, floor);
        let normals = estimate_normals(&g);
        let segmenter = PlaneSegmenter::new(params().min_cluster_size(2000), 0.06);
        assert!(segmenter.segment(&g, &normals).unwrap().is_empty());
    }

    #[test]
    fn unaligned_image_rejected() {
        let g = grid(30, 40, floor);
        let normals = estimate_normals(&g);
        let err = PlaneSegmenter::new(params(), 0.06)
            .segment(&g, &normals)
            .unwrap_err();
        assert_eq!(
            err,
            EstimationError::UnalignedImage {
                rows: 30,
                cols: 40,
                block_size: 20
            }
        );
    }

    #[test]
    fn sparse_blocks_do_not_seed() {
        let g = grid(40, 40, |r, c| {
            if (r as usize + c as usize) % 3 == 0 {
                floor(r, c)
            } else {
                Vec3::NAN
            }
        });
        let normals = estimate_normals(&g);
        assert!(PlaneSegmenter::new(params(), 0.06)
            .segment(&g, &normals)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn block_neighbours() {
        let blocks = Blocks {
            size: 1,
            rows: 2,
            cols: 3,
        };
        let mut n: Vec<usize> = blocks.neighbours(4).collect();
        n.sort_unstable();
        assert_eq!(n, vec![1, 3, 5]);
        assert_eq!(blocks.pixels(5).collect::<Vec<_>>(), vec![(1, 2)]);
    }
}
