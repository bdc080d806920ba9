//! Per-pixel surface normals from an organized point grid.

use glam::Vec3;
use rayon::prelude::*;

use crate::reproject::PointGrid;

/// Estimates a unit normal for every pixel of `grid`.
///
/// Tangents come from central differences along the row and column,
/// falling back to a one-sided difference next to invalid neighbours.
/// Normals face the sensor origin. Pixels without two tangents get `None`.
#[must_use]
pub fn estimate_normals(grid: &PointGrid) -> Vec<Option<Vec3>> {
    let (rows, cols) = (grid.rows(), grid.cols());
    if rows == 0 || cols == 0 {
        return Vec::new();
    }

    let mut normals = vec![None; rows * cols];
    normals
        .par_chunks_mut(cols)
        .enumerate()
        .for_each(|(row, out)| {
            for (col, normal) in out.iter_mut().enumerate() {
                *normal = pixel_normal(grid, row, col);
            }
        });
    normals
}

fn pixel_normal(grid: &PointGrid, row: usize, col: usize) -> Option<Vec3> {
    let center = grid.valid_at(row, col, 0, 0)?;
    let along_row = tangent(
        center,
        grid.valid_at(row, col, 0, -1),
        grid.valid_at(row, col, 0, 1),
    )?;
    let along_col = tangent(
        center,
        grid.valid_at(row, col, -1, 0),
        grid.valid_at(row, col, 1, 0),
    )?;

    let normal = along_row.cross(along_col).normalize_or_zero();
    if normal == Vec3::ZERO {
        return None;
    }
    if normal.dot(center) > 0.0 {
        Some(-normal)
    } else {
        Some(normal)
    }
}

fn tangent(center: Vec3, before: Option<Vec3>, after: Option<Vec3>) -> Option<Vec3> {
    match (before, after) {
        (Some(b), Some(a)) => Some(a - b),
        (None, Some(a)) => Some(a - center),
        (Some(b), None) => Some(center - b),
        (None, None) => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use sensor_types::{FrameId, Timestamp};

    fn grid(rows: usize, cols: usize, f: impl Fn(usize, usize) -> Vec3) -> PointGrid {
        let points = (0..rows)
            .flat_map(|r| (0..cols).map(move |c| (r, c)))
            .map(|(r, c)| f(r, c))
            .collect();
        PointGrid::new(rows, cols, FrameId::new("cam"), Timestamp::zero(), points).unwrap()
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn floor_normal_points_up_toward_camera() {
        // Floor 1 m below an optical-frame camera: y = 1 everywhere.
        let g = grid(6, 6, |r, c| Vec3::new(c as f32 * 0.1 - 0.25, 1.0, 1.0 + r as f32 * 0.1));
        let normals = estimate_normals(&g);
        for n in normals.iter().map(|n| n.unwrap()) {
            assert!((n - Vec3::new(0.0, -1.0, 0.0)).length() < 1e-5, "{n:?}");
        }
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn wall_normal_faces_camera() {
        let g = grid(5, 5, |r, c| Vec3::new(c as f32 * 0.1 - 0.25, r as f32 * 0.1 - 0.25, 2.0));
        let normals = estimate_normals(&g);
        let n = normals[2 * 5 + 3].unwrap();
        assert!((n - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-5);
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn isolated_pixels_have_no_normal() {
        // Every other column invalid: no horizontal tangent anywhere.
        let g = grid(4, 4, |r, c| {
            if c % 2 == 0 {
                Vec3::NAN
            } else {
                Vec3::new(c as f32 * 0.1, r as f32 * 0.1 + 0.05, 1.0)
            }
        });
        assert!(estimate_normals(&g).iter().all(Option::is_none));
    }

    #[test]
    fn empty_grid() {
        let g = grid(0, 0, |_, _| Vec3::ZERO);
        assert!(estimate_normals(&g).is_empty());
    }
}
