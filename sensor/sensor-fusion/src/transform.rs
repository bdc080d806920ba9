//! Rigid transforms between sensor frames.

use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// A rigid body transform (rotation + translation).
///
/// A `Transform3D` stored for the edge `parent -> child` maps points
/// expressed in `child` into `parent`: `p_parent = R * p_child + t`.
///
/// # Example
///
/// ```
/// use sensor_fusion::Transform3D;
/// use glam::Vec3;
///
/// // Camera mounted 1.2 m above the base origin.
/// let base_from_camera = Transform3D::from_translation(Vec3::new(0.0, 0.0, 1.2));
/// let p = base_from_camera.apply_point(Vec3::new(0.5, 0.0, 0.0));
/// assert!((p.z - 1.2).abs() < 1e-6);
///
/// // Directions ignore translation.
/// let up = base_from_camera.apply_direction(Vec3::Z);
/// assert!((up - Vec3::Z).length() < 1e-6);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform3D {
    /// Rotation component.
    pub rotation: Quat,
    /// Translation component, the child origin expressed in the parent frame.
    pub translation: Vec3,
}

impl Default for Transform3D {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform3D {
    /// Creates an identity transform.
    #[must_use]
    pub const fn identity() -> Self {
        Self {
            rotation: Quat::IDENTITY,
            translation: Vec3::ZERO,
        }
    }

    /// Creates a transform from rotation and translation.
    #[must_use]
    pub const fn new(rotation: Quat, translation: Vec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Creates a pure translation.
    #[must_use]
    pub const fn from_translation(translation: Vec3) -> Self {
        Self::new(Quat::IDENTITY, translation)
    }

    /// Creates a pure rotation.
    #[must_use]
    pub const fn from_rotation(rotation: Quat) -> Self {
        Self::new(rotation, Vec3::ZERO)
    }

    /// Creates a transform whose rotation has the child axes as columns.
    ///
    /// `axes` holds the child frame's x, y and z axes expressed in the
    /// parent frame; they should be orthonormal.
    #[must_use]
    pub fn from_axes(axes: [Vec3; 3], translation: Vec3) -> Self {
        let rotation = Quat::from_mat3(&Mat3::from_cols(axes[0], axes[1], axes[2]));
        Self::new(rotation.normalize(), translation)
    }

    /// Applies the transform to a point.
    #[must_use]
    pub fn apply_point(&self, point: Vec3) -> Vec3 {
        self.rotation * point + self.translation
    }

    /// Applies only the rotation, for direction vectors.
    #[must_use]
    pub fn apply_direction(&self, direction: Vec3) -> Vec3 {
        self.rotation * direction
    }

    /// Returns the inverse transform.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self {
            rotation,
            translation: rotation * (-self.translation),
        }
    }

    /// Composes `self * other`: `other` is applied first.
    #[must_use]
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            rotation: (self.rotation * other.rotation).normalize(),
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// Returns true if every component is finite and the rotation is unit length.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.rotation.is_finite()
            && self.translation.is_finite()
            && (self.rotation.length() - 1.0).abs() < 1e-3
    }

    /// Returns true if this is approximately the identity transform.
    #[must_use]
    pub fn is_identity(&self, epsilon: f32) -> bool {
        // q and -q encode the same rotation
        let rot_diff = (self.rotation - Quat::IDENTITY)
            .length()
            .min((self.rotation + Quat::IDENTITY).length());
        rot_diff < epsilon && self.translation.length() < epsilon
    }
}
