//! Coordinate frame bookkeeping for sensor data.
//!
//! This crate answers "where is this sensor right now" for the perception
//! front-end:
//!
//! - [`Transform3D`] - Rigid body transform (rotation + translation)
//! - [`TransformTree`] - Newest transform per parent/child edge, resolved
//!   through the closest common ancestor
//! - [`StampedTransform`] - A resolved transform with its validity time
//!
//! # Layer 0 Crate
//!
//! This is a Layer 0 crate. It depends only on `glam` for math and on
//! `sensor-types` for frame names and timestamps.
//!
//! # Example
//!
//! ```
//! use glam::Vec3;
//! use sensor_fusion::{Transform3D, TransformTree};
//! use sensor_types::{FrameId, Timestamp};
//!
//! let mut tree = TransformTree::new();
//! tree.set_transform(
//!     FrameId::new("base_link"),
//!     FrameId::new("head_camera_depth_optical_frame"),
//!     Transform3D::from_translation(Vec3::new(0.0, 0.0, 1.0)),
//!     Timestamp::zero(),
//! )
//! .unwrap();
//!
//! let camera_from_base = tree
//!     .lookup_latest(
//!         &FrameId::new("head_camera_depth_optical_frame"),
//!         &FrameId::new("base_link"),
//!     )
//!     .unwrap();
//! let floor = camera_from_base.transform.apply_point(Vec3::ZERO);
//! assert!((floor.z + 1.0).abs() < 1e-6);
//! ```

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod error;
mod transform;
mod tree;

pub use error::{FusionError, Result};
pub use transform::Transform3D;
pub use tree::{StampedTransform, TransformTree};
