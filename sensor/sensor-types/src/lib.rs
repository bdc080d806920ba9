//! Hardware-agnostic depth camera data types.
//!
//! This crate provides the raw inbound types consumed by the depth
//! perception front-end:
//!
//! - [`CameraInfo`] - Calibration event published alongside a depth stream
//! - [`CameraIntrinsics`] - Pinhole parameters restored to per-pixel units
//! - [`DepthImage`] - Raw depth frame as it arrives from the transport
//! - [`DepthMap`] - Decoded per-pixel depth in meters
//!
//! # Layer 0 Crate
//!
//! This is a Layer 0 crate with no math or runtime dependencies. It can be
//! used by drivers, simulators, and offline tools alike.
//!
//! # Frames and Time
//!
//! Every reading carries a [`FrameId`] naming the coordinate frame its
//! data is expressed in, and a nanosecond [`Timestamp`].
//!
//! # Example
//!
//! ```
//! use sensor_types::{DepthEncoding, DepthImage, DepthMap, FrameId, Timestamp};
//!
//! let image = DepthImage::from_f32(
//!     FrameId::new("head_camera_depth_optical_frame"),
//!     Timestamp::from_secs_f64(1.0),
//!     4,
//!     2,
//!     &[1.5f32; 8],
//! );
//! assert_eq!(image.encoding, DepthEncoding::Float32);
//!
//! let depth = DepthMap::decode(&image).unwrap();
//! assert_eq!(depth.pixel_count(), 8);
//! ```

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod camera;
mod depth;
mod error;
mod frame;
mod time;

pub use camera::{CameraInfo, CameraIntrinsics};
pub use depth::{DepthEncoding, DepthImage, DepthMap};
pub use error::{Result, SensorError};
pub use frame::FrameId;
pub use time::Timestamp;
