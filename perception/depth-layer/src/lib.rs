//! Depth camera front-end for occupancy mapping.
//!
//! Each depth frame is turned into two point sets in the camera's optical
//! frame: clearing points (free space along every usable ray) and marking
//! points (obstacles that are neither floor nor isolated noise).
//!
//! # Pipeline
//!
//! 1. [`IntrinsicsStore`] - the latest calibration, shared between channels
//! 2. [`convert`] - inverse pinhole reprojection into a [`PointGrid`]
//! 3. [`GroundPlaneEstimator`] - floor plane by segmentation
//!    ([`ClusteringStrategy`]) or from the robot pose ([`PoseLookupStrategy`])
//! 4. [`PointClassifier`] - margin, floor and neighbour-consistency tests
//! 5. [`ObservationSink`] - optional visualization plus the map-side
//!    [`ObservationConsumer`]
//!
//! [`DepthLayer`] wires these together; [`spawn_listeners`] drives it from
//! two channels.
//!
//! # Example
//!
//! ```
//! use std::sync::{Arc, RwLock};
//! use depth_layer::{DepthLayer, DepthLayerConfig, ObservationBuffer, ObservationKind, ObservationSink};
//! use glam::Vec3;
//! use sensor_fusion::{Transform3D, TransformTree};
//! use sensor_types::{CameraInfo, DepthImage, FrameId, Timestamp};
//!
//! // Camera 1 m above the base, looking along base +x.
//! let mut tree = TransformTree::new();
//! let mount = Transform3D::from_axes([Vec3::NEG_Y, Vec3::NEG_Z, Vec3::X], Vec3::new(0.0, 0.0, 1.0));
//! tree.set_transform(FrameId::new("base_link"), FrameId::new("cam"), mount, Timestamp::zero())
//!     .unwrap();
//!
//! let config = DepthLayerConfig::default()
//!     .with_find_ground_plane(false)
//!     .with_skip_rays(0, 0, 0, 0);
//! let buffer = Arc::new(ObservationBuffer::from_config(&config, 16));
//! let layer = DepthLayer::new(
//!     config,
//!     Arc::new(RwLock::new(tree)),
//!     ObservationSink::new(buffer.clone()),
//! )
//! .unwrap();
//!
//! layer
//!     .handle_camera_info(&CameraInfo::pinhole(FrameId::new("cam"), 5, 5, 500.0, 2.5, 2.5))
//!     .unwrap();
//! let image = DepthImage::from_f32(FrameId::new("cam"), Timestamp::zero(), 5, 5, &[2.0; 25]);
//! let report = layer.handle_depth_frame(&image).unwrap();
//!
//! // A wall 2 m ahead: everything clears, the interior is marked.
//! assert_eq!(report.clearing, 25);
//! assert_eq!(report.marking, 9);
//! assert!(buffer.latest(ObservationKind::Marking).is_some());
//! ```

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod channels;
mod classify;
mod config;
mod error;
mod ground;
mod intrinsics;
mod layer;
mod reproject;
mod sink;

pub use channels::{ListenerStats, Listeners, spawn_listeners};
pub use classify::{
    Classification, MIN_CONSISTENT_NEIGHBORS, NEIGHBOR_TOLERANCE, PointClassifier, SkipMargins,
    consistent_neighbors,
};
pub use config::{DepthLayerConfig, PlaneSegmentationParams};
pub use error::{DepthLayerError, Result};
pub use ground::{
    ClusteringStrategy, EstimationError, FLOOR_NORMAL, GroundPlane, GroundPlaneEstimator,
    PlaneCandidate, PlaneSegmenter, PoseLookupStrategy, PoseSource, StaticPose, estimate_normals,
};
pub use intrinsics::IntrinsicsStore;
pub use layer::{DepthLayer, FrameReport};
pub use reproject::{NAN_FILL_DEPTH, PointGrid, convert, is_valid_point, reproject};
pub use sink::{
    BufferedObservation, ClassifiedPointSet, DeliveryReport, ObservationBuffer,
    ObservationConsumer, ObservationKind, ObservationLimits, ObservationPublisher, ObservationSink,
    PackedCloud,
    POINT_STEP,
};
