//! The per-instance depth observation pipeline.

use std::sync::{Arc, Mutex, PoisonError};

use sensor_types::{CameraInfo, CameraIntrinsics, DepthImage, DepthMap, FrameId, Timestamp};
use tracing::{debug, error, info};

use crate::classify::PointClassifier;
use crate::config::DepthLayerConfig;
use crate::error::{DepthLayerError, Result};
use crate::ground::{GroundPlane, GroundPlaneEstimator, PoseSource};
use crate::intrinsics::IntrinsicsStore;
use crate::reproject::convert;
use crate::sink::{ClassifiedPointSet, DeliveryReport, ObservationKind, ObservationSink};

/// Summary of one processed depth frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    /// Camera frame of the observations.
    pub frame: FrameId,
    /// Acquisition time of the depth frame.
    pub timestamp: Timestamp,
    /// Ground plane used for classification.
    pub plane: GroundPlane,
    /// Clearing points produced.
    pub clearing: usize,
    /// Marking points produced.
    pub marking: usize,
    /// What reached the sink.
    pub delivery: DeliveryReport,
}

/// Turns depth frames into marking and clearing observations.
///
/// Calibration and depth events may arrive from different threads. The
/// intrinsics snapshot is the only state they share; depth frames are
/// processed one at a time.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use depth_layer::{DepthLayer, DepthLayerConfig, ObservationBuffer, ObservationSink, StaticPose};
/// use sensor_fusion::Transform3D;
/// use sensor_types::{CameraInfo, DepthImage, FrameId, Timestamp};
///
/// let config = DepthLayerConfig::default()
///     .with_find_ground_plane(false)
///     .with_skip_rays(0, 0, 0, 0);
/// let buffer = Arc::new(ObservationBuffer::from_config(&config, 8));
/// let poses = Arc::new(StaticPose::new("base_link", "cam", Transform3D::identity()));
/// let layer = DepthLayer::new(config, poses, ObservationSink::new(buffer.clone())).unwrap();
///
/// let image = DepthImage::from_f32(FrameId::new("cam"), Timestamp::zero(), 2, 2, &[1.0; 4]);
/// assert!(layer.handle_depth_frame(&image).is_err()); // no intrinsics yet
///
/// let info = CameraInfo::pinhole(FrameId::new("cam"), 2, 2, 500.0, 0.5, 0.5);
/// layer.handle_camera_info(&info).unwrap();
/// let report = layer.handle_depth_frame(&image).unwrap();
/// assert_eq!(report.clearing, 4);
/// assert_eq!(buffer.len(), 1);
/// ```
#[derive(Debug)]
pub struct DepthLayer {
    config: DepthLayerConfig,
    intrinsics: IntrinsicsStore,
    estimator: GroundPlaneEstimator,
    classifier: PointClassifier,
    sink: ObservationSink,
    frame_guard: Mutex<()>,
}

impl DepthLayer {
    /// Creates a layer.
    ///
    /// `poses` backs the pose-lookup strategy when `find_ground_plane` is
    /// off. The sink's publisher is kept only if `publish_observations` is set.
    ///
    /// # Errors
    ///
    /// Returns [`DepthLayerError::InvalidConfig`] if `config` fails validation.
    pub fn new(
        config: DepthLayerConfig,
        poses: Arc<dyn PoseSource>,
        sink: ObservationSink,
    ) -> Result<Self> {
        config.validate()?;

        let estimator = GroundPlaneEstimator::from_config(&config, poses);
        let classifier = PointClassifier::from_config(&config);
        let sink = sink.publishing(config.publish_observations);

        info!(
            depth_topic = %config.depth_topic,
            info_topic = %config.info_topic,
            find_ground_plane = config.find_ground_plane,
            publish = config.publish_observations,
            "depth layer initialized"
        );

        Ok(Self {
            config,
            intrinsics: IntrinsicsStore::new(),
            estimator,
            classifier,
            sink,
            frame_guard: Mutex::new(()),
        })
    }

    /// Layer configuration.
    #[must_use]
    pub const fn config(&self) -> &DepthLayerConfig {
        &self.config
    }

    /// Current intrinsics slot.
    #[must_use]
    pub const fn intrinsics(&self) -> &IntrinsicsStore {
        &self.intrinsics
    }

    /// Applies a calibration event.
    ///
    /// # Errors
    ///
    /// Returns [`DepthLayerError::Configuration`] for unequal binning; the
    /// previous intrinsics are kept.
    pub fn handle_camera_info(&self, info: &CameraInfo) -> Result<CameraIntrinsics> {
        self.intrinsics.update_from_info(info).inspect_err(|e| {
            error!(frame = %info.frame, error = %e, "ignoring camera info");
        })
    }

    /// Runs one depth frame through the pipeline and delivers its observations.
    ///
    /// A set that fails conversion is dropped on its own and recorded in the
    /// report; it does not fail the frame.
    ///
    /// # Errors
    ///
    /// Returns the reason the whole frame was dropped: missing intrinsics,
    /// an undecodable buffer, or no usable ground plane. Nothing reaches the
    /// sink in that case.
    pub fn handle_depth_frame(&self, image: &DepthImage) -> Result<FrameReport> {
        let _in_flight = self
            .frame_guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        self.process(image).inspect_err(|e| {
            if e.is_expected() {
                debug!(frame = %image.frame, reason = %e, "dropping depth frame");
            } else {
                error!(frame = %image.frame, error = %e, "dropping depth frame");
            }
        })
    }

    fn process(&self, image: &DepthImage) -> Result<FrameReport> {
        let intrinsics = self.intrinsics.get();
        if intrinsics.is_none() {
            return Err(DepthLayerError::NotReady);
        }

        let depth = DepthMap::decode(image)?;
        let grid = convert(depth, intrinsics.as_ref(), self.config.clear_nans)?;
        let plane = self.estimator.estimate(&grid)?;
        let classified = self.classifier.classify(&grid, &plane);

        let (clearing, marking) = (classified.clearing.len(), classified.marking.len());
        debug!(
            frame = %grid.frame,
            rows = grid.rows(),
            cols = grid.cols(),
            %plane,
            clearing,
            marking,
            "classified depth frame"
        );

        let delivery = self.sink.deliver_frame(
            &ClassifiedPointSet::new(
                ObservationKind::Clearing,
                grid.frame.clone(),
                grid.timestamp,
                classified.clearing,
            ),
            &ClassifiedPointSet::new(
                ObservationKind::Marking,
                grid.frame.clone(),
                grid.timestamp,
                classified.marking,
            ),
        );

        Ok(FrameReport {
            frame: grid.frame,
            timestamp: grid.timestamp,
            plane,
            clearing,
            marking,
            delivery,
        })
    }
}
