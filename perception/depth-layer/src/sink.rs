//! Delivery of classified observations.
//!
//! Each non-empty point set is packed into a [`PackedCloud`], optionally
//! published for visualization, then handed to an [`ObservationConsumer`]
//! that feeds the map. Points stay in the camera frame.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use glam::Vec3;
use sensor_types::{FrameId, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::config::DepthLayerConfig;
use crate::error::{DepthLayerError, Result};

/// Bytes per packed point (x, y, z as `f32`).
pub const POINT_STEP: u32 = 12;

/// Which evidence a point set carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObservationKind {
    /// Free space along each ray.
    Clearing,
    /// Obstacles at each ray's end.
    Marking,
}

impl fmt::Display for ObservationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Clearing => "clearing",
            Self::Marking => "marking",
        })
    }
}

/// Points of one kind from one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedPointSet {
    /// Clearing or marking.
    pub kind: ObservationKind,
    /// Camera frame the points are expressed in.
    pub frame: FrameId,
    /// Acquisition time of the source frame.
    pub timestamp: Timestamp,
    /// Points in row-major pixel order.
    pub points: Vec<Vec3>,
}

impl ClassifiedPointSet {
    /// Creates a point set.
    #[must_use]
    pub const fn new(
        kind: ObservationKind,
        frame: FrameId,
        timestamp: Timestamp,
        points: Vec<Vec3>,
    ) -> Self {
        Self {
            kind,
            frame,
            timestamp,
            points,
        }
    }

    /// Returns true if the set holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Unorganized cloud of host-endian `f32` xyz triples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedCloud {
    /// Camera frame of the points.
    pub frame: FrameId,
    /// Acquisition time.
    pub timestamp: Timestamp,
    /// Number of points.
    pub width: u32,
    /// Always 1.
    pub height: u32,
    /// Bytes per point.
    pub point_step: u32,
    /// Bytes per row.
    pub row_step: u32,
    /// True if `data` is big-endian.
    pub is_bigendian: bool,
    /// Packed point data.
    pub data: Vec<u8>,
}

impl PackedCloud {
    /// Number of points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.width as usize
    }

    /// Returns true if the cloud holds no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0
    }

    /// Iterates over the packed points.
    pub fn points(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.data
            .chunks_exact(POINT_STEP as usize)
            .map(bytemuck::pod_read_unaligned::<Vec3>)
    }
}

impl TryFrom<&ClassifiedPointSet> for PackedCloud {
    type Error = DepthLayerError;

    fn try_from(set: &ClassifiedPointSet) -> Result<Self> {
        let width = u32::try_from(set.points.len()).map_err(|_| {
            DepthLayerError::sink_conversion(
                set.kind,
                format!("{} points do not fit in a cloud", set.points.len()),
            )
        })?;
        let row_step = width.checked_mul(POINT_STEP).ok_or_else(|| {
            DepthLayerError::sink_conversion(set.kind, format!("row of {width} points overflows"))
        })?;
        if let Some(index) = set.points.iter().position(|p| !p.is_finite()) {
            return Err(DepthLayerError::sink_conversion(
                set.kind,
                format!("point {index} is not finite"),
            ));
        }

        Ok(Self {
            frame: set.frame.clone(),
            timestamp: set.timestamp,
            width,
            height: 1,
            point_step: POINT_STEP,
            row_step,
            is_bigendian: cfg!(target_endian = "big"),
            data: bytemuck::cast_slice(&set.points).to_vec(),
        })
    }
}

/// Visualization output.
pub trait ObservationPublisher: Send + Sync {
    /// Publishes one converted point set.
    fn publish(&self, kind: ObservationKind, cloud: &PackedCloud);
}

/// Map-side consumer buffering observations for incorporation.
pub trait ObservationConsumer: Send + Sync {
    /// Takes ownership of one converted point set.
    fn buffer(&self, kind: ObservationKind, cloud: PackedCloud);
}

/// Height and range limits the map applies to one kind of observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservationLimits {
    /// Lowest point height kept (m).
    pub min_height: f64,
    /// Highest point height kept (m).
    pub max_height: f64,
    /// Marking range (m).
    pub obstacle_range: f64,
    /// Clearing range (m).
    pub raytrace_range: f64,
}

/// A buffered cloud with the limits that apply to it.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedObservation {
    /// Clearing or marking.
    pub kind: ObservationKind,
    /// The points.
    pub cloud: PackedCloud,
    /// Limits for this kind.
    pub limits: ObservationLimits,
}

/// Bounded, thread-safe store of the newest observations.
///
/// When full, the oldest entry is evicted.
///
/// # Example
///
/// ```
/// use depth_layer::{DepthLayerConfig, ObservationBuffer, ObservationKind};
///
/// let buffer = ObservationBuffer::from_config(&DepthLayerConfig::default(), 4);
/// assert!(buffer.is_empty());
/// assert!(buffer.latest(ObservationKind::Marking).is_none());
/// assert_eq!(buffer.limits(ObservationKind::Marking).max_height, 2.0);
/// ```
#[derive(Debug)]
pub struct ObservationBuffer {
    capacity: usize,
    marking: ObservationLimits,
    clearing: ObservationLimits,
    entries: Mutex<VecDeque<BufferedObservation>>,
}

impl ObservationBuffer {
    /// Creates a buffer holding at most `capacity` entries (at least one).
    #[must_use]
    pub fn new(capacity: usize, marking: ObservationLimits, clearing: ObservationLimits) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            marking,
            clearing,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Creates a buffer tagged with the height bounds and ranges of `config`.
    #[must_use]
    pub fn from_config(config: &DepthLayerConfig, capacity: usize) -> Self {
        let limits = |min_height, max_height| ObservationLimits {
            min_height,
            max_height,
            obstacle_range: config.obstacle_range,
            raytrace_range: config.raytrace_range,
        };
        Self::new(
            capacity,
            limits(config.min_obstacle_height, config.max_obstacle_height),
            limits(config.min_clearing_height, config.max_clearing_height),
        )
    }

    /// Limits applied to `kind`.
    #[must_use]
    pub const fn limits(&self, kind: ObservationKind) -> ObservationLimits {
        match kind {
            ObservationKind::Marking => self.marking,
            ObservationKind::Clearing => self.clearing,
        }
    }

    /// Number of buffered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Newest entry of `kind`, left in place.
    #[must_use]
    pub fn latest(&self, kind: ObservationKind) -> Option<BufferedObservation> {
        self.lock().iter().rev().find(|o| o.kind == kind).cloned()
    }

    /// Removes and returns every entry, oldest first.
    pub fn drain(&self) -> Vec<BufferedObservation> {
        self.lock().drain(..).collect()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<BufferedObservation>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ObservationConsumer for ObservationBuffer {
    fn buffer(&self, kind: ObservationKind, cloud: PackedCloud) {
        let limits = self.limits(kind);
        let mut entries = self.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(BufferedObservation {
            kind,
            cloud,
            limits,
        });
    }
}

/// Outcome of delivering one frame's observation sets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryReport {
    /// Sets handed to the consumer.
    pub delivered: Vec<ObservationKind>,
    /// Sets dropped during conversion.
    pub failed: Vec<DepthLayerError>,
}

/// Routes point sets to the optional publisher and the consumer.
#[derive(Clone)]
pub struct ObservationSink {
    consumer: Arc<dyn ObservationConsumer>,
    publisher: Option<Arc<dyn ObservationPublisher>>,
}

impl fmt::Debug for ObservationSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservationSink")
            .field("publishing", &self.publisher.is_some())
            .finish_non_exhaustive()
    }
}

impl ObservationSink {
    /// Creates a sink feeding `consumer` only.
    #[must_use]
    pub fn new(consumer: Arc<dyn ObservationConsumer>) -> Self {
        Self {
            consumer,
            publisher: None,
        }
    }

    /// Adds a visualization publisher.
    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<dyn ObservationPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Drops the publisher unless `enabled`.
    #[must_use]
    pub fn publishing(mut self, enabled: bool) -> Self {
        if !enabled {
            self.publisher = None;
        }
        self
    }

    /// Delivers one point set. Empty sets are skipped.
    ///
    /// Returns whether the set reached the consumer.
    ///
    /// # Errors
    ///
    /// Returns [`DepthLayerError::SinkConversion`] if the set cannot be packed.
    pub fn deliver(&self, set: &ClassifiedPointSet) -> Result<bool> {
        if set.is_empty() {
            return Ok(false);
        }
        let cloud = PackedCloud::try_from(set)?;
        if let Some(publisher) = &self.publisher {
            publisher.publish(set.kind, &cloud);
        }
        self.consumer.buffer(set.kind, cloud);
        Ok(true)
    }

    /// Delivers both sets of a frame; a failure drops only the failing set.
    pub fn deliver_frame(
        &self,
        clearing: &ClassifiedPointSet,
        marking: &ClassifiedPointSet,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for set in [clearing, marking] {
            match self.deliver(set) {
                Ok(true) => report.delivered.push(set.kind),
                Ok(false) => {}
                Err(e) => {
                    error!(kind = %set.kind, frame = %set.frame, error = %e, "dropping observation set");
                    report.failed.push(e);
                }
            }
        }
        report
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        published: Mutex<Vec<(ObservationKind, usize)>>,
    }

    impl ObservationPublisher for Recorder {
        fn publish(&self, kind: ObservationKind, cloud: &PackedCloud) {
            self.published.lock().unwrap().push((kind, cloud.len()));
        }
    }

    fn set(kind: ObservationKind, points: Vec<Vec3>) -> ClassifiedPointSet {
        ClassifiedPointSet::new(kind, FrameId::new("cam"), Timestamp::from_nanos(42), points)
    }

    #[test]
    fn pack_layout() {
        let s = set(ObservationKind::Marking, vec![Vec3::new(1.0, -2.0, 0.5), Vec3::ONE]);
        let cloud = PackedCloud::try_from(&s).unwrap();
        assert_eq!((cloud.width, cloud.height), (2, 1));
        assert_eq!(cloud.point_step, 12);
        assert_eq!(cloud.row_step, 24);
        assert_eq!(cloud.data.len(), 24);
        assert_eq!(cloud.is_bigendian, cfg!(target_endian = "big"));
        assert_eq!(&cloud.data[4..8], &(-2.0f32).to_ne_bytes());
        assert_eq!(cloud.points().collect::<Vec<_>>(), s.points);
        assert_eq!(cloud.timestamp, Timestamp::from_nanos(42));
    }

    #[test]
    fn non_finite_points_fail_conversion() {
        let s = set(ObservationKind::Clearing, vec![Vec3::ONE, Vec3::new(f32::INFINITY, 0.0, 1.0)]);
        let err = PackedCloud::try_from(&s).unwrap_err();
        assert_eq!(
            err,
            DepthLayerError::sink_conversion(ObservationKind::Clearing, "point 1 is not finite")
        );
    }

    #[test]
    fn failing_set_does_not_block_the_other() {
        let buffer = Arc::new(ObservationBuffer::from_config(&DepthLayerConfig::default(), 8));
        let sink = ObservationSink::new(buffer.clone());
        let clearing = set(ObservationKind::Clearing, vec![Vec3::new(f32::NAN, 1.0, 1.0)]);
        let marking = set(ObservationKind::Marking, vec![Vec3::ONE]);

        let report = sink.deliver_frame(&clearing, &marking);
        assert_eq!(report.delivered, vec![ObservationKind::Marking]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(buffer.len(), 1);
        assert!(buffer.latest(ObservationKind::Marking).is_some());
        assert!(buffer.latest(ObservationKind::Clearing).is_none());
    }

    #[test]
    fn empty_sets_are_skipped() {
        let buffer = Arc::new(ObservationBuffer::from_config(&DepthLayerConfig::default(), 8));
        let recorder = Arc::new(Recorder::default());
        let sink = ObservationSink::new(buffer.clone()).with_publisher(recorder.clone());
        let report = sink.deliver_frame(
            &set(ObservationKind::Clearing, vec![Vec3::ONE]),
            &set(ObservationKind::Marking, Vec::new()),
        );
        assert_eq!(report.delivered, vec![ObservationKind::Clearing]);
        assert!(report.failed.is_empty());
        assert_eq!(
            *recorder.published.lock().unwrap(),
            vec![(ObservationKind::Clearing, 1)]
        );
    }

    #[test]
    fn publisher_can_be_disabled() {
        let buffer = Arc::new(ObservationBuffer::from_config(&DepthLayerConfig::default(), 8));
        let recorder = Arc::new(Recorder::default());
        let sink = ObservationSink::new(buffer.clone())
            .with_publisher(recorder.clone())
            .publishing(false);
        sink.deliver(&set(ObservationKind::Marking, vec![Vec3::ONE])).unwrap();
        assert!(recorder.published.lock().unwrap().is_empty());
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn buffer_is_bounded_and_tagged() {
        let config = DepthLayerConfig::default().with_obstacle_heights(0.1, 1.8);
        let buffer = ObservationBuffer::from_config(&config, 2);
        for n in 1..=3 {
            let s = set(ObservationKind::Marking, vec![Vec3::ONE; n]);
            buffer.buffer(ObservationKind::Marking, PackedCloud::try_from(&s).unwrap());
        }
        assert_eq!(buffer.len(), 2);
        let latest = buffer.latest(ObservationKind::Marking).unwrap();
        assert_eq!(latest.cloud.len(), 3);
        assert_eq!(latest.limits.min_height, 0.1);
        assert_eq!(latest.limits.obstacle_range, 2.5);

        let drained = buffer.drain();
        assert_eq!(drained.iter().map(|o| o.cloud.len()).collect::<Vec<_>>(), vec![2, 3]);
        assert!(buffer.is_empty());
        assert_eq!(
            buffer.limits(ObservationKind::Clearing).max_height,
            f64::INFINITY
        );
    }
}
