//! Robot pose access for the pose-lookup ground estimator.

use std::sync::{PoisonError, RwLock};

use sensor_fusion::{FusionError, Transform3D, TransformTree};
use sensor_types::FrameId;

/// Source of the most recent rigid transform between two frames.
///
/// Implementations return the transform mapping points expressed in
/// `source` into `target`. No time synchronization is implied.
pub trait PoseSource: Send + Sync {
    /// Returns the newest `target <- source` transform.
    ///
    /// # Errors
    ///
    /// Returns a [`FusionError`] if either frame is unknown or unconnected.
    fn latest_transform(
        &self,
        target: &FrameId,
        source: &FrameId,
    ) -> Result<Transform3D, FusionError>;
}

impl PoseSource for TransformTree {
    fn latest_transform(
        &self,
        target: &FrameId,
        source: &FrameId,
    ) -> Result<Transform3D, FusionError> {
        self.lookup_latest(target, source).map(|t| t.transform)
    }
}

/// A tree updated concurrently by a pose stream.
impl PoseSource for RwLock<TransformTree> {
    fn latest_transform(
        &self,
        target: &FrameId,
        source: &FrameId,
    ) -> Result<Transform3D, FusionError> {
        self.read()
            .unwrap_or_else(PoisonError::into_inner)
            .latest_transform(target, source)
    }
}

/// A sensor bolted to the robot with a known, fixed mounting.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticPose {
    target: FrameId,
    source: FrameId,
    transform: Transform3D,
}

impl StaticPose {
    /// Creates a fixed `target <- source` transform.
    #[must_use]
    pub fn new(target: impl Into<FrameId>, source: impl Into<FrameId>, transform: Transform3D) -> Self {
        Self {
            target: target.into(),
            source: source.into(),
            transform,
        }
    }
}

impl PoseSource for StaticPose {
    fn latest_transform(
        &self,
        target: &FrameId,
        source: &FrameId,
    ) -> Result<Transform3D, FusionError> {
        if *target == self.target && *source == self.source {
            Ok(self.transform)
        } else if *target == self.source && *source == self.target {
            Ok(self.transform.inverse())
        } else if target == source {
            Ok(Transform3D::identity())
        } else {
            Err(FusionError::no_path(source.as_str(), target.as_str()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use glam::Vec3;
    use sensor_types::Timestamp;

    fn lifted() -> Transform3D {
        Transform3D::from_translation(Vec3::new(0.0, 0.0, 1.2))
    }

    #[test]
    fn static_pose_both_directions() {
        let pose = StaticPose::new("base_link", "cam", lifted());
        let up = pose
            .latest_transform(&FrameId::new("base_link"), &FrameId::new("cam"))
            .unwrap();
        let down = pose
            .latest_transform(&FrameId::new("cam"), &FrameId::new("base_link"))
            .unwrap();
        assert!(up.compose(&down).is_identity(1e-6));
        assert!(pose
            .latest_transform(&FrameId::new("odom"), &FrameId::new("cam"))
            .is_err());
    }

    #[test]
    fn locked_tree_reads_latest() {
        let tree = RwLock::new(TransformTree::new());
        let (base, cam) = (FrameId::new("base_link"), FrameId::new("cam"));
        assert!(tree.latest_transform(&base, &cam).is_err());

        tree.write()
            .unwrap()
            .set_transform(base.clone(), cam.clone(), lifted(), Timestamp::zero())
            .unwrap();
        let t = tree.latest_transform(&base, &cam).unwrap();
        assert_eq!(t.translation.z, 1.2);
    }
}
