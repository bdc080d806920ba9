//! Latest-value transform tree.

use std::collections::HashMap;

use sensor_types::{FrameId, Timestamp};
use tracing::trace;

use crate::error::{FusionError, Result};
use crate::transform::Transform3D;

/// Upper bound on chain length, guards against malformed trees.
const MAX_DEPTH: usize = 256;

/// A transform together with the time it was valid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StampedTransform {
    /// Maps points from the source frame into the target frame.
    pub transform: Transform3D,
    /// Oldest stamp among the edges used to build the transform.
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone)]
struct Edge {
    parent: FrameId,
    /// `parent <- child`
    transform: Transform3D,
    stamp: Timestamp,
}

/// A tree of coordinate frames keeping the newest transform per edge.
///
/// Each frame has at most one parent. Lookups walk both frames up to
/// their closest common ancestor and compose the edges in between.
///
/// # Example
///
/// ```
/// use glam::Vec3;
/// use sensor_fusion::{Transform3D, TransformTree};
/// use sensor_types::{FrameId, Timestamp};
///
/// let mut tree = TransformTree::new();
/// tree.set_transform(
///     FrameId::new("base_link"),
///     FrameId::new("head_camera"),
///     Transform3D::from_translation(Vec3::new(0.1, 0.0, 1.1)),
///     Timestamp::from_secs_f64(1.0),
/// )
/// .unwrap();
///
/// let tf = tree
///     .lookup_latest(&FrameId::new("base_link"), &FrameId::new("head_camera"))
///     .unwrap();
/// assert!((tf.transform.translation.z - 1.1).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TransformTree {
    edges: HashMap<FrameId, Edge>,
}

impl TransformTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of parent/child edges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Returns true if no transform was ever set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Returns true if `frame` appears anywhere in the tree.
    #[must_use]
    pub fn contains(&self, frame: &FrameId) -> bool {
        self.edges.contains_key(frame) || self.edges.values().any(|e| &e.parent == frame)
    }

    /// Returns the parent of `frame`, if it has one.
    #[must_use]
    pub fn parent(&self, frame: &FrameId) -> Option<&FrameId> {
        self.edges.get(frame).map(|e| &e.parent)
    }

    /// Sets the transform mapping `child` points into `parent`.
    ///
    /// Replaces any previous edge for `child`, including one with a
    /// different parent. Older stamps than the stored one are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the transform is not finite, if `parent` and
    /// `child` are the same frame, or if the edge would close a cycle.
    pub fn set_transform(
        &mut self,
        parent: FrameId,
        child: FrameId,
        transform: Transform3D,
        stamp: Timestamp,
    ) -> Result<()> {
        if !transform.is_valid() {
            return Err(FusionError::invalid_transform(format!(
                "{parent} -> {child} is not a finite rigid transform"
            )));
        }
        if parent == child {
            return Err(FusionError::invalid_transform(format!(
                "{child} cannot be its own parent"
            )));
        }
        if self.ancestors(&parent).any(|frame| frame == &child) {
            return Err(FusionError::invalid_transform(format!(
                "{parent} -> {child} would create a cycle"
            )));
        }

        if let Some(existing) = self.edges.get(&child) {
            if existing.parent == parent && existing.stamp > stamp {
                trace!(%parent, %child, "ignoring out-of-order transform");
                return Ok(());
            }
        }

        self.edges.insert(
            child,
            Edge {
                parent,
                transform,
                stamp,
            },
        );
        Ok(())
    }

    /// Looks up the newest transform mapping `source` points into `target`.
    ///
    /// # Errors
    ///
    /// Returns [`FusionError::FrameNotFound`] if either frame is unknown and
    /// [`FusionError::NoPath`] if they share no common ancestor.
    pub fn lookup_latest(&self, target: &FrameId, source: &FrameId) -> Result<StampedTransform> {
        for frame in [target, source] {
            if !self.contains(frame) {
                return Err(FusionError::frame_not_found(frame.as_str()));
            }
        }

        // Each entry: (ancestor, ancestor <- frame, oldest stamp on the way).
        let source_chain = self.chain_to_root(source);
        let target_chain = self.chain_to_root(target);

        for (ancestor, ancestor_from_target, target_stamp) in &target_chain {
            let Some((_, ancestor_from_source, source_stamp)) =
                source_chain.iter().find(|(frame, _, _)| frame == ancestor)
            else {
                continue;
            };

            let transform = ancestor_from_target.inverse().compose(ancestor_from_source);
            return Ok(StampedTransform {
                transform,
                timestamp: oldest(*target_stamp, *source_stamp),
            });
        }

        Err(FusionError::no_path(source.as_str(), target.as_str()))
    }

    fn ancestors<'a>(&'a self, frame: &'a FrameId) -> impl Iterator<Item = &'a FrameId> + 'a {
        std::iter::successors(Some(frame), |f| self.parent(f)).take(MAX_DEPTH)
    }

    fn chain_to_root(&self, frame: &FrameId) -> Vec<(FrameId, Transform3D, Option<Timestamp>)> {
        let mut chain = vec![(frame.clone(), Transform3D::identity(), None)];
        let mut current = frame;
        let mut accumulated = Transform3D::identity();
        let mut stamp: Option<Timestamp> = None;

        while let Some(edge) = self.edges.get(current) {
            if chain.len() > MAX_DEPTH {
                break;
            }
            accumulated = edge.transform.compose(&accumulated);
            stamp = Some(oldest(stamp, Some(edge.stamp)));
            chain.push((edge.parent.clone(), accumulated, stamp));
            current = &edge.parent;
        }
        chain
    }
}

fn oldest(a: Option<Timestamp>, b: Option<Timestamp>) -> Timestamp {
    match (a, b) {
        (Some(a), Some(b)) => a.min(b),
        (Some(t), None) | (None, Some(t)) => t,
        (None, None) => Timestamp::zero(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::{Quat, Vec3};
    use std::f32::consts::FRAC_PI_2;

    fn id(name: &str) -> FrameId {
        FrameId::new(name)
    }

    fn robot() -> TransformTree {
        let mut tree = TransformTree::new();
        tree.set_transform(
            id("odom"),
            id("base_link"),
            Transform3D::from_translation(Vec3::new(2.0, 0.0, 0.0)),
            Timestamp::from_nanos(30),
        )
        .unwrap();
        tree.set_transform(
            id("base_link"),
            id("head"),
            Transform3D::new(Quat::from_rotation_z(FRAC_PI_2), Vec3::new(0.0, 0.0, 1.0)),
            Timestamp::from_nanos(20),
        )
        .unwrap();
        tree.set_transform(
            id("base_link"),
            id("laser"),
            Transform3D::from_translation(Vec3::new(0.2, 0.0, 0.3)),
            Timestamp::from_nanos(10),
        )
        .unwrap();
        tree
    }

    #[test]
    fn lookup_child_to_parent() {
        let tree = robot();
        let tf = tree.lookup_latest(&id("base_link"), &id("head")).unwrap();
        let p = tf.transform.apply_point(Vec3::X);
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-6);
        assert_relative_eq!(p.z, 1.0, epsilon = 1e-6);
        assert_eq!(tf.timestamp, Timestamp::from_nanos(20));
    }

    #[test]
    fn lookup_parent_to_child_is_inverse() {
        let tree = robot();
        let up = tree.lookup_latest(&id("base_link"), &id("head")).unwrap();
        let down = tree.lookup_latest(&id("head"), &id("base_link")).unwrap();
        assert!(up.transform.compose(&down.transform).is_identity(1e-5));
    }

    #[test]
    fn lookup_through_common_ancestor() {
        let tree = robot();
        let tf = tree.lookup_latest(&id("laser"), &id("head")).unwrap();
        // head origin sits at (0, 0, 1) in base; laser origin at (0.2, 0, 0.3).
        let p = tf.transform.apply_point(Vec3::ZERO);
        assert_relative_eq!(p.x, -0.2, epsilon = 1e-6);
        assert_relative_eq!(p.z, 0.7, epsilon = 1e-6);
        assert_eq!(tf.timestamp, Timestamp::from_nanos(10));
    }

    #[test]
    fn lookup_to_root() {
        let tree = robot();
        let tf = tree.lookup_latest(&id("odom"), &id("laser")).unwrap();
        assert_relative_eq!(tf.transform.translation.x, 2.2, epsilon = 1e-6);
    }

    #[test]
    fn lookup_same_frame_is_identity() {
        let tree = robot();
        let tf = tree.lookup_latest(&id("head"), &id("head")).unwrap();
        assert!(tf.transform.is_identity(1e-6));
    }

    #[test]
    fn unknown_frame() {
        let tree = robot();
        let err = tree.lookup_latest(&id("base_link"), &id("gripper")).unwrap_err();
        assert_eq!(err, FusionError::frame_not_found("gripper"));
    }

    #[test]
    fn disconnected_trees() {
        let mut tree = robot();
        tree.set_transform(
            id("map"),
            id("dock"),
            Transform3D::identity(),
            Timestamp::zero(),
        )
        .unwrap();
        let err = tree.lookup_latest(&id("map"), &id("head")).unwrap_err();
        assert!(matches!(err, FusionError::NoPath { .. }));
    }

    #[test]
    fn rejects_cycles_and_self_edges() {
        let mut tree = robot();
        assert!(tree
            .set_transform(id("head"), id("odom"), Transform3D::identity(), Timestamp::zero())
            .is_err());
        assert!(tree
            .set_transform(id("head"), id("head"), Transform3D::identity(), Timestamp::zero())
            .is_err());
    }

    #[test]
    fn rejects_non_finite() {
        let mut tree = TransformTree::new();
        let bad = Transform3D::from_translation(Vec3::new(0.0, f32::INFINITY, 0.0));
        assert!(tree
            .set_transform(id("a"), id("b"), bad, Timestamp::zero())
            .is_err());
        assert!(tree.is_empty());
    }

    #[test]
    fn newer_stamp_replaces_older() {
        let mut tree = TransformTree::new();
        let a = Transform3D::from_translation(Vec3::X);
        let b = Transform3D::from_translation(Vec3::Y);
        tree.set_transform(id("p"), id("c"), b, Timestamp::from_nanos(5)).unwrap();
        tree.set_transform(id("p"), id("c"), a, Timestamp::from_nanos(1)).unwrap();
        let tf = tree.lookup_latest(&id("p"), &id("c")).unwrap();
        assert_eq!(tf.transform, b);

        tree.set_transform(id("p"), id("c"), a, Timestamp::from_nanos(9)).unwrap();
        let tf = tree.lookup_latest(&id("p"), &id("c")).unwrap();
        assert_eq!(tf.transform, a);
        assert_eq!(tree.len(), 1);
    }
}
