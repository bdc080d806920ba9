//! Shared camera intrinsics slot.

use std::sync::{Mutex, MutexGuard, PoisonError};

use sensor_types::{CameraInfo, CameraIntrinsics};
use tracing::info;

use crate::error::{DepthLayerError, Result};

/// Holds the most recent usable camera intrinsics.
///
/// Starts unset. The calibration channel writes it and the depth channel
/// reads a copy; the lock is held only for that copy, never while a frame
/// is processed.
///
/// # Example
///
/// ```
/// use depth_layer::IntrinsicsStore;
///
/// let store = IntrinsicsStore::new();
/// assert!(store.get().is_none());
///
/// store.update(1000.0, 640.0, 480.0, 2, 2).unwrap();
/// assert_eq!(store.get().map(|k| k.fx), Some(500.0));
///
/// // Unequal binning is rejected and the previous value kept.
/// assert!(store.update(600.0, 320.0, 240.0, 2, 1).is_err());
/// assert_eq!(store.get().map(|k| k.fx), Some(500.0));
/// ```
#[derive(Debug, Default)]
pub struct IntrinsicsStore {
    slot: Mutex<Option<CameraIntrinsics>>,
}

impl IntrinsicsStore {
    /// Creates an unset store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Replaces the stored intrinsics from a raw calibration.
    ///
    /// A positive binning factor divides focal length and principal point.
    ///
    /// # Errors
    ///
    /// Returns [`DepthLayerError::Configuration`] if `binning_x != binning_y`;
    /// the stored value is left untouched.
    pub fn update(
        &self,
        focal_pixels: f64,
        center_x: f64,
        center_y: f64,
        binning_x: u32,
        binning_y: u32,
    ) -> Result<CameraIntrinsics> {
        let intrinsics =
            CameraIntrinsics::from_binned(focal_pixels, center_x, center_y, binning_x, binning_y)
                .map_err(|e| DepthLayerError::configuration(e.to_string()))?;
        self.store(intrinsics, binning_x);
        Ok(intrinsics)
    }

    /// Replaces the stored intrinsics from a calibration event.
    ///
    /// # Errors
    ///
    /// Same as [`IntrinsicsStore::update`].
    pub fn update_from_info(&self, info: &CameraInfo) -> Result<CameraIntrinsics> {
        let intrinsics = info
            .intrinsics()
            .map_err(|e| DepthLayerError::configuration(e.to_string()))?;
        self.store(intrinsics, info.binning_x);
        Ok(intrinsics)
    }

    fn store(&self, intrinsics: CameraIntrinsics, binning: u32) {
        let previous = self.lock().replace(intrinsics);
        if previous.is_none() {
            info!(
                fx = intrinsics.fx,
                cx = intrinsics.cx,
                cy = intrinsics.cy,
                binning,
                "camera intrinsics received"
            );
        }
    }

    /// Returns a copy of the current intrinsics, or `None` while unset.
    #[must_use]
    pub fn get(&self) -> Option<CameraIntrinsics> {
        *self.lock()
    }

    /// Returns true once intrinsics have been received.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.lock().is_some()
    }

    // A panic elsewhere cannot leave a half-written `Option<Copy>`.
    fn lock(&self) -> MutexGuard<'_, Option<CameraIntrinsics>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sensor_types::FrameId;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn starts_unset() {
        let store = IntrinsicsStore::new();
        assert!(store.get().is_none());
        assert!(!store.is_set());
    }

    #[test]
    fn zero_binning_uses_raw_values() {
        let store = IntrinsicsStore::new();
        let k = store.update(525.0, 319.5, 239.5, 0, 0).unwrap();
        assert_eq!(k, CameraIntrinsics::new(525.0, 525.0, 319.5, 239.5));
        assert_eq!(store.get(), Some(k));
    }

    #[test]
    fn unequal_binning_keeps_unset() {
        let store = IntrinsicsStore::new();
        let err = store.update(525.0, 319.5, 239.5, 4, 2).unwrap_err();
        assert!(matches!(err, DepthLayerError::Configuration(_)));
        assert!(store.get().is_none());
    }

    #[test]
    fn unequal_binning_keeps_previous() {
        let store = IntrinsicsStore::new();
        let first = store.update(525.0, 319.5, 239.5, 1, 1).unwrap();
        assert!(store.update(100.0, 1.0, 1.0, 1, 2).is_err());
        assert_eq!(store.get(), Some(first));
    }

    #[test]
    fn update_from_info_reads_projection() {
        let store = IntrinsicsStore::new();
        let info = CameraInfo::pinhole(FrameId::new("cam"), 640, 480, 570.0, 319.5, 239.5)
            .with_binning(4, 4);
        let k = store.update_from_info(&info).unwrap();
        assert_relative_eq!(k.fx, 142.5);
        assert_relative_eq!(k.cx, 79.875);
        assert_relative_eq!(k.cy, 59.875);
        assert_eq!(store.get(), Some(k));
    }

    #[test]
    fn update_from_info_rejects_unequal_binning() {
        let store = IntrinsicsStore::new();
        let first = store.update(525.0, 319.5, 239.5, 1, 1).unwrap();
        let info = CameraInfo::pinhole(FrameId::new("cam"), 640, 480, 570.0, 319.5, 239.5)
            .with_binning(2, 1);
        let err = store.update_from_info(&info).unwrap_err();
        assert!(matches!(err, DepthLayerError::Configuration(_)));
        assert_eq!(store.get(), Some(first));
    }

    #[test]
    fn concurrent_readers_see_whole_values() {
        let store = Arc::new(IntrinsicsStore::new());
        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 1..=200u32 {
                    let f = f64::from(i);
                    store.update(f, f, f, 0, 0).unwrap();
                }
            })
        };
        for _ in 0..200 {
            if let Some(k) = store.get() {
                assert_eq!(k.fx, k.cx);
                assert_eq!(k.cx, k.cy);
            }
        }
        writer.join().unwrap();
        assert_eq!(store.get().map(|k| k.fx), Some(200.0));
    }
}
