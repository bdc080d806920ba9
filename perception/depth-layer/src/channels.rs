//! Threads draining the calibration and depth channels.
//!
//! Each channel gets one thread that handles an event to completion before
//! receiving the next. A thread exits once its sender is dropped.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};

use sensor_types::{CameraInfo, DepthImage};
use tracing::{debug, error};

use crate::layer::DepthLayer;

/// Handles to the two listener threads.
#[derive(Debug)]
pub struct Listeners {
    info: JoinHandle<usize>,
    depth: JoinHandle<usize>,
}

/// Events handled by each listener before its channel closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListenerStats {
    /// Calibration events received.
    pub camera_infos: usize,
    /// Depth frames received, delivered or dropped.
    pub depth_frames: usize,
}

impl Listeners {
    /// Waits for both channels to close.
    ///
    /// A listener that panicked is logged at error level and reports zero
    /// events.
    #[must_use]
    pub fn join(self) -> ListenerStats {
        ListenerStats {
            camera_infos: joined("camera_info", self.info),
            depth_frames: joined("depth", self.depth),
        }
    }
}

fn joined(listener: &'static str, handle: JoinHandle<usize>) -> usize {
    handle.join().unwrap_or_else(|_| {
        error!(listener, "listener thread panicked");
        0
    })
}

/// Spawns one thread per inbound channel, both feeding `layer`.
///
/// Failures are logged by the layer and the thread moves on to the next
/// event.
#[must_use]
pub fn spawn_listeners(
    layer: Arc<DepthLayer>,
    info_rx: Receiver<CameraInfo>,
    depth_rx: Receiver<DepthImage>,
) -> Listeners {
    let info_layer = Arc::clone(&layer);
    let info = thread::spawn(move || {
        let mut handled = 0;
        for info in info_rx {
            let _ = info_layer.handle_camera_info(&info);
            handled += 1;
        }
        debug!(handled, "camera info channel closed");
        handled
    });

    let depth = thread::spawn(move || {
        let mut handled = 0;
        for image in depth_rx {
            let _ = layer.handle_depth_frame(&image);
            handled += 1;
        }
        debug!(handled, "depth channel closed");
        handled
    });

    Listeners { info, depth }
}
