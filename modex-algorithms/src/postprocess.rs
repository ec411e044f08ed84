//! Monitor/detector renormalisation.

use crate::slices::Slice;
use log::{info, warn};
use modex_core::PostProcessingMode;

/// Reconciles detector and monitor frame counts of finished slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostProcessor {
    mode: PostProcessingMode,
}

impl PostProcessor {
    /// Creates a post-processor applying `mode`.
    #[must_use]
    pub fn new(mode: PostProcessingMode) -> Self {
        Self { mode }
    }

    /// Scales one slice. Returns the factor applied, if any.
    ///
    /// Slices without detector frames or without monitor frames are left
    /// untouched.
    pub fn apply(&self, slice: &mut Slice) -> Option<f64> {
        info!(
            "Output '{}' ({:.2} -> {:.2}) has {} detector frames and {:.2} monitor frames",
            slice.window().id(),
            slice.window().start(),
            slice.window().end(),
            slice.detector_frames(),
            slice.monitor_frames()
        );
        if self.mode == PostProcessingMode::None {
            return None;
        }
        let detector = f64::from(slice.detector_frames());
        let monitor = slice.monitor_frames();
        if detector <= 0.0 || monitor <= 0.0 {
            warn!(
                "Output '{}' has no detector or monitor frames; not rescaled",
                slice.window().id()
            );
            return None;
        }
        match self.mode {
            PostProcessingMode::None => None,
            PostProcessingMode::ScaleMonitors => {
                let factor = detector / monitor;
                info!(" --> scaling monitors by detector-to-monitor frame ratio ({factor})");
                slice.scale_monitors(factor);
                Some(factor)
            }
            PostProcessingMode::ScaleDetectors => {
                let factor = monitor / detector;
                info!(" --> scaling detectors by monitor-to-detector frame ratio ({factor})");
                slice.scale_detectors(factor);
                Some(factor)
            }
        }
    }
}
