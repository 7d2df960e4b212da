use camera_calib_chessboard::gray_view;
use camera_calib_core::GrayImage;
use camera_calib_solver::{RectificationMap, RectifyError};
use std::sync::{Arc, RwLock};

/// The current undistortion map, shared between the worker that derives it
/// and the per-frame callback that applies it. The map is swapped as a
/// whole, so readers always see either the old or the new complete map.
#[derive(Clone, Debug, Default)]
pub struct SharedRectifier {
    inner: Arc<RwLock<Option<Arc<RectificationMap>>>>,
}

impl SharedRectifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, map: Arc<RectificationMap>) {
        match self.inner.write() {
            Ok(mut slot) => *slot = Some(map),
            Err(poisoned) => *poisoned.into_inner() = Some(map),
        }
    }

    pub fn clear(&self) {
        match self.inner.write() {
            Ok(mut slot) => *slot = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    /// Current map, if any. The lock is held only for the pointer copy.
    pub fn snapshot(&self) -> Option<Arc<RectificationMap>> {
        match self.inner.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.snapshot().is_some()
    }

    /// Undistort `frame` into `out`. Returns `Ok(false)` when no map is
    /// installed.
    pub fn rectify_into(&self, frame: &image::GrayImage, out: &mut GrayImage) -> Result<bool, RectifyError> {
        let Some(map) = self.snapshot() else {
            return Ok(false);
        };
        map.apply_into(&gray_view(frame), out)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_calib_core::ImageSize;
    use camera_calib_solver::{CameraParams, Distortion, Intrinsics};

    #[test]
    fn install_swap_and_clear() {
        let rect = SharedRectifier::new();
        let frame = image::GrayImage::from_fn(8, 8, |x, y| image::Luma([(x * 8 + y) as u8]));
        let mut out = GrayImage::new(0, 0);
        assert!(!rect.rectify_into(&frame, &mut out).expect("no map"));

        let cam = CameraParams::new(Intrinsics::new(40.0, 40.0, 3.5, 3.5), Distortion::default());
        let map = Arc::new(RectificationMap::build(&cam, ImageSize::new(8, 8)));
        rect.install(map.clone());
        let held = rect.snapshot().expect("installed");
        assert!(Arc::ptr_eq(&held, &map));

        assert!(rect.rectify_into(&frame, &mut out).expect("same size"));
        assert_eq!(out.data, frame.as_raw().clone());

        rect.clear();
        assert!(!rect.is_ready());
        // A reader that took a snapshot keeps a complete map.
        assert_eq!(held.size(), ImageSize::new(8, 8));
    }
}
