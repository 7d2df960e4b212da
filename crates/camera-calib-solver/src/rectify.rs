use crate::camera::CameraParams;
use camera_calib_core::{sample_bilinear_u8, GrayImage, GrayImageView, ImageSize};
use nalgebra::{Point2, Vector2};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RectifyError {
    #[error("frame is {got_w}x{got_h}, map was built for {width}x{height}")]
    SizeMismatch {
        width: u32,
        height: u32,
        got_w: u32,
        got_h: u32,
    },
}

/// Dense undistortion lookup: destination pixel `(u, v)` samples the source
/// at `(map_x[i], map_y[i])` with `i = v * width + u`.
#[derive(Clone, Debug, PartialEq)]
pub struct RectificationMap {
    size: ImageSize,
    map_x: Vec<f32>,
    map_y: Vec<f32>,
}

impl RectificationMap {
    /// Build the map for `camera` with the same matrix as the new camera and
    /// no rectifying rotation.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(camera), fields(width = size.width, height = size.height))
    )]
    pub fn build(camera: &CameraParams, size: ImageSize) -> Self {
        let intr = &camera.intrinsics;
        let mut map_x = Vec::with_capacity(size.area());
        let mut map_y = Vec::with_capacity(size.area());

        for v in 0..size.height {
            let y = (v as f64 - intr.cy) / intr.fy;
            for u in 0..size.width {
                let x = (u as f64 - intr.cx) / intr.fx;
                let d = camera.distortion.distort(Vector2::new(x, y));
                let src = intr.denormalize(d);
                map_x.push(src.x as f32);
                map_y.push(src.y as f32);
            }
        }

        Self { size, map_x, map_y }
    }

    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// Source location sampled for destination pixel `(u, v)`.
    pub fn lookup(&self, u: u32, v: u32) -> Option<Point2<f32>> {
        if u >= self.size.width || v >= self.size.height {
            return None;
        }
        let i = v as usize * self.size.width as usize + u as usize;
        Some(Point2::new(self.map_x[i], self.map_y[i]))
    }

    fn check_size(&self, got: ImageSize) -> Result<(), RectifyError> {
        if got != self.size {
            return Err(RectifyError::SizeMismatch {
                width: self.size.width,
                height: self.size.height,
                got_w: got.width,
                got_h: got.height,
            });
        }
        Ok(())
    }

    /// Remap `src` into `dst`, reusing `dst`'s buffer. Samples falling
    /// outside the source are black.
    pub fn apply_into(&self, src: &GrayImageView<'_>, dst: &mut GrayImage) -> Result<(), RectifyError> {
        self.check_size(src.size())?;
        if dst.size() != self.size {
            *dst = GrayImage::new(self.size.width as usize, self.size.height as usize);
        }
        for ((out, &x), &y) in dst.data.iter_mut().zip(&self.map_x).zip(&self.map_y) {
            *out = sample_bilinear_u8(src, x, y);
        }
        Ok(())
    }

    pub fn apply(&self, src: &GrayImageView<'_>) -> Result<GrayImage, RectifyError> {
        let mut dst = GrayImage::new(self.size.width as usize, self.size.height as usize);
        self.apply_into(src, &mut dst)?;
        Ok(dst)
    }
}
