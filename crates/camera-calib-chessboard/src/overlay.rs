//! Debug overlays for detected boards.

use camera_calib_core::{ImagePoint, PatternGeometry};
use image::{GrayImage, Luma};

const FOUND: Luma<u8> = Luma([255]);
const PARTIAL: Luma<u8> = Luma([96]);

fn put(img: &mut GrayImage, x: i64, y: i64, color: Luma<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_cross(img: &mut GrayImage, p: ImagePoint, half: i64, color: Luma<u8>) {
    let (cx, cy) = (p.x.round() as i64, p.y.round() as i64);
    for d in -half..=half {
        put(img, cx + d, cy + d, color);
        put(img, cx + d, cy - d, color);
    }
}

fn draw_line(img: &mut GrayImage, a: ImagePoint, b: ImagePoint, color: Luma<u8>) {
    let steps = (b - a).abs().max().ceil().max(1.0) as usize;
    for s in 0..=steps {
        let t = s as f32 / steps as f32;
        let p = a + (b - a) * t;
        put(img, p.x.round() as i64, p.y.round() as i64, color);
    }
}

/// Draw corner markers on `img`. When `found` is set the corners are also
/// chained in row-major order, so a wrong ordering is visible at a glance.
pub fn draw_chessboard_corners(
    img: &mut GrayImage,
    pattern: &PatternGeometry,
    corners: &[ImagePoint],
    found: bool,
) {
    let color = if found { FOUND } else { PARTIAL };
    for &c in corners {
        draw_cross(img, c, 3, color);
    }
    if found && corners.len() == pattern.n_points() {
        for pair in corners.windows(2) {
            draw_line(img, pair[0], pair[1], color);
        }
    }
}

/// Photographic negative, used as the capture "flash".
pub fn negative(img: &GrayImage) -> GrayImage {
    let mut out = img.clone();
    image::imageops::invert(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;

    #[test]
    fn negative_inverts_every_pixel() {
        let img = GrayImage::from_fn(4, 3, |x, y| Luma([(x * 10 + y) as u8]));
        let neg = negative(&img);
        for (a, b) in img.pixels().zip(neg.pixels()) {
            assert_eq!(a.0[0] as u16 + b.0[0] as u16, 255);
        }
    }

    #[test]
    fn overlay_marks_corners_and_ignores_out_of_bounds() {
        let pattern = PatternGeometry::new(2, 2, 1.0).expect("pattern");
        let corners = vec![
            Point2::new(5.0, 5.0),
            Point2::new(15.0, 5.0),
            Point2::new(5.0, 15.0),
            Point2::new(-40.0, 200.0),
        ];
        let mut img = GrayImage::new(20, 20);
        draw_chessboard_corners(&mut img, &pattern, &corners, true);
        assert_eq!(img.get_pixel(5, 5).0[0], 255);
        assert_eq!(img.get_pixel(10, 5).0[0], 255);

        let mut partial = GrayImage::new(20, 20);
        draw_chessboard_corners(&mut partial, &pattern, &corners[..1], false);
        assert_eq!(partial.get_pixel(5, 5).0[0], 96);
        assert_eq!(partial.get_pixel(10, 5).0[0], 0);
    }
}
