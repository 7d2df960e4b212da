//! Gradient-orthogonality sub-pixel corner refinement.
//!
//! For a true saddle point `q`, every image gradient inside a small window is
//! orthogonal to the vector from `q` to the sample. Each iteration solves the
//! 2x2 normal equations of that condition, Gaussian-weighted across the
//! window, and moves `q` to the solution.

use crate::params::SubPixParams;
use camera_calib_core::{GrayImageView, ImagePoint};
use nalgebra::Point2;

#[inline]
fn sample_clamped(src: &GrayImageView<'_>, x: f64, y: f64) -> f64 {
    let max_x = src.width.saturating_sub(1) as f64;
    let max_y = src.height.saturating_sub(1) as f64;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(src.width - 1);
    let y1 = (y0 + 1).min(src.height - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = src.get(x0, y0) as f64;
    let p10 = src.get(x1, y0) as f64;
    let p01 = src.get(x0, y1) as f64;
    let p11 = src.get(x1, y1) as f64;

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

fn weight_mask(radius: usize, zero_zone: Option<u32>) -> Vec<f64> {
    let win = 2 * radius + 1;
    let r = radius as f64;
    let mut mask = Vec::with_capacity(win * win);
    for i in 0..win {
        let y = (i as f64 - r) / r;
        let vy = (-y * y).exp();
        for j in 0..win {
            let x = (j as f64 - r) / r;
            mask.push(vy * (-x * x).exp());
        }
    }

    if let Some(zz) = zero_zone {
        let zz = (zz as usize).min(radius);
        for i in radius - zz..=radius + zz {
            for j in radius - zz..=radius + zz {
                mask[i * win + j] = 0.0;
            }
        }
    }
    mask
}

/// Refine one corner estimate. Returns `initial` when the iteration is
/// ill-conditioned or wanders outside the search window.
pub fn refine_corner_subpix(
    src: &GrayImageView<'_>,
    initial: ImagePoint,
    params: &SubPixParams,
) -> ImagePoint {
    let radius = params.window_radius.max(1) as usize;
    let mask = weight_mask(radius, params.zero_zone);
    refine_with_mask(src, initial, radius, &mask, params)
}

fn refine_with_mask(
    src: &GrayImageView<'_>,
    initial: ImagePoint,
    radius: usize,
    mask: &[f64],
    params: &SubPixParams,
) -> ImagePoint {
    if src.width == 0 || src.height == 0 {
        return initial;
    }

    let win = 2 * radius + 1;
    let patch_w = win + 2;
    let eps_sq = params.criteria.epsilon * params.criteria.epsilon;
    let max_iters = params.criteria.max_iterations.max(1);

    let (x0, y0) = (initial.x as f64, initial.y as f64);
    let (mut cx, mut cy) = (x0, y0);
    let mut patch = vec![0.0f64; patch_w * patch_w];

    for _ in 0..max_iters {
        // patch[i][j] samples (cx - radius - 1 + j, cy - radius - 1 + i)
        let ox = cx - radius as f64 - 1.0;
        let oy = cy - radius as f64 - 1.0;
        for i in 0..patch_w {
            for j in 0..patch_w {
                patch[i * patch_w + j] = sample_clamped(src, ox + j as f64, oy + i as f64);
            }
        }

        let (mut a, mut b, mut c, mut bb1, mut bb2) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for i in 0..win {
            let py = i as f64 - radius as f64;
            for j in 0..win {
                let m = mask[i * win + j];
                if m == 0.0 {
                    continue;
                }
                let px = j as f64 - radius as f64;
                let tgx = patch[(i + 1) * patch_w + j + 2] - patch[(i + 1) * patch_w + j];
                let tgy = patch[(i + 2) * patch_w + j + 1] - patch[i * patch_w + j + 1];
                let gxx = tgx * tgx * m;
                let gxy = tgx * tgy * m;
                let gyy = tgy * tgy * m;
                a += gxx;
                b += gxy;
                c += gyy;
                bb1 += gxx * px + gxy * py;
                bb2 += gxy * px + gyy * py;
            }
        }

        let det = a * c - b * b;
        if det.abs() <= f64::EPSILON * f64::EPSILON {
            break;
        }
        let nx = cx + (c * bb1 - b * bb2) / det;
        let ny = cy + (a * bb2 - b * bb1) / det;
        let err = (nx - cx).powi(2) + (ny - cy).powi(2);
        cx = nx;
        cy = ny;

        if !cx.is_finite()
            || !cy.is_finite()
            || cx < 0.0
            || cy < 0.0
            || cx >= src.width as f64
            || cy >= src.height as f64
        {
            break;
        }
        if err <= eps_sq {
            break;
        }
    }

    if !cx.is_finite()
        || !cy.is_finite()
        || (cx - x0).abs() > radius as f64
        || (cy - y0).abs() > radius as f64
    {
        return initial;
    }
    Point2::new(cx as f32, cy as f32)
}

/// Refine every corner in place.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(level = "debug", skip(src, corners, params), fields(n = corners.len()))
)]
pub fn refine_corners_subpix(
    src: &GrayImageView<'_>,
    corners: &mut [ImagePoint],
    params: &SubPixParams,
) {
    let radius = params.window_radius.max(1) as usize;
    let mask = weight_mask(radius, params.zero_zone);
    for corner in corners.iter_mut() {
        *corner = refine_with_mask(src, *corner, radius, &mask, params);
    }
}
