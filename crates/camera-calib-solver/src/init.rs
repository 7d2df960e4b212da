//! Closed-form starting point for the bundle solve.

use crate::camera::Intrinsics;
use camera_calib_core::{Homography, ImageSize};
use log::debug;
use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};

/// Focal lengths from plane homographies with the principal point fixed at
/// the image centre.
///
/// With `Hc = T * H` (`T` shifts the centre to the origin) the first two
/// columns of `diag(1/fx, 1/fy, 1) * Hc` are a scaled orthonormal pair. That
/// gives two equations per view, linear in `a = 1/fx^2` and `b = 1/fy^2`:
///
/// ```text
/// h1x*h2x*a + h1y*h2y*b           = -h1z*h2z
/// (h1x^2-h2x^2)*a + (h1y^2-h2y^2)*b = -(h1z^2-h2z^2)
/// ```
///
/// solved in the least-squares sense over all views. Returns `None` when the
/// system is singular (e.g. only fronto-parallel views) or yields a
/// non-positive solution.
pub fn init_intrinsics_center_fixed(
    homographies: &[Homography],
    image_size: ImageSize,
) -> Option<Intrinsics> {
    let (cx, cy) = image_size.center();
    let t = Matrix3::new(
        1.0, 0.0, -cx, //
        0.0, 1.0, -cy, //
        0.0, 0.0, 1.0,
    );

    let mut ata = Matrix2::<f64>::zeros();
    let mut atb = Vector2::<f64>::zeros();

    for h in homographies {
        let hc = t * h.h;
        let norm = hc.norm();
        if !(norm.is_finite() && norm > 0.0) {
            continue;
        }
        let hc = hc / norm;
        let h1: Vector3<f64> = hc.column(0).into_owned();
        let h2: Vector3<f64> = hc.column(1).into_owned();

        let rows = [
            (
                Vector2::new(h1.x * h2.x, h1.y * h2.y),
                -h1.z * h2.z,
            ),
            (
                Vector2::new(h1.x * h1.x - h2.x * h2.x, h1.y * h1.y - h2.y * h2.y),
                -(h1.z * h1.z - h2.z * h2.z),
            ),
        ];
        for (row, rhs) in rows {
            ata += row * row.transpose();
            atb += row * rhs;
        }
    }

    if ata.determinant().abs() <= 1e-12 * ata.norm_squared() {
        return None;
    }
    let sol = ata.try_inverse()? * atb;
    let (a, b) = (sol.x, sol.y);
    debug!("focal init: 1/fx^2 = {a:e}, 1/fy^2 = {b:e}");
    if !(a.is_finite() && b.is_finite() && a > 0.0 && b > 0.0) {
        return None;
    }

    let intr = Intrinsics::new(1.0 / a.sqrt(), 1.0 / b.sqrt(), cx, cy);
    intr.is_valid().then_some(intr)
}
