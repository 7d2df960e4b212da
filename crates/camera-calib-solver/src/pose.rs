use crate::camera::Intrinsics;
use camera_calib_core::Homography;
use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3};

/// Board pose (board -> camera) from a plane homography and intrinsics.
///
/// Decomposes `K^-1 H = λ [r1 r2 t]`, projects `[r1 r2 r1×r2]` onto SO(3)
/// and flips the sign when the board would end up behind the camera.
pub fn pose_from_homography(intrinsics: &Intrinsics, h: &Homography) -> Option<Isometry3<f64>> {
    let k_inv = intrinsics.matrix().try_inverse()?;
    let m = k_inv * h.h;

    let h1 = m.column(0).into_owned();
    let h2 = m.column(1).into_owned();
    let h3 = m.column(2).into_owned();

    let scale = 0.5 * (h1.norm() + h2.norm());
    if !(scale.is_finite() && scale > 0.0) {
        return None;
    }
    let mut lambda = 1.0 / scale;
    if h3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = h1 * lambda;
    let r2 = h2 * lambda;
    let r3 = r1.cross(&r2);
    let r_mat = Matrix3::from_columns(&[r1, r2, r3]);

    // Closest rotation in the Frobenius sense.
    let svd = r_mat.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let t: Vector3<f64> = h3 * lambda;
    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_orth));
    let pose = Isometry3::from_parts(Translation3::from(t), rot);
    pose.translation.vector.iter().all(|v| v.is_finite()).then_some(pose)
}
