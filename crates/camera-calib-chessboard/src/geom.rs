//! Angle arithmetic for corner orientations.
//!
//! ChESS orientations are axes (defined modulo π) while neighbour offsets are
//! directed vectors, so both kinds of comparison are needed.

use std::f32::consts::{FRAC_PI_2, PI};

/// Unsigned difference between two angles, in `[0, π]`.
pub fn wrapped_angle_diff(a: f32, b: f32) -> f32 {
    let d = b - a;
    d.sin().atan2(d.cos()).abs()
}

/// True when the two directions are perpendicular up to `tolerance` radians.
pub fn is_perpendicular(a: f32, b: f32, tolerance: f32) -> bool {
    (wrapped_angle_diff(a, b) - FRAC_PI_2).abs() <= tolerance.abs()
}

/// Angle between the undirected axis `axis` and the directed vector angle
/// `dir`, in `[0, π/2]`.
pub fn axis_to_direction(axis: f32, dir: f32) -> f32 {
    let d = wrapped_angle_diff(axis, dir);
    d.min(PI - d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f32::consts::FRAC_PI_4;

    #[test]
    fn difference_wraps_around() {
        assert_abs_diff_eq!(wrapped_angle_diff(0.1, 2.0 * PI - 0.1), 0.2, epsilon = 1e-5);
        assert_abs_diff_eq!(wrapped_angle_diff(-FRAC_PI_2, FRAC_PI_2), PI, epsilon = 1e-5);
    }

    #[test]
    fn perpendicular_orientations() {
        assert!(is_perpendicular(FRAC_PI_4, -FRAC_PI_4, 1e-3));
        assert!(is_perpendicular(0.2, 0.2 + 3.0 * FRAC_PI_2, 1e-3));
        assert!(!is_perpendicular(0.0, 0.3, 0.1));
    }

    #[test]
    fn axes_have_no_sign() {
        assert_abs_diff_eq!(axis_to_direction(FRAC_PI_4, FRAC_PI_4 + PI), 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(axis_to_direction(0.0, 3.0 * FRAC_PI_4), FRAC_PI_4, epsilon = 1e-5);
    }
}
