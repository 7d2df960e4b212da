use nalgebra::{Isometry3, Matrix3, Point2, Point3, Vector2};
use serde::{Deserialize, Serialize};

/// Pinhole intrinsics with zero skew.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    #[inline]
    pub fn normalize(&self, p: Point2<f64>) -> Vector2<f64> {
        Vector2::new((p.x - self.cx) / self.fx, (p.y - self.cy) / self.fy)
    }

    #[inline]
    pub fn denormalize(&self, n: Vector2<f64>) -> Point2<f64> {
        Point2::new(self.fx * n.x + self.cx, self.fy * n.y + self.cy)
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    pub fn is_valid(&self) -> bool {
        [self.fx, self.fy, self.cx, self.cy].iter().all(|v| v.is_finite())
            && self.fx > 0.0
            && self.fy > 0.0
    }
}

/// Brown-Conrady radial/tangential distortion. Coefficients are stored and
/// exchanged in the order `k1, k2, p1, p2, k3`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    pub fn to_array(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn from_array(c: [f64; 5]) -> Self {
        Self {
            k1: c[0],
            k2: c[1],
            p1: c[2],
            p2: c[3],
            k3: c[4],
        }
    }

    pub fn is_zero(&self) -> bool {
        self.to_array().iter().all(|&c| c == 0.0)
    }

    /// Map an undistorted normalized point to its distorted position.
    #[inline]
    pub fn distort(&self, n: Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;

        let xy = x * y;
        let x_tan = 2.0 * self.p1 * xy + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * xy;

        Vector2::new(x * radial + x_tan, y * radial + y_tan)
    }

    /// Fixed-point inversion of [`Distortion::distort`].
    pub fn undistort(&self, n_dist: Vector2<f64>, iters: usize) -> Vector2<f64> {
        let mut n = n_dist;
        for _ in 0..iters.max(1) {
            let err = self.distort(n) - n_dist;
            n -= err;
        }
        n
    }
}

/// Intrinsic camera model: pinhole matrix plus lens distortion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraParams {
    pub intrinsics: Intrinsics,
    pub distortion: Distortion,
}

impl CameraParams {
    pub fn new(intrinsics: Intrinsics, distortion: Distortion) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    /// Row-major 3x3 camera matrix.
    pub fn matrix(&self) -> Matrix3<f64> {
        self.intrinsics.matrix()
    }

    /// Rebuild from a camera matrix; skew and the bottom row are ignored.
    pub fn from_matrix(k: &Matrix3<f64>, distortion: Distortion) -> Self {
        Self::new(
            Intrinsics::new(k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)]),
            distortion,
        )
    }

    pub fn is_valid(&self) -> bool {
        self.intrinsics.is_valid() && self.distortion.to_array().iter().all(|c| c.is_finite())
    }

    /// Project a point given in camera coordinates.
    #[inline]
    pub fn project_camera_point(&self, p: &Point3<f64>) -> Point2<f64> {
        let n = Vector2::new(p.x / p.z, p.y / p.z);
        self.intrinsics.denormalize(self.distortion.distort(n))
    }

    /// Project a board point through `pose` (board -> camera).
    #[inline]
    pub fn project(&self, pose: &Isometry3<f64>, board_point: &Point3<f64>) -> Point2<f64> {
        self.project_camera_point(&pose.transform_point(board_point))
    }

    /// Remove distortion from a pixel, returning the ideal pinhole pixel.
    pub fn undistort_pixel(&self, p: Point2<f64>) -> Point2<f64> {
        let n = self.intrinsics.normalize(p);
        self.intrinsics.denormalize(self.distortion.undistort(n, 20))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, UnitQuaternion};

    fn camera() -> CameraParams {
        CameraParams::new(
            Intrinsics::new(800.0, 790.0, 318.0, 242.0),
            Distortion {
                k1: -0.21,
                k2: 0.08,
                p1: 0.001,
                p2: -0.0015,
                k3: 0.0,
            },
        )
    }

    #[test]
    fn matrix_round_trip() {
        let cam = camera();
        let k = cam.matrix();
        assert_eq!(k[(0, 1)], 0.0);
        assert_eq!(k[(2, 2)], 1.0);
        assert_eq!(CameraParams::from_matrix(&k, cam.distortion), cam);
    }

    #[test]
    fn coefficient_order_is_k1_k2_p1_p2_k3() {
        let d = Distortion::from_array([1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!((d.k1, d.k2, d.p1, d.p2, d.k3), (1.0, 2.0, 3.0, 4.0, 5.0));
        assert_eq!(d.to_array(), [1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn undistort_inverts_distort() {
        let d = camera().distortion;
        let n = Vector2::new(0.21, -0.17);
        let back = d.undistort(d.distort(n), 20);
        assert_relative_eq!(back, n, epsilon = 1e-9);
    }

    #[test]
    fn projects_optical_axis_to_principal_point() {
        let cam = camera();
        let pose = Isometry3::from_parts(Translation3::new(0.0, 0.0, 500.0), UnitQuaternion::identity());
        let p = cam.project(&pose, &Point3::origin());
        assert_relative_eq!(p, Point2::new(318.0, 242.0), epsilon = 1e-12);
        assert_relative_eq!(cam.undistort_pixel(p), p, epsilon = 1e-12);
    }
}
