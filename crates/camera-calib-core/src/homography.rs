use nalgebra::{DMatrix, Matrix3, Point2, Vector2, Vector3};
use std::f64::consts::SQRT_2;

/// Plane-to-plane projective map, `dst ~ H * src`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Point2<f64> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        let w = v[2];
        Point2::new(v[0] / w, v[1] / w)
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }
}

/// Similarity taking `pts` to zero mean and mean radius `sqrt(2)`.
fn conditioner(pts: &[Point2<f64>]) -> Matrix3<f64> {
    let n = pts.len() as f64;
    let centroid = pts.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords) / n;
    let spread = pts.iter().map(|p| (p.coords - centroid).norm()).sum::<f64>() / n;
    let s = if spread > 1e-12 { SQRT_2 / spread } else { 1.0 };
    Matrix3::new(s, 0.0, -s * centroid.x, 0.0, s, -s * centroid.y, 0.0, 0.0, 1.0)
}

fn transform(t: &Matrix3<f64>, p: &Point2<f64>) -> (f64, f64) {
    let v = t * p.to_homogeneous();
    (v.x / v.z, v.y / v.z)
}

/// Estimate `H` such that `dst ~ H * src` with the normalized DLT.
///
/// Needs at least 4 correspondences. Returns `None` for mismatched inputs or a
/// degenerate (e.g. collinear) configuration.
pub fn estimate_homography(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }
    let ts = conditioner(src);
    let td = conditioner(dst);

    // Two rows per match; at least 9 rows so the SVD yields a full V.
    let rows = (2 * src.len()).max(9);
    let mut a = DMatrix::<f64>::zeros(rows, 9);
    for (k, (p, q)) in src.iter().zip(dst).enumerate() {
        let (x, y) = transform(&ts, p);
        let (u, v) = transform(&td, q);
        let r = 2 * k;
        a.row_mut(r)
            .copy_from_slice(&[-x, -y, -1.0, 0.0, 0.0, 0.0, u * x, u * y, u]);
        a.row_mut(r + 1)
            .copy_from_slice(&[0.0, 0.0, 0.0, -x, -y, -1.0, v * x, v * y, v]);
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&i, &j| svd.singular_values[i].total_cmp(&svd.singular_values[j]));
    // A second vanishing singular value leaves the solution underdetermined.
    if order.len() < 2 || svd.singular_values[order[1]] < 1e-10 {
        return None;
    }
    let null = v_t.row(order[0]);
    let hn = Matrix3::from_fn(|r, c| null[3 * r + c]);

    let h = td.try_inverse()? * hn * ts;
    let scale = h[(2, 2)];
    if !scale.is_finite() || scale.abs() < 1e-12 {
        return None;
    }
    Some(Homography::new(h / scale))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_close(a: Point2<f64>, b: Point2<f64>, tol: f64) {
        assert!(
            (a.x - b.x).abs() < tol && (a.y - b.y).abs() < tol,
            "expected ({:.6},{:.6}) ~ ({:.6},{:.6}) within {}",
            a.x,
            a.y,
            b.x,
            b.y,
            tol
        );
    }

    #[test]
    fn inverse_round_trips_points() {
        let h = Homography::new(Matrix3::new(
            1.2, 0.1, 5.0, //
            -0.05, 0.9, 3.0, //
            0.001, 0.0005, 1.0,
        ));
        let inv = h.inverse().expect("invertible");

        for p in [
            Point2::new(0.0, 0.0),
            Point2::new(50.0, -20.0),
            Point2::new(320.0, 200.0),
        ] {
            assert_close(inv.apply(h.apply(p)), p, 1e-9);
        }
    }

    #[test]
    fn dlt_recovers_board_to_image_map() {
        let ground_truth = Homography::new(Matrix3::new(
            2.1, 0.2, 120.0, //
            -0.1, 1.9, 60.0, //
            0.0006, 0.0004, 1.0,
        ));

        let board: Vec<Point2<f64>> = (0..4)
            .flat_map(|r| (0..5).map(move |c| Point2::new(c as f64 * 20.0, r as f64 * 20.0)))
            .collect();
        let img: Vec<Point2<f64>> = board.iter().map(|&p| ground_truth.apply(p)).collect();

        let estimated = estimate_homography(&board, &img).expect("estimate");
        assert_relative_eq!(estimated.h, ground_truth.h, epsilon = 1e-6, max_relative = 1e-6);
        assert_close(
            estimated.apply(Point2::new(33.0, 47.0)),
            ground_truth.apply(Point2::new(33.0, 47.0)),
            1e-6,
        );
    }

    #[test]
    fn minimal_four_point_case() {
        let src = [
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        let dst = src.map(|p| Point2::new(2.0 * p.x + 3.0, 2.0 * p.y - 1.0));
        let h = estimate_homography(&src, &dst).expect("estimate");
        assert_close(h.apply(Point2::new(0.5, 0.5)), Point2::new(4.0, 0.0), 1e-9);
    }

    #[test]
    fn mismatched_or_collinear_inputs_fail() {
        let src = [Point2::new(0.0, 0.0); 4];
        let dst = [Point2::new(1.0, 1.0); 3];
        assert!(estimate_homography(&src, &dst).is_none());

        let line: Vec<Point2<f64>> = (0..6).map(|i| Point2::new(i as f64, 0.0)).collect();
        assert!(estimate_homography(&line, &line).is_none());
    }
}
