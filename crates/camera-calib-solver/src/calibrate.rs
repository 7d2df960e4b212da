use crate::camera::{CameraParams, Distortion, Intrinsics};
use crate::init::init_intrinsics_center_fixed;
use crate::pose::pose_from_homography;
use camera_calib_core::{estimate_homography, CorrespondenceSet, Homography, ImageSize, TermCriteria};
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use lm_nalgebra::{storage::Owned, Dyn};
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector, Isometry3, Point2, Point3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("need at least {min} views, got {got}")]
    TooFewViews { got: usize, min: usize },
    #[error("view {view} has {got} points, need at least 4")]
    TooFewPoints { view: usize, got: usize },
    #[error("degenerate homography for view {view}")]
    DegenerateHomography { view: usize },
    #[error("intrinsics initialization failed (views may be fronto-parallel)")]
    InitializationFailed,
    #[error("pose initialization failed for view {view}")]
    PoseInitialization { view: usize },
    #[error("optimization diverged")]
    Diverged,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrateParams {
    pub criteria: TermCriteria,
    /// Keep the sixth-order radial term at zero.
    pub fix_k3: bool,
    pub min_views: usize,
}

impl Default for CalibrateParams {
    fn default() -> Self {
        Self {
            criteria: TermCriteria::default(),
            fix_k3: true,
            min_views: 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub camera: CameraParams,
    pub image_size: ImageSize,
    /// Board -> camera pose per view.
    pub extrinsics: Vec<Isometry3<f64>>,
    /// RMS reprojection error over all points, in pixels.
    pub reprojection_error: f64,
    /// RMS reprojection error per view, in pixels.
    pub per_view_errors: Vec<f64>,
    /// Residual evaluations spent by the solver.
    pub evaluations: usize,
}

struct View {
    object: Vec<Point3<f64>>,
    image: Vec<Point2<f64>>,
}

/// Bundle problem over `[fx, fy, cx, cy, k1, k2, p1, p2, (k3)]` followed by
/// `[rx, ry, rz, tx, ty, tz]` per view (axis-angle rotation).
struct BundleProblem<'a> {
    views: &'a [View],
    n_intrinsics: usize,
    /// Row offset of each view's residual block.
    offsets: Vec<usize>,
    n_residuals: usize,
}

impl<'a> BundleProblem<'a> {
    fn new(views: &'a [View], fix_k3: bool) -> Self {
        let mut offsets = Vec::with_capacity(views.len());
        let mut n = 0;
        for v in views {
            offsets.push(n);
            n += 2 * v.object.len();
        }
        Self {
            views,
            n_intrinsics: if fix_k3 { 8 } else { 9 },
            offsets,
            n_residuals: n,
        }
    }

    fn pack(&self, camera: &CameraParams, poses: &[Isometry3<f64>]) -> DVector<f64> {
        let mut p = DVector::zeros(self.n_intrinsics + 6 * poses.len());
        let i = &camera.intrinsics;
        let d = &camera.distortion;
        let head = [i.fx, i.fy, i.cx, i.cy, d.k1, d.k2, d.p1, d.p2, d.k3];
        for (k, v) in head.iter().take(self.n_intrinsics).enumerate() {
            p[k] = *v;
        }
        for (v, pose) in poses.iter().enumerate() {
            let o = self.n_intrinsics + 6 * v;
            let r = pose.rotation.scaled_axis();
            let t = pose.translation.vector;
            for k in 0..3 {
                p[o + k] = r[k];
                p[o + 3 + k] = t[k];
            }
        }
        p
    }

    fn camera(&self, p: &DVector<f64>) -> CameraParams {
        CameraParams::new(
            Intrinsics::new(p[0], p[1], p[2], p[3]),
            Distortion {
                k1: p[4],
                k2: p[5],
                p1: p[6],
                p2: p[7],
                k3: if self.n_intrinsics > 8 { p[8] } else { 0.0 },
            },
        )
    }

    fn pose(&self, p: &DVector<f64>, view: usize) -> Isometry3<f64> {
        let o = self.n_intrinsics + 6 * view;
        let r = Vector3::new(p[o], p[o + 1], p[o + 2]);
        let t = Translation3::new(p[o + 3], p[o + 4], p[o + 5]);
        Isometry3::from_parts(t, UnitQuaternion::from_scaled_axis(r))
    }

    fn view_residuals(&self, camera: &CameraParams, pose: &Isometry3<f64>, view: usize, out: &mut [f64]) {
        let v = &self.views[view];
        for (k, (obj, img)) in v.object.iter().zip(&v.image).enumerate() {
            let proj = camera.project(pose, obj);
            out[2 * k] = proj.x - img.x;
            out[2 * k + 1] = proj.y - img.y;
        }
    }

    fn unpack(&self, p: &DVector<f64>) -> (CameraParams, Vec<Isometry3<f64>>) {
        let poses = (0..self.views.len()).map(|v| self.pose(p, v)).collect();
        (self.camera(p), poses)
    }
}

fn step_size(value: f64) -> f64 {
    1e-6 * value.abs().max(1.0)
}

impl BundleProblem<'_> {
    fn residuals_at(&self, p: &DVector<f64>) -> DVector<f64> {
        let camera = self.camera(p);
        let mut r = DVector::zeros(self.n_residuals);
        for view in 0..self.views.len() {
            let pose = self.pose(p, view);
            let o = self.offsets[view];
            let len = 2 * self.views[view].object.len();
            self.view_residuals(&camera, &pose, view, &mut r.as_mut_slice()[o..o + len]);
        }
        r
    }

    /// Central differences. Intrinsic columns touch every view, pose columns
    /// only their own view's block.
    fn jacobian_at(&self, p: &DVector<f64>) -> DMatrix<f64> {
        let mut j = DMatrix::zeros(self.n_residuals, p.len());

        for col in 0..self.n_intrinsics {
            let h = step_size(p[col]);
            let mut plus = p.clone();
            let mut minus = p.clone();
            plus[col] += h;
            minus[col] -= h;
            let diff = (self.residuals_at(&plus) - self.residuals_at(&minus)) / (2.0 * h);
            j.set_column(col, &diff);
        }

        let camera = self.camera(p);
        for view in 0..self.views.len() {
            let o = self.offsets[view];
            let len = 2 * self.views[view].object.len();
            let mut r_plus = vec![0.0; len];
            let mut r_minus = vec![0.0; len];
            for k in 0..6 {
                let col = self.n_intrinsics + 6 * view + k;
                let h = step_size(p[col]);
                let mut q = p.clone();
                q[col] = p[col] + h;
                self.view_residuals(&camera, &self.pose(&q, view), view, &mut r_plus);
                q[col] = p[col] - h;
                self.view_residuals(&camera, &self.pose(&q, view), view, &mut r_minus);
                for row in 0..len {
                    j[(o + row, col)] = (r_plus[row] - r_minus[row]) / (2.0 * h);
                }
            }
        }
        j
    }
}

/// Adapter handing a [`BundleProblem`] to the `levenberg_marquardt` solver.
///
/// The solver crate is built against its own `nalgebra`, so vectors and the
/// Jacobian are copied across at this boundary.
struct BundleLm<'p, 'v> {
    problem: &'p BundleProblem<'v>,
    params: DVector<f64>,
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for BundleLm<'_, '_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &lm_nalgebra::DVector<f64>) {
        self.params.copy_from_slice(x.as_slice());
    }

    fn params(&self) -> lm_nalgebra::DVector<f64> {
        lm_nalgebra::DVector::from_column_slice(self.params.as_slice())
    }

    fn residuals(&self) -> Option<lm_nalgebra::DVector<f64>> {
        let r = self.problem.residuals_at(&self.params);
        Some(lm_nalgebra::DVector::from_column_slice(r.as_slice()))
    }

    fn jacobian(&self) -> Option<lm_nalgebra::DMatrix<f64>> {
        let j = self.problem.jacobian_at(&self.params);
        Some(lm_nalgebra::DMatrix::from_column_slice(j.nrows(), j.ncols(), j.as_slice()))
    }
}

struct Refined {
    params: DVector<f64>,
    /// Sum of squared residuals at `params`.
    cost: f64,
    evaluations: usize,
    converged: bool,
}

/// Run the joint refinement from `x0`.
///
/// `criteria.epsilon` bounds the relative change of the parameters and of the
/// cost; `criteria.max_iterations` becomes the solver's patience, so at most
/// `max_iterations * (n + 1)` residual evaluations are spent.
fn refine(problem: &BundleProblem<'_>, x0: DVector<f64>, criteria: &TermCriteria) -> Result<Refined, SolveError> {
    let solver = LevenbergMarquardt::new()
        .with_xtol(criteria.epsilon)
        .with_ftol(criteria.epsilon)
        .with_patience(criteria.max_iterations.max(1));
    let (fitted, report) = solver.minimize(BundleLm { problem, params: x0 });

    if let TerminationReason::Numerical(what) = report.termination {
        warn!("bundle adjustment stopped on a numerical failure in {what}");
        return Err(SolveError::Diverged);
    }
    let cost = problem.residuals_at(&fitted.params).norm_squared();
    if !cost.is_finite() {
        return Err(SolveError::Diverged);
    }
    debug!("bundle adjustment terminated: {:?}", report.termination);
    Ok(Refined {
        params: fitted.params,
        cost,
        evaluations: report.number_of_evaluations,
        converged: report.termination.was_successful(),
    })
}

/// Planar chessboard calibration (Zhang-style initialization followed by a
/// joint Levenberg-Marquardt refinement of intrinsics and poses).
#[derive(Clone, Debug, Default)]
pub struct Calibrator {
    pub params: CalibrateParams,
}

impl Calibrator {
    pub fn new(params: CalibrateParams) -> Self {
        Self { params }
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip(self, correspondences),
            fields(views = correspondences.len(), width = image_size.width, height = image_size.height)
        )
    )]
    pub fn calibrate(
        &self,
        correspondences: &CorrespondenceSet,
        image_size: ImageSize,
    ) -> Result<CalibrationResult, SolveError> {
        let min_views = self.params.min_views.max(1);
        if correspondences.len() < min_views {
            return Err(SolveError::TooFewViews {
                got: correspondences.len(),
                min: min_views,
            });
        }

        let views: Vec<View> = correspondences
            .views()
            .map(|v| View {
                object: v.object.iter().map(|p| p.cast::<f64>()).collect(),
                image: v.image.iter().map(|p| p.cast::<f64>()).collect(),
            })
            .collect();

        // 1. Plane -> image homography per view.
        let mut homographies: Vec<Homography> = Vec::with_capacity(views.len());
        for (idx, v) in views.iter().enumerate() {
            if v.object.len() < 4 {
                return Err(SolveError::TooFewPoints {
                    view: idx,
                    got: v.object.len(),
                });
            }
            let plane: Vec<Point2<f64>> = v.object.iter().map(|p| Point2::new(p.x, p.y)).collect();
            let h = estimate_homography(&plane, &v.image)
                .ok_or(SolveError::DegenerateHomography { view: idx })?;
            homographies.push(h);
        }

        // 2. Focal lengths with the principal point at the image centre.
        let intrinsics = init_intrinsics_center_fixed(&homographies, image_size)
            .ok_or(SolveError::InitializationFailed)?;
        debug!(
            "initial intrinsics: fx={:.3} fy={:.3} cx={:.3} cy={:.3}",
            intrinsics.fx, intrinsics.fy, intrinsics.cx, intrinsics.cy
        );
        let initial = CameraParams::new(intrinsics, Distortion::default());

        // 3. Pose per view.
        let poses = homographies
            .iter()
            .enumerate()
            .map(|(view, h)| pose_from_homography(&intrinsics, h).ok_or(SolveError::PoseInitialization { view }))
            .collect::<Result<Vec<_>, _>>()?;

        // 4. Joint refinement.
        let problem = BundleProblem::new(&views, self.params.fix_k3);
        let x0 = problem.pack(&initial, &poses);
        let report = refine(&problem, x0, &self.params.criteria)?;

        let (camera, extrinsics) = problem.unpack(&report.params);
        if !camera.is_valid() {
            return Err(SolveError::Diverged);
        }

        let residuals = problem.residuals_at(&report.params);
        let mut per_view_errors = Vec::with_capacity(views.len());
        for (view, v) in views.iter().enumerate() {
            let o = problem.offsets[view];
            let len = 2 * v.object.len();
            let sq: f64 = residuals.rows(o, len).norm_squared();
            per_view_errors.push((sq / v.object.len() as f64).sqrt());
        }
        let total_points = correspondences.total_points().max(1);
        let reprojection_error = (report.cost / total_points as f64).sqrt();

        info!(
            "calibrated {} views in {} evaluations (converged: {}), rms {:.4} px",
            views.len(),
            report.evaluations,
            report.converged,
            reprojection_error
        );

        Ok(CalibrationResult {
            camera,
            image_size,
            extrinsics,
            reprojection_error,
            per_view_errors,
            evaluations: report.evaluations,
        })
    }
}

/// Convenience wrapper around [`Calibrator::calibrate`].
pub fn calibrate_camera(
    correspondences: &CorrespondenceSet,
    image_size: ImageSize,
    params: &CalibrateParams,
) -> Result<CalibrationResult, SolveError> {
    Calibrator::new(params.clone()).calibrate(correspondences, image_size)
}
