//! Intrinsic calibration from planar chessboard views.
//!
//! - [`Calibrator`]: homographies, centre-fixed focal initialization, planar
//!   poses, then Levenberg-Marquardt over intrinsics, distortion and poses.
//! - [`RectificationMap`]: per-pixel undistortion lookup derived from a
//!   [`CameraParams`].

mod calibrate;
mod camera;
mod init;
mod pose;
mod rectify;

pub use calibrate::{calibrate_camera, CalibrateParams, CalibrationResult, Calibrator, SolveError};
pub use camera::{CameraParams, Distortion, Intrinsics};
pub use init::init_intrinsics_center_fixed;
pub use pose::pose_from_homography;
pub use rectify::{RectificationMap, RectifyError};
