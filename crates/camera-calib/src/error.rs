use crate::config::ConfigError;
use crate::source::SourceError;
use crate::state::StateError;
use crate::store::StoreError;
use camera_calib_chessboard::DetectError;
use camera_calib_solver::{RectifyError, SolveError};

/// Operator-facing failure taxonomy. Each variant is terminal for the
/// operation that produced it; per-frame detection misses never surface
/// here.
#[derive(thiserror::Error, Debug)]
pub enum CalibError {
    #[error("device unavailable: {0}")]
    DeviceUnavailable(#[from] SourceError),
    #[error("calibration failed: {0}")]
    SolveFailure(#[from] SolveError),
    #[error("store format error: {0}")]
    StoreFormat(#[from] StoreError),
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(#[from] ConfigError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("no chessboard found for view {view} after {misses} frame(s)")]
    BoardNotFound { view: usize, misses: u32 },
    #[error(transparent)]
    Detection(#[from] DetectError),
    #[error(transparent)]
    Rectify(#[from] RectifyError),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error("cannot start worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}
