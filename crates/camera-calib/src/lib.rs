//! Single-camera chessboard calibration.
//!
//! This crate ties the `camera-calib-*` workspace together:
//! - accumulate debounced chessboard views from a [`FrameSource`] on a
//!   background worker,
//! - solve intrinsics and distortion and persist them as XML stores,
//! - undistort live frames with a precomputed rectification map.
//!
//! ## Quickstart
//!
//! ```no_run
//! use camera_calib::{spawn_worker, CalibrationConfig, ChessboardDetector, CornerInput,
//!     ImageSequenceSource, WorkerEvent};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = CalibrationConfig::default();
//! config.capture_pause_ms = 0;
//! let source = ImageSequenceSource::new("captures")?;
//! let finder = Arc::new(ChessboardDetector::default());
//! let worker = spawn_worker(config, finder, CornerInput::Frames(Box::new(source)))?;
//! while let Some(event) = worker.next_blocking() {
//!     if let WorkerEvent::Calibrated { result, .. } = &event {
//!         println!("rms = {:.4}px", result.reprojection_error);
//!     }
//!     if event.is_terminal() {
//!         break;
//!     }
//! }
//! worker.join();
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `camera_calib::core`: board geometry, correspondences, images, homographies.
//! - `camera_calib::chessboard`: corner detection and ordering, sub-pixel refinement.
//! - `camera_calib::solver`: intrinsic/distortion solve and rectification maps.
//! - [`CalibrationController`]: state machine plus per-frame rectification.

pub use camera_calib_chessboard as chessboard;
pub use camera_calib_core as core;
pub use camera_calib_solver as solver;

mod cancel;
mod config;
mod controller;
mod error;
mod rectifier;
mod session;
mod source;
mod state;
mod store;
mod worker;

pub use cancel::CancelToken;
pub use config::{CalibrationConfig, ConfigError};
pub use controller::CalibrationController;
pub use error::CalibError;
pub use rectifier::SharedRectifier;
pub use session::{CalibrationSession, StepOutcome};
pub use source::{FrameSource, ImageSequenceSource, LiveFrameBuffer, SourceError};
pub use state::{CalibrationState, Phase, StateError};
pub use store::{CornerStore, ParameterStore, StoreError};
pub use worker::{spawn_worker, CalibrationWorker, CornerInput, WorkerEvent, WorkerHandle};

pub use camera_calib_chessboard::{ChessboardDetector, ChessboardParams, CornerFinder, DetectError};
pub use camera_calib_core::{init_with_level, PatternGeometry};
pub use camera_calib_solver::{CalibrationResult, CameraParams, Distortion, Intrinsics, RectificationMap};

/// Install a `tracing` subscriber and route `log` records through it.
///
/// Safe to call more than once; later calls are ignored.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool, level: log::LevelFilter) {
    let _ = tracing_log::LogTracer::init();
    camera_calib_core::init_tracing(json, level);
}
