//! JSON run configuration.

use camera_calib_chessboard::ChessboardParams;
use camera_calib_core::{ImageSize, PatternError, PatternGeometry};
use camera_calib_solver::CalibrateParams;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("image count must be at least 1")]
    NoImages,
    #[error("frame size must be non-zero, got {width}x{height}")]
    EmptyFrameSize { width: u32, height: u32 },
    #[error("min_views must be at least 1")]
    NoViewsRequired,
    #[error("image count {image_count} is below the {min_views} views the solver needs")]
    TooFewImages { image_count: usize, min_views: usize },
    #[error("max_misses_per_slot must be at least 1")]
    ZeroMissLimit,
}

fn default_pattern() -> PatternGeometry {
    PatternGeometry {
        columns: 12,
        rows: 8,
        square_size: 20.0,
    }
}

/// Everything a calibration run needs. Every field has a default, so a
/// partial JSON file only overrides what it names.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub pattern: PatternGeometry,
    /// Number of accepted board views to collect.
    pub image_count: usize,
    pub frame_size: ImageSize,
    /// Consecutive successful detections required before a slot is committed.
    pub debounce_frames: u32,
    /// Pause after each accepted slot, in milliseconds.
    pub capture_pause_ms: u64,
    /// Give up on a view after this many frames without a board. `None`
    /// keeps waiting on live sources; still sources give up on the first miss.
    pub max_misses_per_slot: Option<u32>,
    pub corners_path: PathBuf,
    pub intrinsics_path: PathBuf,
    pub chessboard: ChessboardParams,
    pub calibrate: CalibrateParams,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            image_count: 20,
            frame_size: ImageSize::new(640, 480),
            debounce_frames: 6,
            capture_pause_ms: 1000,
            max_misses_per_slot: None,
            corners_path: PathBuf::from("DataCorners.xml"),
            intrinsics_path: PathBuf::from("Intrinsic.xml"),
            chessboard: ChessboardParams::default(),
            calibrate: CalibrateParams::default(),
        }
    }
}

impl CalibrationConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Reject configurations that cannot produce a calibration. Runs before
    /// any worker is started.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pattern.validate()?;
        if self.image_count == 0 {
            return Err(ConfigError::NoImages);
        }
        if self.frame_size.width == 0 || self.frame_size.height == 0 {
            return Err(ConfigError::EmptyFrameSize {
                width: self.frame_size.width,
                height: self.frame_size.height,
            });
        }
        if self.calibrate.min_views == 0 {
            return Err(ConfigError::NoViewsRequired);
        }
        if self.image_count < self.calibrate.min_views {
            return Err(ConfigError::TooFewImages {
                image_count: self.image_count,
                min_views: self.calibrate.min_views,
            });
        }
        if self.max_misses_per_slot == Some(0) {
            return Err(ConfigError::ZeroMissLimit);
        }
        Ok(())
    }

    pub fn capture_pause(&self) -> Duration {
        Duration::from_millis(self.capture_pause_ms)
    }
}
