#![allow(dead_code)]

use camera_calib::chessboard::{CornerFinder, DetectError};
use camera_calib::core::{ImagePoint, PatternGeometry};
use camera_calib::{CameraParams, Distortion, FrameSource, Intrinsics, SourceError};
use image::{GrayImage, Luma};
use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn pattern() -> PatternGeometry {
    PatternGeometry::new(12, 8, 20.0).expect("pattern")
}

pub fn ground_truth() -> CameraParams {
    CameraParams::new(
        Intrinsics::new(800.0, 790.0, 318.0, 242.0),
        Distortion {
            k1: -0.2,
            k2: 0.05,
            p1: 0.001,
            p2: -0.0005,
            k3: 0.0,
        },
    )
}

pub fn poses(n: usize) -> Vec<Isometry3<f64>> {
    let tilts = [
        (0.25, -0.1, 0.05),
        (-0.3, 0.15, -0.1),
        (0.1, 0.35, 0.2),
        (-0.15, -0.3, 0.0),
        (0.35, 0.2, -0.25),
        (-0.05, -0.4, 0.1),
        (0.2, 0.05, 0.4),
        (-0.35, -0.05, -0.3),
    ];
    tilts
        .iter()
        .take(n)
        .enumerate()
        .map(|(i, &(r, p, y))| {
            let rot = UnitQuaternion::from_euler_angles(r, p, y);
            let centre = rot * Vector3::new(110.0, 70.0, 0.0);
            let shift = Vector3::new((i as f64 - 3.5) * 8.0, (i % 3) as f64 * 10.0 - 10.0, 0.0);
            let t = Vector3::new(0.0, 0.0, 480.0 + 15.0 * i as f64) - centre + shift;
            Isometry3::from_parts(Translation3::from(t), rot)
        })
        .collect()
}

/// Board corners as seen by `camera` from each pose.
pub fn projected_views(camera: &CameraParams, views: &[Isometry3<f64>]) -> Vec<Vec<ImagePoint>> {
    let object = pattern().object_points();
    views
        .iter()
        .map(|pose| {
            object
                .iter()
                .map(|p| camera.project(pose, &p.cast::<f64>()).cast::<f32>())
                .collect()
        })
        .collect()
}

/// Frame whose top-left pixel tags which view it shows. `0` means no board.
pub fn tagged_frame(tag: u8) -> GrayImage {
    let mut img = GrayImage::from_pixel(WIDTH, HEIGHT, Luma([40]));
    img.put_pixel(0, 0, Luma([tag]));
    img
}

/// Finder that "sees" view `tag - 1` in a tagged frame.
pub struct TaggedFinder {
    pub views: Vec<Vec<ImagePoint>>,
}

impl CornerFinder for TaggedFinder {
    fn find_corners(&self, frame: &GrayImage, pattern: &PatternGeometry) -> Result<Vec<ImagePoint>, DetectError> {
        let tag = frame.get_pixel(0, 0)[0] as usize;
        tag.checked_sub(1)
            .and_then(|i| self.views.get(i))
            .cloned()
            .ok_or(DetectError::NotFound {
                expected: pattern.n_points(),
                found: 0,
            })
    }
}

/// Always shows the board of the slot being collected.
pub struct SlotSource;

impl FrameSource for SlotSource {
    fn grab(&mut self, slot: usize) -> Result<Option<GrayImage>, SourceError> {
        Ok(Some(tagged_frame(slot as u8 + 1)))
    }
}

/// Plays back a fixed list of frames, then reports no frame.
pub struct ScriptedSource {
    pub frames: std::collections::VecDeque<GrayImage>,
}

impl ScriptedSource {
    pub fn new(tags: &[u8]) -> Self {
        Self {
            frames: tags.iter().map(|&t| tagged_frame(t)).collect(),
        }
    }
}

impl FrameSource for ScriptedSource {
    fn grab(&mut self, _slot: usize) -> Result<Option<GrayImage>, SourceError> {
        Ok(self.frames.pop_front())
    }
}
