use chess_corners::CornerDescriptor;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Raw chessboard corner candidate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Corner {
    /// Pixel position (pixel centres at integer coordinates).
    pub position: Point2<f32>,
    /// Direction of the corner's dark/bright diagonal, radians, modulo π.
    pub orientation: f32,
    /// Detector response; larger is stronger.
    pub strength: f32,
}

impl Corner {
    pub fn new(x: f32, y: f32, orientation: f32, strength: f32) -> Self {
        Self {
            position: Point2::new(x, y),
            orientation,
            strength,
        }
    }
}

impl From<&CornerDescriptor> for Corner {
    fn from(c: &CornerDescriptor) -> Self {
        Corner::new(c.x as f32, c.y as f32, c.orientation as f32, c.response as f32)
    }
}
