//! Board geometry for a planar chessboard target.

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// 3-D corner position in board-local millimetres (`z` is always zero).
pub type ObjectPoint = Point3<f32>;

/// 2-D corner position in image pixels.
pub type ImagePoint = Point2<f32>;

/// Static chessboard layout.
///
/// `columns`/`rows` are **inner corner** counts (not square counts).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternGeometry {
    pub columns: u32,
    pub rows: u32,
    /// Edge length of one square, in millimetres.
    pub square_size: f32,
}

/// Pattern validation errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PatternError {
    #[error("pattern needs at least 2x2 inner corners, got {columns}x{rows}")]
    InvalidSize { columns: u32, rows: u32 },
    #[error("square size must be finite and > 0, got {0}")]
    InvalidSquareSize(f32),
}

impl PatternGeometry {
    /// Validate and create a pattern.
    pub fn new(columns: u32, rows: u32, square_size: f32) -> Result<Self, PatternError> {
        let pattern = Self {
            columns,
            rows,
            square_size,
        };
        pattern.validate()?;
        Ok(pattern)
    }

    /// Check the invariants of a (possibly deserialized) pattern.
    pub fn validate(&self) -> Result<(), PatternError> {
        if self.columns < 2 || self.rows < 2 {
            return Err(PatternError::InvalidSize {
                columns: self.columns,
                rows: self.rows,
            });
        }
        if !self.square_size.is_finite() || self.square_size <= 0.0 {
            return Err(PatternError::InvalidSquareSize(self.square_size));
        }
        Ok(())
    }

    /// Number of inner corners on the board.
    #[inline]
    pub fn n_points(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    /// Row-major index of the corner at `(row, col)`.
    #[inline]
    pub fn point_index(&self, row: u32, col: u32) -> usize {
        row as usize * self.columns as usize + col as usize
    }

    /// Board coordinate of the corner at `(row, col)`.
    #[inline]
    pub fn object_point(&self, row: u32, col: u32) -> ObjectPoint {
        Point3::new(
            col as f32 * self.square_size,
            row as f32 * self.square_size,
            0.0,
        )
    }

    /// All corners of one board, row-major.
    pub fn object_points(&self) -> Vec<ObjectPoint> {
        let mut out = Vec::with_capacity(self.n_points());
        for row in 0..self.rows {
            for col in 0..self.columns {
                out.push(self.object_point(row, col));
            }
        }
        out
    }
}

/// Object points for `n_images` views of the same board.
///
/// Every entry is identical; the board does not move in its own frame.
pub fn generate_object_points(pattern: &PatternGeometry, n_images: usize) -> Vec<Vec<ObjectPoint>> {
    let board = pattern.object_points();
    vec![board; n_images]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_board_layout() {
        let pattern = PatternGeometry::new(12, 8, 20.0).expect("pattern");
        assert_eq!(pattern.n_points(), 96);

        let views = generate_object_points(&pattern, 20);
        assert_eq!(views.len(), 20);
        for view in &views {
            assert_eq!(view.len(), 96);
            assert_eq!(view[pattern.point_index(2, 3)], Point3::new(60.0, 40.0, 0.0));
        }
    }

    #[test]
    fn grid_is_row_major_and_planar() {
        let pattern = PatternGeometry::new(4, 3, 12.5).expect("pattern");
        let pts = pattern.object_points();
        for (idx, p) in pts.iter().enumerate() {
            let row = idx / 4;
            let col = idx % 4;
            assert_eq!(p.z, 0.0);
            assert_eq!(p.x, col as f32 * 12.5);
            assert_eq!(p.y, row as f32 * 12.5);
        }
        // neighbours along a row are exactly one square apart
        assert_eq!(pts[1].x - pts[0].x, 12.5);
        assert_eq!(pts[4].y - pts[0].y, 12.5);
    }

    #[test]
    fn rejects_degenerate_patterns() {
        assert!(matches!(
            PatternGeometry::new(0, 8, 20.0),
            Err(PatternError::InvalidSize { .. })
        ));
        assert!(matches!(
            PatternGeometry::new(12, 1, 20.0),
            Err(PatternError::InvalidSize { .. })
        ));
        assert!(matches!(
            PatternGeometry::new(12, 8, 0.0),
            Err(PatternError::InvalidSquareSize(_))
        ));
        assert!(PatternGeometry::new(12, 8, f32::NAN).is_err());
    }

    #[test]
    fn zero_images_yield_no_views() {
        let pattern = PatternGeometry::new(3, 3, 1.0).expect("pattern");
        assert!(generate_object_points(&pattern, 0).is_empty());
    }

    #[test]
    fn deserialized_pattern_still_needs_validation() {
        let p: PatternGeometry =
            serde_json::from_str(r#"{"columns": 1, "rows": 8, "square_size": 20.0}"#).expect("parse");
        assert!(p.validate().is_err());
    }
}
