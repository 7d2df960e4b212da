use crate::corner::Corner;
use crate::gridgraph::GridGraph;
use crate::params::ChessboardParams;
use crate::subpix::refine_corners_subpix;
use camera_calib_core::{GrayImageView, ImagePoint, PatternGeometry};
use chess_corners::{find_chess_corners_image, ChessConfig};
use log::debug;
use std::collections::HashSet;

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectError {
    #[error("chessboard not found (expected {expected} inner corners, {found} candidates)")]
    NotFound { expected: usize, found: usize },
    #[error("frame is empty (width={width}, height={height})")]
    EmptyFrame { width: u32, height: u32 },
}

/// Locates the full inner-corner grid of a chessboard in a frame.
///
/// On success the points are ordered row-major, one per inner corner, so the
/// `k`-th point pairs with `PatternGeometry::object_points()[k]`.
pub trait CornerFinder: Send + Sync {
    fn find_corners(
        &self,
        frame: &image::GrayImage,
        pattern: &PatternGeometry,
    ) -> Result<Vec<ImagePoint>, DetectError>;
}

/// Convert an `image::GrayImage` into the lightweight core view type.
pub fn gray_view(img: &image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// ChESS corners, grid graph, then sub-pixel refinement.
#[derive(Clone, Debug, Default)]
pub struct ChessboardDetector {
    pub params: ChessboardParams,
}

impl ChessboardDetector {
    pub fn new(params: ChessboardParams) -> Self {
        Self { params }
    }

    fn chess_config(&self) -> ChessConfig {
        let mut cfg = ChessConfig::single_scale();
        cfg.params.threshold_rel = self.params.threshold_rel as _;
        cfg.params.nms_radius = self.params.nms_radius as _;
        cfg
    }

    /// Raw ChESS candidates for `img`.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, img), fields(width = img.width(), height = img.height()))
    )]
    pub fn raw_corners(&self, img: &image::GrayImage) -> Vec<Corner> {
        find_chess_corners_image(img, &self.chess_config())
            .iter()
            .map(Corner::from)
            .collect()
    }

    /// Full pipeline on one frame.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip(self, img, pattern),
            fields(width = img.width(), height = img.height(), columns = pattern.columns, rows = pattern.rows)
        )
    )]
    pub fn detect(
        &self,
        img: &image::GrayImage,
        pattern: &PatternGeometry,
    ) -> Result<Vec<ImagePoint>, DetectError> {
        if img.width() == 0 || img.height() == 0 {
            return Err(DetectError::EmptyFrame {
                width: img.width(),
                height: img.height(),
            });
        }

        let raw = self.raw_corners(img);
        let Some(mut points) = self.detect_from_corners(&raw, pattern) else {
            return Err(DetectError::NotFound {
                expected: pattern.n_points(),
                found: raw.len(),
            });
        };

        refine_corners_subpix(&gray_view(img), &mut points, &self.params.subpix);
        Ok(points)
    }

    /// Assemble a complete `columns x rows` grid out of corner candidates.
    ///
    /// Returns pixel-accurate positions in row-major order, or `None` when no
    /// connected component forms exactly the expected grid.
    pub fn detect_from_corners(
        &self,
        corners: &[Corner],
        pattern: &PatternGeometry,
    ) -> Option<Vec<ImagePoint>> {
        // 1. Filter by strength.
        let strong: Vec<Corner> = corners
            .iter()
            .copied()
            .filter(|c| c.strength >= self.params.min_strength)
            .collect();

        let n_points = pattern.n_points();
        debug!(
            "{} of {} ChESS corners pass the strength filter",
            strong.len(),
            corners.len()
        );
        if strong.len() < n_points {
            return None;
        }

        // 2. Grid graph; only components of exactly the board size qualify.
        let graph = GridGraph::new(&strong, &self.params.graph);
        let mut components = graph.components();
        components.retain(|c| c.len() == n_points);

        // 3. The first component that forms the board in either orientation.
        for component in components {
            let coords = graph.grid_coordinates(&component);
            if let Some(ordered) = order_grid(&coords, pattern) {
                return Some(ordered.into_iter().map(|idx| strong[idx].position).collect());
            }
        }

        debug!("no component forms a {}x{} grid", pattern.columns, pattern.rows);
        None
    }
}

impl CornerFinder for ChessboardDetector {
    fn find_corners(
        &self,
        frame: &image::GrayImage,
        pattern: &PatternGeometry,
    ) -> Result<Vec<ImagePoint>, DetectError> {
        self.detect(frame, pattern)
    }
}

/// Map BFS grid coordinates onto board indices.
///
/// `i` grows to the image right and `j` downwards. A board lying sideways in
/// the image (bounding box `rows x columns`) is rotated by 90°, never
/// mirrored, so the board frame stays right-handed.
fn order_grid(coords: &[(usize, i32, i32)], pattern: &PatternGeometry) -> Option<Vec<usize>> {
    let min_i = coords.iter().map(|c| c.1).min()?;
    let min_j = coords.iter().map(|c| c.2).min()?;
    let max_i = coords.iter().map(|c| c.1).max()?;
    let max_j = coords.iter().map(|c| c.2).max()?;
    let width = (max_i - min_i + 1) as u32;
    let height = (max_j - min_j + 1) as u32;

    let unique: HashSet<(i32, i32)> = coords.iter().map(|c| (c.1, c.2)).collect();
    if unique.len() != coords.len() || coords.len() != pattern.n_points() {
        return None;
    }

    let (cols, rows) = (pattern.columns, pattern.rows);
    let mut ordered = vec![usize::MAX; pattern.n_points()];
    if width == cols && height == rows {
        for &(node, i, j) in coords {
            let (col, row) = ((i - min_i) as u32, (j - min_j) as u32);
            ordered[pattern.point_index(row, col)] = node;
        }
    } else if width == rows && height == cols {
        for &(node, i, j) in coords {
            let (col, row) = ((j - min_j) as u32, width - 1 - (i - min_i) as u32);
            ordered[pattern.point_index(row, col)] = node;
        }
    } else {
        return None;
    }

    if ordered.contains(&usize::MAX) {
        return None;
    }
    Some(ordered)
}
