//! Chessboard inner-corner detector built on top of `camera-calib-core`.
//!
//! Pipeline:
//! 1. Detect ChESS corner candidates with `chess-corners`.
//! 2. Filter weak candidates.
//! 3. Link each corner to at most one neighbor per image direction, using
//!    spacing and corner orientation (adjacent corners have orthogonal
//!    diagonals, and the edge between them runs at ~45° to both).
//! 4. BFS each connected component and assign integer grid coordinates.
//! 5. Keep the component whose bounding box is exactly `columns x rows`
//!    (or the 90°-rotated board) and emit its corners row-major.
//! 6. Refine every corner to sub-pixel accuracy.

mod corner;
mod detector;
mod geom;
mod gridgraph;
mod overlay;
mod params;
mod subpix;

pub use corner::Corner;
pub use detector::{gray_view, ChessboardDetector, CornerFinder, DetectError};
pub use gridgraph::{Edge, GridGraph, GridStep};
pub use overlay::{draw_chessboard_corners, negative};
pub use params::{ChessboardParams, GridGraphParams, SubPixParams};
pub use subpix::{refine_corner_subpix, refine_corners_subpix};
