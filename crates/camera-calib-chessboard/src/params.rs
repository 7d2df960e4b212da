use camera_calib_core::TermCriteria;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GridGraphParams {
    pub min_spacing_pix: f32,
    pub max_spacing_pix: f32,
    pub k_neighbors: usize,
    pub orientation_tolerance_deg: f32,
}

impl Default for GridGraphParams {
    fn default() -> Self {
        Self {
            min_spacing_pix: 5.0,
            max_spacing_pix: 120.0,
            k_neighbors: 8,
            orientation_tolerance_deg: 22.5,
        }
    }
}

/// Local sub-pixel corner refinement.
///
/// The sampling window is `(2 * window_radius + 1)` pixels on a side, so the
/// default radius of 5 matches the classic `cornerSubPix(win = 5x5)` contract.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SubPixParams {
    pub window_radius: u32,
    /// Half size of the central dead zone excluded from the sums; `None`
    /// disables it.
    pub zero_zone: Option<u32>,
    pub criteria: TermCriteria,
}

impl Default for SubPixParams {
    fn default() -> Self {
        Self {
            window_radius: 5,
            zero_zone: None,
            criteria: TermCriteria::default(),
        }
    }
}

/// Parameters specific to the chessboard detector.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessboardParams {
    /// Relative ChESS response threshold passed to `chess-corners`.
    pub threshold_rel: f32,
    /// Non-maximum suppression radius passed to `chess-corners`.
    pub nms_radius: u32,
    /// Minimal corner strength to consider.
    pub min_strength: f32,
    pub graph: GridGraphParams,
    pub subpix: SubPixParams,
}

impl Default for ChessboardParams {
    fn default() -> Self {
        Self {
            threshold_rel: 0.2,
            nms_radius: 2,
            min_strength: 0.0,
            graph: GridGraphParams::default(),
            subpix: SubPixParams::default(),
        }
    }
}
