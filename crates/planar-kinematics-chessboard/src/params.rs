use serde::{Deserialize, Serialize};

/// Settings forwarded to the ChESS corner detector.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessCornerParams {
    /// Relative response threshold as a fraction of the strongest response.
    pub threshold_rel: f32,
    /// Non-maximum suppression radius in pixels.
    pub nms_radius: u32,
}

impl Default for ChessCornerParams {
    fn default() -> Self {
        Self {
            threshold_rel: 0.2,
            nms_radius: 2,
        }
    }
}

/// Neighbour search settings for the 4-connected grid graph.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GridGraphParams {
    /// Absolute lower bound on corner spacing.
    pub min_spacing_pix: f32,
    /// Absolute upper bound on corner spacing.
    pub max_spacing_pix: f32,
    /// Neighbour distance window relative to each corner's nearest-neighbour
    /// distance, `[min_ratio, max_ratio]`.
    pub spacing_ratio: [f32; 2],
    /// Number of kd-tree neighbours inspected per corner.
    pub k_neighbors: usize,
    /// Maximal deviation of an edge from the grid axes.
    pub orientation_tolerance_deg: f32,
}

impl Default for GridGraphParams {
    fn default() -> Self {
        Self {
            min_spacing_pix: 4.0,
            max_spacing_pix: 1000.0,
            spacing_ratio: [0.5, 1.6],
            k_neighbors: 8,
            orientation_tolerance_deg: 25.0,
        }
    }
}

/// Iterative sub-pixel refinement of coarse corners.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CornerRefineParams {
    /// Half size of the search window; the window is `2 * half_window + 1` wide.
    pub half_window: usize,
    /// Iteration cap.
    pub max_iters: usize,
    /// Stop once a step is shorter than this (pixels).
    pub epsilon: f64,
}

impl Default for CornerRefineParams {
    fn default() -> Self {
        Self {
            half_window: 5,
            max_iters: 30,
            epsilon: 1e-3,
        }
    }
}

/// Parameters of the checker pattern detector.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessboardParams {
    pub chess: ChessCornerParams,
    pub graph: GridGraphParams,
    pub refine: CornerRefineParams,
    /// Minimal corner strength to consider.
    pub min_strength: f32,
}
