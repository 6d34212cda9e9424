use crate::geom::dominant_axis_angle;
use crate::gridgraph::{
    assign_grid_coordinates, connected_components, local_spacings, nearest_distances, Candidate,
    GridGraph,
};
use crate::params::{ChessCornerParams, ChessboardParams};
use crate::refine::refine_corner;
use chess_corners::{find_chess_corners_image, ChessConfig};
use log::{debug, info};
use nalgebra::Point2;
use planar_kinematics_core::{CornerSet, GrayImageView, PatternSize};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Why a pattern was not found. Always recoverable.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PatternNotFound {
    #[error("invalid pattern size {rows}x{cols}: need at least 2x2 inner corners")]
    InvalidPattern { rows: usize, cols: usize },

    #[error("invalid image buffer ({width}x{height}, {len} bytes)")]
    InvalidImage {
        width: usize,
        height: usize,
        len: usize,
    },

    #[error("too few corner candidates ({found}, pattern needs {needed})")]
    TooFewCandidates { found: usize, needed: usize },

    #[error("no dominant grid direction among corner candidates")]
    NoGridAxes,

    #[error("grid neighbourhood graph is inconsistent")]
    InconsistentGrid,

    #[error("largest connected grid has {found} corners spanning {width}x{height}, pattern needs {rows}x{cols}")]
    IncompleteGrid {
        found: usize,
        width: usize,
        height: usize,
        rows: usize,
        cols: usize,
    },
}

/// Successful pattern detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternDetection {
    pub pattern: PatternSize,
    /// Refined corners, row-major.
    pub corners: CornerSet,
    /// Median distance between neighbouring corners, pixels.
    pub spacing_px: f64,
    /// Number of raw candidates the grid was assembled from.
    pub num_candidates: usize,
}

/// Checker pattern detector: ChESS candidates, grid graph, window fit,
/// canonical ordering and sub-pixel refinement.
pub struct ChessboardDetector {
    pub params: ChessboardParams,
}

impl Default for ChessboardDetector {
    fn default() -> Self {
        Self::new(ChessboardParams::default())
    }
}

/// `chess-corners` configuration derived from the detector parameters.
pub fn chess_config(params: &ChessCornerParams) -> ChessConfig {
    let mut cfg = ChessConfig::single_scale();
    cfg.params.threshold_rel = params.threshold_rel;
    cfg.params.nms_radius = params.nms_radius;
    cfg
}

impl ChessboardDetector {
    pub fn new(params: ChessboardParams) -> Self {
        Self { params }
    }

    /// Detect a pattern with `pattern.rows x pattern.cols` inner corners.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip(self, img),
            fields(width = img.width, height = img.height, rows = pattern.rows, cols = pattern.cols)
        )
    )]
    pub fn detect(
        &self,
        img: &GrayImageView<'_>,
        pattern: PatternSize,
    ) -> Result<PatternDetection, PatternNotFound> {
        if !pattern.is_valid() {
            return Err(PatternNotFound::InvalidPattern {
                rows: pattern.rows,
                cols: pattern.cols,
            });
        }
        let candidates = self.candidates(img)?;
        let coarse = self.assemble(&candidates, pattern)?;

        let points = coarse
            .corners
            .points
            .iter()
            .map(|&p| refine_corner(img, p, &self.params.refine))
            .collect();

        Ok(PatternDetection {
            corners: CornerSet::new(points),
            ..coarse
        })
    }

    /// ChESS corner candidates above the strength threshold.
    pub fn candidates(&self, img: &GrayImageView<'_>) -> Result<Vec<Candidate>, PatternNotFound> {
        let invalid = || PatternNotFound::InvalidImage {
            width: img.width,
            height: img.height,
            len: img.data.len(),
        };
        let width = u32::try_from(img.width).map_err(|_| invalid())?;
        let height = u32::try_from(img.height).map_err(|_| invalid())?;
        let buffer =
            ::image::GrayImage::from_raw(width, height, img.data.to_vec()).ok_or_else(invalid)?;

        let cfg = chess_config(&self.params.chess);
        let raw = find_chess_corners_image(&buffer, &cfg);
        let candidates: Vec<Candidate> = raw
            .iter()
            .filter(|c| c.response >= self.params.min_strength)
            .map(|c| Candidate {
                position: Point2::new(c.x, c.y),
                strength: c.response,
            })
            .collect();
        debug!(
            "{} ChESS corners, {} after strength filter",
            raw.len(),
            candidates.len()
        );
        Ok(candidates)
    }

    /// Assemble candidates into a row-major pattern grid without refinement.
    pub fn assemble(
        &self,
        candidates: &[Candidate],
        pattern: PatternSize,
    ) -> Result<PatternDetection, PatternNotFound> {
        let needed = pattern.count();
        if candidates.len() < needed {
            return Err(PatternNotFound::TooFewCandidates {
                found: candidates.len(),
                needed,
            });
        }

        let nearest = nearest_distances(candidates);
        let axis = dominant_axis_angle(nearest.iter().map(|(_, e)| e))
            .ok_or(PatternNotFound::NoGridAxes)?;
        let distances: Vec<f32> = nearest.iter().map(|(d, _)| *d).collect();
        let (spacing, median_spacing) =
            local_spacings(&distances).ok_or(PatternNotFound::NoGridAxes)?;
        debug!(
            "grid axis {:.1} deg, median spacing {:.1} px",
            axis.to_degrees(),
            median_spacing
        );

        let graph = GridGraph::new(candidates, &spacing, axis, &self.params.graph);
        let components = connected_components(&graph);
        let Some(largest) = components.iter().max_by_key(|c| c.len()) else {
            return Err(PatternNotFound::InconsistentGrid);
        };
        let coords =
            assign_grid_coordinates(&graph, largest).ok_or(PatternNotFound::InconsistentGrid)?;

        let cells = normalize_cells(&coords).ok_or(PatternNotFound::InconsistentGrid)?;
        let grid = fit_window(&cells, candidates, pattern).ok_or_else(|| {
            let (width, height) = cells.extent;
            PatternNotFound::IncompleteGrid {
                found: coords.len(),
                width,
                height,
                rows: pattern.rows,
                cols: pattern.cols,
            }
        })?;

        let ordered = canonical_order(&grid, pattern, candidates);
        info!(
            "pattern {}x{} assembled from {} candidates",
            pattern.rows,
            pattern.cols,
            candidates.len()
        );

        Ok(PatternDetection {
            pattern,
            corners: CornerSet::new(
                ordered
                    .into_iter()
                    .map(|idx| {
                        let p = candidates[idx].position;
                        Point2::new(p.x as f64, p.y as f64)
                    })
                    .collect(),
            ),
            spacing_px: median_spacing as f64,
            num_candidates: candidates.len(),
        })
    }
}

struct Cells {
    /// `(i, j)` -> candidate index, with `i, j >= 0`.
    map: HashMap<(usize, usize), usize>,
    /// Bounding box `(width, height)` in cells.
    extent: (usize, usize),
}

fn normalize_cells(coords: &[(usize, i32, i32)]) -> Option<Cells> {
    let min_i = coords.iter().map(|c| c.1).min()?;
    let min_j = coords.iter().map(|c| c.2).min()?;
    let mut map = HashMap::with_capacity(coords.len());
    let mut extent = (0usize, 0usize);
    for &(node, i, j) in coords {
        let cell = ((i - min_i) as usize, (j - min_j) as usize);
        extent.0 = extent.0.max(cell.0 + 1);
        extent.1 = extent.1.max(cell.1 + 1);
        if map.insert(cell, node).is_some() {
            return None;
        }
    }
    Some(Cells { map, extent })
}

/// Fully populated `rows x cols` window with the highest total response,
/// in either orientation. Returned as `grid[row][col]` of candidate indices.
fn fit_window(
    cells: &Cells,
    candidates: &[Candidate],
    pattern: PatternSize,
) -> Option<Vec<Vec<usize>>> {
    let (width, height) = cells.extent;
    let mut best: Option<(f32, Vec<Vec<usize>>)> = None;

    for transposed in [false, true] {
        // Extent of the pattern along the graph's i and j axes.
        let (span_i, span_j) = if transposed {
            (pattern.rows, pattern.cols)
        } else {
            (pattern.cols, pattern.rows)
        };
        if span_i > width || span_j > height {
            continue;
        }
        for j0 in 0..=(height - span_j) {
            for i0 in 0..=(width - span_i) {
                let mut grid = vec![vec![0usize; pattern.cols]; pattern.rows];
                let mut score = 0.0f32;
                let mut complete = true;
                'fill: for (r, row) in grid.iter_mut().enumerate() {
                    for (c, slot) in row.iter_mut().enumerate() {
                        let cell = if transposed {
                            (i0 + r, j0 + c)
                        } else {
                            (i0 + c, j0 + r)
                        };
                        match cells.map.get(&cell) {
                            Some(&idx) => {
                                *slot = idx;
                                score += candidates[idx].strength;
                            }
                            None => {
                                complete = false;
                                break 'fill;
                            }
                        }
                    }
                }
                if complete && best.as_ref().is_none_or(|(s, _)| score > *s) {
                    best = Some((score, grid));
                }
            }
        }
    }

    best.map(|(_, grid)| grid)
}

/// Row-major candidate indices in canonical order: the first corner is the
/// grid corner nearest the image origin and rows run rightwards.
fn canonical_order(grid: &[Vec<usize>], pattern: PatternSize, candidates: &[Candidate]) -> Vec<usize> {
    let (rows, cols) = (pattern.rows, pattern.cols);
    let square = rows == cols;

    // (transpose, flip rows, flip cols); transposes only keep the shape of
    // square patterns.
    let mut variants = Vec::new();
    for transpose in [false, true] {
        if transpose && !square {
            continue;
        }
        for flip_r in [false, true] {
            for flip_c in [false, true] {
                variants.push((transpose, flip_r, flip_c));
            }
        }
    }

    let source = |(transpose, flip_r, flip_c): (bool, bool, bool), r: usize, c: usize| {
        let (mut rr, mut cc) = if transpose { (c, r) } else { (r, c) };
        if flip_r {
            rr = rows - 1 - rr;
        }
        if flip_c {
            cc = cols - 1 - cc;
        }
        grid[rr][cc]
    };
    let pos = |idx: usize| candidates[idx].position;

    let key = |v: (bool, bool, bool)| {
        let origin = pos(source(v, 0, 0));
        let next = pos(source(v, 0, 1));
        let step = next - origin;
        let rightward = step.x / step.norm().max(f32::EPSILON);
        (origin.x + origin.y, -rightward)
    };

    let best = variants
        .into_iter()
        .min_by(|a, b| {
            let (ka, kb) = (key(*a), key(*b));
            ka.0.total_cmp(&kb.0).then(ka.1.total_cmp(&kb.1))
        })
        .unwrap_or((false, false, false));

    (0..rows)
        .flat_map(|r| (0..cols).map(move |c| (r, c)))
        .map(|(r, c)| source(best, r, c))
        .collect()
}
