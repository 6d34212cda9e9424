//! Checker pattern detector built on top of `planar-kinematics-core`.
//!
//! Algorithm:
//! 1. ChESS X-junction candidates (`chess-corners`), filtered by strength.
//! 2. Base spacing from nearest-neighbour distances (kd-tree).
//! 3. Global grid axis from nearest-neighbour edge directions (modulo 90°).
//! 4. For each corner, up to 4 neighbours (right/left/up/down), confirmed
//!    from both ends.
//! 5. BFS the largest connected component and assign integer coordinates.
//! 6. Fit the expected `rows x cols` window, in either orientation.
//! 7. Canonical row-major order starting at the corner nearest the image
//!    origin.
//! 8. Iterative sub-pixel refinement of every corner.
//!
//! Failures are reported as [`PatternNotFound`], never as panics.

mod detector;
mod geom;
mod gridgraph;
mod params;
mod refine;

pub use detector::{chess_config, ChessboardDetector, PatternDetection, PatternNotFound};
pub use gridgraph::{Candidate, GridGraph, NeighborDirection};
pub use params::{ChessCornerParams, ChessboardParams, CornerRefineParams, GridGraphParams};
pub use refine::refine_corner;
