//! Camera calibration from views of a planar checker pattern.
//!
//! Pipeline:
//! 1. Per-view board-to-image homographies (normalized DLT).
//! 2. Closed-form intrinsics from the image of the absolute conic (three or
//!    more views), or a centered principal point with a shared focal length.
//! 3. Per-view poses from `K^-1 H`, projected onto SO(3).
//! 4. Joint Levenberg-Marquardt refinement of intrinsics, distortion
//!    `[k1, k2, p1, p2, k3]` and all poses.
//!
//! The engine reports reprojection errors and leaves acceptance thresholds
//! to the caller.

mod detect;
mod engine;
mod error;
mod init;
mod lm;
mod model;
mod params;
mod profile;

pub use detect::detect_corner_sets;
pub use engine::{CalibrationEngine, CalibrationResult, ViewReport};
pub use error::{CalibrationError, CalibrationStage};
pub use init::{focal_from_homographies, intrinsics_from_homographies, pose_from_homography};
pub use lm::{minimize, NllsProblem, SolveError, SolveOptions, SolveReport};
pub use model::{project, ViewPose};
pub use params::CalibrationParams;
pub use profile::{CalibrationProfile, ProfileError};
