use crate::lm::SolveOptions;
use serde::{Deserialize, Serialize};

/// Parameters of the joint refinement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationParams {
    /// Levenberg-Marquardt stopping criteria.
    pub solve: SolveOptions,
    /// Refine the tangential terms `p1, p2`. When false they stay at zero.
    pub estimate_tangential: bool,
    /// Refine the sixth-order radial term `k3`. When false it stays at zero.
    pub estimate_k3: bool,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            solve: SolveOptions::default(),
            estimate_tangential: true,
            estimate_k3: true,
        }
    }
}
