use planar_kinematics_chessboard::ChessboardParams;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaneParams {
    /// Detector settings used on the undistorted reference image.
    pub detector: ChessboardParams,
    /// Homographies whose normalized condition number exceeds this are
    /// rejected as untrustworthy.
    pub max_condition_number: f64,
}

impl Default for PlaneParams {
    fn default() -> Self {
        Self {
            detector: ChessboardParams::default(),
            max_condition_number: 1e4,
        }
    }
}
