use crate::lm::SolveError;
use std::fmt;

/// Step of the calibration pipeline a failure happened in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalibrationStage {
    Homography { view: usize },
    Initialization,
    PoseInitialization { view: usize },
    Refinement,
}

impl fmt::Display for CalibrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Homography { view } => write!(f, "homography of view {view}"),
            Self::Initialization => f.write_str("intrinsics initialization"),
            Self::PoseInitialization { view } => write!(f, "pose initialization of view {view}"),
            Self::Refinement => f.write_str("joint refinement"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("no calibration data: at least one corner set is required")]
    NoCalibrationData,

    #[error("view {view}: expected {expected} corners, got {got}")]
    CornerCountMismatch {
        view: usize,
        expected: usize,
        got: usize,
    },

    #[error("invalid pattern size {rows}x{cols}")]
    InvalidPattern { rows: usize, cols: usize },

    #[error("square size must be positive and finite, got {0}")]
    InvalidSquareSize(f64),

    #[error("invalid image size {width}x{height}")]
    InvalidImageSize { width: usize, height: usize },

    #[error("calibration did not converge during {stage}: {reason}")]
    DidNotConverge {
        stage: CalibrationStage,
        reason: String,
    },
}

impl CalibrationError {
    pub(crate) fn not_converged(stage: CalibrationStage, reason: impl fmt::Display) -> Self {
        Self::DidNotConverge {
            stage,
            reason: reason.to_string(),
        }
    }
}

impl From<SolveError> for CalibrationError {
    fn from(err: SolveError) -> Self {
        Self::not_converged(CalibrationStage::Refinement, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solver_failures_are_refinement_non_convergence() {
        let err: CalibrationError = SolveError::NonFiniteJacobian.into();
        assert!(matches!(
            err,
            CalibrationError::DidNotConverge {
                stage: CalibrationStage::Refinement,
                ..
            }
        ));
        assert!(err.to_string().contains("jacobian"));
    }
}
