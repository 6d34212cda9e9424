use planar_kinematics_chessboard::PatternNotFound;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PlaneError {
    #[error("plane transformer is not ready: compute a homography first")]
    NotReady,

    #[error("invalid pattern size {rows}x{cols}: both dimensions must be at least 2")]
    InvalidPattern { rows: usize, cols: usize },

    #[error("homography is singular")]
    Singular,

    #[error("homography condition number {condition_number:.3e} exceeds {max:.3e}")]
    IllConditioned { condition_number: f64, max: f64 },

    #[error("pattern not found: {0}")]
    PatternNotFound(#[from] PatternNotFound),

    #[error("expected {expected} corners, got {got}")]
    CornerCountMismatch { expected: usize, got: usize },

    #[error("point ({x}, {y}) maps to infinity")]
    PointAtInfinity { x: f64, y: f64 },
}
