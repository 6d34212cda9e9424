use planar_kinematics_plane::PlaneError;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum KinematicsError {
    #[error("invalid frame range [{start}, {end}] for a source with {frame_count} frames")]
    InvalidRange {
        start: usize,
        end: usize,
        frame_count: usize,
    },

    #[error("invalid frame rate {0} (must be finite and positive)")]
    InvalidFrameRate(f64),

    #[error("frame rate unknown: the source reports none and no override was given")]
    MissingFrameRate,

    #[error("invalid square size {0} (must be finite and positive)")]
    InvalidScale(f64),

    #[error("scan cancelled before frame {frame_index}")]
    Cancelled { frame_index: usize },

    #[error(transparent)]
    Plane(#[from] PlaneError),
}
