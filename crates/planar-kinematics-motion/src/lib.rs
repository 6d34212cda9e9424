//! World-plane kinematics of a tracked object.
//!
//! A [`KinematicsEstimator`] walks a [`FrameSource`] over a [`FrameRange`]
//! with a [`FrameScan`]: every frame is undistorted, handed to an
//! [`ObjectTracker`](planar_kinematics_track::ObjectTracker), and measured
//! centroids are mapped through a ready
//! [`PlaneTransformer`](planar_kinematics_plane::PlaneTransformer) into
//! world-plane coordinates. Positions are then differentiated into speeds
//! and accelerations; missing samples stay missing.
//!
//! Units: the transformer works in grid units (one square). A [`Scale`]
//! multiplies by the physical square size and converts to the requested
//! [`LengthUnit`]. Timestamps are frame indices divided by the frame rate.

mod cancel;
mod error;
mod estimator;
mod kinematics;
mod scan;
mod source;
mod units;

pub use cancel::CancellationToken;
pub use error::KinematicsError;
pub use estimator::{FrameRange, FrameRate, KinematicsEstimator, KinematicsParams, KinematicsReport};
pub use kinematics::{accelerations, differentiate, speeds, KinematicSample, KinematicsSummary};
pub use scan::{FrameObservation, FrameScan, ScanProgress};
pub use source::{FrameSource, FrameSourceError, InMemorySource};
pub use units::{LengthUnit, Scale, UnknownUnit};
