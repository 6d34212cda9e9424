//! Per-frame object centroids smoothed by a constant-velocity Kalman filter.
//!
//! A [`Locator`] finds a raw centroid in one frame. Four are provided
//! (blob, circle, contour, background subtraction) and selected through
//! [`LocatorKind`]. An [`ObjectTracker`] owns one locator and one filter and
//! must see frames in increasing order.
//!
//! Image filtering, edge detection, morphology and labelling come from
//! `imageproc`; this crate holds the locator and Kalman logic.

mod background;
mod blob;
mod circle;
mod contour;
mod kalman;
mod locator;
mod ops;
mod tracker;

pub use background::{BackgroundParams, BackgroundSubtractionLocator};
pub use blob::{BlobLocator, BlobParams, Polarity};
pub use circle::{CircleLocator, CircleParams};
pub use contour::{ContourLocator, ContourParams};
pub use kalman::{ConstantVelocityKalman, KalmanParams};
pub use locator::{Locator, LocatorKind};
pub use tracker::{CentroidSource, ObjectTracker, TrackedCentroid, TrackerParams};
