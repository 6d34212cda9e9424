//! Homography between the pattern plane and undistorted image pixels.
//!
//! A [`PlaneTransformer`] starts uninitialized. A successful
//! [`PlaneTransformer::compute_homography`] (undistort, detect, fit, invert)
//! moves it to the ready state, after which pixels map to world-plane
//! coordinates in grid units and back.

mod error;
mod params;
mod transformer;

pub use error::PlaneError;
pub use params::PlaneParams;
pub use transformer::{CoordinateAxes, DenseWorldMap, PlaneTransformer};
