//! Core types and utilities shared by the planar kinematics crates.
//!
//! This crate is purely geometric: grayscale image buffers, homographies,
//! the pinhole + polynomial distortion camera model and the pattern grid
//! conventions. It does not detect anything by itself.

mod camera;
mod grid;
mod homography;
mod image;
mod logger;

pub use camera::{
    distort_normalized, undistort_image, CameraIntrinsics, CameraModel, Distortion, UndistortMap,
};
pub use grid::{world_grid, CornerSet, ImageSize, PatternSize};
pub use homography::{
    estimate_homography, fit_homography, homography_from_4pt, Homography, HomographyFit,
};
pub use image::{sample_bilinear, sample_bilinear_u8, GrayImage, GrayImageView};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
