//! High-level facade crate for the `planar-kinematics-*` workspace.
//!
//! This crate provides:
//! - re-exports of the underlying crates
//! - image loading and directory-of-frames video input (`image` crate)
//! - the camera profile database
//! - text exports of dense world maps and kinematics reports
//! - JSON configuration for the calibrate and analyze workflows
//! - the `planar-kinematics` command-line tool (feature `cli`)
//!
//! ## Quickstart
//!
//! ```no_run
//! use planar_kinematics::motion::{
//!     CancellationToken, FrameRange, FrameRate, KinematicsEstimator,
//! };
//! use planar_kinematics::store::{JsonProfileStore, ProfileStore};
//! use planar_kinematics::track::ObjectTracker;
//! use planar_kinematics::{workflow, AnalysisConfig, ImageSequenceSource};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = JsonProfileStore::new("calibration_db.json");
//! let profile = store.load("phone")?.ok_or("unknown camera")?;
//! let config = AnalysisConfig::default();
//!
//! let plane = workflow::plane_from_reference_file(&profile, "reference.png", &config)?;
//! let mut frames = ImageSequenceSource::open("frames/", None)?;
//! let report = KinematicsEstimator::new(config.kinematics.clone()).estimate(
//!     &mut frames,
//!     FrameRange::new(0, 119),
//!     FrameRate::Fixed(240.0),
//!     &plane,
//!     ObjectTracker::new(config.tracker.clone()),
//!     workflow::profile_scale(&profile, &config),
//!     &CancellationToken::new(),
//! )?;
//! println!("mean speed: {:?} m/s", report.summary.mean_speed);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `planar_kinematics::core`: images, homographies, camera model, grids.
//! - `planar_kinematics::chessboard`: checker pattern detection.
//! - `planar_kinematics::calib`: intrinsic calibration and profiles.
//! - `planar_kinematics::plane`: pixel/world-plane mapping.
//! - `planar_kinematics::track`: locators and the Kalman tracker.
//! - `planar_kinematics::motion`: frame scans and finite differences.

pub use planar_kinematics_calib as calib;
pub use planar_kinematics_chessboard as chessboard;
pub use planar_kinematics_core as core;
pub use planar_kinematics_motion as motion;
pub use planar_kinematics_plane as plane;
pub use planar_kinematics_track as track;

pub mod config;
pub mod export;
pub mod io;
mod sequence;
pub mod store;
pub mod workflow;

pub use config::{AnalysisConfig, CalibrateConfig, ConfigError};
pub use export::{
    write_dense_map, write_dense_map_file, write_kinematics, write_kinematics_file, ExportError,
};
pub use io::{load_gray, IoError};
pub use sequence::ImageSequenceSource;
pub use store::{JsonProfileStore, MemoryProfileStore, ProfileStore, StoreError};
pub use workflow::{calibrate_images, CalibrateImagesError, CalibrationRun};

/// Install logging for binaries.
///
/// Without the `tracing` feature this is the plain stderr logger at
/// `level`. With it, `log` records are bridged into a `tracing`
/// subscriber whose filter follows `RUST_LOG`.
pub fn init_logging(level: log::LevelFilter) {
    #[cfg(feature = "tracing")]
    {
        let _ = tracing_log::LogTracer::builder()
            .with_max_level(level)
            .init();
        planar_kinematics_core::init_tracing(false);
    }
    #[cfg(not(feature = "tracing"))]
    {
        let _ = planar_kinematics_core::init_with_level(level);
    }
}
