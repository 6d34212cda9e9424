//! End-to-end helpers composing the workspace crates with file IO.

use crate::config::{AnalysisConfig, CalibrateConfig};
use crate::io::{load_gray, IoError};
use log::{info, warn};
use planar_kinematics_calib::{
    detect_corner_sets, CalibrationEngine, CalibrationError, CalibrationProfile,
    CalibrationResult,
};
use planar_kinematics_chessboard::ChessboardDetector;
use planar_kinematics_core::{GrayImage, GrayImageView, ImageSize, PatternSize};
use planar_kinematics_motion::Scale;
use planar_kinematics_plane::{PlaneError, PlaneTransformer};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug)]
pub enum CalibrateImagesError {
    #[error("no calibration images given")]
    NoImages,

    #[error("{path} is {got_w}x{got_h}, expected {want_w}x{want_h} like the other images")]
    ImageSizeMismatch {
        path: PathBuf,
        got_w: usize,
        got_h: usize,
        want_w: usize,
        want_h: usize,
    },

    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

#[derive(thiserror::Error, Debug)]
pub enum ReferenceError {
    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Plane(#[from] PlaneError),
}

/// Outcome of [`calibrate_images`].
#[derive(Clone, Debug)]
pub struct CalibrationRun {
    pub result: CalibrationResult,
    /// Images that contributed a view, in view order.
    pub used: Vec<PathBuf>,
    /// Images left out, with the reason.
    pub skipped: Vec<(PathBuf, String)>,
}

/// Load, detect and calibrate from a list of image files.
///
/// Images that fail to load or where the pattern is not found are skipped
/// and reported. Every loaded image must share the resolution of the first.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(paths, config), fields(num_images = paths.len()))
)]
pub fn calibrate_images(
    paths: &[PathBuf],
    pattern: PatternSize,
    square_size: f64,
    config: &CalibrateConfig,
) -> Result<CalibrationRun, CalibrateImagesError> {
    if paths.is_empty() {
        return Err(CalibrateImagesError::NoImages);
    }

    let loaded: Vec<(PathBuf, Result<GrayImage, IoError>)> = paths
        .par_iter()
        .map(|p| (p.clone(), load_gray(p)))
        .collect();

    let mut skipped = Vec::new();
    let mut images = Vec::new();
    for (path, res) in loaded {
        match res {
            Ok(img) => images.push((path, img)),
            Err(err) => {
                warn!("{err}");
                skipped.push((path, err.to_string()));
            }
        }
    }

    let image_size = match images.first() {
        Some((_, img)) => ImageSize {
            width: img.width,
            height: img.height,
        },
        None => return Err(CalibrationError::NoCalibrationData.into()),
    };
    if let Some((path, img)) = images
        .iter()
        .find(|(_, img)| img.width != image_size.width || img.height != image_size.height)
    {
        return Err(CalibrateImagesError::ImageSizeMismatch {
            path: path.clone(),
            got_w: img.width,
            got_h: img.height,
            want_w: image_size.width,
            want_h: image_size.height,
        });
    }

    let detector = ChessboardDetector::new(config.detector.clone());
    let views: Vec<GrayImageView<'_>> = images.iter().map(|(_, img)| img.view()).collect();
    let detections = detect_corner_sets(&detector, &views, pattern);

    let mut used = Vec::new();
    let mut corner_sets = Vec::new();
    for ((path, _), detection) in images.iter().zip(detections) {
        match detection {
            Ok(corners) => {
                used.push(path.clone());
                corner_sets.push(corners);
            }
            Err(err) => skipped.push((path.clone(), err.to_string())),
        }
    }
    info!(
        "pattern found in {}/{} images",
        corner_sets.len(),
        paths.len()
    );

    let engine = CalibrationEngine::new(config.calibration.clone());
    let result = engine.calibrate(&corner_sets, pattern, square_size, image_size)?;
    Ok(CalibrationRun {
        result,
        used,
        skipped,
    })
}

/// Transformer for `profile`, made ready on a reference image.
pub fn plane_from_reference(
    profile: &CalibrationProfile,
    reference: &GrayImageView<'_>,
    config: &AnalysisConfig,
) -> Result<PlaneTransformer, PlaneError> {
    let mut plane = PlaneTransformer::with_params(
        profile.camera_model(),
        profile.pattern_size,
        config.plane.clone(),
    );
    plane.compute_homography(reference)?;
    Ok(plane)
}

/// Same as [`plane_from_reference`], loading the image from disk.
pub fn plane_from_reference_file(
    profile: &CalibrationProfile,
    reference: impl AsRef<Path>,
    config: &AnalysisConfig,
) -> Result<PlaneTransformer, ReferenceError> {
    let img = load_gray(reference)?;
    Ok(plane_from_reference(profile, &img.view(), config)?)
}

/// Grid-unit to output-unit scale of a profile under `config`.
pub fn profile_scale(profile: &CalibrationProfile, config: &AnalysisConfig) -> Scale {
    Scale::new(profile.square_size, config.square_unit, config.output_unit)
}
