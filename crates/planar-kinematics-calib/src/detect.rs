use log::{debug, warn};
use planar_kinematics_chessboard::{ChessboardDetector, PatternNotFound};
use planar_kinematics_core::{CornerSet, GrayImageView, PatternSize};
use rayon::prelude::*;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Run the pattern detector on every image in parallel.
///
/// Output order matches input order. A miss on one image never affects the
/// others.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(detector, images), fields(num_images = images.len()))
)]
pub fn detect_corner_sets(
    detector: &ChessboardDetector,
    images: &[GrayImageView<'_>],
    pattern: PatternSize,
) -> Vec<Result<CornerSet, PatternNotFound>> {
    let results: Vec<_> = images
        .par_iter()
        .map(|img| detector.detect(img, pattern).map(|d| d.corners))
        .collect();

    for (idx, res) in results.iter().enumerate() {
        match res {
            Ok(_) => debug!("image {idx}: pattern found"),
            Err(err) => warn!("image {idx}: {err}"),
        }
    }
    results
}
