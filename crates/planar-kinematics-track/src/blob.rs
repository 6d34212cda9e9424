use crate::locator::Locator;
use crate::ops::{largest_region, presmooth, to_luma};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use log::trace;
use nalgebra::Point2;
use planar_kinematics_core::GrayImageView;
use serde::{Deserialize, Serialize};

/// Whether the object is darker or brighter than its surroundings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    #[default]
    Dark,
    Bright,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobParams {
    /// Gaussian pre-blur kernel size (odd).
    pub blur_kernel: usize,
    pub polarity: Polarity,
    /// Accepted blob area in pixels, inclusive.
    pub min_area: usize,
    pub max_area: usize,
}

impl Default for BlobParams {
    fn default() -> Self {
        Self {
            blur_kernel: 5,
            polarity: Polarity::Dark,
            min_area: 50,
            max_area: 5000,
        }
    }
}

/// Otsu-thresholded connected blobs; the largest blob within the area
/// bounds wins.
#[derive(Clone, Debug, Default)]
pub struct BlobLocator {
    pub params: BlobParams,
}

impl BlobLocator {
    pub fn new(params: BlobParams) -> Self {
        Self { params }
    }
}

impl Locator for BlobLocator {
    fn locate(&mut self, frame: &GrayImageView<'_>) -> Option<Point2<f64>> {
        let blurred = presmooth(&to_luma(frame)?, self.params.blur_kernel);
        let t = otsu_level(&blurred);
        let kind = match self.params.polarity {
            Polarity::Dark => ThresholdType::BinaryInverted,
            Polarity::Bright => ThresholdType::Binary,
        };
        let mask = threshold(&blurred, t, kind);

        let best = largest_region(&mask, self.params.min_area, self.params.max_area)?;
        trace!("blob: threshold {t}, area {}", best.area);
        Some(best.centroid())
    }
}
