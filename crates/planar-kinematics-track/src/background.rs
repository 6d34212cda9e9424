use crate::locator::{is_empty, Locator};
use crate::ops::largest_region;
use image::{GrayImage as LumaImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology::open;
use log::{debug, trace};
use nalgebra::Point2;
use planar_kinematics_core::GrayImageView;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundParams {
    /// Number of frames the learning rate averages over.
    pub history: usize,
    /// Squared Mahalanobis distance above which a pixel is foreground.
    pub var_threshold: f32,
    /// Variance assigned to a pixel on the first frame.
    pub var_init: f32,
    pub var_min: f32,
    pub var_max: f32,
    /// Smallest foreground mass accepted, pixels.
    pub min_area: usize,
}

impl Default for BackgroundParams {
    fn default() -> Self {
        Self {
            history: 500,
            var_threshold: 50.0,
            var_init: 225.0,
            var_min: 4.0,
            var_max: 5625.0,
            min_area: 20,
        }
    }
}

#[derive(Clone, Debug)]
struct Model {
    width: usize,
    height: usize,
    mean: Vec<f32>,
    var: Vec<f32>,
    frames: usize,
}

/// Per-pixel running Gaussian background; the largest foreground mass after
/// a 3x3 cross opening wins.
///
/// The first frame only seeds the model and yields no centroid.
#[derive(Clone, Debug, Default)]
pub struct BackgroundSubtractionLocator {
    pub params: BackgroundParams,
    model: Option<Model>,
}

impl BackgroundSubtractionLocator {
    pub fn new(params: BackgroundParams) -> Self {
        Self {
            params,
            model: None,
        }
    }

    /// Classify the frame against the model, then fold it in.
    fn foreground(&mut self, frame: &GrayImageView<'_>) -> Option<LumaImage> {
        let p = &self.params;
        let pixels = &frame.data[..frame.width * frame.height];
        let fits = matches!(
            &self.model,
            Some(m) if m.width == frame.width && m.height == frame.height
        );
        if !fits {
            if self.model.is_some() {
                debug!("frame size changed, reseeding background model");
            }
            self.model = Some(Model {
                width: frame.width,
                height: frame.height,
                mean: pixels.iter().map(|&v| v as f32).collect(),
                var: vec![p.var_init; frame.width * frame.height],
                frames: 1,
            });
            return None;
        }
        let model = self.model.as_mut()?;

        model.frames += 1;
        let alpha = 1.0 / model.frames.min(p.history.max(1)) as f32;
        let mut mask = LumaImage::new(frame.width as u32, frame.height as u32);
        for ((i, &v), px) in pixels.iter().enumerate().zip(mask.pixels_mut()) {
            let d = v as f32 - model.mean[i];
            let d2 = d * d;
            if d2 > p.var_threshold * model.var[i] {
                *px = Luma([255]);
            }
            model.mean[i] += alpha * d;
            model.var[i] = (model.var[i] + alpha * (d2 - model.var[i])).clamp(p.var_min, p.var_max);
        }
        Some(mask)
    }
}

impl Locator for BackgroundSubtractionLocator {
    fn locate(&mut self, frame: &GrayImageView<'_>) -> Option<Point2<f64>> {
        if is_empty(frame) {
            return None;
        }
        let mask = open(&self.foreground(frame)?, Norm::L1, 1);
        let best = largest_region(&mask, self.params.min_area, usize::MAX)?;
        trace!("background: foreground area {}", best.area);
        Some(best.centroid())
    }

    fn reset(&mut self) {
        self.model = None;
    }
}
