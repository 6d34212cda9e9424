use crate::kalman::{ConstantVelocityKalman, KalmanParams};
use crate::locator::{Locator, LocatorKind};
use log::debug;
use nalgebra::Point2;
use planar_kinematics_core::GrayImageView;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerParams {
    pub locator: LocatorKind,
    pub kalman: KalmanParams,
    /// Consecutive misses bridged by prediction before the filter is
    /// dropped. Zero disables coasting.
    pub max_coast_frames: usize,
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self {
            locator: LocatorKind::default(),
            kalman: KalmanParams::default(),
            max_coast_frames: 5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CentroidSource {
    /// Prediction made right after folding in this frame's measurement.
    Measured,
    /// Prediction across a detection gap.
    Predicted,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackedCentroid {
    /// Filter prediction one frame ahead, pixels. On the frame that starts
    /// a track this is the measurement itself.
    pub position: Point2<f64>,
    /// Raw locator output, when there was one.
    pub measurement: Option<Point2<f64>>,
    pub source: CentroidSource,
}

/// One locator plus one Kalman filter, fed frames in increasing order.
pub struct ObjectTracker {
    locator: Box<dyn Locator>,
    params: TrackerParams,
    filter: Option<ConstantVelocityKalman>,
    coasted: usize,
}

impl ObjectTracker {
    pub fn new(params: TrackerParams) -> Self {
        let locator = params.locator.build();
        Self::with_locator(locator, params)
    }

    /// Use a custom locator; `params.locator` is ignored.
    pub fn with_locator(locator: Box<dyn Locator>, params: TrackerParams) -> Self {
        Self {
            locator,
            params,
            filter: None,
            coasted: 0,
        }
    }

    pub fn params(&self) -> &TrackerParams {
        &self.params
    }

    pub fn is_tracking(&self) -> bool {
        self.filter.is_some()
    }

    /// Locate the object in `frame` and update the filter.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "trace", skip(self, frame), fields(locator = self.params.locator.name()))
    )]
    pub fn track(&mut self, frame: &GrayImageView<'_>) -> Option<TrackedCentroid> {
        let measurement = self.locator.locate(frame);
        self.update(measurement)
    }

    /// Filter step for an externally located measurement.
    ///
    /// The filter always holds the prior for the next frame: a measurement
    /// is corrected against it and the state is then predicted forward, and
    /// that prediction is reported.
    pub fn update(&mut self, measurement: Option<Point2<f64>>) -> Option<TrackedCentroid> {
        match (measurement, self.filter.as_mut()) {
            (Some(z), None) => {
                debug!("track started at ({:.1}, {:.1})", z.x, z.y);
                let mut filter = ConstantVelocityKalman::new(z, &self.params.kalman);
                filter.predict();
                self.filter = Some(filter);
                self.coasted = 0;
                Some(TrackedCentroid {
                    position: z,
                    measurement: Some(z),
                    source: CentroidSource::Measured,
                })
            }
            (Some(z), Some(filter)) => {
                filter.correct(z);
                let position = filter.predict();
                self.coasted = 0;
                Some(TrackedCentroid {
                    position,
                    measurement: Some(z),
                    source: CentroidSource::Measured,
                })
            }
            (None, Some(filter)) if self.coasted < self.params.max_coast_frames => {
                self.coasted += 1;
                Some(TrackedCentroid {
                    position: filter.predict(),
                    measurement: None,
                    source: CentroidSource::Predicted,
                })
            }
            (None, Some(_)) => {
                debug!("track lost after {} predicted frames", self.coasted);
                self.filter = None;
                self.coasted = 0;
                None
            }
            (None, None) => None,
        }
    }

    /// Forget the filter and any locator state before a new video.
    pub fn reset(&mut self) {
        self.filter = None;
        self.coasted = 0;
        self.locator.reset();
    }
}
