use crate::cancel::CancellationToken;
use crate::error::KinematicsError;
use crate::kinematics::{differentiate, KinematicSample, KinematicsSummary};
use crate::scan::{FrameScan, ScanProgress};
use crate::source::FrameSource;
use crate::units::{LengthUnit, Scale};
use log::{debug, info};
use planar_kinematics_plane::{PlaneError, PlaneTransformer};
use planar_kinematics_track::ObjectTracker;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Inclusive frame index range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: usize,
    pub end: usize,
}

impl FrameRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of frames, end inclusive.
    pub fn len(&self) -> usize {
        (self.end + 1).saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `start < end < frame_count`.
    pub fn validate(&self, frame_count: usize) -> Result<(), KinematicsError> {
        if self.start < self.end && self.end < frame_count {
            Ok(())
        } else {
            Err(KinematicsError::InvalidRange {
                start: self.start,
                end: self.end,
                frame_count,
            })
        }
    }
}

/// Where the frame rate used for timestamps comes from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameRate {
    /// The rate reported by the source.
    #[default]
    Native,
    /// Explicit override, e.g. 240 fps for slow-motion footage stored at a
    /// lower container rate.
    Fixed(f64),
}

impl FrameRate {
    pub fn resolve(self, native: Option<f64>) -> Result<f64, KinematicsError> {
        let fps = match self {
            FrameRate::Fixed(fps) => fps,
            FrameRate::Native => native.ok_or(KinematicsError::MissingFrameRate)?,
        };
        if fps.is_finite() && fps > 0.0 {
            Ok(fps)
        } else {
            Err(KinematicsError::InvalidFrameRate(fps))
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KinematicsParams {
    /// Pair each sample with the previous valid one across gaps, dividing by
    /// the real frame gap. When false the speed right after a gap is
    /// undefined.
    pub bridge_gaps: bool,
    /// Undistort frames with the transformer's camera model before
    /// tracking. Disable only for footage that is already undistorted.
    pub undistort_frames: bool,
}

impl Default for KinematicsParams {
    fn default() -> Self {
        Self {
            bridge_gaps: true,
            undistort_frames: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KinematicsReport {
    pub range: FrameRange,
    pub frame_rate: f64,
    pub unit: LengthUnit,
    pub samples: Vec<KinematicSample>,
    pub summary: KinematicsSummary,
}

#[derive(Clone, Debug, Default)]
pub struct KinematicsEstimator {
    pub params: KinematicsParams,
}

impl KinematicsEstimator {
    pub fn new(params: KinematicsParams) -> Self {
        Self { params }
    }

    fn check_inputs<S: FrameSource + ?Sized>(
        source: &S,
        range: FrameRange,
        transformer: &PlaneTransformer,
        scale: &Scale,
    ) -> Result<(), KinematicsError> {
        range.validate(source.frame_count())?;
        if !scale.is_valid() {
            return Err(KinematicsError::InvalidScale(scale.square_size));
        }
        if !transformer.is_ready() {
            return Err(PlaneError::NotReady.into());
        }
        Ok(())
    }

    /// Validated frame-by-frame scan without timestamps.
    pub fn scan<'a, S: FrameSource + ?Sized>(
        &self,
        source: &'a mut S,
        range: FrameRange,
        transformer: &'a PlaneTransformer,
        tracker: ObjectTracker,
        scale: Scale,
        cancel: &'a CancellationToken,
    ) -> Result<FrameScan<'a, S>, KinematicsError> {
        Self::check_inputs(source, range, transformer, &scale)?;
        Ok(FrameScan::new(
            source,
            range,
            transformer,
            tracker,
            scale,
            cancel,
            self.params.undistort_frames,
        ))
    }

    /// Track the object over `range` and differentiate its world-plane
    /// trajectory.
    ///
    /// All inputs are validated before the first frame is decoded.
    #[allow(clippy::too_many_arguments)]
    pub fn estimate<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        range: FrameRange,
        frame_rate: FrameRate,
        transformer: &PlaneTransformer,
        tracker: ObjectTracker,
        scale: Scale,
        cancel: &CancellationToken,
    ) -> Result<KinematicsReport, KinematicsError> {
        self.estimate_with_progress(
            source,
            range,
            frame_rate,
            transformer,
            tracker,
            scale,
            cancel,
            |_| {},
        )
    }

    #[allow(clippy::too_many_arguments)]
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip(self, source, transformer, tracker, cancel, progress),
            fields(start = range.start, end = range.end)
        )
    )]
    pub fn estimate_with_progress<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        range: FrameRange,
        frame_rate: FrameRate,
        transformer: &PlaneTransformer,
        tracker: ObjectTracker,
        scale: Scale,
        cancel: &CancellationToken,
        progress: impl FnMut(ScanProgress),
    ) -> Result<KinematicsReport, KinematicsError> {
        Self::check_inputs(source, range, transformer, &scale)?;
        let fps = frame_rate.resolve(source.frame_rate())?;
        debug!(
            "scanning frames {}..={} at {fps} fps, 1 square = {} {}",
            range.start,
            range.end,
            scale.factor(),
            scale.output_unit
        );

        let mut frames = Vec::with_capacity(range.len());
        let mut pixels = Vec::with_capacity(range.len());
        let mut positions = Vec::with_capacity(range.len());
        let scan = self
            .scan(source, range, transformer, tracker, scale, cancel)?
            .on_progress(progress);
        for observation in scan {
            let observation = observation?;
            frames.push(observation.frame_index);
            pixels.push(observation.tracked.map(|t| t.position));
            positions.push(observation.world);
        }

        let (samples, summary) = differentiate(
            &frames,
            &pixels,
            &positions,
            fps,
            self.params.bridge_gaps,
        );
        info!(
            "kinematics: {}/{} frames with a position, mean speed {} {}/s",
            summary.valid_positions,
            summary.frames,
            fmt_opt(summary.mean_speed),
            scale.output_unit
        );
        Ok(KinematicsReport {
            range,
            frame_rate: fps,
            unit: scale.output_unit,
            samples,
            summary,
        })
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_validation() {
        assert!(FrameRange::new(0, 9).validate(10).is_ok());
        assert_eq!(FrameRange::new(0, 9).len(), 10);
        for (start, end) in [(5, 5), (6, 5), (0, 10)] {
            assert!(matches!(
                FrameRange::new(start, end).validate(10),
                Err(KinematicsError::InvalidRange { .. })
            ));
        }
    }

    #[test]
    fn frame_rate_resolution() {
        assert_eq!(FrameRate::Native.resolve(Some(30.0)).unwrap(), 30.0);
        assert_eq!(FrameRate::Fixed(240.0).resolve(Some(30.0)).unwrap(), 240.0);
        assert_eq!(
            FrameRate::Native.resolve(None),
            Err(KinematicsError::MissingFrameRate)
        );
        assert!(matches!(
            FrameRate::Fixed(0.0).resolve(None),
            Err(KinematicsError::InvalidFrameRate(_))
        ));
        assert!(matches!(
            FrameRate::Native.resolve(Some(f64::INFINITY)),
            Err(KinematicsError::InvalidFrameRate(_))
        ));
    }

    #[test]
    fn params_default_from_empty_json() {
        let p: KinematicsParams = serde_json::from_str("{}").unwrap();
        assert_eq!(p, KinematicsParams::default());
        assert!(p.undistort_frames);
    }
}
