use crate::cancel::CancellationToken;
use crate::error::KinematicsError;
use crate::source::FrameSource;
use crate::units::Scale;
use crate::FrameRange;
use log::{trace, warn};
use nalgebra::Point2;
use planar_kinematics_core::{GrayImage, UndistortMap};
use planar_kinematics_plane::PlaneTransformer;
use planar_kinematics_track::{CentroidSource, ObjectTracker, TrackedCentroid};

/// Reported after every processed frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanProgress {
    pub frame_index: usize,
    pub processed: usize,
    pub total: usize,
}

/// Result of one scan step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameObservation {
    pub frame_index: usize,
    /// Tracker output in undistorted pixels.
    pub tracked: Option<TrackedCentroid>,
    /// World-plane position in output units; only for measured centroids.
    pub world: Option<Point2<f64>>,
}

/// Sequential walk over a frame range: decode, undistort, track, map to the
/// world plane.
///
/// Frames are visited in increasing order, one per `next()`. Unreadable
/// frames and misses yield observations without a position. Cancellation is
/// checked before every frame; a cancelled scan yields one
/// [`KinematicsError::Cancelled`], drops its tracker and ends.
pub struct FrameScan<'a, S: FrameSource + ?Sized> {
    source: &'a mut S,
    transformer: &'a PlaneTransformer,
    tracker: Option<ObjectTracker>,
    scale: Scale,
    cancel: &'a CancellationToken,
    progress: Option<Box<dyn FnMut(ScanProgress) + 'a>>,
    undistort: Option<UndistortMap>,
    undistort_frames: bool,
    range: FrameRange,
    next: usize,
}

impl<'a, S: FrameSource + ?Sized> FrameScan<'a, S> {
    /// The range, transformer and scale are assumed valid; see
    /// [`crate::KinematicsEstimator::scan`] for the checked constructor.
    pub(crate) fn new(
        source: &'a mut S,
        range: FrameRange,
        transformer: &'a PlaneTransformer,
        mut tracker: ObjectTracker,
        scale: Scale,
        cancel: &'a CancellationToken,
        undistort_frames: bool,
    ) -> Self {
        tracker.reset();
        Self {
            source,
            transformer,
            tracker: Some(tracker),
            scale,
            cancel,
            progress: None,
            undistort: None,
            undistort_frames,
            range,
            next: range.start,
        }
    }

    /// Callback invoked after each processed frame.
    pub fn on_progress(mut self, progress: impl FnMut(ScanProgress) + 'a) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn range(&self) -> FrameRange {
        self.range
    }

    fn undistorted(&mut self, frame: GrayImage) -> GrayImage {
        let camera = self.transformer.camera();
        if !self.undistort_frames || camera.distortion.is_zero() {
            return frame;
        }
        let stale = !self
            .undistort
            .as_ref()
            .is_some_and(|map| map.matches(frame.width, frame.height));
        if stale {
            if let Some(map) = &self.undistort {
                warn!(
                    "frame size changed from {}x{} to {}x{}; rebuilding undistortion map",
                    map.width, map.height, frame.width, frame.height
                );
            }
            self.undistort = Some(UndistortMap::new(camera, frame.width, frame.height));
        }
        self.undistort
            .as_ref()
            .and_then(|map| map.apply(&frame.view()))
            .unwrap_or(frame)
    }

    fn to_world(&self, tracked: &TrackedCentroid, index: usize) -> Option<Point2<f64>> {
        if tracked.source != CentroidSource::Measured {
            return None;
        }
        match self.transformer.pixel_to_world(tracked.position) {
            Ok(grid) => Some(Point2::new(
                self.scale.grid_to_output(grid.x),
                self.scale.grid_to_output(grid.y),
            )),
            Err(err) => {
                warn!("frame {index}: {err}");
                None
            }
        }
    }

    fn step(&mut self, index: usize) -> FrameObservation {
        let frame = match self.source.read_frame(index) {
            Ok(frame) => Some(self.undistorted(frame)),
            Err(err) => {
                warn!("frame {index} skipped: {err}");
                None
            }
        };
        let tracked = self.tracker.as_mut().and_then(|tracker| match &frame {
            Some(frame) => tracker.track(&frame.view()),
            None => tracker.update(None),
        });
        let world = tracked.as_ref().and_then(|t| self.to_world(t, index));
        trace!("frame {index}: tracked {tracked:?}, world {world:?}");
        FrameObservation {
            frame_index: index,
            tracked,
            world,
        }
    }
}

impl<S: FrameSource + ?Sized> Iterator for FrameScan<'_, S> {
    type Item = Result<FrameObservation, KinematicsError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next > self.range.end {
            return None;
        }
        self.tracker.as_ref()?;
        let index = self.next;
        if self.cancel.is_cancelled() {
            self.tracker = None;
            self.next = self.range.end + 1;
            return Some(Err(KinematicsError::Cancelled { frame_index: index }));
        }

        let observation = self.step(index);
        self.next += 1;
        if let Some(progress) = self.progress.as_mut() {
            progress(ScanProgress {
                frame_index: index,
                processed: index - self.range.start + 1,
                total: self.range.len(),
            });
        }
        Some(Ok(observation))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.range.end + 1).saturating_sub(self.next);
        (0, Some(remaining))
    }
}
