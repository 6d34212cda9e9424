use approx::assert_relative_eq;
use nalgebra::Point2;
use planar_kinematics_core::{
    CameraIntrinsics, CameraModel, CornerSet, Distortion, GrayImage, PatternSize,
};
use planar_kinematics_motion::{
    CancellationToken, FrameRange, FrameRate, FrameSource, FrameSourceError, InMemorySource,
    KinematicsError, KinematicsEstimator, KinematicsParams, LengthUnit, Scale,
};
use planar_kinematics_plane::{PlaneError, PlaneTransformer};
use planar_kinematics_track::{ObjectTracker, TrackerParams};

const FRAMES: usize = 30;

/// Grid square (c, r) corner sits at pixel (40 + 20c, 30 + 20r).
fn transformer() -> PlaneTransformer {
    let pattern = PatternSize::new(4, 5);
    let camera = CameraModel::new(
        CameraIntrinsics {
            fx: 500.0,
            fy: 500.0,
            cx: 100.0,
            cy: 75.0,
        },
        Distortion::default(),
    );
    let points = (0..pattern.rows)
        .flat_map(|r| (0..pattern.cols).map(move |c| Point2::new(40.0 + 20.0 * c as f64, 30.0 + 20.0 * r as f64)))
        .collect();
    let mut t = PlaneTransformer::new(camera, pattern);
    t.compute_homography_from_corners(CornerSet::new(points))
        .unwrap();
    t
}

fn center(k: usize) -> Point2<f64> {
    Point2::new(40.0 + 4.0 * k as f64, 70.0)
}

fn frame(k: usize) -> GrayImage {
    let c = center(k);
    let mut img = GrayImage::new(200, 150);
    for y in 0..img.height {
        for x in 0..img.width {
            let d = ((x as f64 - c.x).powi(2) + (y as f64 - c.y).powi(2)).sqrt();
            img.set(x, y, if d <= 6.0 { 15 } else { 210 });
        }
    }
    img
}

fn source(fps: Option<f64>) -> InMemorySource {
    InMemorySource::new((0..FRAMES).map(frame).collect(), fps)
}

fn mm() -> Scale {
    Scale::new(10.0, LengthUnit::Millimeter, LengthUnit::Millimeter)
}

fn tracker() -> ObjectTracker {
    ObjectTracker::new(TrackerParams::default())
}

/// Counts decode calls.
struct Counting {
    inner: InMemorySource,
    reads: usize,
}

impl FrameSource for Counting {
    fn frame_count(&self) -> usize {
        self.inner.frame_count()
    }

    fn frame_rate(&self) -> Option<f64> {
        self.inner.frame_rate()
    }

    fn read_frame(&mut self, index: usize) -> Result<GrayImage, FrameSourceError> {
        self.reads += 1;
        self.inner.read_frame(index)
    }
}

#[test]
fn constant_velocity_object() {
    let plane = transformer();
    let mut src = source(Some(30.0));
    let report = KinematicsEstimator::default()
        .estimate(
            &mut src,
            FrameRange::new(0, FRAMES - 1),
            FrameRate::Native,
            &plane,
            tracker(),
            mm(),
            &CancellationToken::new(),
        )
        .unwrap();

    assert_eq!(report.samples.len(), FRAMES);
    assert_eq!(report.summary.valid_positions, FRAMES);
    assert_eq!(report.unit, LengthUnit::Millimeter);

    // (40, 70) px is grid (0, 2), i.e. (0, 20) mm.
    let p0 = report.samples[0].position.unwrap();
    assert_relative_eq!(p0.x, 0.0, epsilon = 0.05);
    assert_relative_eq!(p0.y, 20.0, epsilon = 0.05);

    // 4 px/frame = 0.2 squares/frame = 2 mm/frame = 60 mm/s
    for s in &report.samples[12..] {
        assert_relative_eq!(s.speed.unwrap(), 60.0, epsilon = 0.5);
        assert!(s.acceleration.unwrap().abs() < 20.0, "{s:?}");
    }
    // The first sample is the raw measurement, the last the prediction for
    // frame 30: 120 px = 6 squares.
    assert_relative_eq!(report.summary.net_displacement.unwrap(), 60.0, epsilon = 0.2);
    assert_relative_eq!(report.summary.path_length.unwrap(), 60.0, epsilon = 0.2);
}

#[test]
fn frame_rate_override_and_output_unit() {
    let plane = transformer();
    let mut src = source(Some(30.0));
    let scale = Scale::new(1.0, LengthUnit::Centimeter, LengthUnit::Meter);
    let report = KinematicsEstimator::default()
        .estimate(
            &mut src,
            FrameRange::new(0, FRAMES - 1),
            FrameRate::Fixed(240.0),
            &plane,
            tracker(),
            scale,
            &CancellationToken::new(),
        )
        .unwrap();
    assert_eq!(report.frame_rate, 240.0);
    // 2 mm/frame at 240 fps
    assert_relative_eq!(report.samples[20].speed.unwrap(), 0.48, epsilon = 0.005);
}

#[test]
fn unreadable_frame_is_a_missing_sample() {
    let plane = transformer();
    let frames = (0..FRAMES)
        .map(|k| (k != 15).then(|| frame(k)))
        .collect();
    let mut src = InMemorySource::with_gaps(frames, Some(30.0));
    let estimator = KinematicsEstimator::new(KinematicsParams {
        bridge_gaps: false,
        ..KinematicsParams::default()
    });
    let report = estimator
        .estimate(
            &mut src,
            FrameRange::new(0, FRAMES - 1),
            FrameRate::Native,
            &plane,
            tracker(),
            mm(),
            &CancellationToken::new(),
        )
        .unwrap();

    let gap = &report.samples[15];
    assert!(gap.position.is_none());
    assert!(gap.speed.is_none());
    assert!(gap.pixel.is_some(), "tracker coasts through the gap");
    assert!(report.samples[16].speed.is_none());
    assert!(report.samples[14].acceleration.is_none());
    assert!(report.samples[17].speed.is_some());
    assert_eq!(report.summary.valid_positions, FRAMES - 1);
}

#[test]
fn bridging_recovers_speed_after_a_gap() {
    let plane = transformer();
    let frames = (0..FRAMES)
        .map(|k| (k != 15).then(|| frame(k)))
        .collect();
    let mut src = InMemorySource::with_gaps(frames, Some(30.0));
    assert!(KinematicsParams::default().bridge_gaps);
    let report = KinematicsEstimator::default()
        .estimate(
            &mut src,
            FrameRange::new(0, FRAMES - 1),
            FrameRate::Native,
            &plane,
            tracker(),
            mm(),
            &CancellationToken::new(),
        )
        .unwrap();
    assert_relative_eq!(report.samples[16].speed.unwrap(), 60.0, epsilon = 0.5);
}

#[test]
fn cancellation_stops_the_scan() {
    let plane = transformer();
    let mut src = source(Some(30.0));
    let token = CancellationToken::new();
    let remote = token.clone();
    let mut seen = Vec::new();
    let err = KinematicsEstimator::default()
        .estimate_with_progress(
            &mut src,
            FrameRange::new(2, FRAMES - 1),
            FrameRate::Native,
            &plane,
            tracker(),
            mm(),
            &token,
            |p| {
                seen.push(p.processed);
                if p.frame_index == 6 {
                    remote.cancel();
                }
            },
        )
        .unwrap_err();
    assert_eq!(err, KinematicsError::Cancelled { frame_index: 7 });
    assert_eq!(seen, vec![1, 2, 3, 4, 5]);
}

#[test]
fn scan_yields_one_observation_per_frame() {
    let plane = transformer();
    let mut src = source(None);
    let token = CancellationToken::new();
    let scan = KinematicsEstimator::default()
        .scan(&mut src, FrameRange::new(3, 8), &plane, tracker(), mm(), &token)
        .unwrap();
    let observations: Vec<_> = scan.collect::<Result<_, _>>().unwrap();
    let indices: Vec<usize> = observations.iter().map(|o| o.frame_index).collect();
    assert_eq!(indices, vec![3, 4, 5, 6, 7, 8]);
    let first = observations[0].world.unwrap();
    assert_relative_eq!(first.x, 6.0, epsilon = 0.05);
}

#[test]
fn inputs_are_validated_before_decoding() {
    let plane = transformer();
    let token = CancellationToken::new();
    let cases: Vec<(FrameRange, FrameRate, Scale, Option<f64>)> = vec![
        (FrameRange::new(5, 5), FrameRate::Native, mm(), Some(30.0)),
        (FrameRange::new(0, FRAMES), FrameRate::Native, mm(), Some(30.0)),
        (FrameRange::new(0, 9), FrameRate::Native, mm(), None),
        (FrameRange::new(0, 9), FrameRate::Fixed(-1.0), mm(), Some(30.0)),
        (
            FrameRange::new(0, 9),
            FrameRate::Native,
            Scale::new(0.0, LengthUnit::Millimeter, LengthUnit::Meter),
            Some(30.0),
        ),
    ];
    let expected = [
        "InvalidRange",
        "InvalidRange",
        "MissingFrameRate",
        "InvalidFrameRate",
        "InvalidScale",
    ];
    for ((range, rate, scale, fps), name) in cases.into_iter().zip(expected) {
        let mut src = Counting {
            inner: source(fps),
            reads: 0,
        };
        let err = KinematicsEstimator::default()
            .estimate(&mut src, range, rate, &plane, tracker(), scale, &token)
            .unwrap_err();
        assert!(format!("{err:?}").starts_with(name), "{err:?}");
        assert_eq!(src.reads, 0);
    }
}

#[test]
fn uninitialized_transformer_is_rejected() {
    let plane = PlaneTransformer::new(
        CameraModel::new(
            CameraIntrinsics {
                fx: 500.0,
                fy: 500.0,
                cx: 100.0,
                cy: 75.0,
            },
            Distortion::default(),
        ),
        PatternSize::new(4, 5),
    );
    let mut src = source(Some(30.0));
    let err = KinematicsEstimator::default()
        .estimate(
            &mut src,
            FrameRange::new(0, 9),
            FrameRate::Native,
            &plane,
            tracker(),
            mm(),
            &CancellationToken::new(),
        )
        .unwrap_err();
    assert_eq!(err, KinematicsError::Plane(PlaneError::NotReady));
}
