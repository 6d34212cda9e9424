use nalgebra::Point2;
use planar_kinematics_core::GrayImage;
use planar_kinematics_track::{
    BackgroundParams, CentroidSource, LocatorKind, ObjectTracker, TrackerParams,
};

fn frame_with_disk(center: Point2<f64>, radius: f64) -> GrayImage {
    let mut img = GrayImage::new(160, 100);
    for y in 0..img.height {
        for x in 0..img.width {
            let d = ((x as f64 - center.x).powi(2) + (y as f64 - center.y).powi(2)).sqrt();
            img.set(x, y, if d <= radius { 20 } else { 200 });
        }
    }
    img
}

fn truth(k: usize) -> Point2<f64> {
    Point2::new(30.0 + 4.0 * k as f64, 50.0 - 1.0 * k as f64)
}

#[test]
fn blob_tracker_follows_linear_motion() {
    let mut tracker = ObjectTracker::new(TrackerParams::default());
    for k in 0..20 {
        let img = frame_with_disk(truth(k), 7.0);
        let out = tracker.track(&img.view()).expect("tracked");
        assert_eq!(out.source, CentroidSource::Measured);
        let m = out.measurement.unwrap();
        assert!((m - truth(k)).norm() < 0.5, "frame {k}: {m:?}");
        // The reported position is the prediction for the next frame.
        if k > 10 {
            assert!((out.position - truth(k + 1)).norm() < 1.0, "frame {k}");
        }
    }
}

#[test]
fn gap_is_bridged_by_prediction() {
    let mut tracker = ObjectTracker::new(TrackerParams::default());
    for k in 0..15 {
        tracker.track(&frame_with_disk(truth(k), 7.0).view());
    }
    let mut blank = GrayImage::new(160, 100);
    blank.data.fill(200);
    let out = tracker.track(&blank.view()).expect("predicted");
    assert_eq!(out.source, CentroidSource::Predicted);
    assert!(out.measurement.is_none());
    assert!((out.position - truth(16)).norm() < 1.5, "{:?}", out.position);
}

#[test]
fn background_subtraction_tracker_needs_a_seed_frame() {
    let params = TrackerParams {
        locator: LocatorKind::BackgroundSubtraction(BackgroundParams::default()),
        ..TrackerParams::default()
    };
    let mut tracker = ObjectTracker::new(params);
    let mut empty = GrayImage::new(160, 100);
    empty.data.fill(200);
    for _ in 0..10 {
        assert!(tracker.track(&empty.view()).is_none());
    }
    let out = tracker
        .track(&frame_with_disk(Point2::new(80.0, 40.0), 6.0).view())
        .expect("foreground");
    assert!((out.position - Point2::new(80.0, 40.0)).norm() < 0.5);
}
