//! Finite differences over a world-plane track.
//!
//! Positions are in output length units, timestamps are frame indices
//! divided by the frame rate. Missing positions propagate: any difference
//! that touches a missing value is itself missing.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KinematicSample {
    pub frame_index: usize,
    /// Tracker output in undistorted pixels, measured or predicted.
    pub pixel: Option<Point2<f64>>,
    /// World-plane position of a measured centroid, output units.
    pub position: Option<Point2<f64>>,
    /// Output units per second.
    pub speed: Option<f64>,
    /// Output units per second squared.
    pub acceleration: Option<f64>,
}

/// Aggregates over non-missing samples. `None` means undefined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KinematicsSummary {
    pub frames: usize,
    pub valid_positions: usize,
    /// Seconds between the first and last frame of the range.
    pub duration: f64,
    pub mean_speed: Option<f64>,
    pub mean_acceleration: Option<f64>,
    /// Sum of the displacements that produced a speed.
    pub path_length: Option<f64>,
    /// Distance from the first to the last valid position.
    pub net_displacement: Option<f64>,
}

fn previous_valid(
    positions: &[Option<Point2<f64>>],
    k: usize,
    bridge_gaps: bool,
) -> Option<(usize, Point2<f64>)> {
    if bridge_gaps {
        (0..k).rev().find_map(|j| positions[j].map(|p| (j, p)))
    } else {
        positions[k - 1].map(|p| (k - 1, p))
    }
}

/// Per-sample displacement from the paired earlier sample, with the index of
/// that sample.
fn steps(
    positions: &[Option<Point2<f64>>],
    bridge_gaps: bool,
) -> Vec<Option<(usize, f64)>> {
    (0..positions.len())
        .map(|k| {
            if k == 0 {
                return None;
            }
            let cur = positions[k]?;
            let (j, prev) = previous_valid(positions, k, bridge_gaps)?;
            Some((j, (cur - prev).norm()))
        })
        .collect()
}

/// Backward-difference speed at each sample.
///
/// `frames` and `positions` run in parallel, frame indices strictly
/// increasing. The first sample never has a speed.
pub fn speeds(
    frames: &[usize],
    positions: &[Option<Point2<f64>>],
    fps: f64,
    bridge_gaps: bool,
) -> Vec<Option<f64>> {
    debug_assert_eq!(frames.len(), positions.len());
    steps(positions, bridge_gaps)
        .into_iter()
        .enumerate()
        .map(|(k, step)| {
            let (j, dist) = step?;
            let frame_gap = frames[k].checked_sub(frames[j]).filter(|&d| d > 0)?;
            Some(dist * fps / frame_gap as f64)
        })
        .collect()
}

/// Rate of change of the speed series: forward difference at the first
/// sample with a speed, backward at the last, centered in between.
pub fn accelerations(frames: &[usize], speeds: &[Option<f64>], fps: f64) -> Vec<Option<f64>> {
    debug_assert_eq!(frames.len(), speeds.len());
    let n = speeds.len();
    let (Some(first), Some(last)) = (
        speeds.iter().position(Option::is_some),
        speeds.iter().rposition(Option::is_some),
    ) else {
        return vec![None; n];
    };
    let diff = |a: usize, b: usize| -> Option<f64> {
        let (sa, sb) = (speeds[a]?, speeds[b]?);
        let frame_gap = frames[b].checked_sub(frames[a]).filter(|&d| d > 0)?;
        Some((sb - sa) * fps / frame_gap as f64)
    };
    (0..n)
        .map(|k| {
            if k < first || k > last || first == last {
                None
            } else if k == first {
                diff(k, k + 1)
            } else if k == last {
                diff(k - 1, k)
            } else {
                diff(k - 1, k + 1)
            }
        })
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Build samples and the summary from frame indices and optional positions.
pub fn differentiate(
    frames: &[usize],
    pixels: &[Option<Point2<f64>>],
    positions: &[Option<Point2<f64>>],
    fps: f64,
    bridge_gaps: bool,
) -> (Vec<KinematicSample>, KinematicsSummary) {
    let speed = speeds(frames, positions, fps, bridge_gaps);
    let accel = accelerations(frames, &speed, fps);

    let samples: Vec<KinematicSample> = (0..frames.len())
        .map(|k| KinematicSample {
            frame_index: frames[k],
            pixel: pixels.get(k).copied().flatten(),
            position: positions[k],
            speed: speed[k],
            acceleration: accel[k],
        })
        .collect();

    let step_lengths: Vec<f64> = steps(positions, bridge_gaps)
        .into_iter()
        .flatten()
        .map(|(_, d)| d)
        .collect();
    let path_length = (!step_lengths.is_empty()).then(|| step_lengths.iter().sum());
    let first = positions.iter().flatten().next();
    let last = positions.iter().flatten().next_back();
    let net_displacement = first.zip(last).map(|(a, b)| (b - a).norm());

    let duration = match (frames.first(), frames.last()) {
        (Some(&a), Some(&b)) if fps > 0.0 => b.saturating_sub(a) as f64 / fps,
        _ => 0.0,
    };

    let summary = KinematicsSummary {
        frames: frames.len(),
        valid_positions: positions.iter().flatten().count(),
        duration,
        mean_speed: mean(speed.iter().flatten().copied()),
        mean_acceleration: mean(accel.iter().flatten().copied()),
        path_length,
        net_displacement,
    };
    (samples, summary)
}
