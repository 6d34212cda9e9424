use crate::locator::Locator;
use crate::ops::to_luma;
use imageproc::edges::canny;
use imageproc::filter::median_filter;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use log::trace;
use nalgebra::Point2;
use planar_kinematics_core::GrayImageView;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircleParams {
    /// Median pre-blur kernel size (odd).
    pub blur_kernel: usize,
    /// Inverse accumulator resolution: one cell covers `dp x dp` pixels.
    pub dp: f64,
    /// Upper Canny threshold; the lower one is half of it.
    pub canny_high: f32,
    /// Minimum votes for a center.
    pub accumulator_threshold: u32,
    pub min_radius: u32,
    pub max_radius: u32,
}

impl Default for CircleParams {
    fn default() -> Self {
        Self {
            blur_kernel: 5,
            dp: 1.2,
            canny_high: 50.0,
            accumulator_threshold: 30,
            min_radius: 10,
            max_radius: 100,
        }
    }
}

/// Hough gradient voting: every edge pixel votes along its gradient
/// direction (both senses) for centers within the radius range; the
/// strongest accumulator cell wins.
#[derive(Clone, Debug, Default)]
pub struct CircleLocator {
    pub params: CircleParams,
}

impl CircleLocator {
    pub fn new(params: CircleParams) -> Self {
        Self { params }
    }
}

impl Locator for CircleLocator {
    fn locate(&mut self, frame: &GrayImageView<'_>) -> Option<Point2<f64>> {
        let p = &self.params;
        let dp = if p.dp >= 1.0 { p.dp } else { 1.0 };
        let radius = (p.blur_kernel / 2) as u32;
        let blurred = median_filter(&to_luma(frame)?, radius, radius);
        let high = p.canny_high.max(0.0);
        let edges = canny(&blurred, 0.5 * high, high);
        let (gxs, gys) = (horizontal_sobel(&blurred), vertical_sobel(&blurred));

        let aw = (frame.width as f64 / dp).ceil() as usize;
        let ah = (frame.height as f64 / dp).ceil() as usize;
        let mut acc = vec![0u32; aw * ah];
        let (r_min, r_max) = (p.min_radius.max(1), p.max_radius.max(p.min_radius.max(1)));

        for (x, y, e) in edges.enumerate_pixels() {
            if e[0] == 0 {
                continue;
            }
            let (gx, gy) = (gxs.get_pixel(x, y)[0] as f32, gys.get_pixel(x, y)[0] as f32);
            let norm = (gx * gx + gy * gy).sqrt();
            if norm <= f32::EPSILON {
                continue;
            }
            let (ux, uy) = ((gx / norm) as f64, (gy / norm) as f64);
            for sign in [-1.0, 1.0] {
                let mut last = usize::MAX;
                for r in r_min..=r_max {
                    let cx = x as f64 + sign * ux * r as f64;
                    let cy = y as f64 + sign * uy * r as f64;
                    if cx < 0.0 || cy < 0.0 {
                        break;
                    }
                    let (ax, ay) = ((cx / dp) as usize, (cy / dp) as usize);
                    if ax >= aw || ay >= ah {
                        break;
                    }
                    let cell = ay * aw + ax;
                    // One vote per ray and cell.
                    if cell != last {
                        acc[cell] += 1;
                        last = cell;
                    }
                }
            }
        }

        let (best, votes) = acc
            .iter()
            .copied()
            .enumerate()
            .max_by_key(|&(_, v)| v)?;
        if votes < p.accumulator_threshold {
            return None;
        }

        // Vote-weighted mean of the 3x3 neighbourhood.
        let (bx, by) = ((best % aw) as i64, (best / aw) as i64);
        let (mut sx, mut sy, mut sw) = (0.0, 0.0, 0.0);
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (nx, ny) = (bx + dx, by + dy);
                if nx < 0 || ny < 0 || nx >= aw as i64 || ny >= ah as i64 {
                    continue;
                }
                let v = acc[ny as usize * aw + nx as usize] as f64;
                sx += v * (nx as f64 + 0.5);
                sy += v * (ny as f64 + 0.5);
                sw += v;
            }
        }
        trace!("circle: {votes} votes at cell ({bx}, {by})");
        Some(Point2::new(sx / sw * dp, sy / sw * dp))
    }
}
