use crate::locator::Locator;
use crate::ops::to_luma;
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::morphology::dilate;
use imageproc::point::Point;
use log::trace;
use nalgebra::Point2;
use planar_kinematics_core::GrayImageView;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContourParams {
    pub canny_low: f32,
    pub canny_high: f32,
    /// Smallest enclosed area accepted, square pixels.
    pub min_area: f64,
}

impl Default for ContourParams {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 150.0,
            min_area: 20.0,
        }
    }
}

/// Canny outlines closed by a 3x3 dilation; the outer border enclosing the
/// largest area wins and its polygon centroid is reported.
#[derive(Clone, Debug, Default)]
pub struct ContourLocator {
    pub params: ContourParams,
}

impl ContourLocator {
    pub fn new(params: ContourParams) -> Self {
        Self { params }
    }
}

impl Locator for ContourLocator {
    fn locate(&mut self, frame: &GrayImageView<'_>) -> Option<Point2<f64>> {
        let p = &self.params;
        let img = to_luma(frame)?;
        let (low, high) = (p.canny_low.min(p.canny_high), p.canny_high.max(p.canny_low));
        let edges = dilate(&canny(&img, low, high), Norm::LInf, 1);

        let (area, centroid) = find_contours::<i32>(&edges)
            .iter()
            .filter(|c| c.border_type == BorderType::Outer)
            .filter_map(|c| polygon_moments(&c.points))
            .filter(|&(area, _)| area >= p.min_area)
            .max_by(|a, b| a.0.total_cmp(&b.0))?;
        trace!("contour: area {area:.1}");
        Some(centroid)
    }
}

/// Enclosed area and centroid of a closed polygon (shoelace). `None` for
/// degenerate outlines.
fn polygon_moments(points: &[Point<i32>]) -> Option<(f64, Point2<f64>)> {
    if points.len() < 3 {
        return None;
    }
    let (mut a2, mut cx, mut cy) = (0.0, 0.0, 0.0);
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        let (x0, y0, x1, y1) = (p.x as f64, p.y as f64, q.x as f64, q.y as f64);
        let cross = x0 * y1 - x1 * y0;
        a2 += cross;
        cx += (x0 + x1) * cross;
        cy += (y0 + y1) * cross;
    }
    if a2.abs() < f64::EPSILON {
        return None;
    }
    Some((0.5 * a2.abs(), Point2::new(cx / (3.0 * a2), cy / (3.0 * a2))))
}
