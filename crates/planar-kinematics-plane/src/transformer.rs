use crate::error::PlaneError;
use crate::params::PlaneParams;
use log::{debug, info, warn};
use nalgebra::Point2;
use planar_kinematics_chessboard::ChessboardDetector;
use planar_kinematics_core::{
    fit_homography, undistort_image, world_grid, CameraModel, CornerSet, GrayImageView,
    Homography, PatternSize,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Pixel positions of the pattern origin and the ends of its two axes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoordinateAxes {
    pub origin: Point2<f64>,
    pub x_axis: Point2<f64>,
    pub y_axis: Point2<f64>,
}

/// World-plane coordinate of every pixel, row-major, in grid units.
///
/// Pixels on the horizon line of the plane hold `NaN`.
#[derive(Clone, Debug, PartialEq)]
pub struct DenseWorldMap {
    pub width: usize,
    pub height: usize,
    pub points: Vec<[f64; 2]>,
}

impl DenseWorldMap {
    pub fn get(&self, x: usize, y: usize) -> Option<[f64; 2]> {
        (x < self.width && y < self.height).then(|| self.points[y * self.width + x])
    }
}

#[derive(Clone, Debug)]
struct ReadyState {
    h: Homography,
    h_inv: Homography,
    corners: CornerSet,
    condition_number: f64,
}

#[derive(Clone, Debug)]
enum State {
    Uninitialized,
    Ready(ReadyState),
}

/// Maps between undistorted pixels and pattern-plane coordinates.
///
/// One grid unit equals one pattern square; callers scale to physical
/// lengths. Until a homography is computed every mapping fails with
/// [`PlaneError::NotReady`].
#[derive(Clone, Debug)]
pub struct PlaneTransformer {
    camera: CameraModel,
    pattern: PatternSize,
    params: PlaneParams,
    state: State,
}

impl PlaneTransformer {
    pub fn new(camera: CameraModel, pattern: PatternSize) -> Self {
        Self::with_params(camera, pattern, PlaneParams::default())
    }

    pub fn with_params(camera: CameraModel, pattern: PatternSize, params: PlaneParams) -> Self {
        Self {
            camera,
            pattern,
            params,
            state: State::Uninitialized,
        }
    }

    pub fn camera(&self) -> &CameraModel {
        &self.camera
    }

    pub fn pattern(&self) -> PatternSize {
        self.pattern
    }

    pub fn params(&self) -> &PlaneParams {
        &self.params
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    /// Drop the current homography.
    pub fn reset(&mut self) {
        self.state = State::Uninitialized;
    }

    fn check_pattern(&self) -> Result<(), PlaneError> {
        if self.pattern.is_valid() {
            Ok(())
        } else {
            Err(PlaneError::InvalidPattern {
                rows: self.pattern.rows,
                cols: self.pattern.cols,
            })
        }
    }

    fn ready(&self) -> Result<&ReadyState, PlaneError> {
        match &self.state {
            State::Ready(ready) => Ok(ready),
            State::Uninitialized => Err(PlaneError::NotReady),
        }
    }

    pub fn homography(&self) -> Result<&Homography, PlaneError> {
        self.ready().map(|r| &r.h)
    }

    pub fn inverse_homography(&self) -> Result<&Homography, PlaneError> {
        self.ready().map(|r| &r.h_inv)
    }

    /// Corners the homography was fitted to, in undistorted pixels.
    pub fn corners(&self) -> Result<&CornerSet, PlaneError> {
        self.ready().map(|r| &r.corners)
    }

    pub fn condition_number(&self) -> Result<f64, PlaneError> {
        self.ready().map(|r| r.condition_number)
    }

    /// Undistort `img`, detect the pattern and fit the homography.
    ///
    /// On failure the transformer is left uninitialized.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, img), fields(width = img.width, height = img.height))
    )]
    pub fn compute_homography(&mut self, img: &GrayImageView<'_>) -> Result<(), PlaneError> {
        self.reset();
        self.check_pattern()?;
        let undistorted = undistort_image(&self.camera, img);
        let detector = ChessboardDetector::new(self.params.detector.clone());
        let detection = detector.detect(&undistorted.view(), self.pattern)?;
        debug!(
            "reference pattern found: {} corners, spacing {:.1} px",
            detection.corners.len(),
            detection.spacing_px
        );
        self.compute_homography_from_corners(detection.corners)
    }

    /// Fit the homography to corners that were already detected in an
    /// undistorted image.
    pub fn compute_homography_from_corners(&mut self, corners: CornerSet) -> Result<(), PlaneError> {
        self.reset();
        self.check_pattern()?;
        if !corners.matches(self.pattern) {
            return Err(PlaneError::CornerCountMismatch {
                expected: self.pattern.count(),
                got: corners.len(),
            });
        }

        let world = world_grid(self.pattern, 1.0);
        let fit = fit_homography(&world, &corners.points).ok_or(PlaneError::Singular)?;
        let max = self.params.max_condition_number;
        if fit.condition_number.is_nan() || fit.condition_number > max {
            warn!(
                "rejecting homography with condition number {:.3e}",
                fit.condition_number
            );
            return Err(PlaneError::IllConditioned {
                condition_number: fit.condition_number,
                max,
            });
        }
        let h_inv = fit.homography.inverse().ok_or(PlaneError::Singular)?;

        info!(
            "homography ready (condition number {:.2})",
            fit.condition_number
        );
        self.state = State::Ready(ReadyState {
            h: fit.homography,
            h_inv,
            corners,
            condition_number: fit.condition_number,
        });
        Ok(())
    }

    /// Undistorted pixel to world-plane coordinates (grid units).
    pub fn pixel_to_world(&self, pixel: Point2<f64>) -> Result<Point2<f64>, PlaneError> {
        let ready = self.ready()?;
        ready
            .h_inv
            .try_apply(pixel)
            .ok_or(PlaneError::PointAtInfinity {
                x: pixel.x,
                y: pixel.y,
            })
    }

    /// World-plane coordinates (grid units) to undistorted pixel.
    pub fn world_to_pixel(&self, world: Point2<f64>) -> Result<Point2<f64>, PlaneError> {
        let ready = self.ready()?;
        ready.h.try_apply(world).ok_or(PlaneError::PointAtInfinity {
            x: world.x,
            y: world.y,
        })
    }

    /// Plane distance between two undistorted pixels, grid units.
    pub fn world_distance(&self, a: Point2<f64>, b: Point2<f64>) -> Result<f64, PlaneError> {
        Ok((self.pixel_to_world(b)? - self.pixel_to_world(a)?).norm())
    }

    /// Axes for display, taken from the detected corners rather than from H.
    ///
    /// `x_axis` lies `num_units` squares along the first row, `y_axis`
    /// `num_units` squares down the first column.
    pub fn coordinate_axes(&self, num_units: f64) -> Result<CoordinateAxes, PlaneError> {
        let pts = &self.ready()?.corners.points;
        let corner = |i: usize| {
            pts.get(i).copied().ok_or(PlaneError::InvalidPattern {
                rows: self.pattern.rows,
                cols: self.pattern.cols,
            })
        };
        let origin = corner(0)?;
        let dx = corner(1)? - origin;
        let dy = corner(self.pattern.cols)? - origin;
        Ok(CoordinateAxes {
            origin,
            x_axis: origin + dx * num_units,
            y_axis: origin + dy * num_units,
        })
    }

    /// World coordinates of every pixel of a `width x height` image.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn dense_map(&self, width: usize, height: usize) -> Result<DenseWorldMap, PlaneError> {
        let h_inv = self.ready()?.h_inv;
        let mut points = vec![[f64::NAN; 2]; width * height];
        points
            .par_chunks_mut(width.max(1))
            .enumerate()
            .for_each(|(y, row)| {
                for (x, out) in row.iter_mut().enumerate() {
                    if let Some(w) = h_inv.try_apply(Point2::new(x as f64, y as f64)) {
                        *out = [w.x, w.y];
                    }
                }
            });
        Ok(DenseWorldMap {
            width,
            height,
            points,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Matrix3;
    use planar_kinematics_core::{CameraIntrinsics, Distortion, GrayImage};

    fn camera() -> CameraModel {
        CameraModel::new(
            CameraIntrinsics {
                fx: 700.0,
                fy: 700.0,
                cx: 320.0,
                cy: 240.0,
            },
            Distortion::default(),
        )
    }

    fn h0() -> Homography {
        Homography::new(Matrix3::new(
            40.0, 6.0, 150.0, //
            -4.0, 38.0, 110.0, //
            0.0004, 0.0006, 1.0,
        ))
    }

    fn corners_through(h: &Homography, pattern: PatternSize) -> CornerSet {
        CornerSet::new(
            world_grid(pattern, 1.0)
                .into_iter()
                .map(|p| h.apply(p))
                .collect(),
        )
    }

    #[test]
    fn not_ready_until_homography() {
        let t = PlaneTransformer::new(camera(), PatternSize::new(4, 4));
        assert!(!t.is_ready());
        assert_eq!(
            t.pixel_to_world(Point2::new(1.0, 1.0)),
            Err(PlaneError::NotReady)
        );
        assert_eq!(
            t.world_to_pixel(Point2::new(1.0, 1.0)),
            Err(PlaneError::NotReady)
        );
        assert_eq!(t.coordinate_axes(3.0), Err(PlaneError::NotReady));
        assert!(matches!(t.dense_map(4, 4), Err(PlaneError::NotReady)));
    }

    #[test]
    fn fitted_inverse_maps_corners_back_to_grid() {
        let pattern = PatternSize::new(4, 4);
        let mut t = PlaneTransformer::new(camera(), pattern);
        t.compute_homography_from_corners(corners_through(&h0(), pattern))
            .unwrap();

        let world = world_grid(pattern, 1.0);
        for (px, w) in t.corners().unwrap().points.iter().zip(&world) {
            let back = t.pixel_to_world(*px).unwrap();
            assert_relative_eq!(back.x, w.x, epsilon = 1e-9);
            assert_relative_eq!(back.y, w.y, epsilon = 1e-9);
        }
    }

    #[test]
    fn pixel_world_round_trip() {
        let pattern = PatternSize::new(5, 6);
        let mut t = PlaneTransformer::new(camera(), pattern);
        t.compute_homography_from_corners(corners_through(&h0(), pattern))
            .unwrap();
        for &(x, y) in &[(0.0, 0.0), (320.0, 240.0), (639.0, 479.0), (100.5, 400.25)] {
            let p = Point2::new(x, y);
            let back = t.world_to_pixel(t.pixel_to_world(p).unwrap()).unwrap();
            assert_relative_eq!(back.x, p.x, epsilon = 1e-6);
            assert_relative_eq!(back.y, p.y, epsilon = 1e-6);
        }
    }

    #[test]
    fn distance_between_corner_pixels() {
        let pattern = PatternSize::new(5, 6);
        let mut t = PlaneTransformer::new(camera(), pattern);
        let corners = corners_through(&h0(), pattern);
        let (a, b) = (corners.points[0], corners.points[pattern.index(3, 4)]);
        t.compute_homography_from_corners(corners).unwrap();
        assert_relative_eq!(t.world_distance(a, b).unwrap(), 5.0, epsilon = 1e-6);
    }

    #[test]
    fn collinear_corners_are_rejected() {
        let pattern = PatternSize::new(4, 4);
        let points = (0..16)
            .map(|i| Point2::new(10.0 + 5.0 * i as f64, 20.0 + 2.0 * i as f64))
            .collect();
        let mut t = PlaneTransformer::new(camera(), pattern);
        let err = t
            .compute_homography_from_corners(CornerSet::new(points))
            .unwrap_err();
        assert!(
            matches!(
                err,
                PlaneError::Singular | PlaneError::IllConditioned { .. }
            ),
            "{err}"
        );
        assert!(!t.is_ready());
    }

    #[test]
    fn single_row_pattern_is_rejected() {
        let pattern = PatternSize::new(1, 6);
        let points = (0..6)
            .map(|i| Point2::new(100.0 + 20.0 * i as f64, 50.0 + 3.0 * i as f64))
            .collect();
        let mut t = PlaneTransformer::new(camera(), pattern);
        let err = t
            .compute_homography_from_corners(CornerSet::new(points))
            .unwrap_err();
        assert_eq!(err, PlaneError::InvalidPattern { rows: 1, cols: 6 });
        assert!(!t.is_ready());
        assert_eq!(t.coordinate_axes(2.0), Err(PlaneError::NotReady));

        let img = GrayImage::new(64, 48);
        assert_eq!(
            t.compute_homography(&img.view()),
            Err(PlaneError::InvalidPattern { rows: 1, cols: 6 })
        );
    }

    #[test]
    fn failure_discards_previous_homography() {
        let pattern = PatternSize::new(4, 4);
        let mut t = PlaneTransformer::new(camera(), pattern);
        t.compute_homography_from_corners(corners_through(&h0(), pattern))
            .unwrap();
        assert!(t.is_ready());

        let err = t
            .compute_homography_from_corners(CornerSet::new(vec![Point2::origin(); 3]))
            .unwrap_err();
        assert_eq!(
            err,
            PlaneError::CornerCountMismatch {
                expected: 16,
                got: 3
            }
        );
        assert!(!t.is_ready());
    }

    #[test]
    fn axes_follow_detected_corners() {
        let pattern = PatternSize::new(4, 5);
        let corners = CornerSet::new(
            world_grid(pattern, 1.0)
                .into_iter()
                .map(|p| Point2::new(100.0 + 20.0 * p.x, 50.0 + 30.0 * p.y))
                .collect(),
        );
        let mut t = PlaneTransformer::new(camera(), pattern);
        t.compute_homography_from_corners(corners).unwrap();

        let axes = t.coordinate_axes(3.0).unwrap();
        assert_eq!(axes.origin, Point2::new(100.0, 50.0));
        assert_relative_eq!(axes.x_axis.x, 160.0, epsilon = 1e-12);
        assert_relative_eq!(axes.x_axis.y, 50.0, epsilon = 1e-12);
        assert_relative_eq!(axes.y_axis.x, 100.0, epsilon = 1e-12);
        assert_relative_eq!(axes.y_axis.y, 140.0, epsilon = 1e-12);
    }

    #[test]
    fn dense_map_matches_pointwise_mapping() {
        let pattern = PatternSize::new(4, 4);
        let mut t = PlaneTransformer::new(camera(), pattern);
        t.compute_homography_from_corners(corners_through(&h0(), pattern))
            .unwrap();

        let map = t.dense_map(32, 24).unwrap();
        assert_eq!(map.points.len(), 32 * 24);
        let [wx, wy] = map.get(17, 9).unwrap();
        let expected = t.pixel_to_world(Point2::new(17.0, 9.0)).unwrap();
        assert_relative_eq!(wx, expected.x, epsilon = 1e-12);
        assert_relative_eq!(wy, expected.y, epsilon = 1e-12);
        assert!(map.get(32, 0).is_none());
    }
}
