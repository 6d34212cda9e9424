use crate::error::{CalibrationError, CalibrationStage};
use crate::init::{focal_from_homographies, intrinsics_from_homographies, pose_from_homography};
use crate::lm::{minimize, NllsProblem};
use crate::model::{project, ParamLayout, ViewPose, VIEW_PARAMS};
use crate::params::CalibrationParams;
use crate::profile::CalibrationProfile;
use log::{debug, info};
use nalgebra::{DMatrix, DVector, Matrix3, Point2};
use planar_kinematics_core::{
    fit_homography, world_grid, CameraModel, CornerSet, Distortion, ImageSize, PatternSize,
};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Views whose board-to-image homography is worse conditioned than this are
/// treated as degenerate.
const MAX_VIEW_CONDITION: f64 = 1e8;

/// Reprojection summary of one input view.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewReport {
    pub pose: ViewPose,
    /// RMS reprojection error, pixels.
    pub rms: f64,
    /// Largest single-corner reprojection error, pixels.
    pub max_error: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub camera: CameraModel,
    pub pattern: PatternSize,
    pub square_size: f64,
    pub image_size: ImageSize,
    /// RMS reprojection error over all corners after refinement, pixels.
    pub rms: f64,
    /// Same metric at the closed-form starting point.
    pub initial_rms: f64,
    pub views: Vec<ViewReport>,
    /// Residual evaluations spent by the solver.
    pub iterations: usize,
    /// False when the evaluation budget ran out first.
    pub converged: bool,
}

impl CalibrationResult {
    pub fn to_profile(&self, name: impl Into<String>) -> CalibrationProfile {
        CalibrationProfile {
            name: name.into(),
            camera_matrix: self.camera.intrinsics.to_array(),
            dist_coefs: self.camera.distortion.to_coefs(),
            square_size: self.square_size,
            pattern_size: self.pattern,
            image_size: Some(self.image_size),
            rms: Some(self.rms),
        }
    }
}

/// Joint intrinsics/distortion/pose estimation from planar pattern views.
#[derive(Clone, Debug, Default)]
pub struct CalibrationEngine {
    pub params: CalibrationParams,
}

impl CalibrationEngine {
    pub fn new(params: CalibrationParams) -> Self {
        Self { params }
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip(self, views),
            fields(num_views = views.len(), rows = pattern.rows, cols = pattern.cols)
        )
    )]
    pub fn calibrate(
        &self,
        views: &[CornerSet],
        pattern: PatternSize,
        square_size: f64,
        image_size: ImageSize,
    ) -> Result<CalibrationResult, CalibrationError> {
        validate_inputs(views, pattern, square_size, image_size)?;

        let board = world_grid(pattern, square_size);
        let homographies = views
            .iter()
            .enumerate()
            .map(|(view, corners)| {
                fit_homography(&board, &corners.points)
                    .filter(|fit| fit.condition_number < MAX_VIEW_CONDITION)
                    .map(|fit| fit.homography.h)
                    .ok_or_else(|| {
                        CalibrationError::not_converged(
                            CalibrationStage::Homography { view },
                            "corners are degenerate",
                        )
                    })
            })
            .collect::<Result<Vec<Matrix3<f64>>, _>>()?;

        let intrinsics = match intrinsics_from_homographies(&homographies, image_size) {
            Some(k) => k,
            None => {
                debug!(
                    "closed-form intrinsics unavailable for {} view(s), assuming centered principal point",
                    views.len()
                );
                focal_from_homographies(&homographies, image_size)
            }
        };
        if !intrinsics.is_valid() {
            return Err(CalibrationError::not_converged(
                CalibrationStage::Initialization,
                "initial focal length is not positive",
            ));
        }

        let k = intrinsics.matrix();
        let poses = homographies
            .iter()
            .enumerate()
            .map(|(view, h)| {
                pose_from_homography(&k, h).ok_or_else(|| {
                    CalibrationError::not_converged(
                        CalibrationStage::PoseInitialization { view },
                        "homography does not decompose into a pose",
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let layout = ParamLayout {
            tangential: self.params.estimate_tangential,
            k3: self.params.estimate_k3,
        };
        let problem = CalibrationProblem {
            layout,
            board: &board,
            views,
        };
        let x0 = DVector::from_vec(layout.pack(
            &CameraModel::new(intrinsics, Distortion::default()),
            &poses,
        ));
        let initial_rms = problem.rms(&x0);
        debug!("initial reprojection rms {initial_rms:.4} px");

        let (x, report) = minimize(&problem, x0, &self.params.solve)?;

        let camera = layout.unpack_camera(x.as_slice());
        if !camera.intrinsics.is_valid() {
            return Err(CalibrationError::not_converged(
                CalibrationStage::Refinement,
                "refined intrinsics are not valid",
            ));
        }
        let view_reports: Vec<ViewReport> = (0..views.len())
            .map(|v| {
                let pose = layout.unpack_pose(x.as_slice(), v);
                let errors: Vec<f64> = board
                    .iter()
                    .zip(&views[v].points)
                    .map(|(b, obs)| (project(&camera, &pose, b) - obs).norm())
                    .collect();
                let sq: f64 = errors.iter().map(|e| e * e).sum();
                ViewReport {
                    pose,
                    rms: (sq / errors.len() as f64).sqrt(),
                    max_error: errors.iter().copied().fold(0.0, f64::max),
                }
            })
            .collect();
        let rms = problem.rms(&x);

        info!(
            "calibrated {} views: rms {:.4} px (initial {:.4}), {} evaluations, converged={}",
            views.len(),
            rms,
            initial_rms,
            report.iterations,
            report.converged
        );

        Ok(CalibrationResult {
            camera,
            pattern,
            square_size,
            image_size,
            rms,
            initial_rms,
            views: view_reports,
            iterations: report.iterations,
            converged: report.converged,
        })
    }
}

fn validate_inputs(
    views: &[CornerSet],
    pattern: PatternSize,
    square_size: f64,
    image_size: ImageSize,
) -> Result<(), CalibrationError> {
    if views.is_empty() {
        return Err(CalibrationError::NoCalibrationData);
    }
    if !pattern.is_valid() {
        return Err(CalibrationError::InvalidPattern {
            rows: pattern.rows,
            cols: pattern.cols,
        });
    }
    if !(square_size.is_finite() && square_size > 0.0) {
        return Err(CalibrationError::InvalidSquareSize(square_size));
    }
    if image_size.width == 0 || image_size.height == 0 {
        return Err(CalibrationError::InvalidImageSize {
            width: image_size.width,
            height: image_size.height,
        });
    }
    for (view, corners) in views.iter().enumerate() {
        if !corners.matches(pattern) {
            return Err(CalibrationError::CornerCountMismatch {
                view,
                expected: pattern.count(),
                got: corners.len(),
            });
        }
    }
    Ok(())
}

/// Reprojection residuals of all views, two rows per corner.
struct CalibrationProblem<'a> {
    layout: ParamLayout,
    board: &'a [Point2<f64>],
    views: &'a [CornerSet],
}

impl CalibrationProblem<'_> {
    fn rows_per_view(&self) -> usize {
        2 * self.board.len()
    }

    fn view_residuals(&self, camera: &CameraModel, pose: &ViewPose, view: usize, out: &mut [f64]) {
        for (i, (b, obs)) in self.board.iter().zip(&self.views[view].points).enumerate() {
            let p = project(camera, pose, b);
            out[2 * i] = p.x - obs.x;
            out[2 * i + 1] = p.y - obs.y;
        }
    }

    fn rms(&self, x: &DVector<f64>) -> f64 {
        let n = self.views.len() * self.board.len();
        (self.residuals(x).norm_squared() / n as f64).sqrt()
    }
}

fn step_for(value: f64) -> f64 {
    1e-6 * value.abs().max(1.0)
}

impl NllsProblem for CalibrationProblem<'_> {
    fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        let xs = x.as_slice();
        let camera = self.layout.unpack_camera(xs);
        let rows = self.rows_per_view();
        let mut r = DVector::zeros(rows * self.views.len());
        for v in 0..self.views.len() {
            let pose = self.layout.unpack_pose(xs, v);
            let out = &mut r.as_mut_slice()[v * rows..(v + 1) * rows];
            self.view_residuals(&camera, &pose, v, out);
        }
        r
    }

    /// Central differences. Pose columns only touch their own view's rows.
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let rows = self.rows_per_view();
        let n_views = self.views.len();
        let mut jac = DMatrix::zeros(rows * n_views, x.len());
        let mut xp = x.clone();

        for j in 0..self.layout.intrinsic_len() {
            let h = step_for(x[j]);
            xp[j] = x[j] + h;
            let plus = self.residuals(&xp);
            xp[j] = x[j] - h;
            let minus = self.residuals(&xp);
            xp[j] = x[j];
            jac.set_column(j, &((plus - minus) / (2.0 * h)));
        }

        let camera = self.layout.unpack_camera(x.as_slice());
        let mut plus = vec![0.0; rows];
        let mut minus = vec![0.0; rows];
        for v in 0..n_views {
            let offset = self.layout.view_offset(v);
            for k in 0..VIEW_PARAMS {
                let j = offset + k;
                let h = step_for(x[j]);
                xp[j] = x[j] + h;
                let pose = self.layout.unpack_pose(xp.as_slice(), v);
                self.view_residuals(&camera, &pose, v, &mut plus);
                xp[j] = x[j] - h;
                let pose = self.layout.unpack_pose(xp.as_slice(), v);
                self.view_residuals(&camera, &pose, v, &mut minus);
                xp[j] = x[j];
                for i in 0..rows {
                    jac[(v * rows + i, j)] = (plus[i] - minus[i]) / (2.0 * h);
                }
            }
        }
        jac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern() -> PatternSize {
        PatternSize::new(4, 5)
    }

    fn size() -> ImageSize {
        ImageSize {
            width: 640,
            height: 480,
        }
    }

    #[test]
    fn empty_input_is_no_data() {
        let err = CalibrationEngine::default()
            .calibrate(&[], pattern(), 10.0, size())
            .unwrap_err();
        assert_eq!(err, CalibrationError::NoCalibrationData);
    }

    #[test]
    fn count_mismatch_names_the_view() {
        let good = CornerSet::new(world_grid(pattern(), 10.0));
        let bad = CornerSet::new(vec![Point2::new(1.0, 2.0); 7]);
        let err = CalibrationEngine::default()
            .calibrate(&[good, bad], pattern(), 10.0, size())
            .unwrap_err();
        assert_eq!(
            err,
            CalibrationError::CornerCountMismatch {
                view: 1,
                expected: 20,
                got: 7
            }
        );
        assert!(err.to_string().contains("view 1"));
    }

    #[test]
    fn rejects_bad_scale_and_size() {
        let view = CornerSet::new(world_grid(pattern(), 10.0));
        let engine = CalibrationEngine::default();
        assert_eq!(
            engine
                .calibrate(std::slice::from_ref(&view), pattern(), -1.0, size())
                .unwrap_err(),
            CalibrationError::InvalidSquareSize(-1.0)
        );
        assert!(matches!(
            engine
                .calibrate(
                    std::slice::from_ref(&view),
                    pattern(),
                    10.0,
                    ImageSize {
                        width: 0,
                        height: 480
                    }
                )
                .unwrap_err(),
            CalibrationError::InvalidImageSize { .. }
        ));
    }

    #[test]
    fn collinear_view_fails_at_homography_stage() {
        let points = (0..20).map(|i| Point2::new(i as f64, 2.0 * i as f64)).collect();
        let err = CalibrationEngine::default()
            .calibrate(&[CornerSet::new(points)], pattern(), 10.0, size())
            .unwrap_err();
        match err {
            CalibrationError::DidNotConverge { stage, .. } => {
                assert_eq!(stage, CalibrationStage::Homography { view: 0 })
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
