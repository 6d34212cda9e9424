//! Levenberg-Marquardt refinement for small nonlinear least-squares
//! problems, backed by the `levenberg-marquardt` crate.
//!
//! The solver crate is built against its own `nalgebra` release, so
//! parameters, residuals and Jacobians cross the boundary as column-major
//! slices.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use lm_nalgebra::{storage::Owned, Dyn};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Residual vector and Jacobian of a least-squares cost `0.5 * |r(x)|^2`.
pub trait NllsProblem {
    fn residuals(&self, x: &DVector<f64>) -> DVector<f64>;
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Evaluation budget, in units of `n + 1` residual evaluations for `n`
    /// parameters. Running out is reported, not treated as failure.
    pub max_iters: usize,
    /// Relative cost decrease below which the solve has converged.
    pub ftol: f64,
    /// Relative step length below which the solve has converged.
    pub xtol: f64,
    /// Orthogonality between residuals and Jacobian columns below which the
    /// solve has converged.
    pub gtol: f64,
    /// Initial trust-region bound, relative to the scaled parameter norm.
    pub stepbound: f64,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 100,
            ftol: 1e-12,
            xtol: 1e-12,
            gtol: 0.0,
            stepbound: 100.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SolveReport {
    /// Residual evaluations spent.
    pub iterations: usize,
    /// `|r|^2` at the initial estimate.
    pub initial_cost: f64,
    /// `|r|^2` at the returned estimate.
    pub final_cost: f64,
    pub converged: bool,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("cost is not finite at the initial estimate")]
    NonFiniteCost,
    #[error("jacobian contains non-finite entries")]
    NonFiniteJacobian,
    #[error("solver failed: {0}")]
    Numerical(String),
}

fn to_lm_vector(v: &DVector<f64>) -> lm_nalgebra::DVector<f64> {
    lm_nalgebra::DVector::from_column_slice(v.as_slice())
}

fn from_lm_vector(v: &lm_nalgebra::DVector<f64>) -> DVector<f64> {
    DVector::from_column_slice(v.as_slice())
}

struct LmWrapper<'a, P: NllsProblem> {
    problem: &'a P,
    params: DVector<f64>,
}

impl<P: NllsProblem> LeastSquaresProblem<f64, Dyn, Dyn> for LmWrapper<'_, P> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &lm_nalgebra::DVector<f64>) {
        self.params = from_lm_vector(x);
    }

    fn params(&self) -> lm_nalgebra::DVector<f64> {
        to_lm_vector(&self.params)
    }

    fn residuals(&self) -> Option<lm_nalgebra::DVector<f64>> {
        Some(to_lm_vector(&self.problem.residuals(&self.params)))
    }

    fn jacobian(&self) -> Option<lm_nalgebra::DMatrix<f64>> {
        let jac = self.problem.jacobian(&self.params);
        if jac.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(lm_nalgebra::DMatrix::from_column_slice(
            jac.nrows(),
            jac.ncols(),
            jac.as_slice(),
        ))
    }
}

/// Minimize `|r(x)|^2` from `x0`.
///
/// Converged terminations and an exhausted evaluation budget return the
/// best estimate found; the latter with `converged == false`. Numerical
/// breakdown is an error.
pub fn minimize<P: NllsProblem>(
    problem: &P,
    x0: DVector<f64>,
    opts: &SolveOptions,
) -> Result<(DVector<f64>, SolveReport), SolveError> {
    let initial_cost = problem.residuals(&x0).norm_squared();
    if !initial_cost.is_finite() {
        return Err(SolveError::NonFiniteCost);
    }

    // The solver asserts non-negative tolerances and a positive step bound.
    let lm = LevenbergMarquardt::new()
        .with_ftol(opts.ftol.max(0.0))
        .with_xtol(opts.xtol.max(0.0))
        .with_gtol(opts.gtol.max(0.0))
        .with_stepbound(if opts.stepbound > 0.0 { opts.stepbound } else { 100.0 })
        .with_patience(opts.max_iters.max(1));
    let (wrapper, report) = lm.minimize(LmWrapper { problem, params: x0 });

    let converged = match report.termination {
        TerminationReason::ResidualsZero
        | TerminationReason::Orthogonal
        | TerminationReason::Converged { .. } => true,
        TerminationReason::LostPatience => false,
        TerminationReason::User(_) => return Err(SolveError::NonFiniteJacobian),
        other => return Err(SolveError::Numerical(format!("{other:?}"))),
    };
    let final_cost = problem.residuals(&wrapper.params).norm_squared();
    if !final_cost.is_finite() {
        return Err(SolveError::Numerical("non-finite final cost".into()));
    }

    Ok((
        wrapper.params,
        SolveReport {
            iterations: report.number_of_evaluations,
            initial_cost,
            final_cost,
            converged,
        },
    ))
}
