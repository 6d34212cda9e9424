//! Constant-velocity Kalman filter over pixel positions.

use nalgebra::{Matrix2, Matrix2x4, Matrix4, Point2, Vector2, Vector4};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KalmanParams {
    /// Process noise, `q * I` over (x, y, vx, vy).
    pub process_noise: f64,
    /// Measurement noise, `r * I` over (x, y).
    pub measurement_noise: f64,
    /// Initial state covariance, `p0 * I`.
    pub initial_covariance: f64,
}

impl Default for KalmanParams {
    fn default() -> Self {
        Self {
            process_noise: 0.03,
            measurement_noise: 0.5,
            initial_covariance: 1.0,
        }
    }
}

/// State `(x, y, vx, vy)` with a unit time step between frames.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstantVelocityKalman {
    x: Vector4<f64>,
    p: Matrix4<f64>,
    q: Matrix4<f64>,
    r: Matrix2<f64>,
}

fn transition() -> Matrix4<f64> {
    Matrix4::new(
        1.0, 0.0, 1.0, 0.0, //
        0.0, 1.0, 0.0, 1.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    )
}

fn observation() -> Matrix2x4<f64> {
    Matrix2x4::new(
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0,
    )
}

impl ConstantVelocityKalman {
    /// Start at `initial` with zero velocity.
    pub fn new(initial: Point2<f64>, params: &KalmanParams) -> Self {
        Self {
            x: Vector4::new(initial.x, initial.y, 0.0, 0.0),
            p: Matrix4::identity() * params.initial_covariance,
            q: Matrix4::identity() * params.process_noise,
            r: Matrix2::identity() * params.measurement_noise,
        }
    }

    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.x[0], self.x[1])
    }

    /// Pixels per frame.
    pub fn velocity(&self) -> Vector2<f64> {
        Vector2::new(self.x[2], self.x[3])
    }

    pub fn covariance(&self) -> &Matrix4<f64> {
        &self.p
    }

    /// Advance one frame; returns the prior position.
    pub fn predict(&mut self) -> Point2<f64> {
        let f = transition();
        self.x = f * self.x;
        self.p = f * self.p * f.transpose() + self.q;
        self.position()
    }

    /// Fold in a position measurement; returns the posterior position.
    ///
    /// A singular innovation covariance leaves the state unchanged.
    pub fn correct(&mut self, z: Point2<f64>) -> Point2<f64> {
        let h = observation();
        let y = Vector2::new(z.x, z.y) - h * self.x;
        let s = h * self.p * h.transpose() + self.r;
        let Some(s_inv) = s.try_inverse() else {
            return self.position();
        };
        let k = self.p * h.transpose() * s_inv;
        self.x += k * y;
        self.p = (Matrix4::identity() - k * h) * self.p;
        self.position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn starts_at_rest() {
        let kf = ConstantVelocityKalman::new(Point2::new(3.0, 4.0), &KalmanParams::default());
        assert_eq!(kf.position(), Point2::new(3.0, 4.0));
        assert_eq!(kf.velocity(), Vector2::zeros());
        assert_eq!(*kf.covariance(), Matrix4::identity());
    }

    #[test]
    fn predict_grows_uncertainty() {
        let mut kf = ConstantVelocityKalman::new(Point2::new(0.0, 0.0), &KalmanParams::default());
        kf.predict();
        // P = F I F^T + Q: position variance 1 + 1 + 0.03
        assert_relative_eq!(kf.covariance()[(0, 0)], 2.03, epsilon = 1e-12);
        assert_relative_eq!(kf.covariance()[(0, 2)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn first_correction_gain() {
        let mut kf = ConstantVelocityKalman::new(Point2::new(0.0, 0.0), &KalmanParams::default());
        kf.predict();
        let p = kf.correct(Point2::new(10.0, 0.0));
        // K_xx = 2.03 / (2.03 + 0.5)
        assert_relative_eq!(p.x, 10.0 * 2.03 / 2.53, epsilon = 1e-12);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-12);
        assert!(kf.velocity().x > 0.0);
    }

    #[test]
    fn converges_to_constant_velocity() {
        let mut kf = ConstantVelocityKalman::new(Point2::new(0.0, 0.0), &KalmanParams::default());
        for i in 1..=60 {
            kf.predict();
            kf.correct(Point2::new(2.0 * i as f64, -1.0 * i as f64));
        }
        let v = kf.velocity();
        assert_relative_eq!(v.x, 2.0, epsilon = 1e-2);
        assert_relative_eq!(v.y, -1.0, epsilon = 1e-2);
        let ahead = kf.predict();
        assert_relative_eq!(ahead.x, 122.0, epsilon = 0.1);
    }
}
