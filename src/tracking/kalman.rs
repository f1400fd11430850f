//! Constant-velocity Kalman estimator for one track
//!
//! State: [x, y, vx, vy] (pixels, pixels/frame)
//! Measurement: [x, y] (observation centroid)
//!
//! Transition matrix A = [I, dt*I; 0, I] with dt = one frame.
//! Process noise Q = q*I, measurement noise R = r*I, both fixed and shared
//! by every track. R is floored at
//! [`MEASUREMENT_NOISE_FLOOR`](crate::config::MEASUREMENT_NOISE_FLOOR) so the
//! innovation covariance S = H*P*Hᵀ + R is always invertible.
//!
//! A prediction is computed from the last posterior and held until the next
//! update. Predicting again while a track coasts inflates the held
//! covariance by Q but leaves the predicted mean where it was, so a missed
//! detection never drags the estimate further along a stale velocity.

use nalgebra::{Matrix2, Matrix2x4, Matrix4, Point2, Vector2, Vector4};
use serde::{Deserialize, Serialize};

use crate::config::KalmanConfig;
use crate::errors::PipelineError;

/// Predicted state held between `predict()` and `update()`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Prior {
    mean: Vector4<f64>,
    covariance: Matrix4<f64>,
}

/// Per-track linear motion estimator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KalmanEstimator {
    /// Posterior state [x, y, vx, vy]
    state: Vector4<f64>,
    /// Posterior covariance
    covariance: Matrix4<f64>,
    /// Pending prediction, if `predict()` ran since the last update
    prior: Option<Prior>,
    /// Diagonal of Q
    process_noise: f64,
    /// Diagonal of R (already floored)
    measurement_noise: f64,
}

impl KalmanEstimator {
    /// Create an estimator at `position` with zero velocity
    pub fn new(position: Point2<f64>, config: &KalmanConfig) -> Self {
        Self {
            state: Vector4::new(position.x, position.y, 0.0, 0.0),
            covariance: Matrix4::identity() * config.initial_uncertainty,
            prior: None,
            process_noise: config.process_noise,
            measurement_noise: config.effective_measurement_noise(),
        }
    }

    /// State transition matrix for a one-frame step
    #[rustfmt::skip]
    fn transition() -> Matrix4<f64> {
        Matrix4::new(
            1.0, 0.0, 1.0, 0.0,   // x' = x + vx
            0.0, 1.0, 0.0, 1.0,   // y' = y + vy
            0.0, 0.0, 1.0, 0.0,   // vx' = vx
            0.0, 0.0, 0.0, 1.0,   // vy' = vy
        )
    }

    /// Observation matrix H = [I, 0]
    #[rustfmt::skip]
    fn observation() -> Matrix2x4<f64> {
        Matrix2x4::new(
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
        )
    }

    /// Predict the next position.
    ///
    /// - `μ' = A × μ`
    /// - `Σ' = A × Σ × Aᵀ + Q`
    ///
    /// A repeated call without an intervening update adds Q to the held
    /// covariance and returns the same mean.
    pub fn predict(&mut self) -> Point2<f64> {
        let q = Matrix4::identity() * self.process_noise;
        let prior = match self.prior.take() {
            Some(held) => Prior {
                mean: held.mean,
                covariance: held.covariance + q,
            },
            None => {
                let a = Self::transition();
                Prior {
                    mean: a * self.state,
                    covariance: a * self.covariance * a.transpose() + q,
                }
            }
        };
        let predicted = Point2::new(prior.mean[0], prior.mean[1]);
        self.prior = Some(prior);
        predicted
    }

    /// Absorb a position measurement.
    ///
    /// Uses the pending prediction when there is one, the current posterior
    /// otherwise. On a singular innovation covariance the prediction is
    /// accepted as the new posterior and an error is returned.
    pub fn update(&mut self, measurement: Point2<f64>) -> Result<(), PipelineError> {
        let (mean, covariance) = match self.prior.take() {
            Some(prior) => (prior.mean, prior.covariance),
            None => (self.state, self.covariance),
        };

        let h = Self::observation();
        let r = Matrix2::identity() * self.measurement_noise;

        // Innovation
        let innovation = Vector2::new(measurement.x, measurement.y) - h * mean;

        // Innovation covariance
        let s = h * covariance * h.transpose() + r;
        let Some(s_inv) = s.try_inverse() else {
            self.state = mean;
            self.covariance = covariance;
            return Err(PipelineError::SingularMatrix {
                context: "innovation covariance".to_string(),
            });
        };

        // Kalman gain
        let k = covariance * h.transpose() * s_inv;

        self.state = mean + k * innovation;

        // Joseph form keeps the covariance symmetric positive definite
        let i_minus_kh = Matrix4::identity() - k * h;
        self.covariance =
            i_minus_kh * covariance * i_minus_kh.transpose() + k * r * k.transpose();

        Ok(())
    }

    /// Latest position estimate (the pending prediction if there is one)
    pub fn position(&self) -> Point2<f64> {
        let mean = self.prior.as_ref().map_or(&self.state, |p| &p.mean);
        Point2::new(mean[0], mean[1])
    }

    /// Posterior velocity estimate in pixels/frame
    pub fn velocity(&self) -> Vector2<f64> {
        Vector2::new(self.state[2], self.state[3])
    }

    /// Posterior state [x, y, vx, vy]
    pub fn state(&self) -> &Vector4<f64> {
        &self.state
    }

    /// Latest covariance (the pending prediction's if there is one)
    pub fn covariance(&self) -> &Matrix4<f64> {
        self.prior
            .as_ref()
            .map_or(&self.covariance, |p| &p.covariance)
    }

    /// Scalar position uncertainty: σ²_x + σ²_y of the latest covariance
    pub fn position_uncertainty(&self) -> f64 {
        let p = self.covariance();
        p[(0, 0)] + p[(1, 1)]
    }
}
