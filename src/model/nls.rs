//! Nonlinear least squares for the power law `y = a * x^b`.
//!
//! Levenberg-Marquardt: damped Gauss-Newton steps with Marquardt's
//! diagonal scaling, minimizing squared residuals on the original
//! (untransformed) scale.

use crate::error::{AlloError, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Residual sum of squares, relative to `sum(y^2)`, treated as an exact fit.
const PERFECT_FIT_REL: f64 = 1e-20;

/// Solver settings for the Levenberg-Marquardt refinement.
///
/// When no damped step can lower the RSS any further, the fit is accepted
/// only if the relative offset is within [`stall_floor`](Self::stall_floor):
/// the larger of `tolerance` and `sqrt(f64::EPSILON)`, the smallest offset
/// reliably resolvable in double precision. Above that the solver reports
/// non-convergence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NlsConfig {
    /// Maximum number of accepted steps.
    pub max_iterations: usize,
    /// Relative-offset convergence tolerance.
    pub tolerance: f64,
    /// Initial damping factor.
    pub initial_lambda: f64,
    /// Damping multiplier after a rejected step.
    pub lambda_up: f64,
    /// Damping divisor after an accepted step.
    pub lambda_down: f64,
    /// Damping above which the solver gives up.
    pub max_lambda: f64,
}

impl Default for NlsConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tolerance: 1e-6,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 10.0,
            max_lambda: 1e16,
        }
    }
}

impl NlsConfig {
    /// Set the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the convergence tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Largest relative offset accepted when the solver stalls.
    pub fn stall_floor(&self) -> f64 {
        self.tolerance.max(f64::EPSILON.sqrt())
    }

    /// Check that the settings describe a usable solver.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(AlloError::InvalidParameter(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(AlloError::InvalidParameter(format!(
                "tolerance must be positive and finite, got {}",
                self.tolerance
            )));
        }
        if !(self.initial_lambda > 0.0 && self.initial_lambda < self.max_lambda) {
            return Err(AlloError::InvalidParameter(format!(
                "initial_lambda must be in (0, max_lambda), got {}",
                self.initial_lambda
            )));
        }
        if self.lambda_up <= 1.0 || self.lambda_down <= 1.0 {
            return Err(AlloError::InvalidParameter(
                "lambda_up and lambda_down must exceed 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Converged power-law fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerLawFit {
    /// Scale coefficient.
    pub a: f64,
    /// Exponent.
    pub b: f64,
    /// Residual sum of squares on the original scale.
    pub rss: f64,
    /// Number of accepted Levenberg-Marquardt steps.
    pub iterations: usize,
    /// Relative offset at the solution (0 for an exact fit).
    pub relative_offset: f64,
}

impl PowerLawFit {
    /// Predicted value at `x`.
    pub fn predict(&self, x: f64) -> f64 {
        self.a * x.powf(self.b)
    }
}

/// Fit `y = a * x^b` by Levenberg-Marquardt from `start = (a, b)`.
///
/// Convergence is declared when the fit is exact to machine precision,
/// when the relative offset of the residual vector from the tangent
/// plane drops below `config.tolerance`, or when no damped step can
/// lower the RSS and the offset is within `config.stall_floor()`.
///
/// # Errors
/// Fails with a model-fitting error when the start values are not
/// finite, the gradient matrix is singular, the damping overflows,
/// the solver stalls above the stall floor, or the iteration budget
/// is exhausted.
pub fn fit_power_law(
    x: &[f64],
    y: &[f64],
    start: (f64, f64),
    config: &NlsConfig,
) -> Result<PowerLawFit> {
    config.validate()?;

    if x.len() != y.len() {
        return Err(AlloError::DimensionMismatch {
            expected: x.len(),
            actual: y.len(),
        });
    }

    let n = x.len();
    if n < 3 {
        return Err(AlloError::InsufficientData {
            required: 3,
            actual: n,
        });
    }

    if x.iter().any(|v| *v <= 0.0 || !v.is_finite()) {
        return Err(AlloError::Numerical(
            "Power-law fit requires finite positive predictor values".to_string(),
        ));
    }
    if x.iter().all(|v| *v == x[0]) {
        return Err(AlloError::Numerical(
            "Power-law parameters are not identifiable from a constant predictor".to_string(),
        ));
    }

    let (mut a, mut b) = start;
    if !a.is_finite() || !b.is_finite() || a == 0.0 {
        return Err(AlloError::Numerical(format!(
            "Degenerate starting values (a = {}, b = {})",
            a, b
        )));
    }

    let log_x: Vec<f64> = x.iter().map(|v| v.ln()).collect();
    let y_vec = DVector::from_column_slice(y);
    let y_ss: f64 = y.iter().map(|v| v * v).sum();
    let perfect_fit = y_ss * PERFECT_FIT_REL;

    let mut rss = residual_ss(x, &y_vec, a, b);
    if !rss.is_finite() {
        return Err(AlloError::Numerical(format!(
            "Residual sum of squares is not finite at start (a = {}, b = {})",
            a, b
        )));
    }

    let mut lambda = config.initial_lambda;
    let mut iterations = 0;

    let relative_offset = loop {
        if rss <= perfect_fit {
            break 0.0;
        }

        let (jac, resid) = jacobian_and_residuals(x, &log_x, &y_vec, a, b);
        let jtj = jac.transpose() * &jac;
        let grad = jac.transpose() * &resid;

        let jtj_inv = jtj.clone().try_inverse().ok_or_else(|| {
            AlloError::Numerical(format!(
                "Singular gradient matrix at (a = {}, b = {})",
                a, b
            ))
        })?;

        let offset = (grad.dot(&(&jtj_inv * &grad)) / rss).max(0.0).sqrt();
        trace!(iteration = iterations, a, b, rss, offset, lambda, "LM iteration");

        if offset < config.tolerance {
            break offset;
        }

        if iterations >= config.max_iterations {
            return Err(AlloError::NonConvergence {
                iterations,
                reason: format!(
                    "iteration budget exhausted (relative offset {:.3e} > tolerance {:.1e})",
                    offset, config.tolerance
                ),
            });
        }
        iterations += 1;

        let scale = DVector::from_iterator(2, (0..2).map(|j| jtj[(j, j)].max(f64::MIN_POSITIVE)));

        // Inner damping loop: raise lambda until a step lowers the RSS.
        let mut stalled = false;
        loop {
            let mut damped = jtj.clone();
            for j in 0..2 {
                damped[(j, j)] += lambda * scale[j];
            }

            let step = damped.try_inverse().map(|inv| inv * &grad);
            if let Some(delta) = step {
                let a_new = a + delta[0];
                let b_new = b + delta[1];
                let rss_new = residual_ss(x, &y_vec, a_new, b_new);
                let step_small = delta[0].abs() <= config.tolerance * (a.abs() + config.tolerance)
                    && delta[1].abs() <= config.tolerance * (b.abs() + config.tolerance);

                if rss_new.is_finite() && rss_new <= rss {
                    a = a_new;
                    b = b_new;
                    rss = rss_new;
                    lambda = (lambda / config.lambda_down).max(f64::EPSILON);
                    break;
                }

                if step_small {
                    stalled = true;
                    break;
                }
            }

            lambda *= config.lambda_up;
            if lambda > config.max_lambda {
                return Err(AlloError::NonConvergence {
                    iterations,
                    reason: format!("damping factor exceeded {:.1e}", config.max_lambda),
                });
            }
        }

        if stalled {
            if offset <= config.stall_floor() {
                break offset;
            }
            return Err(AlloError::NonConvergence {
                iterations,
                reason: format!(
                    "stalled at relative offset {:.3e} (floor {:.1e})",
                    offset,
                    config.stall_floor()
                ),
            });
        }
    };

    debug!(a, b, rss, iterations, relative_offset, "power-law fit converged");

    Ok(PowerLawFit {
        a,
        b,
        rss,
        iterations,
        relative_offset,
    })
}

/// Residual sum of squares of `y - a * x^b`.
fn residual_ss(x: &[f64], y: &DVector<f64>, a: f64, b: f64) -> f64 {
    x.iter()
        .zip(y.iter())
        .map(|(&xi, &yi)| {
            let r = yi - a * xi.powf(b);
            r * r
        })
        .sum()
}

/// Jacobian of the model (columns d/da, d/db) and residuals `y - f`.
fn jacobian_and_residuals(
    x: &[f64],
    log_x: &[f64],
    y: &DVector<f64>,
    a: f64,
    b: f64,
) -> (DMatrix<f64>, DVector<f64>) {
    let n = x.len();
    let powered: Vec<f64> = x.iter().map(|xi| xi.powf(b)).collect();

    let jac = DMatrix::from_fn(n, 2, |i, j| {
        if j == 0 {
            powered[i]
        } else {
            a * powered[i] * log_x[i]
        }
    });
    let resid = DVector::from_iterator(n, (0..n).map(|i| y[i] - a * powered[i]));

    (jac, resid)
}
