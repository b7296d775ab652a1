//! Log-log ordinary least squares for power-law starting values.

use crate::error::{AlloError, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Fewest observations that leave residual degrees of freedom for two coefficients.
pub const MIN_OBSERVATIONS: usize = 3;

/// Result of regressing `ln(y)` on `ln(x)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLinearFit {
    /// Intercept, `ln(a)`.
    pub intercept: f64,
    /// Slope, the exponent `b`.
    pub slope: f64,
    /// R-squared on the log scale.
    pub r_squared: f64,
}

impl LogLinearFit {
    /// Back-transformed scale coefficient, `exp(intercept)`.
    pub fn scale(&self) -> f64 {
        self.intercept.exp()
    }

    /// Starting values `(a, b)` for the nonlinear refinement.
    pub fn start(&self) -> (f64, f64) {
        (self.scale(), self.slope)
    }
}

/// Fit `ln(y) = ln(a) + b ln(x)` by OLS.
///
/// Both inputs must be strictly positive and of equal length.
///
/// # Arguments
/// * `x` - Size variable (`normalize_by`)
/// * `y` - Trait variable (`character`)
pub fn fit_log_linear(x: &[f64], y: &[f64]) -> Result<LogLinearFit> {
    if x.len() != y.len() {
        return Err(AlloError::DimensionMismatch {
            expected: x.len(),
            actual: y.len(),
        });
    }

    let n = x.len();
    if n < MIN_OBSERVATIONS {
        return Err(AlloError::InsufficientData {
            required: MIN_OBSERVATIONS,
            actual: n,
        });
    }

    if let Some(v) = x.iter().chain(y.iter()).find(|v| **v <= 0.0 || !v.is_finite()) {
        return Err(AlloError::Numerical(format!(
            "Log-linear fit requires finite positive values; found {}",
            v
        )));
    }

    let log_x: Vec<f64> = x.iter().map(|v| v.ln()).collect();
    let log_y = DVector::from_iterator(n, y.iter().map(|v| v.ln()));

    if log_x.iter().all(|v| *v == log_x[0]) {
        return Err(AlloError::Numerical(
            "Log-linear design is singular (normalizing variable is constant)".to_string(),
        ));
    }

    // Design matrix [1, ln x]
    let design = DMatrix::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { log_x[i] });

    let xtx = design.transpose() * &design;
    let xtx_inv = xtx.try_inverse().ok_or_else(|| {
        AlloError::Numerical(
            "Log-linear design is singular (normalizing variable is constant)".to_string(),
        )
    })?;

    // beta = (X'X)^-1 X'y
    let beta = &xtx_inv * (design.transpose() * &log_y);

    let fitted = &design * &beta;
    let residuals = &log_y - &fitted;
    let rss: f64 = residuals.iter().map(|e| e * e).sum();

    let y_mean = log_y.mean();
    let tss: f64 = log_y.iter().map(|v| (v - y_mean).powi(2)).sum();
    let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { 1.0 };

    if !beta[0].is_finite() || !beta[1].is_finite() {
        return Err(AlloError::Numerical(
            "Log-linear fit produced non-finite coefficients".to_string(),
        ));
    }

    Ok(LogLinearFit {
        intercept: beta[0],
        slope: beta[1],
        r_squared,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_exact_power_law() {
        let x = vec![1.0, 2.0, 4.0, 8.0, 16.0];
        let y: Vec<f64> = x.iter().map(|v: &f64| 3.0 * v.powf(0.75)).collect();

        let fit = fit_log_linear(&x, &y).unwrap();

        assert_relative_eq!(fit.slope, 0.75, epsilon = 1e-10);
        assert_relative_eq!(fit.scale(), 3.0, epsilon = 1e-10);
        assert_relative_eq!(fit.r_squared, 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_isometric_data() {
        let x = vec![40.0, 50.0, 60.0, 45.0, 55.0];
        let y = vec![8.0, 10.0, 12.0, 9.0, 11.0];

        let fit = fit_log_linear(&x, &y).unwrap();

        assert_relative_eq!(fit.slope, 1.0, epsilon = 1e-10);
        assert_relative_eq!(fit.scale(), 0.2, epsilon = 1e-10);
    }

    #[test]
    fn test_constant_predictor_is_singular() {
        let x = vec![5.0, 5.0, 5.0, 5.0];
        let y = vec![1.0, 2.0, 3.0, 4.0];

        let result = fit_log_linear(&x, &y);
        assert!(matches!(result, Err(AlloError::Numerical(_))));
    }

    #[test]
    fn test_insufficient_data() {
        let result = fit_log_linear(&[1.0, 2.0], &[1.0, 2.0]);
        assert!(matches!(
            result,
            Err(AlloError::InsufficientData { required: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_rejects_non_positive() {
        let result = fit_log_linear(&[1.0, 0.0, 3.0], &[1.0, 2.0, 3.0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_dimension_mismatch() {
        let result = fit_log_linear(&[1.0, 2.0, 3.0], &[1.0, 2.0]);
        assert!(matches!(result, Err(AlloError::DimensionMismatch { .. })));
    }
}
