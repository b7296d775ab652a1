//! Regression models for power-law fitting.
//!
//! - **ols**: log-log ordinary least squares (closed-form starting values)
//! - **nls**: Levenberg-Marquardt refinement on the original scale

pub mod nls;
pub mod ols;

pub use nls::{fit_power_law, NlsConfig, PowerLawFit};
pub use ols::{fit_log_linear, LogLinearFit, MIN_OBSERVATIONS};
