//! Error types for the allometric-normalize library.

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum AlloError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing column '{0}'")]
    MissingColumn(String),

    #[error("Column '{0}' is not numeric")]
    NonNumericColumn(String),

    #[error("Column '{column}' has non-positive value {value} at row {row}")]
    NonPositiveValue { column: String, row: usize, value: f64 },

    #[error("Column '{column}' has non-finite value at row {row}")]
    NonFiniteValue { column: String, row: usize },

    #[error("Column '{column}' has a missing value at row {row}")]
    MissingValue { column: String, row: usize },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("Parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Insufficient data: need at least {required} complete observations, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Nonlinear fit did not converge after {iterations} iterations: {reason}")]
    NonConvergence { iterations: usize, reason: String },

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Broad classification of an [`AlloError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller's table or arguments cannot be normalized as given.
    InvalidInput,
    /// The power-law model could not be fitted to otherwise valid data.
    ModelFitting,
    /// Reading or writing a file failed.
    Io,
    /// YAML or JSON (de)serialization failed.
    Serialization,
}

impl AlloError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AlloError::MissingColumn(_)
            | AlloError::NonNumericColumn(_)
            | AlloError::NonPositiveValue { .. }
            | AlloError::NonFiniteValue { .. }
            | AlloError::MissingValue { .. }
            | AlloError::DimensionMismatch { .. }
            | AlloError::DuplicateColumn(_)
            | AlloError::Parse { .. }
            | AlloError::EmptyData(_)
            | AlloError::InvalidParameter(_) => ErrorKind::InvalidInput,
            AlloError::InsufficientData { .. }
            | AlloError::Numerical(_)
            | AlloError::NonConvergence { .. } => ErrorKind::ModelFitting,
            AlloError::Io(_) => ErrorKind::Io,
            AlloError::Yaml(_) | AlloError::Json(_) => ErrorKind::Serialization,
        }
    }

    pub fn is_invalid_input(&self) -> bool {
        self.kind() == ErrorKind::InvalidInput
    }

    pub fn is_model_fitting(&self) -> bool {
        self.kind() == ErrorKind::ModelFitting
    }
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, AlloError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert!(AlloError::MissingColumn("x".into()).is_invalid_input());
        assert!(AlloError::NonPositiveValue {
            column: "x".into(),
            row: 0,
            value: 0.0
        }
        .is_invalid_input());
        assert!(AlloError::NonConvergence {
            iterations: 50,
            reason: "budget".into()
        }
        .is_model_fitting());
        assert!(AlloError::InsufficientData {
            required: 3,
            actual: 2
        }
        .is_model_fitting());
    }

    #[test]
    fn test_error_display() {
        let err = AlloError::NonPositiveValue {
            column: "length".into(),
            row: 3,
            value: -1.0,
        };
        assert_eq!(
            err.to_string(),
            "Column 'length' has non-positive value -1 at row 3"
        );
    }
}
