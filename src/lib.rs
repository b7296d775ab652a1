//! Allometric Size Normalization Library
//!
//! Removes size-correlated variation from a morphological measurement by
//! fitting a power law `character = a * normalize_by^b` and rescaling each
//! measurement to the mean size.
//!
//! # Overview
//!
//! The library is organized into small modules:
//!
//! - **data**: Column-addressable table with TSV I/O
//! - **model**: Log-log OLS and Levenberg-Marquardt power-law fitting
//! - **normalize**: Allometric normalization
//! - **config**: YAML/JSON normalization settings
//! - **synthetic**: Seeded power-law test data
//!
//! # Example
//!
//! ```no_run
//! use allometric_normalize::prelude::*;
//!
//! let table = Table::from_tsv("specimens.tsv").unwrap();
//!
//! let normalized = AllometricNormalizer::new("beak_depth", "wing_chord")
//!     .normalize(&table)
//!     .unwrap();
//!
//! normalized.to_tsv("specimens_normalized.tsv").unwrap();
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod normalize;
pub mod synthetic;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::config::NormalizeConfig;
    pub use crate::data::{Column, ColumnType, Table, Value};
    pub use crate::error::{AlloError, ErrorKind, Result};
    pub use crate::model::{
        fit_log_linear, fit_power_law, LogLinearFit, NlsConfig, PowerLawFit,
    };
    pub use crate::normalize::{
        normalize_character, AllometricNormalizer, FitResult, MissingPolicy, NORMALIZED_SUFFIX,
    };
    pub use crate::synthetic::{generate_power_law, SyntheticConfig};
}
