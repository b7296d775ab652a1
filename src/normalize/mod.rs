//! Size normalization of morphological measurements.
//!
//! - **allometric**: power-law (allometric) rescaling to the mean size

pub mod allometric;

pub use allometric::{
    normalize_character, AllometricNormalizer, FitResult, MissingPolicy, NORMALIZED_SUFFIX,
};
