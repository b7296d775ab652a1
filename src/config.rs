//! Serializable normalization settings.

use crate::error::{AlloError, Result};
use crate::model::NlsConfig;
use crate::normalize::{AllometricNormalizer, MissingPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Normalization configuration for YAML/JSON files.
///
/// ```yaml
/// character: width
/// normalize_by: length
/// new_column_name: width_size_free
/// missing: exclude
/// solver:
///   max_iterations: 100
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizeConfig {
    /// Trait column to normalize.
    pub character: String,
    /// Size column to normalize by.
    pub normalize_by: String,
    /// Output column; defaults to `<character>_normalized`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_column_name: Option<String>,
    /// Missing-value handling.
    #[serde(default)]
    pub missing: MissingPolicy,
    /// Nonlinear solver settings.
    #[serde(default)]
    pub solver: NlsConfig,
}

impl NormalizeConfig {
    /// Configuration with default output name, missing policy and solver.
    pub fn new(character: &str, normalize_by: &str) -> Self {
        Self {
            character: character.to_string(),
            normalize_by: normalize_by.to_string(),
            new_column_name: None,
            missing: MissingPolicy::default(),
            solver: NlsConfig::default(),
        }
    }

    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(AlloError::from)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(AlloError::from)
    }

    /// Load from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load from JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(AlloError::from)
    }

    /// Build the normalizer this configuration describes.
    pub fn normalizer(&self) -> AllometricNormalizer {
        AllometricNormalizer::from_config(self)
    }
}
