//! Allometric size normalization.
//!
//! Fits `character = a * normalize_by^b` in two stages (log-log OLS for
//! starting values, then Levenberg-Marquardt on the original scale) and
//! rescales every measurement to the mean size:
//!
//! `normalized = character * (mean(normalize_by) / normalize_by)^b`

use crate::config::NormalizeConfig;
use crate::data::{Column, Table};
use crate::error::{AlloError, Result};
use crate::model::{fit_log_linear, fit_power_law, NlsConfig, MIN_OBSERVATIONS};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Suffix appended to the character name when no output column is given.
pub const NORMALIZED_SUFFIX: &str = "_normalized";

/// How missing cells in the two source columns are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Drop incomplete rows from the fit; their output cell is missing.
    #[default]
    Exclude,
    /// Reject the table if either column has a missing cell.
    Error,
}

/// Fitted allometric relationship `character ≈ a * normalize_by^b`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    /// Trait column that was fitted.
    pub character: String,
    /// Size column used as predictor.
    pub normalize_by: String,
    /// Scale coefficient from the nonlinear fit.
    pub a: f64,
    /// Allometric exponent from the nonlinear fit.
    pub b: f64,
    /// Scale coefficient from the log-log starting fit.
    pub a_start: f64,
    /// Exponent from the log-log starting fit.
    pub b_start: f64,
    /// Residual sum of squares on the original scale.
    pub rss: f64,
    /// Accepted Levenberg-Marquardt steps.
    pub iterations: usize,
    /// Relative offset at the solution; above `tolerance` only when the
    /// solver stalled within its machine-precision floor.
    pub relative_offset: f64,
    /// Complete rows used in the fit.
    pub n_obs: usize,
    /// Rows left out because a cell was missing.
    pub n_excluded: usize,
    /// Mean of `normalize_by` over its non-missing cells.
    pub reference_size: f64,
}

impl FitResult {
    /// Predicted character value at a given size.
    pub fn predict(&self, size: f64) -> f64 {
        self.a * size.powf(self.b)
    }

    /// Multiplier taking a measurement at `size` to the reference size.
    pub fn scale_factor(&self, size: f64) -> f64 {
        (self.reference_size / size).powf(self.b)
    }

    /// Normalize a single measurement.
    pub fn normalize_value(&self, character: f64, size: f64) -> f64 {
        character * self.scale_factor(size)
    }

    /// Serialize the fit as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(AlloError::from)
    }
}

/// Validated source columns and the complete observations drawn from them.
struct Prepared<'a> {
    traits: &'a [Option<f64>],
    sizes: &'a [Option<f64>],
    x: Vec<f64>,
    y: Vec<f64>,
    reference_size: f64,
    n_excluded: usize,
}

/// Builder for allometric normalization of one character by one size variable.
///
/// # Example
///
/// ```
/// use allometric_normalize::prelude::*;
///
/// let table = Table::new()
///     .with_numeric("width", vec![8.0, 10.0, 12.0, 9.0, 11.0]).unwrap()
///     .with_numeric("length", vec![40.0, 50.0, 60.0, 45.0, 55.0]).unwrap();
///
/// let out = AllometricNormalizer::new("width", "length")
///     .normalize(&table)
///     .unwrap();
///
/// assert!(out.has_column("width_normalized"));
/// ```
#[derive(Debug, Clone)]
pub struct AllometricNormalizer {
    character: String,
    normalize_by: String,
    column_name: Option<String>,
    solver: NlsConfig,
    missing: MissingPolicy,
}

impl AllometricNormalizer {
    /// Normalize `character` by `normalize_by` with default settings.
    pub fn new(character: &str, normalize_by: &str) -> Self {
        Self {
            character: character.to_string(),
            normalize_by: normalize_by.to_string(),
            column_name: None,
            solver: NlsConfig::default(),
            missing: MissingPolicy::default(),
        }
    }

    /// Build from a serialized configuration.
    pub fn from_config(config: &NormalizeConfig) -> Self {
        Self {
            character: config.character.clone(),
            normalize_by: config.normalize_by.clone(),
            column_name: config.new_column_name.clone(),
            solver: config.solver.clone(),
            missing: config.missing,
        }
    }

    /// Set the output column name.
    pub fn column_name(mut self, name: &str) -> Self {
        self.column_name = Some(name.to_string());
        self
    }

    /// Set solver settings for the nonlinear refinement.
    pub fn solver(mut self, config: NlsConfig) -> Self {
        self.solver = config;
        self
    }

    /// Set the missing-value policy.
    pub fn missing(mut self, policy: MissingPolicy) -> Self {
        self.missing = policy;
        self
    }

    /// Name of the column that `normalize` will write.
    pub fn output_column(&self) -> String {
        self.column_name
            .clone()
            .unwrap_or_else(|| format!("{}{}", self.character, NORMALIZED_SUFFIX))
    }

    /// Fit the power law without touching the table.
    pub fn fit(&self, table: &Table) -> Result<FitResult> {
        self.solver.validate()?;
        let prepared = self.prepare(table)?;
        self.fit_prepared(&prepared)
    }

    /// Fit and return a copy of the table with the normalized column added.
    pub fn normalize(&self, table: &Table) -> Result<Table> {
        self.normalize_with_fit(table).map(|(out, _)| out)
    }

    /// Like [`normalize`](Self::normalize), also returning the fit.
    pub fn normalize_with_fit(&self, table: &Table) -> Result<(Table, FitResult)> {
        self.solver.validate()?;
        let output = self.output_column();
        if output.trim().is_empty() {
            return Err(AlloError::InvalidParameter(
                "Output column name must not be empty".to_string(),
            ));
        }
        if output == self.character || output == self.normalize_by {
            return Err(AlloError::InvalidParameter(format!(
                "Output column '{}' would overwrite a source column",
                output
            )));
        }

        let prepared = self.prepare(table)?;
        let fit = self.fit_prepared(&prepared)?;

        let values: Vec<Option<f64>> = prepared
            .traits
            .par_iter()
            .zip(prepared.sizes.par_iter())
            .map(|(t, s)| match (t, s) {
                (Some(t), Some(s)) => Some(fit.normalize_value(*t, *s)),
                _ => None,
            })
            .collect();

        let mut out = table.clone();
        out.insert_column(output.as_str(), Column::Numeric(values))?;

        debug!(
            column = %output,
            b = fit.b,
            reference_size = fit.reference_size,
            "added normalized column"
        );

        Ok((out, fit))
    }

    fn prepare<'a>(&self, table: &'a Table) -> Result<Prepared<'a>> {
        if table.n_rows() == 0 {
            return Err(AlloError::EmptyData("Table has no rows".to_string()));
        }

        let traits = table.numeric(&self.character)?;
        let sizes = table.numeric(&self.normalize_by)?;
        check_cells(&self.character, traits, self.missing)?;
        check_cells(&self.normalize_by, sizes, self.missing)?;

        let (x, y): (Vec<f64>, Vec<f64>) = sizes
            .iter()
            .zip(traits.iter())
            .filter_map(|(s, t)| Some(((*s)?, (*t)?)))
            .unzip();
        let n_excluded = table.n_rows() - x.len();
        if n_excluded > 0 {
            warn!(
                n_excluded,
                character = %self.character,
                normalize_by = %self.normalize_by,
                "rows with missing values excluded from fit"
            );
        }

        if x.len() < MIN_OBSERVATIONS {
            return Err(AlloError::InsufficientData {
                required: MIN_OBSERVATIONS,
                actual: x.len(),
            });
        }

        let observed: Vec<f64> = sizes.iter().flatten().copied().collect();
        let reference_size = observed.iter().sum::<f64>() / observed.len() as f64;

        Ok(Prepared {
            traits,
            sizes,
            x,
            y,
            reference_size,
            n_excluded,
        })
    }

    fn fit_prepared(&self, prepared: &Prepared<'_>) -> Result<FitResult> {
        let start = fit_log_linear(&prepared.x, &prepared.y)?;
        let (a_start, b_start) = start.start();
        debug!(a_start, b_start, r_squared = start.r_squared, "log-log starting fit");

        let refined = fit_power_law(&prepared.x, &prepared.y, (a_start, b_start), &self.solver)?;

        Ok(FitResult {
            character: self.character.clone(),
            normalize_by: self.normalize_by.clone(),
            a: refined.a,
            b: refined.b,
            a_start,
            b_start,
            rss: refined.rss,
            iterations: refined.iterations,
            relative_offset: refined.relative_offset,
            n_obs: prepared.x.len(),
            n_excluded: prepared.n_excluded,
            reference_size: prepared.reference_size,
        })
    }
}

/// Reject non-finite or non-positive cells, and missing ones under `MissingPolicy::Error`.
fn check_cells(column: &str, cells: &[Option<f64>], policy: MissingPolicy) -> Result<()> {
    for (row, cell) in cells.iter().enumerate() {
        match cell {
            Some(v) if !v.is_finite() => {
                return Err(AlloError::NonFiniteValue {
                    column: column.to_string(),
                    row,
                })
            }
            Some(v) if *v <= 0.0 => {
                return Err(AlloError::NonPositiveValue {
                    column: column.to_string(),
                    row,
                    value: *v,
                })
            }
            None if policy == MissingPolicy::Error => {
                return Err(AlloError::MissingValue {
                    column: column.to_string(),
                    row,
                })
            }
            _ => {}
        }
    }
    Ok(())
}

/// Normalize `character` by `normalize_by`, writing `new_column`
/// (default `<character>_normalized`).
pub fn normalize_character(
    table: &Table,
    character: &str,
    normalize_by: &str,
    new_column: Option<&str>,
) -> Result<Table> {
    let mut normalizer = AllometricNormalizer::new(character, normalize_by);
    if let Some(name) = new_column {
        normalizer = normalizer.column_name(name);
    }
    normalizer.normalize(table)
}
