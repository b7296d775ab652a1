//! Column-addressable table of measurements.

use crate::error::{AlloError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Tokens read as a missing cell.
const MISSING_TOKENS: &[&str] = &["", "NA", "na", "NaN", "nan"];

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Numeric measurement.
    Number(f64),
    /// Free text (specimen IDs, taxon names, ...).
    Text(String),
    /// Missing value.
    Missing,
}

impl Value {
    /// Check if this is a missing value.
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Try to get as a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Numeric,
    Text,
}

/// A column of values, `None` marking a missing cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl Column {
    /// Numeric column with no missing cells.
    pub fn numeric(values: impl IntoIterator<Item = f64>) -> Self {
        Column::Numeric(values.into_iter().map(Some).collect())
    }

    /// Text column with no missing cells.
    pub fn text<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        Column::Text(values.into_iter().map(|s| Some(s.into())).collect())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Column::Numeric(_) => ColumnType::Numeric,
            Column::Text(_) => ColumnType::Text,
        }
    }

    /// Borrow the numeric cells, or `None` for a text column.
    pub fn as_numeric(&self) -> Option<&[Option<f64>]> {
        match self {
            Column::Numeric(v) => Some(v),
            Column::Text(_) => None,
        }
    }

    /// Value at a row.
    pub fn get(&self, row: usize) -> Option<Value> {
        match self {
            Column::Numeric(v) => v
                .get(row)
                .map(|cell| cell.map(Value::Number).unwrap_or(Value::Missing)),
            Column::Text(v) => v.get(row).map(|cell| match cell {
                Some(s) => Value::Text(s.clone()),
                None => Value::Missing,
            }),
        }
    }

    /// Number of missing cells.
    pub fn n_missing(&self) -> usize {
        match self {
            Column::Numeric(v) => v.iter().filter(|c| c.is_none()).count(),
            Column::Text(v) => v.iter().filter(|c| c.is_none()).count(),
        }
    }

    fn format_cell(&self, row: usize) -> String {
        match self {
            Column::Numeric(v) => match v[row] {
                Some(x) => x.to_string(),
                None => "NA".to_string(),
            },
            Column::Text(v) => match &v[row] {
                Some(s) => s.clone(),
                None => "NA".to_string(),
            },
        }
    }
}

/// A table of equal-length named columns.
///
/// Column order is preserved; replacing a column keeps its position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    /// Column names in order.
    column_names: Vec<String>,
    /// Data stored as column_name -> Column.
    columns: HashMap<String, Column>,
    /// Row count shared by every column.
    n_rows: usize,
}

impl Table {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from named columns.
    pub fn from_columns<S: Into<String>>(columns: impl IntoIterator<Item = (S, Column)>) -> Result<Self> {
        let mut table = Self::new();
        for (name, column) in columns {
            let name = name.into();
            if table.has_column(&name) {
                return Err(AlloError::DuplicateColumn(name));
            }
            table.insert_column(name, column)?;
        }
        Ok(table)
    }

    /// Builder-style insertion of a fully observed numeric column.
    pub fn with_numeric(mut self, name: &str, values: Vec<f64>) -> Result<Self> {
        self.insert_column(name, Column::numeric(values))?;
        Ok(self)
    }

    /// Builder-style insertion of a fully observed text column.
    pub fn with_text(mut self, name: &str, values: Vec<String>) -> Result<Self> {
        self.insert_column(name, Column::text(values))?;
        Ok(self)
    }

    /// Insert a column, replacing any existing column of the same name in place.
    pub fn insert_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if self.column_names.is_empty() {
            self.n_rows = column.len();
        } else if column.len() != self.n_rows {
            return Err(AlloError::DimensionMismatch {
                expected: self.n_rows,
                actual: column.len(),
            });
        }
        if !self.columns.contains_key(&name) {
            self.column_names.push(name.clone());
        }
        self.columns.insert(name, column);
        Ok(())
    }

    /// Load a table from a TSV file.
    ///
    /// Expected format:
    /// - First row: header with column names
    /// - Subsequent rows: one value per column
    ///
    /// A column is numeric if every non-missing cell parses as a number,
    /// otherwise text. Empty cells, `NA` and `NaN` are missing.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Parse TSV content from any buffered reader.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| AlloError::EmptyData("Empty table file".to_string()))??;
        let column_names: Vec<String> = header_line
            .split('\t')
            .map(|s| s.trim().to_string())
            .collect();
        if column_names.iter().all(|c| c.is_empty()) {
            return Err(AlloError::EmptyData("Table header has no columns".to_string()));
        }

        let mut raw_rows: Vec<Vec<String>> = Vec::new();
        for (idx, line_result) in lines.enumerate() {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<String> = line.split('\t').map(|s| s.trim().to_string()).collect();
            if fields.len() > column_names.len() {
                return Err(AlloError::Parse {
                    line: idx + 2,
                    reason: format!(
                        "expected at most {} fields, found {}",
                        column_names.len(),
                        fields.len()
                    ),
                });
            }
            raw_rows.push(fields);
        }

        let cell = |row: &Vec<String>, col: usize| -> Option<String> {
            row.get(col)
                .filter(|v| !MISSING_TOKENS.contains(&v.as_str()))
                .cloned()
        };

        let mut pairs = Vec::with_capacity(column_names.len());
        for (col_idx, name) in column_names.iter().enumerate() {
            let cells: Vec<Option<String>> = raw_rows.iter().map(|r| cell(r, col_idx)).collect();
            let all_numeric = cells
                .iter()
                .flatten()
                .all(|v| v.parse::<f64>().is_ok());
            let column = if all_numeric {
                Column::Numeric(
                    cells
                        .iter()
                        .map(|c| c.as_ref().and_then(|v| v.parse::<f64>().ok()))
                        .collect(),
                )
            } else {
                Column::Text(cells)
            };
            pairs.push((name.clone(), column));
        }

        Self::from_columns(pairs)
    }

    /// Write the table as TSV. Missing cells are written as `NA`.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(self.to_tsv_string().as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    /// Render the table as a TSV string, header first, one line per row.
    pub fn to_tsv_string(&self) -> String {
        let mut lines = Vec::with_capacity(self.n_rows + 1);
        lines.push(self.column_names.join("\t"));
        for row in 0..self.n_rows {
            let fields: Vec<String> = self
                .column_names
                .iter()
                .map(|name| self.columns[name].format_cell(row))
                .collect();
            lines.push(fields.join("\t"));
        }
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }

    /// Column names in order.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of columns.
    pub fn n_columns(&self) -> usize {
        self.column_names.len()
    }

    /// Check if a column exists.
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    /// Get a column by name.
    pub fn column(&self, column: &str) -> Result<&Column> {
        self.columns
            .get(column)
            .ok_or_else(|| AlloError::MissingColumn(column.to_string()))
    }

    /// Get a numeric column by name.
    pub fn numeric(&self, column: &str) -> Result<&[Option<f64>]> {
        self.column(column)?
            .as_numeric()
            .ok_or_else(|| AlloError::NonNumericColumn(column.to_string()))
    }

    /// Get the value at a row of a column.
    pub fn get(&self, row: usize, column: &str) -> Option<Value> {
        self.columns.get(column).and_then(|c| c.get(row))
    }

    /// Get the type of a column.
    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.columns.get(column).map(Column::column_type)
    }
}
