//! # Dataset Abstraction and Input Adapters
//!
//! This module is the exclusive entry point for user-provided data. Every
//! external representation (a polars `DataFrame`, a rectangular `ndarray`
//! matrix, plain row vectors, an endog/exog pair or a delimited file on disk)
//! is adapted into a single [`Dataset`] at the boundary. Downstream code only
//! ever sees a `Dataset`, so the splitting and decomposition logic never
//! branches on how the caller happened to hold their data.
//!
//! - Named vs. positional: a `Dataset` built from a `DataFrame` or a file
//!   carries column names and must be addressed with [`ColumnSelector::Name`].
//!   One built from an array carries no names and must be addressed with
//!   [`ColumnSelector::Index`]. Mixing the two is an input error rather than
//!   a silent reinterpretation.
//! - Strict values: numeric columns must be complete and finite. Missing
//!   values are rejected, never imputed.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use polars::prelude::*;
use std::fmt;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// A comprehensive error type for all data adaptation and column lookup failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("The input is not a usable numeric table: {0}")]
    InvalidInputKind(String),
    #[error(
        "Selector {selector} cannot address a {representation} dataset. Use a column name for tabular data and a column index for array data."
    )]
    InvalidSelectorKind {
        selector: ColumnSelector,
        representation: &'static str,
    },
    #[error("The column {0} was not found in the dataset. Please check spelling and case.")]
    SelectorNotFound(ColumnSelector),
}

/// Addresses one column of a [`Dataset`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnSelector {
    Name(String),
    Index(usize),
}

impl fmt::Display for ColumnSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnSelector::Name(name) => write!(f, "'{name}'"),
            ColumnSelector::Index(index) => write!(f, "#{index}"),
        }
    }
}

impl From<&str> for ColumnSelector {
    fn from(name: &str) -> Self {
        ColumnSelector::Name(name.to_string())
    }
}

impl From<String> for ColumnSelector {
    fn from(name: String) -> Self {
        ColumnSelector::Name(name)
    }
}

impl From<usize> for ColumnSelector {
    fn from(index: usize) -> Self {
        ColumnSelector::Index(index)
    }
}

/// The values held by a single column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Array1<f64>),
    /// Text columns are only usable as a group indicator.
    Text(Vec<String>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(values) => values.len(),
            ColumnData::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The internal tabular representation every input is adapted into.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// `Some` for tabular inputs addressed by name, `None` for positional arrays.
    names: Option<Vec<String>>,
    columns: Vec<ColumnData>,
    n_rows: usize,
}

impl Dataset {
    /// Builds a named dataset from `(name, column)` pairs.
    pub fn from_named_columns(columns: Vec<(String, ColumnData)>) -> Result<Self, DataError> {
        let (names, columns): (Vec<String>, Vec<ColumnData>) = columns.into_iter().unzip();
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(DataError::InvalidInputKind(format!(
                    "column name '{name}' appears more than once"
                )));
            }
        }
        Self::assemble(Some(names), columns)
    }

    /// Builds a positional dataset from a rectangular numeric matrix.
    pub fn from_array(data: ArrayView2<f64>) -> Result<Self, DataError> {
        let columns = data
            .columns()
            .into_iter()
            .map(|column| ColumnData::Numeric(column.to_owned()))
            .collect();
        Self::assemble(None, columns)
    }

    /// Builds a positional dataset from row vectors, rejecting ragged input.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, DataError> {
        let width = rows.first().map_or(0, Vec::len);
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != width) {
            return Err(DataError::InvalidInputKind(format!(
                "rows are not rectangular: row {} has {} fields but row 1 has {}",
                i + 1,
                row.len(),
                width
            )));
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let matrix = Array2::from_shape_vec((rows.len(), width), flat)
            .map_err(|e| DataError::InvalidInputKind(e.to_string()))?;
        Self::from_array(matrix.view())
    }

    /// Adapts a polars `DataFrame`. String columns are kept as text; every
    /// other column is cast to `f64`.
    pub fn from_dataframe(df: &DataFrame) -> Result<Self, DataError> {
        let mut columns = Vec::with_capacity(df.width());
        for column in df.get_columns() {
            let name = column.name().to_string();
            if column.null_count() > 0 {
                return Err(DataError::InvalidInputKind(format!(
                    "missing values were found in column '{name}'"
                )));
            }

            let data = if matches!(column.dtype(), DataType::String) {
                let values = column
                    .str()?
                    .into_iter()
                    .map(|value| value.unwrap_or_default().to_string())
                    .collect();
                ColumnData::Text(values)
            } else {
                let casted = column.cast(&DataType::Float64).map_err(|_| {
                    DataError::InvalidInputKind(format!(
                        "column '{name}' has type {:?}, which is neither numeric nor text",
                        column.dtype()
                    ))
                })?;
                if casted.null_count() > 0 {
                    return Err(DataError::InvalidInputKind(format!(
                        "column '{name}' could not be converted to f64 (found type {:?})",
                        column.dtype()
                    )));
                }
                let chunked = casted.f64()?.rechunk();
                ColumnData::Numeric(chunked.into_no_null_iter().collect())
            };
            columns.push((name, data));
        }
        Self::from_named_columns(columns)
    }

    /// Loads a delimited text file with a header row. Files ending in `.csv`
    /// are read comma-separated, everything else tab-separated.
    pub fn from_delimited_file(path: &Path) -> Result<Self, DataError> {
        let separator = match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => b',',
            _ => b'\t',
        };

        log::info!("Loading data from '{}'", path.display());
        let df = CsvReader::new(File::open(path)?)
            .with_options(
                CsvReadOptions::default()
                    .with_has_header(true)
                    .with_parse_options(CsvParseOptions::default().with_separator(separator)),
            )
            .finish()?;
        log::info!(
            "Loaded {} rows and {} columns from '{}'",
            df.height(),
            df.width(),
            path.display()
        );

        Self::from_dataframe(&df)
    }

    fn assemble(names: Option<Vec<String>>, columns: Vec<ColumnData>) -> Result<Self, DataError> {
        let n_rows = columns.first().map_or(0, ColumnData::len);
        if columns.is_empty() || n_rows == 0 {
            return Err(DataError::InvalidInputKind(
                "the dataset has no rows or no columns".to_string(),
            ));
        }

        for (i, column) in columns.iter().enumerate() {
            let label = match &names {
                Some(names) => format!("'{}'", names[i]),
                None => format!("#{i}"),
            };
            if column.len() != n_rows {
                return Err(DataError::InvalidInputKind(format!(
                    "column {label} has {} rows but the first column has {n_rows}",
                    column.len()
                )));
            }
            if let ColumnData::Numeric(values) = column {
                if values.iter().any(|v| !v.is_finite()) {
                    return Err(DataError::InvalidInputKind(format!(
                        "non-finite values (NaN or Infinity) were found in column {label}"
                    )));
                }
            }
        }

        Ok(Self {
            names,
            columns,
            n_rows,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_named(&self) -> bool {
        self.names.is_some()
    }

    /// Resolves a selector to a column position.
    pub fn resolve(&self, selector: &ColumnSelector) -> Result<usize, DataError> {
        match (selector, &self.names) {
            (ColumnSelector::Name(name), Some(names)) => names
                .iter()
                .position(|candidate| candidate == name)
                .ok_or_else(|| DataError::SelectorNotFound(selector.clone())),
            (ColumnSelector::Index(index), None) => {
                if *index < self.columns.len() {
                    Ok(*index)
                } else {
                    Err(DataError::SelectorNotFound(selector.clone()))
                }
            }
            (ColumnSelector::Name(_), None) => Err(DataError::InvalidSelectorKind {
                selector: selector.clone(),
                representation: "positional (array)",
            }),
            (ColumnSelector::Index(_), Some(_)) => Err(DataError::InvalidSelectorKind {
                selector: selector.clone(),
                representation: "named (tabular)",
            }),
        }
    }

    /// Human-readable label of a column: its name, or `x{index}` for arrays.
    pub fn column_label(&self, index: usize) -> String {
        match &self.names {
            Some(names) => names[index].clone(),
            None => format!("x{index}"),
        }
    }

    pub fn column(&self, index: usize) -> &ColumnData {
        &self.columns[index]
    }

    /// Returns a numeric column, rejecting text columns.
    pub fn numeric_column(&self, index: usize) -> Result<ArrayView1<'_, f64>, DataError> {
        match &self.columns[index] {
            ColumnData::Numeric(values) => Ok(values.view()),
            ColumnData::Text(_) => Err(DataError::InvalidInputKind(format!(
                "column '{}' holds text, but only numeric predictors and responses are supported",
                self.column_label(index)
            ))),
        }
    }

    /// Stacks two datasets with identical column layout, appending a synthetic
    /// text column named `group` (or positioned last for arrays) that records
    /// which input each row came from.
    pub fn stack_groups(
        first: &Dataset,
        second: &Dataset,
        first_label: &str,
        second_label: &str,
    ) -> Result<(Self, ColumnSelector), DataError> {
        if first.names != second.names || first.columns.len() != second.columns.len() {
            return Err(DataError::InvalidInputKind(
                "the two group datasets do not share the same column layout".to_string(),
            ));
        }

        let mut columns = Vec::with_capacity(first.columns.len() + 1);
        for (a, b) in first.columns.iter().zip(&second.columns) {
            let merged = match (a, b) {
                (ColumnData::Numeric(a), ColumnData::Numeric(b)) => {
                    ColumnData::Numeric(a.iter().chain(b.iter()).copied().collect())
                }
                (ColumnData::Text(a), ColumnData::Text(b)) => {
                    ColumnData::Text(a.iter().chain(b.iter()).cloned().collect())
                }
                _ => {
                    return Err(DataError::InvalidInputKind(
                        "a column is numeric in one group dataset and text in the other"
                            .to_string(),
                    ));
                }
            };
            columns.push(merged);
        }

        let group_values = std::iter::repeat_n(first_label.to_string(), first.n_rows)
            .chain(std::iter::repeat_n(second_label.to_string(), second.n_rows))
            .collect();
        columns.push(ColumnData::Text(group_values));

        let (names, selector) = match &first.names {
            Some(names) => {
                let mut group_name = "group".to_string();
                while names.contains(&group_name) {
                    group_name.insert(0, '_');
                }
                let mut names = names.clone();
                names.push(group_name.clone());
                (Some(names), ColumnSelector::Name(group_name))
            }
            None => (None, ColumnSelector::Index(columns.len() - 1)),
        };

        Ok((Self::assemble(names, columns)?, selector))
    }
}
