use std::fmt;

use crate::error::{ProcessingError, Result};

/// Name of the shared x column in every table written by this crate.
pub const AXIS_NAME: &str = "Wavenumber";

// ---------------------------------------------------------------------------
// Series – one value column
// ---------------------------------------------------------------------------

/// A single named value column (one collected spectrum).
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub values: Vec<f64>,
}

impl Series {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Series {
            name: name.into(),
            values,
        }
    }

    /// Smallest and largest finite value, `None` when there is none.
    pub fn finite_extent(&self) -> Option<(f64, f64)> {
        finite_extent(&self.values)
    }
}

// ---------------------------------------------------------------------------
// SpectrumTable – wavenumber axis plus value columns
// ---------------------------------------------------------------------------

/// A wide table: the wavenumber axis followed by one column per spectrum,
/// in collection order.
///
/// Every column holds exactly `axis.len()` values; [`SpectrumTable::push`]
/// rejects anything else, so the invariant holds for every table built
/// through this API.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumTable {
    axis_name: String,
    axis: Vec<f64>,
    columns: Vec<Series>,
}

impl SpectrumTable {
    /// Empty table over the given axis.
    pub fn new(axis_name: impl Into<String>, axis: Vec<f64>) -> Self {
        SpectrumTable {
            axis_name: axis_name.into(),
            axis,
            columns: Vec::new(),
        }
    }

    /// Append a value column.
    pub fn push(&mut self, series: Series) -> Result<()> {
        if series.values.len() != self.axis.len() {
            return Err(ProcessingError::LengthMismatch {
                name: series.name,
                expected: self.axis.len(),
                found: series.values.len(),
            });
        }
        if series.name == self.axis_name || self.column(&series.name).is_some() {
            return Err(ProcessingError::DuplicateColumn(series.name));
        }
        self.columns.push(series);
        Ok(())
    }

    pub fn axis_name(&self) -> &str {
        &self.axis_name
    }

    pub fn axis(&self) -> &[f64] {
        &self.axis
    }

    pub fn columns(&self) -> &[Series] {
        &self.columns
    }

    /// Look up a value column by name.
    pub fn column(&self, name: &str) -> Option<&Series> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names including the axis, in table order.
    pub fn headers(&self) -> Vec<&str> {
        std::iter::once(self.axis_name.as_str())
            .chain(self.columns.iter().map(|c| c.name.as_str()))
            .collect()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.axis.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.axis.is_empty()
    }

    /// Number of columns including the axis.
    pub fn width(&self) -> usize {
        self.columns.len() + 1
    }

    /// Finite extent of the axis.
    pub fn axis_extent(&self) -> Option<(f64, f64)> {
        finite_extent(&self.axis)
    }
}

impl fmt::Display for SpectrumTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows × {} columns [{}]",
            self.len(),
            self.width(),
            self.headers().join(", ")
        )
    }
}

fn finite_extent(values: &[f64]) -> Option<(f64, f64)> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}
