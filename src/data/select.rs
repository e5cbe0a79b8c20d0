use std::convert::Infallible;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::model::{Series, SpectrumTable};
use super::writer::save_table;
use crate::error::{ProcessingError, Result};

// ---------------------------------------------------------------------------
// Column selectors
// ---------------------------------------------------------------------------

/// Refers to a table column by position (0 = axis) or by header name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnSelector {
    Position(usize),
    Name(String),
}

impl FromStr for ColumnSelector {
    type Err = Infallible;

    /// Digits are positions; `name:0003` forces a numeric-looking name.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Some(name) = s.strip_prefix("name:") {
            return Ok(ColumnSelector::Name(name.to_string()));
        }
        Ok(match s.parse::<usize>() {
            Ok(index) => ColumnSelector::Position(index),
            Err(_) => ColumnSelector::Name(s.to_string()),
        })
    }
}

impl fmt::Display for ColumnSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnSelector::Position(i) => write!(f, "#{i}"),
            ColumnSelector::Name(n) => write!(f, "'{n}'"),
        }
    }
}

/// Index into `table.columns()` for a selector, `None` for the axis.
fn resolve(table: &SpectrumTable, selector: &ColumnSelector) -> Result<Option<usize>> {
    match selector {
        ColumnSelector::Position(0) => Ok(None),
        ColumnSelector::Position(index) => {
            if *index >= table.width() {
                Err(ProcessingError::ColumnIndexOutOfRange {
                    index: *index,
                    width: table.width(),
                })
            } else {
                Ok(Some(index - 1))
            }
        }
        ColumnSelector::Name(name) if name == table.axis_name() => Ok(None),
        ColumnSelector::Name(name) => table
            .columns()
            .iter()
            .position(|c| &c.name == name)
            .map(Some)
            .ok_or_else(|| ProcessingError::ColumnNotFound(name.clone())),
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Restrict `table` to rows whose axis value lies in the inclusive `range`
/// and to the requested columns, in request order.
///
/// * `range` bounds may be given in either order; `None` keeps every row.
/// * An empty `columns` list keeps every value column.
/// * Every selector is resolved before any row is copied, so an invalid
///   selector fails without producing a partial table.
pub fn select(
    table: &SpectrumTable,
    range: Option<(f64, f64)>,
    columns: &[ColumnSelector],
) -> Result<SpectrumTable> {
    let mut picked: Vec<usize> = Vec::new();
    if columns.is_empty() {
        picked.extend(0..table.columns().len());
    } else {
        for selector in columns {
            if let Some(idx) = resolve(table, selector)? {
                if !picked.contains(&idx) {
                    picked.push(idx);
                }
            }
        }
    }

    let rows: Vec<usize> = match range.map(ordered) {
        Some((lo, hi)) => table
            .axis()
            .iter()
            .enumerate()
            .filter(|(_, &x)| x >= lo && x <= hi)
            .map(|(i, _)| i)
            .collect(),
        None => (0..table.len()).collect(),
    };

    let take = |values: &[f64]| -> Vec<f64> { rows.iter().map(|&i| values[i]).collect() };

    let mut selected = SpectrumTable::new(table.axis_name(), take(table.axis()));
    for idx in picked {
        let column = &table.columns()[idx];
        selected.push(Series::new(column.name.clone(), take(&column.values)))?;
    }
    log::info!("Selected {selected}");
    Ok(selected)
}

/// `selected_<lo>-<hi>.csv` from the selected axis, or `selected_full.csv`
/// when no range was requested. A range that matched no rows is named after
/// the requested bounds.
pub fn selection_file_name(selected: &SpectrumTable, range: Option<(f64, f64)>) -> String {
    let Some(requested) = range else {
        return "selected_full.csv".to_string();
    };
    let (lo, hi) = if selected.is_empty() {
        ordered(requested)
    } else {
        selected.axis_extent().unwrap_or_else(|| ordered(requested))
    };
    format!("selected_{lo:.0}-{hi:.0}.csv")
}

/// Select and persist the result next to the other outputs in `dir`.
pub fn select_and_save(
    table: &SpectrumTable,
    range: Option<(f64, f64)>,
    columns: &[ColumnSelector],
    dir: &Path,
) -> Result<(SpectrumTable, PathBuf)> {
    let selected = select(table, range, columns)?;
    if selected.is_empty() {
        log::warn!("No rows fall inside the requested range");
    }
    let path = dir.join(selection_file_name(&selected, range));
    save_table(&selected, &path)?;
    Ok((selected, path))
}

fn ordered((a, b): (f64, f64)) -> (f64, f64) {
    if a <= b { (a, b) } else { (b, a) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::AXIS_NAME;

    fn table() -> SpectrumTable {
        let mut t = SpectrumTable::new(AXIS_NAME, vec![1800.0, 1500.0, 1200.0, 900.0, 600.0]);
        t.push(Series::new("0000", vec![0.0, 1.0, 2.0, 3.0, 4.0])).unwrap();
        t.push(Series::new("0001", vec![10.0, 11.0, 12.0, 13.0, 14.0])).unwrap();
        t.push(Series::new("late", vec![20.0, 21.0, 22.0, 23.0, 24.0])).unwrap();
        t
    }

    #[test]
    fn parses_selectors() {
        assert_eq!("3".parse::<ColumnSelector>().unwrap(), ColumnSelector::Position(3));
        assert_eq!(
            "late".parse::<ColumnSelector>().unwrap(),
            ColumnSelector::Name("late".into())
        );
        assert_eq!(
            "name:0001".parse::<ColumnSelector>().unwrap(),
            ColumnSelector::Name("0001".into())
        );
    }

    #[test]
    fn range_is_inclusive_and_order_free() {
        let selected = select(&table(), Some((1500.0, 900.0)), &[]).unwrap();
        assert_eq!(selected.axis(), &[1500.0, 1200.0, 900.0]);
        assert_eq!(selected.column("0001").unwrap().values, vec![11.0, 12.0, 13.0]);
        assert_eq!(selected.width(), 4);
    }

    #[test]
    fn selectors_follow_request_order() {
        let columns = [
            ColumnSelector::Name("late".into()),
            ColumnSelector::Position(1),
            ColumnSelector::Position(0),
            ColumnSelector::Name("late".into()),
        ];
        let selected = select(&table(), None, &columns).unwrap();
        assert_eq!(selected.headers(), vec!["Wavenumber", "late", "0000"]);
        assert_eq!(selected.len(), 5);
    }

    #[test]
    fn invalid_selectors_fail() {
        assert!(matches!(
            select(&table(), None, &[ColumnSelector::Position(4)]),
            Err(ProcessingError::ColumnIndexOutOfRange { index: 4, width: 4 })
        ));
        assert!(matches!(
            select(&table(), None, &[ColumnSelector::Name("0002".into())]),
            Err(ProcessingError::ColumnNotFound(name)) if name == "0002"
        ));
    }

    #[test]
    fn file_name_uses_selected_extent() {
        let t = table();
        let selected = select(&t, Some((1600.0, 700.0)), &[]).unwrap();
        assert_eq!(
            selection_file_name(&selected, Some((1600.0, 700.0))),
            "selected_900-1500.csv"
        );
        assert_eq!(selection_file_name(&t, None), "selected_full.csv");
    }

    #[test]
    fn empty_range_is_named_after_requested_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let (selected, path) =
            select_and_save(&table(), Some((200.0, 100.0)), &[], dir.path()).unwrap();
        assert!(selected.is_empty());
        assert_eq!(selected.width(), 4);
        assert_eq!(path, dir.path().join("selected_100-200.csv"));
        assert!(path.is_file());
        assert!(!dir.path().join("selected_full.csv").exists());
    }
}
