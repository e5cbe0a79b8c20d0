use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::loader::read_two_column;
use super::model::{Series, SpectrumTable, AXIS_NAME};
use super::writer::save_table;
use crate::error::{ProcessingError, Result};

pub const COMBINED_RAW_FILE: &str = "combined_raw.csv";
pub const REFERENCED_RAW_FILE: &str = "referenced_raw.csv";

/// Axis values closer than this are treated as the same wavenumber.
const AXIS_TOLERANCE: f64 = 1e-6;

/// How input files are ordered before they become table columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FileOrder {
    /// `2.csv` before `10.csv`.
    #[default]
    Natural,
    /// Plain byte order of the file names.
    Lexical,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CombineOptions {
    pub order: FileOrder,
    /// Leave the reference column itself unsubtracted in the referenced table.
    pub keep_reference: bool,
}

/// The two tables produced from one input directory.
#[derive(Debug, Clone)]
pub struct CombinedTables {
    pub raw: SpectrumTable,
    pub referenced: SpectrumTable,
}

impl CombinedTables {
    /// Write `combined_raw.csv` and `referenced_raw.csv` into `dir`.
    pub fn save(&self, dir: &Path) -> Result<(PathBuf, PathBuf)> {
        let raw_path = dir.join(COMBINED_RAW_FILE);
        let referenced_path = dir.join(REFERENCED_RAW_FILE);
        save_table(&self.raw, &raw_path)?;
        save_table(&self.referenced, &referenced_path)?;
        Ok((raw_path, referenced_path))
    }
}

/// List the `*.csv` files of `dir` (case-insensitive), sorted by `order`.
pub fn list_inputs(dir: &Path, order: FileOrder) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ProcessingError::DirectoryNotFound(dir.to_path_buf()));
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
        })
        .collect();

    if files.is_empty() {
        return Err(ProcessingError::NoInputFiles(dir.to_path_buf()));
    }

    files.sort_by(|a, b| compare_names(a, b, order));
    Ok(files)
}

fn compare_names(a: &Path, b: &Path, order: FileOrder) -> Ordering {
    let a = a.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    let b = b.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    match order {
        FileOrder::Natural => natord::compare_ignore_case(&a, &b),
        FileOrder::Lexical => a.cmp(&b),
    }
}

/// Combine every raw export in `dir` into a raw and a reference-subtracted
/// table keyed by the first file's axis.
///
/// Column names are the file stems. Inputs longer than the first file are
/// truncated and shorter ones padded with NaN, so every column has the
/// reference row count.
pub fn combine_directory(dir: &Path, options: CombineOptions) -> Result<CombinedTables> {
    let files = list_inputs(dir, options.order)?;
    log::info!("Combining {} spectra from {}", files.len(), dir.display());

    let mut inputs = files.iter();
    let Some(first) = inputs.next() else {
        return Err(ProcessingError::NoInputFiles(dir.to_path_buf()));
    };
    let (axis, reference) = read_two_column(first)?;

    let mut raw = SpectrumTable::new(AXIS_NAME, axis.clone());
    let mut referenced = SpectrumTable::new(AXIS_NAME, axis.clone());

    let first_name = column_name(first);
    raw.push(Series::new(first_name.clone(), reference.clone()))?;
    let first_referenced = if options.keep_reference {
        reference.clone()
    } else {
        subtract(&reference, &reference)
    };
    referenced.push(Series::new(first_name, first_referenced))?;

    for path in inputs {
        let name = column_name(path);
        let (x, y) = read_two_column(path)?;

        if x.len() != axis.len() {
            log::warn!(
                "{} has {} rows, reference has {}; aligning by row",
                path.display(),
                x.len(),
                axis.len()
            );
        } else if !same_axis(&x, &axis) {
            log::warn!("{} does not share the reference wavenumber axis", path.display());
        }

        let y = align(y, axis.len());
        log::debug!("Adding column {name}");
        referenced.push(Series::new(name.clone(), subtract(&y, &reference)))?;
        raw.push(Series::new(name, y))?;
    }

    Ok(CombinedTables { raw, referenced })
}

fn column_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn align(mut values: Vec<f64>, len: usize) -> Vec<f64> {
    values.resize(len, f64::NAN);
    values
}

fn subtract(values: &[f64], reference: &[f64]) -> Vec<f64> {
    values.iter().zip(reference).map(|(v, r)| v - r).collect()
}

fn same_axis(a: &[f64], b: &[f64]) -> bool {
    a.iter().zip(b).all(|(x, y)| (x - y).abs() <= AXIS_TOLERANCE)
}
