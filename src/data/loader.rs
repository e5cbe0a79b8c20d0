use std::fs::File;
use std::path::Path;

use arrow::array::{Array, Float32Array, Float64Array};
use csv::{ReaderBuilder, Trim};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::model::{Series, SpectrumTable};
use crate::error::{ProcessingError, Result};

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a wide spectrum table. Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row, first column is the wavenumber axis, empty cells are NaN
/// * `.parquet` – one Float64 (or Float32) column per table column, axis first
pub fn load_table(path: &Path) -> Result<SpectrumTable> {
    match table_extension(path).as_str() {
        "csv" => load_csv_table(path),
        "parquet" | "pq" => load_parquet_table(path),
        other => Err(ProcessingError::UnsupportedFormat(other.to_string())),
    }
}

/// Read a headerless raw export with (wavenumber, intensity) per row.
///
/// Extra columns are ignored; rows with fewer than two fields fail.
pub fn read_two_column(path: &Path) -> Result<(Vec<f64>, Vec<f64>)> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)?;

    let mut x = Vec::new();
    let mut y = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        if record.len() < 2 {
            return Err(ProcessingError::TooFewColumns {
                path: path.to_path_buf(),
                row,
                found: record.len(),
            });
        }
        x.push(parse_cell(&record[0], path, row)?);
        y.push(parse_cell(&record[1], path, row)?);
    }

    if x.is_empty() {
        return Err(ProcessingError::EmptyTable(path.to_path_buf()));
    }
    Ok((x, y))
}

pub(crate) fn table_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn parse_cell(cell: &str, path: &Path, row: usize) -> Result<f64> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    cell.parse::<f64>()
        .map_err(|_| ProcessingError::InvalidNumber {
            path: path.to_path_buf(),
            row,
            value: cell.to_string(),
        })
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

fn load_csv_table(path: &Path) -> Result<SpectrumTable> {
    let mut reader = ReaderBuilder::new().trim(Trim::All).from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

    if headers.len() < 2 {
        return Err(ProcessingError::TooFewColumns {
            path: path.to_path_buf(),
            row: 0,
            found: headers.len(),
        });
    }

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); headers.len()];
    for (row_no, result) in reader.records().enumerate() {
        let record = result?;
        // Row 0 is the header line.
        let row = row_no + 1;
        for (col_idx, column) in columns.iter_mut().enumerate() {
            column.push(parse_cell(record.get(col_idx).unwrap_or(""), path, row)?);
        }
    }

    if columns[0].is_empty() {
        return Err(ProcessingError::EmptyTable(path.to_path_buf()));
    }

    assemble(headers, columns)
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet table of float columns, axis in the first column.
fn load_parquet_table(path: &Path) -> Result<SpectrumTable> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let headers: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    if headers.len() < 2 {
        return Err(ProcessingError::TooFewColumns {
            path: path.to_path_buf(),
            row: 0,
            found: headers.len(),
        });
    }

    let reader = builder.build()?;
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); headers.len()];
    for batch in reader {
        let batch = batch?;
        for (col_idx, column) in columns.iter_mut().enumerate() {
            extend_f64(column, batch.column(col_idx).as_ref(), &headers[col_idx])?;
        }
    }

    if columns[0].is_empty() {
        return Err(ProcessingError::EmptyTable(path.to_path_buf()));
    }

    assemble(headers, columns)
}

/// Append a Float64 or Float32 Arrow column, nulls become NaN.
fn extend_f64(out: &mut Vec<f64>, array: &dyn Array, name: &str) -> Result<()> {
    if let Some(arr) = array.as_any().downcast_ref::<Float64Array>() {
        out.extend(arr.iter().map(|v| v.unwrap_or(f64::NAN)));
        Ok(())
    } else if let Some(arr) = array.as_any().downcast_ref::<Float32Array>() {
        out.extend(arr.iter().map(|v| v.map_or(f64::NAN, f64::from)));
        Ok(())
    } else {
        Err(ProcessingError::UnsupportedFormat(format!(
            "parquet column '{name}' of type {:?}, expected Float64 or Float32",
            array.data_type()
        )))
    }
}

fn assemble(headers: Vec<String>, columns: Vec<Vec<f64>>) -> Result<SpectrumTable> {
    let mut pairs = headers.into_iter().zip(columns);
    let Some((axis_name, axis)) = pairs.next() else {
        return Err(ProcessingError::UnsupportedFormat("table without columns".into()));
    };
    let mut table = SpectrumTable::new(axis_name, axis);
    for (name, values) in pairs {
        table.push(Series::new(name, values))?;
    }
    Ok(table)
}
