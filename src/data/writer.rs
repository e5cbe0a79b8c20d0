use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use super::loader::table_extension;
use super::model::SpectrumTable;
use crate::error::{ProcessingError, Result};

/// Persist a table, format chosen by extension (`.csv` or `.parquet`).
///
/// Tables are written once; callers pick a fresh file name for every derived
/// table instead of overwriting their input.
pub fn save_table(table: &SpectrumTable, path: &Path) -> Result<()> {
    match table_extension(path).as_str() {
        "csv" => save_csv(table, path),
        "parquet" | "pq" => save_parquet(table, path),
        other => Err(ProcessingError::UnsupportedFormat(other.to_string())),
    }?;
    log::info!("Wrote {} ({table})", path.display());
    Ok(())
}

fn save_csv(table: &SpectrumTable, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(table.headers())?;

    let mut record: Vec<String> = Vec::with_capacity(table.width());
    for row in 0..table.len() {
        record.clear();
        record.push(format_cell(table.axis()[row]));
        record.extend(table.columns().iter().map(|c| format_cell(c.values[row])));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// NaN is written as an empty cell.
fn format_cell(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        v.to_string()
    }
}

fn save_parquet(table: &SpectrumTable, path: &Path) -> Result<()> {
    let fields: Vec<Field> = table
        .headers()
        .into_iter()
        .map(|name| Field::new(name, DataType::Float64, true))
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let arrays: Vec<ArrayRef> = std::iter::once(table.axis())
        .chain(table.columns().iter().map(|c| c.values.as_slice()))
        .map(|values| Arc::new(Float64Array::from(values.to_vec())) as ArrayRef)
        .collect();

    let batch = RecordBatch::try_new(schema.clone(), arrays)?;
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::data::loader::load_table;
    use crate::data::model::{Series, AXIS_NAME};

    fn sample() -> SpectrumTable {
        let mut table = SpectrumTable::new(AXIS_NAME, vec![4000.0, 3999.0]);
        table.push(Series::new("0000", vec![0.5, f64::NAN])).unwrap();
        table.push(Series::new("0001", vec![-1.25, 2.0])).unwrap();
        table
    }

    #[test]
    fn csv_keeps_headers_and_blank_nan() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.csv");
        save_table(&sample(), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Wavenumber,0000,0001"));
        assert_eq!(lines.next(), Some("4000,0.5,-1.25"));
        assert_eq!(lines.next(), Some("3999,,2"));
    }

    #[test]
    fn parquet_table_loads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.parquet");
        save_table(&sample(), &path).unwrap();

        let loaded = load_table(&path).unwrap();
        assert_eq!(loaded.headers(), vec!["Wavenumber", "0000", "0001"]);
        assert_eq!(loaded.column("0001").unwrap().values, vec![-1.25, 2.0]);
        assert!(loaded.column("0000").unwrap().values[1].is_nan());
    }
}
