use std::path::PathBuf;

use thiserror::Error;

/// Result type of the offline processing pipeline.
pub type Result<T> = std::result::Result<T, ProcessingError>;

/// Failures raised by table loading, combining, selection, baseline fitting
/// and plotting. Acquisition errors are reported separately, see
/// [`crate::acquisition::instrument::InstrumentError`].
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("directory does not exist: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("no CSV files found in {}", .0.display())]
    NoInputFiles(PathBuf),

    #[error("{}: table is empty", .0.display())]
    EmptyTable(PathBuf),

    #[error("{}, row {row}: expected at least 2 columns (wavenumber, intensity), found {found}", .path.display())]
    TooFewColumns {
        path: PathBuf,
        row: usize,
        found: usize,
    },

    #[error("{}, row {row}: '{value}' is not a number", .path.display())]
    InvalidNumber {
        path: PathBuf,
        row: usize,
        value: String,
    },

    #[error("unsupported table format: .{0}")]
    UnsupportedFormat(String),

    #[error("column '{name}' has {found} values but the wavenumber axis has {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("column index {index} is out of range (table has {width} columns)")]
    ColumnIndexOutOfRange { index: usize, width: usize },

    #[error("column '{0}' not found")]
    ColumnNotFound(String),

    #[error("unknown baseline algorithm '{0}', expected one of: {}", crate::baseline::ALGORITHMS.join(", "))]
    UnknownAlgorithm(String),

    #[error("invalid {algorithm} parameter: {reason}")]
    InvalidParameter {
        algorithm: &'static str,
        reason: String,
    },

    #[error("column '{0}' contains non-finite values")]
    NonFinite(String),

    #[error("{algorithm} fit failed: {reason}")]
    FitFailed {
        algorithm: &'static str,
        reason: String,
    },

    #[error("plotting failed: {0}")]
    Plot(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),
}
