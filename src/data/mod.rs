/// Data layer: table model, file I/O, combining, and selection.
///
/// Architecture:
/// ```text
///  raw/0000.csv, raw/0001.csv, ...   (headerless wavenumber,intensity)
///        │
///        ▼
///   ┌──────────┐
///   │ combine  │  first file = axis + reference
///   └──────────┘
///        │
///        ▼
///   ┌───────────────┐
///   │ SpectrumTable │  combined_raw.csv / referenced_raw.csv
///   └───────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  select  │  wavenumber window + columns → selected_<range>.csv
///   └──────────┘
/// ```

pub mod combine;
pub mod loader;
pub mod model;
pub mod select;
pub mod writer;
