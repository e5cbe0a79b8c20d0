use std::path::{Path, PathBuf};

use plotters::prelude::*;
use serde::{Deserialize, Serialize};

use crate::color::generate_palette;
use crate::data::model::SpectrumTable;
use crate::error::{ProcessingError, Result};

const X_LABEL: &str = "Wavenumber (cm⁻¹)";
const Y_LABEL: &str = "Absorbance (A.U.)";

/// How a table is rendered by [`plot_table`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotOptions {
    /// Fixed x window, otherwise the axis extent.
    pub x_range: Option<(f64, f64)>,
    /// Fixed y window, otherwise the extent over every series.
    pub y_range: Option<(f64, f64)>,
    /// High wavenumbers on the left, as IR spectra are usually shown.
    pub reverse_x: bool,
    pub title: Option<String>,
    /// Minutes per step of the number found in a column name.
    pub label_scale: f64,
    pub width: u32,
    pub height: u32,
}

impl Default for PlotOptions {
    fn default() -> Self {
        PlotOptions {
            x_range: None,
            y_range: None,
            reverse_x: true,
            title: None,
            label_scale: 1.0,
            width: 1500,
            height: 1200,
        }
    }
}

// ---------------------------------------------------------------------------
// Legend labels
// ---------------------------------------------------------------------------

/// Number of minutes encoded in a column name such as `0003`, `t12`,
/// `12min`, `12 m` or `file_12`.
///
/// Takes the first run of digits that ends a word, optionally followed by
/// `min`/`m`; digits glued to other letters (`12abc`) do not count.
pub fn minutes_from_name(name: &str) -> Option<u64> {
    let bytes = name.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let digits = &name[start..i];
        let rest = name[i..].trim_start();
        let unit_rest = rest
            .strip_prefix("min")
            .or_else(|| rest.strip_prefix("m"))
            .filter(|r| at_word_boundary(r));
        if unit_rest.is_some() || at_word_boundary(&name[i..]) {
            return digits.parse().ok();
        }
    }
    None
}

fn at_word_boundary(rest: &str) -> bool {
    rest.chars()
        .next()
        .map_or(true, |c| !(c.is_alphanumeric() || c == '_'))
}

/// Legend text for a column: `"<minutes> min"` or the raw name.
pub fn legend_label(name: &str, label_scale: f64) -> String {
    match minutes_from_name(name) {
        Some(n) => {
            let minutes = n as f64 * label_scale;
            if minutes.fract() == 0.0 {
                format!("{minutes:.0} min")
            } else {
                format!("{minutes:.1} min")
            }
        }
        None => name.to_string(),
    }
}

/// `spectrum_<lo>-<hi>.png` for the plotted x window.
pub fn plot_file_name((lo, hi): (f64, f64)) -> String {
    format!(
        "spectrum_{}-{}.png",
        lo.min(hi).trunc() as i64,
        lo.max(hi).trunc() as i64
    )
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn plot_err(e: impl std::fmt::Display) -> ProcessingError {
    ProcessingError::Plot(e.to_string())
}

/// Widen a degenerate window so the chart has a non-empty span.
fn span((lo, hi): (f64, f64)) -> (f64, f64) {
    let (lo, hi) = (lo.min(hi), lo.max(hi));
    if hi - lo > f64::EPSILON {
        (lo, hi)
    } else {
        (lo - 0.5, hi + 0.5)
    }
}

/// Render every value column of `table` against its axis into a PNG in
/// `dir`, returning the written path.
pub fn plot_table(table: &SpectrumTable, options: &PlotOptions, dir: &Path) -> Result<PathBuf> {
    if table.columns().is_empty() {
        return Err(ProcessingError::Plot("table has no value columns".into()));
    }

    let x_range = options
        .x_range
        .or_else(|| table.axis_extent())
        .ok_or_else(|| ProcessingError::Plot("axis has no finite values".into()))?;
    let y_range = options
        .y_range
        .or_else(|| {
            table
                .columns()
                .iter()
                .filter_map(|c| c.finite_extent())
                .reduce(|(a, b), (c, d)| (a.min(c), b.max(d)))
        })
        .ok_or_else(|| ProcessingError::Plot("no finite values to plot".into()))?;

    let path = dir.join(plot_file_name(x_range));
    render(table, options, &path, span(x_range), span(y_range))?;
    log::info!("Wrote {}", path.display());
    Ok(path)
}

fn render(
    table: &SpectrumTable,
    options: &PlotOptions,
    path: &Path,
    (x_lo, x_hi): (f64, f64),
    (y_lo, y_hi): (f64, f64),
) -> Result<()> {
    // Reversal is drawn by mirroring x and labelling the mirrored ticks.
    let sign = if options.reverse_x { -1.0 } else { 1.0 };
    let (cx_lo, cx_hi) = if options.reverse_x {
        (-x_hi, -x_lo)
    } else {
        (x_lo, x_hi)
    };

    let root = BitMapBackend::new(path, (options.width, options.height)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut builder = ChartBuilder::on(&root);
    builder
        .margin(30)
        .x_label_area_size(90)
        .y_label_area_size(60);
    if let Some(title) = &options.title {
        builder.caption(title, ("sans-serif", 44));
    }
    let mut chart = builder
        .build_cartesian_2d(cx_lo..cx_hi, y_lo..y_hi)
        .map_err(plot_err)?;

    let x_fmt = |v: &f64| format!("{:.0}", sign * v);
    let y_fmt = |_: &f64| String::new();
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc(X_LABEL)
        .y_desc(Y_LABEL)
        .x_label_formatter(&x_fmt)
        .y_label_formatter(&y_fmt)
        .label_style(("sans-serif", 30))
        .axis_desc_style(("sans-serif", 36))
        .draw()
        .map_err(plot_err)?;

    let palette = generate_palette(table.columns().len());
    let axis = table.axis();
    for (column, color) in table.columns().iter().zip(palette) {
        let points = axis
            .iter()
            .zip(&column.values)
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .map(|(&x, &y)| (sign * x, y));
        let style = color.stroke_width(2);
        chart
            .draw_series(LineSeries::new(points, style))
            .map_err(plot_err)?
            .label(legend_label(&column.name, options.label_scale))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], style));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.0))
        .border_style(WHITE.mix(0.0))
        .label_font(("sans-serif", 28))
        .draw()
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    Ok(())
}
