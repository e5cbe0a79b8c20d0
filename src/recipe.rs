use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::baseline::{subtract_baseline, Baseline, Fitter};
use crate::data::combine::{combine_directory, CombineOptions, FileOrder};
use crate::data::select::{select_and_save, ColumnSelector};
use crate::data::writer::save_table;
use crate::error::Result;
use crate::plot::{plot_table, PlotOptions};

/// Which combined table the rest of the pipeline works on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableSource {
    Raw,
    #[default]
    Referenced,
}

/// Processing pipeline settings, read from JSON. Every field is optional.
///
/// ```json
/// {
///   "input_dir": "raw",
///   "range": [1000, 1800],
///   "columns": [1, 5, "0010"],
///   "baseline": { "algorithm": "snip", "max_half_window": 60 },
///   "plot": { "title": "Cure at 80 °C", "label_scale": 2.0 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recipe {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub order: FileOrder,
    pub keep_reference: bool,
    pub source: TableSource,
    /// Inclusive wavenumber window; `null` keeps every row.
    pub range: Option<(f64, f64)>,
    /// Empty keeps every column.
    pub columns: Vec<ColumnSelector>,
    /// `null` skips baseline removal.
    pub baseline: Option<Fitter>,
    /// `null` skips the figure.
    pub plot: Option<PlotOptions>,
}

impl Default for Recipe {
    fn default() -> Self {
        Recipe {
            input_dir: PathBuf::from("raw"),
            output_dir: PathBuf::from("."),
            order: FileOrder::default(),
            keep_reference: false,
            source: TableSource::default(),
            range: Some((800.0, 1800.0)),
            columns: Vec::new(),
            baseline: Some(Fitter::default()),
            plot: Some(PlotOptions::default()),
        }
    }
}

/// Files written by one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutputs {
    pub combined_raw: PathBuf,
    pub referenced_raw: PathBuf,
    pub selected: PathBuf,
    pub corrected: Option<PathBuf>,
    pub figure: Option<PathBuf>,
}

impl Recipe {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading recipe {}", path.display()))?;
        let recipe = serde_json::from_str(&text)
            .with_context(|| format!("parsing recipe {}", path.display()))?;
        log::debug!("Loaded recipe {recipe:?}");
        Ok(recipe)
    }

    /// combine → select → baseline → plot, each step writing its output into
    /// `output_dir`.
    pub fn run(&self) -> Result<PipelineOutputs> {
        fs::create_dir_all(&self.output_dir)?;

        let combined = combine_directory(
            &self.input_dir,
            CombineOptions {
                order: self.order,
                keep_reference: self.keep_reference,
            },
        )?;
        let (combined_raw, referenced_raw) = combined.save(&self.output_dir)?;

        let source = match self.source {
            TableSource::Raw => &combined.raw,
            TableSource::Referenced => &combined.referenced,
        };
        let (mut table, selected) =
            select_and_save(source, self.range, &self.columns, &self.output_dir)?;

        let mut corrected = None;
        if let Some(fitter) = &self.baseline {
            table = subtract_baseline(&table, fitter)?;
            let path = suffixed(&selected, fitter.name());
            save_table(&table, &path)?;
            corrected = Some(path);
        }

        let figure = match &self.plot {
            Some(options) => Some(plot_table(&table, options, &self.output_dir)?),
            None => None,
        };

        Ok(PipelineOutputs {
            combined_raw,
            referenced_raw,
            selected,
            corrected,
            figure,
        })
    }
}

/// `dir/selected_800-1800.csv` + `asls` → `dir/selected_800-1800_asls.csv`.
pub fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "csv".to_string());
    path.with_file_name(format!("{stem}_{suffix}.{extension}"))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::baseline::Snip;
    use crate::data::loader::load_table;

    /// Three exports on 1800..600 cm⁻¹ in steps of 5, band growing with time.
    fn write_series(dir: &Path) {
        for run in 0..3 {
            let mut text = String::new();
            for i in 0..=240 {
                let w = 1800.0 - 5.0 * i as f64;
                let band = 0.3 * run as f64 * (-((w - 1200.0) / 20.0).powi(2)).exp();
                let background = 0.1 + 1e-4 * (w - 600.0);
                text.push_str(&format!("{w},{}\n", background + band));
            }
            fs::write(dir.join(format!("{run:04}.csv")), text).unwrap();
        }
    }

    fn recipe(root: &Path) -> Recipe {
        let input_dir = root.join("raw");
        fs::create_dir(&input_dir).unwrap();
        write_series(&input_dir);
        Recipe {
            input_dir,
            output_dir: root.join("out"),
            plot: None,
            ..Recipe::default()
        }
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let recipe: Recipe = serde_json::from_str(r#"{ "input_dir": "spectra" }"#).unwrap();
        assert_eq!(recipe.input_dir, PathBuf::from("spectra"));
        assert_eq!(recipe.range, Some((800.0, 1800.0)));
        assert_eq!(recipe.source, TableSource::Referenced);
        assert_eq!(recipe.baseline, Some(Fitter::default()));
        assert!(recipe.columns.is_empty());
    }

    #[test]
    fn parses_selectors_and_tagged_fitter() {
        let recipe: Recipe = serde_json::from_str(
            r#"{
                "range": [1800, 1000],
                "columns": [2, "0000"],
                "baseline": { "algorithm": "snip", "max_half_window": 12 },
                "plot": null
            }"#,
        )
        .unwrap();
        assert_eq!(
            recipe.columns,
            vec![ColumnSelector::Position(2), ColumnSelector::Name("0000".into())]
        );
        match recipe.baseline {
            Some(Fitter::Snip(snip)) => {
                assert_eq!(snip.max_half_window, 12);
                assert_eq!(snip.smooth_half_window, Snip::default().smooth_half_window);
            }
            other => panic!("unexpected fitter {other:?}"),
        }
        assert!(recipe.plot.is_none());
    }

    #[test]
    fn unknown_algorithm_is_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recipe.json");
        fs::write(&path, r#"{ "baseline": { "algorithm": "rubberband" } }"#).unwrap();
        assert!(Recipe::load(&path).is_err());
    }

    #[test]
    fn pipeline_writes_every_stage() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = recipe(dir.path()).run().unwrap();

        let out = dir.path().join("out");
        assert_eq!(outputs.combined_raw, out.join("combined_raw.csv"));
        assert_eq!(outputs.referenced_raw, out.join("referenced_raw.csv"));
        assert_eq!(outputs.selected, out.join("selected_800-1800.csv"));
        assert_eq!(outputs.corrected, Some(out.join("selected_800-1800_asls.csv")));
        assert!(outputs.figure.is_none());

        let selected = load_table(&outputs.selected).unwrap();
        assert_eq!(selected.len(), 201);
        assert_eq!(selected.headers(), vec!["Wavenumber", "0000", "0001", "0002"]);

        let corrected = load_table(outputs.corrected.as_ref().unwrap()).unwrap();
        assert_eq!(corrected.axis(), selected.axis());
        // Reference-subtracted band of the last run sits at 1200 cm⁻¹.
        let peak_row = corrected.axis().iter().position(|&w| w == 1200.0).unwrap();
        let last = &corrected.columns()[2].values;
        assert!(last[peak_row] > 0.5, "peak {}", last[peak_row]);
        assert_abs_diff_eq!(last[0], 0.0, epsilon = 0.05);
    }

    #[test]
    fn raw_source_without_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let recipe = Recipe {
            source: TableSource::Raw,
            range: None,
            columns: vec![ColumnSelector::Position(3)],
            baseline: None,
            ..recipe(dir.path())
        };
        let outputs = recipe.run().unwrap();
        assert!(outputs.corrected.is_none());

        let selected = load_table(&outputs.selected).unwrap();
        assert!(outputs.selected.ends_with("selected_full.csv"));
        assert_eq!(selected.headers(), vec!["Wavenumber", "0002"]);
        assert_abs_diff_eq!(selected.columns()[0].values[0], 0.22, epsilon = 1e-9);
    }

    #[test]
    fn suffix_goes_before_extension() {
        assert_eq!(
            suffixed(Path::new("out/selected_full.csv"), "mor"),
            PathBuf::from("out/selected_full_mor.csv")
        );
    }
}
