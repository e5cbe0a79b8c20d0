//! Column-wise baseline removal.
//!
//! Each fitter estimates a smooth background under a spectrum from its
//! `(x, y)` samples; [`subtract_baseline`] removes it from every value column
//! of a table and leaves the wavenumber axis untouched.

mod asls;
mod modpoly;
mod morphology;
mod snip;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use asls::Asls;
pub use modpoly::ModPoly;
pub use morphology::Morphological;
pub use snip::Snip;

use crate::data::model::{Series, SpectrumTable};
use crate::error::{ProcessingError, Result};

/// A baseline estimator.
pub trait Baseline {
    /// Short identifier used on the command line and in file names.
    fn name(&self) -> &'static str;

    /// Estimated baseline, same length as `y`.
    fn fit(&self, x: &[f64], y: &[f64]) -> Result<Vec<f64>>;
}

/// The supported fitters with their parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "lowercase")]
pub enum Fitter {
    ModPoly(ModPoly),
    Asls(Asls),
    Mor(Morphological),
    Snip(Snip),
}

pub const ALGORITHMS: [&str; 4] = ["modpoly", "asls", "mor", "snip"];

impl Fitter {
    /// Fitter with default parameters for one of [`ALGORITHMS`].
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "modpoly" => Ok(Fitter::ModPoly(ModPoly::default())),
            "asls" => Ok(Fitter::Asls(Asls::default())),
            "mor" => Ok(Fitter::Mor(Morphological::default())),
            "snip" => Ok(Fitter::Snip(Snip::default())),
            _ => Err(ProcessingError::UnknownAlgorithm(name.to_string())),
        }
    }

    fn inner(&self) -> &dyn Baseline {
        match self {
            Fitter::ModPoly(f) => f,
            Fitter::Asls(f) => f,
            Fitter::Mor(f) => f,
            Fitter::Snip(f) => f,
        }
    }
}

impl Default for Fitter {
    fn default() -> Self {
        Fitter::Asls(Asls::default())
    }
}

impl FromStr for Fitter {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        Fitter::from_name(s)
    }
}

impl fmt::Display for Fitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Baseline for Fitter {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn fit(&self, x: &[f64], y: &[f64]) -> Result<Vec<f64>> {
        self.inner().fit(x, y)
    }
}

/// Fit and subtract a baseline from every value column of `table`.
///
/// The returned table shares the axis values of `table` exactly.
pub fn subtract_baseline(table: &SpectrumTable, fitter: &impl Baseline) -> Result<SpectrumTable> {
    let x = table.axis();
    let mut corrected = SpectrumTable::new(table.axis_name(), x.to_vec());

    for column in table.columns() {
        if column.values.iter().any(|v| !v.is_finite()) {
            return Err(ProcessingError::NonFinite(column.name.clone()));
        }
        let baseline = fitter.fit(x, &column.values)?;
        log::debug!("{} baseline fitted for column {}", fitter.name(), column.name);
        let values = column
            .values
            .iter()
            .zip(&baseline)
            .map(|(y, b)| y - b)
            .collect();
        corrected.push(Series::new(column.name.clone(), values))?;
    }

    log::info!(
        "Removed {} baseline from {} columns",
        fitter.name(),
        table.columns().len()
    );
    Ok(corrected)
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn invalid(algorithm: &'static str, reason: impl Into<String>) -> ProcessingError {
    ProcessingError::InvalidParameter {
        algorithm,
        reason: reason.into(),
    }
}

/// Relative change `‖new − old‖ / ‖old‖` used as convergence criterion.
fn relative_difference(old: &[f64], new: &[f64]) -> f64 {
    let diff: f64 = old.iter().zip(new).map(|(a, b)| (a - b).powi(2)).sum();
    let norm: f64 = old.iter().map(|a| a * a).sum();
    diff.sqrt() / norm.sqrt().max(f64::EPSILON)
}

#[cfg(test)]
pub(crate) mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::data::model::AXIS_NAME;

    /// Gaussian band on a sloped, curved background; returns (x, y, background).
    pub(crate) fn synthetic() -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (0..400).map(|i| 1800.0 - i as f64 * 2.5).collect();
        let background: Vec<f64> = x
            .iter()
            .map(|&w| 0.2 + 1e-4 * (w - 800.0) + 2e-8 * (w - 1300.0).powi(2))
            .collect();
        let y = x
            .iter()
            .zip(&background)
            .map(|(&w, b)| b + 0.8 * (-(w - 1300.0).powi(2) / (2.0 * 15.0f64.powi(2))).exp())
            .collect();
        (x, y, background)
    }

    fn table() -> SpectrumTable {
        let (x, y, _) = synthetic();
        let mut t = SpectrumTable::new(AXIS_NAME, x);
        let shifted: Vec<f64> = y.iter().map(|v| v + 0.5).collect();
        t.push(Series::new("0000", y)).unwrap();
        t.push(Series::new("0001", shifted)).unwrap();
        t
    }

    #[test]
    fn unknown_algorithm_fails() {
        let err = "rubberband".parse::<Fitter>().unwrap_err();
        assert!(matches!(err, ProcessingError::UnknownAlgorithm(name) if name == "rubberband"));
    }

    #[test]
    fn names_resolve_case_insensitively() {
        for name in ALGORITHMS {
            let fitter = Fitter::from_name(&name.to_uppercase()).unwrap();
            assert_eq!(fitter.name(), name);
        }
    }

    #[test]
    fn every_fitter_keeps_axis_and_flattens_background() {
        let t = table();
        for name in ALGORITHMS {
            let fitter = Fitter::from_name(name).unwrap();
            let corrected = subtract_baseline(&t, &fitter).unwrap();
            assert_eq!(corrected.axis(), t.axis(), "{name}");
            assert_eq!(corrected.headers(), t.headers(), "{name}");

            // Far from the band the corrected signal is close to zero.
            let values = &corrected.column("0000").unwrap().values;
            let edge = values[..60].iter().map(|v| v.abs()).fold(0.0, f64::max);
            assert!(edge < 0.08, "{name}: residual {edge}");
            // The band itself survives.
            let peak = values.iter().copied().fold(f64::MIN, f64::max);
            assert!(peak > 0.5, "{name}: peak {peak}");
        }
    }

    #[test]
    fn non_finite_column_is_rejected() {
        let mut t = SpectrumTable::new(AXIS_NAME, vec![1.0, 2.0, 3.0, 4.0]);
        t.push(Series::new("a", vec![1.0, f64::NAN, 1.0, 1.0])).unwrap();
        assert!(matches!(
            subtract_baseline(&t, &Fitter::default()),
            Err(ProcessingError::NonFinite(name)) if name == "a"
        ));
    }

    #[test]
    fn recipe_json_uses_algorithm_tag() {
        let fitter: Fitter = serde_json::from_str(r#"{"algorithm": "mor", "half_window": 12}"#).unwrap();
        assert_eq!(fitter, Fitter::Mor(Morphological { half_window: 12 }));

        let fitter: Fitter = serde_json::from_str(r#"{"algorithm": "asls", "p": 0.05}"#).unwrap();
        let Fitter::Asls(asls) = fitter else {
            panic!("expected asls");
        };
        assert_abs_diff_eq!(asls.p, 0.05);
        assert_abs_diff_eq!(asls.lam, 1e7);
    }

    #[test]
    fn relative_difference_of_identical_is_zero() {
        assert_abs_diff_eq!(relative_difference(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
        assert_abs_diff_eq!(relative_difference(&[3.0, 4.0], &[3.0, 4.0 + 5.0]), 1.0);
    }
}
