use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::{invalid, relative_difference, Baseline};
use crate::error::{ProcessingError, Result};

const NAME: &str = "modpoly";

/// Modified polynomial fit: fit a polynomial, clip the signal to it, refit
/// until the baseline stops moving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModPoly {
    pub poly_order: usize,
    pub tol: f64,
    pub max_iter: usize,
}

impl Default for ModPoly {
    fn default() -> Self {
        ModPoly {
            poly_order: 5,
            tol: 1e-3,
            max_iter: 250,
        }
    }
}

impl Baseline for ModPoly {
    fn name(&self) -> &'static str {
        NAME
    }

    fn fit(&self, x: &[f64], y: &[f64]) -> Result<Vec<f64>> {
        let n = y.len();
        if x.len() != n {
            return Err(invalid(NAME, "x and y lengths differ"));
        }
        if n <= self.poly_order {
            return Err(invalid(
                NAME,
                format!("{n} points cannot determine a polynomial of order {}", self.poly_order),
            ));
        }

        let vander = vandermonde(&scale_to_unit(x), self.poly_order);
        let pinv = vander
            .clone()
            .pseudo_inverse(1e-12)
            .map_err(|reason| ProcessingError::FitFailed {
                algorithm: NAME,
                reason: reason.to_string(),
            })?;

        let mut signal = DVector::from_column_slice(y);
        let mut baseline = &vander * (&pinv * &signal);

        for _ in 0..self.max_iter {
            signal.zip_apply(&baseline, |s, b| *s = s.min(b));
            let next = &vander * (&pinv * &signal);
            let change = relative_difference(baseline.as_slice(), next.as_slice());
            baseline = next;
            if change < self.tol {
                break;
            }
        }

        Ok(baseline.as_slice().to_vec())
    }
}

/// Map `x` linearly onto [-1, 1] to keep the Vandermonde matrix well conditioned.
fn scale_to_unit(x: &[f64]) -> Vec<f64> {
    let (lo, hi) = x
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = hi - lo;
    if span <= 0.0 || !span.is_finite() {
        return vec![0.0; x.len()];
    }
    x.iter().map(|&v| 2.0 * (v - lo) / span - 1.0).collect()
}

fn vandermonde(x: &[f64], order: usize) -> DMatrix<f64> {
    DMatrix::from_fn(x.len(), order + 1, |row, col| x[row].powi(col as i32))
}
