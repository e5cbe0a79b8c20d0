use serde::{Deserialize, Serialize};

use super::{invalid, Baseline};
use crate::error::Result;

const NAME: &str = "mor";

/// Morphological opening with a flat structuring element of `2·half_window + 1`
/// points, smoothed by averaging the opening's erosion and dilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Morphological {
    pub half_window: usize,
}

impl Default for Morphological {
    fn default() -> Self {
        Morphological { half_window: 30 }
    }
}

impl Baseline for Morphological {
    fn name(&self) -> &'static str {
        NAME
    }

    fn fit(&self, _x: &[f64], y: &[f64]) -> Result<Vec<f64>> {
        if self.half_window == 0 {
            return Err(invalid(NAME, "half_window must be at least 1"));
        }
        let hw = self.half_window;
        let opening = dilate(&erode(y, hw), hw);
        let upper = dilate(&opening, hw);
        let lower = erode(&opening, hw);

        Ok(opening
            .iter()
            .zip(upper.iter().zip(&lower))
            .map(|(&o, (&u, &l))| o.min(0.5 * (u + l)))
            .collect())
    }
}

/// Moving minimum; windows are truncated at the edges.
fn erode(y: &[f64], half_window: usize) -> Vec<f64> {
    sliding(y, half_window, f64::min)
}

/// Moving maximum; windows are truncated at the edges.
fn dilate(y: &[f64], half_window: usize) -> Vec<f64> {
    sliding(y, half_window, f64::max)
}

fn sliding(y: &[f64], half_window: usize, pick: fn(f64, f64) -> f64) -> Vec<f64> {
    let n = y.len();
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half_window);
            let hi = (i + half_window + 1).min(n);
            y[lo..hi].iter().copied().reduce(pick).unwrap_or(y[i])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erosion_and_dilation_truncate_at_edges() {
        let y = [3.0, 1.0, 4.0, 1.0, 5.0];
        assert_eq!(erode(&y, 1), vec![1.0, 1.0, 1.0, 1.0, 1.0]);
        assert_eq!(dilate(&y, 1), vec![3.0, 4.0, 4.0, 5.0, 5.0]);
    }

    #[test]
    fn opening_removes_narrow_spike() {
        let mut y = vec![1.0; 40];
        y[20] = 9.0;
        y[21] = 7.0;
        let baseline = Morphological { half_window: 5 }.fit(&[], &y).unwrap();
        assert!(baseline.iter().all(|&b| (b - 1.0).abs() < 1e-12));
    }

    #[test]
    fn zero_window_is_invalid() {
        assert!(Morphological { half_window: 0 }.fit(&[], &[1.0]).is_err());
    }
}
