use serde::{Deserialize, Serialize};

use super::{invalid, Baseline};
use crate::error::Result;

const NAME: &str = "snip";

/// Statistics-sensitive non-linear iterative peak clipping.
///
/// Each point is clipped to the mean of its neighbours `w` points away, for
/// every window `w` up to `max_half_window`. With `smooth_half_window > 0`
/// unclipped points are replaced by their moving average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snip {
    pub max_half_window: usize,
    pub decreasing: bool,
    pub smooth_half_window: usize,
}

impl Default for Snip {
    fn default() -> Self {
        Snip {
            max_half_window: 40,
            decreasing: true,
            smooth_half_window: 3,
        }
    }
}

impl Baseline for Snip {
    fn name(&self) -> &'static str {
        NAME
    }

    fn fit(&self, _x: &[f64], y: &[f64]) -> Result<Vec<f64>> {
        if self.max_half_window == 0 {
            return Err(invalid(NAME, "max_half_window must be at least 1"));
        }
        if y.len() < 2 {
            return Err(invalid(NAME, format!("need at least 2 points, got {}", y.len())));
        }

        let pad = self.max_half_window + self.smooth_half_window;
        let mut baseline = pad_linear(y, pad, self.max_half_window);
        let len = baseline.len();

        let windows: Vec<usize> = if self.decreasing {
            (1..=self.max_half_window).rev().collect()
        } else {
            (1..=self.max_half_window).collect()
        };

        for w in windows {
            let updated: Vec<f64> = (w..len - w)
                .map(|i| {
                    let clip = 0.5 * (baseline[i - w] + baseline[i + w]);
                    if baseline[i] > clip {
                        clip
                    } else if self.smooth_half_window > 0 {
                        moving_average(&baseline, i, self.smooth_half_window)
                    } else {
                        baseline[i]
                    }
                })
                .collect();
            baseline[w..len - w].copy_from_slice(&updated);
        }

        Ok(baseline[pad..pad + y.len()].to_vec())
    }
}

fn moving_average(values: &[f64], center: usize, half_window: usize) -> f64 {
    let lo = center.saturating_sub(half_window);
    let hi = (center + half_window + 1).min(values.len());
    values[lo..hi].iter().sum::<f64>() / (hi - lo) as f64
}

/// Extend `y` by `pad` points on each side along straight lines fitted to
/// the outermost `window` points.
fn pad_linear(y: &[f64], pad: usize, window: usize) -> Vec<f64> {
    let n = y.len();
    let m = window.clamp(2, n);

    let (left_intercept, left_slope) = fit_line(&y[..m]);
    let (right_intercept, right_slope) = fit_line(&y[n - m..]);
    let right_last = (m - 1) as f64;

    let mut padded = Vec::with_capacity(n + 2 * pad);
    padded.extend((1..=pad).rev().map(|j| left_intercept - left_slope * j as f64));
    padded.extend_from_slice(y);
    padded.extend((1..=pad).map(|j| right_intercept + right_slope * (right_last + j as f64)));
    padded
}

/// Least-squares line over index positions 0, 1, …; returns (intercept, slope).
fn fit_line(ys: &[f64]) -> (f64, f64) {
    let n = ys.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = ys.iter().sum::<f64>() / n;
    let (num, den) = ys.iter().enumerate().fold((0.0, 0.0), |(num, den), (i, &v)| {
        let dx = i as f64 - mean_x;
        (num + dx * (v - mean_y), den + dx * dx)
    });
    let slope = if den > 0.0 { num / den } else { 0.0 };
    (mean_y - slope * mean_x, slope)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn line_padding_continues_the_trend() {
        let y = [1.0, 2.0, 3.0, 4.0];
        let padded = pad_linear(&y, 2, 4);
        let expected = [-1.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        for (p, e) in padded.iter().zip(expected) {
            assert_abs_diff_eq!(*p, e, epsilon = 1e-12);
        }
    }

    #[test]
    fn clips_peak_on_linear_background() {
        let mut y: Vec<f64> = (0..200).map(|i| 0.5 + 0.002 * i as f64).collect();
        for (i, v) in y.iter_mut().enumerate().take(110).skip(90) {
            *v += 1.0 - ((i as f64 - 100.0) / 10.0).powi(2);
        }
        let baseline = Snip::default().fit(&[], &y).unwrap();
        for (i, b) in baseline.iter().enumerate() {
            assert_abs_diff_eq!(*b, 0.5 + 0.002 * i as f64, epsilon = 1e-3);
        }
    }

    #[test]
    fn zero_window_is_invalid() {
        let snip = Snip {
            max_half_window: 0,
            ..Default::default()
        };
        assert!(snip.fit(&[], &[1.0, 2.0]).is_err());
    }
}
