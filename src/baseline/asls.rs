use serde::{Deserialize, Serialize};

use super::{invalid, relative_difference, Baseline};
use crate::error::{ProcessingError, Result};

const NAME: &str = "asls";

/// Asymmetric least squares (Whittaker smoother with asymmetric weights).
///
/// Minimises `Σ wᵢ (yᵢ − zᵢ)² + lam Σ (Δ²z)²`, reweighting points above the
/// baseline with `p` and points below with `1 − p`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Asls {
    pub lam: f64,
    pub p: f64,
    pub tol: f64,
    pub max_iter: usize,
}

impl Default for Asls {
    fn default() -> Self {
        Asls {
            lam: 1e7,
            p: 0.02,
            tol: 1e-3,
            max_iter: 50,
        }
    }
}

impl Baseline for Asls {
    fn name(&self) -> &'static str {
        NAME
    }

    fn fit(&self, _x: &[f64], y: &[f64]) -> Result<Vec<f64>> {
        if !(self.p > 0.0 && self.p < 1.0) {
            return Err(invalid(NAME, format!("p must lie in (0, 1), got {}", self.p)));
        }
        if !(self.lam > 0.0) {
            return Err(invalid(NAME, format!("lam must be positive, got {}", self.lam)));
        }
        let n = y.len();
        if n < 3 {
            return Err(invalid(NAME, format!("need at least 3 points, got {n}")));
        }

        let penalty = Pentadiagonal::second_difference_penalty(n, self.lam);
        let mut weights = vec![1.0; n];
        let mut baseline = Vec::new();

        for _ in 0..self.max_iter.max(1) {
            let mut system = penalty.clone();
            for (d, w) in system.d0.iter_mut().zip(&weights) {
                *d += w;
            }
            let rhs: Vec<f64> = weights.iter().zip(y).map(|(w, v)| w * v).collect();
            baseline = system.solve(&rhs)?;

            let next: Vec<f64> = y
                .iter()
                .zip(&baseline)
                .map(|(v, z)| if v > z { self.p } else { 1.0 - self.p })
                .collect();
            let change = relative_difference(&weights, &next);
            weights = next;
            if change < self.tol {
                break;
            }
        }

        Ok(baseline)
    }
}

// ---------------------------------------------------------------------------
// Symmetric pentadiagonal system
// ---------------------------------------------------------------------------

/// Symmetric matrix with bandwidth 2: `d0[i] = A[i][i]`, `d1[i] = A[i][i+1]`,
/// `d2[i] = A[i][i+2]`.
#[derive(Debug, Clone)]
struct Pentadiagonal {
    d0: Vec<f64>,
    d1: Vec<f64>,
    d2: Vec<f64>,
}

impl Pentadiagonal {
    /// `lam · DᵀD` for the second-difference operator `D` of size (n−2)×n.
    fn second_difference_penalty(n: usize, lam: f64) -> Self {
        const STENCIL: [f64; 3] = [1.0, -2.0, 1.0];
        let mut m = Pentadiagonal {
            d0: vec![0.0; n],
            d1: vec![0.0; n.saturating_sub(1)],
            d2: vec![0.0; n.saturating_sub(2)],
        };
        for row in 0..n.saturating_sub(2) {
            for a in 0..3 {
                m.d0[row + a] += lam * STENCIL[a] * STENCIL[a];
                for b in (a + 1)..3 {
                    let v = lam * STENCIL[a] * STENCIL[b];
                    match b - a {
                        1 => m.d1[row + a] += v,
                        _ => m.d2[row + a] += v,
                    }
                }
            }
        }
        m
    }

    /// Banded Cholesky factorisation `A = LLᵀ` followed by the two triangular
    /// solves.
    fn solve(&self, rhs: &[f64]) -> Result<Vec<f64>> {
        let n = self.d0.len();
        // l0: diagonal of L, l1[i] = L[i][i-1], l2[i] = L[i][i-2]
        let mut l0 = vec![0.0; n];
        let mut l1 = vec![0.0; n];
        let mut l2 = vec![0.0; n];

        for i in 0..n {
            if i >= 2 {
                l2[i] = self.d2[i - 2] / l0[i - 2];
            }
            if i >= 1 {
                l1[i] = (self.d1[i - 1] - l2[i] * l1[i - 1]) / l0[i - 1];
            }
            let pivot = self.d0[i] - l1[i] * l1[i] - l2[i] * l2[i];
            if !(pivot > 0.0) || !pivot.is_finite() {
                return Err(ProcessingError::FitFailed {
                    algorithm: NAME,
                    reason: format!("system is not positive definite at row {i}"),
                });
            }
            l0[i] = pivot.sqrt();
        }

        let mut z = vec![0.0; n];
        for i in 0..n {
            let mut acc = rhs[i];
            if i >= 1 {
                acc -= l1[i] * z[i - 1];
            }
            if i >= 2 {
                acc -= l2[i] * z[i - 2];
            }
            z[i] = acc / l0[i];
        }

        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let mut acc = z[i];
            if i + 1 < n {
                acc -= l1[i + 1] * x[i + 1];
            }
            if i + 2 < n {
                acc -= l2[i + 2] * x[i + 2];
            }
            x[i] = acc / l0[i];
        }
        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn penalty_has_known_stencil() {
        let m = Pentadiagonal::second_difference_penalty(6, 1.0);
        assert_eq!(m.d0, vec![1.0, 5.0, 6.0, 6.0, 5.0, 1.0]);
        assert_eq!(m.d1, vec![-2.0, -4.0, -4.0, -4.0, -2.0]);
        assert_eq!(m.d2, vec![1.0; 4]);
    }

    #[test]
    fn solves_against_dense_product() {
        let mut m = Pentadiagonal::second_difference_penalty(7, 3.0);
        m.d0.iter_mut().for_each(|d| *d += 1.0);
        let expected = [1.0, -2.0, 0.5, 4.0, 3.0, -1.0, 2.0];

        // rhs = A · expected
        let n = expected.len();
        let at = |i: usize, j: usize| -> f64 {
            let (lo, hi) = (i.min(j), i.max(j));
            match hi - lo {
                0 => m.d0[lo],
                1 => m.d1[lo],
                2 => m.d2[lo],
                _ => 0.0,
            }
        };
        let rhs: Vec<f64> = (0..n)
            .map(|i| (0..n).map(|j| at(i, j) * expected[j]).sum())
            .collect();

        let solved = m.solve(&rhs).unwrap();
        for (s, e) in solved.iter().zip(expected) {
            assert_abs_diff_eq!(*s, e, epsilon = 1e-9);
        }
    }

    #[test]
    fn straight_line_is_its_own_baseline() {
        let x: Vec<f64> = (0..100).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 - 0.01 * v).collect();
        let baseline = Asls::default().fit(&x, &y).unwrap();
        for (b, v) in baseline.iter().zip(&y) {
            assert_abs_diff_eq!(b, v, epsilon = 1e-5);
        }
    }

    #[test]
    fn rejects_bad_asymmetry() {
        let asls = Asls {
            p: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            asls.fit(&[0.0; 5], &[0.0; 5]),
            Err(ProcessingError::InvalidParameter { algorithm: "asls", .. })
        ));
    }
}
