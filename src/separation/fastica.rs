//! FastICA: symmetric fixed-point independent component analysis.
//!
//! ## Algorithm
//!
//! 1. Center the window and whiten it with the eigen-decomposition of its
//!    covariance, keeping the `n_components` strongest directions.
//! 2. Draw an initial unmixing matrix `W` from a standard normal
//!    distribution seeded with `random_seed`, then symmetrically decorrelate
//!    it: `W ← (W Wᵀ)^-½ W`.
//! 3. Iterate with the logcosh contrast (`g = tanh`, `g' = 1 − tanh²`):
//!
//!    ```text
//!    W₁ = E[g(W X) Xᵀ] − diag(E[g'(W X)]) W
//!    W₁ ← (W₁ W₁ᵀ)^-½ W₁
//!    stop when max |(|diag(W₁ Wᵀ)| − 1)| < tolerance
//!    ```
//!
//! 4. Sources are `W X`, rescaled to unit variance.
//!
//! The engine keeps no state between calls; the seeded generator is rebuilt
//! every call so identical windows give identical sources.

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::audio::AnalysisWindow;
use crate::config::SeparationConfig;

use super::engine::{SeparatedSignals, SeparationEngine, SeparationError};

/// Eigenvalues below `RANK_EPS × largest` count as zero.
const RANK_EPS: f64 = 1e-10;

// ---------------------------------------------------------------------------
// FastIca
// ---------------------------------------------------------------------------

/// Production [`SeparationEngine`].
#[derive(Debug, Clone)]
pub struct FastIca {
    n_components: usize,
    max_iter: usize,
    tolerance: f64,
    random_seed: u64,
}

impl FastIca {
    pub fn new(n_components: usize, config: &SeparationConfig) -> Self {
        Self {
            n_components,
            max_iter: config.max_iter,
            tolerance: config.tolerance,
            random_seed: config.random_seed,
        }
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }

    /// Whitening matrix `K` (`n_components × channels`) for centered data `x`.
    fn whitening(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>, SeparationError> {
        let n = x.nrows() as f64;
        let cov = (x.transpose() * x) / n;
        let eig = SymmetricEigen::new(cov);

        let mut order: Vec<usize> = (0..eig.eigenvalues.len()).collect();
        order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));

        let largest = eig.eigenvalues[order[0]];
        if !largest.is_finite() || largest <= 0.0 {
            return Err(SeparationError::RankDeficient {
                eigenvalue: largest,
            });
        }

        let channels = x.ncols();
        let mut k = DMatrix::zeros(self.n_components, channels);
        for (row, &idx) in order.iter().take(self.n_components).enumerate() {
            let lambda = eig.eigenvalues[idx];
            if !(lambda > largest * RANK_EPS) {
                return Err(SeparationError::RankDeficient { eigenvalue: lambda });
            }
            let scale = 1.0 / lambda.sqrt();
            for c in 0..channels {
                k[(row, c)] = eig.eigenvectors[(c, idx)] * scale;
            }
        }
        Ok(k)
    }

    fn initial_unmixing(&self) -> DMatrix<f64> {
        let mut rng = StdRng::seed_from_u64(self.random_seed);
        DMatrix::from_fn(self.n_components, self.n_components, |_, _| {
            rng.sample(StandardNormal)
        })
    }
}

impl SeparationEngine for FastIca {
    fn separate(&self, window: &AnalysisWindow) -> Result<SeparatedSignals, SeparationError> {
        let channels = window.channels();
        if self.n_components == 0 || self.n_components > channels {
            return Err(SeparationError::InvalidComponents {
                requested: self.n_components,
                channels,
            });
        }
        let n = window.window_size();
        if n < 2 {
            return Err(SeparationError::Numerical(format!(
                "window of {n} samples is too short"
            )));
        }

        let mut x = window.matrix().clone();
        for mut col in x.column_iter_mut() {
            let mean = col.mean();
            col.add_scalar_mut(-mean);
        }

        // Whitened data: n_components × n, identity covariance.
        let k = self.whitening(&x)?;
        let x1 = &k * x.transpose();

        let mut w = symmetric_decorrelation(self.initial_unmixing())?;
        let inv_n = 1.0 / n as f64;
        let mut converged = false;
        let mut last_change = f64::INFINITY;
        let mut iterations = 0;

        for it in 1..=self.max_iter {
            iterations = it;
            let wx = &w * &x1;
            let g = wx.map(f64::tanh);
            let g_prime_mean = DVector::from_fn(self.n_components, |i, _| {
                g.row(i).iter().map(|v| 1.0 - v * v).sum::<f64>() * inv_n
            });

            let w_next = (&g * x1.transpose()) * inv_n - DMatrix::from_diagonal(&g_prime_mean) * &w;
            let w_next = symmetric_decorrelation(w_next)?;

            let overlap = &w_next * w.transpose();
            last_change = (0..self.n_components)
                .map(|i| (overlap[(i, i)].abs() - 1.0).abs())
                .fold(0.0, f64::max);
            w = w_next;

            if last_change < self.tolerance {
                converged = true;
                break;
            }
        }

        if !converged {
            return Err(SeparationError::NotConverged {
                iterations,
                last_change,
            });
        }
        log::trace!("fastica: converged after {iterations} iterations");

        // n × n_components
        let mut sources = (&w * &x1).transpose();
        for mut col in sources.column_iter_mut() {
            let mean = col.mean();
            let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() * inv_n;
            let std = var.sqrt();
            if std > f64::EPSILON {
                col.scale_mut(1.0 / std);
            }
        }

        if sources.iter().any(|v| !v.is_finite()) {
            return Err(SeparationError::Numerical(
                "non-finite value in separated sources".into(),
            ));
        }

        Ok(SeparatedSignals::from_matrix(sources))
    }
}

/// `W ← (W Wᵀ)^-½ W`, making the rows of `W` orthonormal.
fn symmetric_decorrelation(w: DMatrix<f64>) -> Result<DMatrix<f64>, SeparationError> {
    let eig = SymmetricEigen::new(&w * w.transpose());
    let largest = eig.eigenvalues.iter().copied().fold(0.0, f64::max);
    if eig
        .eigenvalues
        .iter()
        .any(|&s| !(s.is_finite() && s > largest * RANK_EPS))
    {
        return Err(SeparationError::Numerical(
            "singular matrix during decorrelation".into(),
        ));
    }
    let inv_sqrt = DMatrix::from_diagonal(&eig.eigenvalues.map(|s| 1.0 / s.sqrt()));
    let u = &eig.eigenvectors;
    Ok(u * inv_sqrt * u.transpose() * w)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn config(max_iter: usize, tolerance: f64) -> SeparationConfig {
        SeparationConfig {
            max_iter,
            tolerance,
            random_seed: 42,
        }
    }

    /// Sine (5 Hz) and square wave (13 Hz) mixed through a fixed matrix.
    fn sources(n: usize) -> (Vec<f64>, Vec<f64>) {
        let s1 = (0..n)
            .map(|i| (2.0 * PI * 5.0 * i as f64 / n as f64).sin())
            .collect();
        let s2 = (0..n)
            .map(|i| {
                if (2.0 * PI * 13.0 * i as f64 / n as f64).sin() >= 0.0 {
                    1.0
                } else {
                    -1.0
                }
            })
            .collect();
        (s1, s2)
    }

    fn mixed_window(n: usize) -> AnalysisWindow {
        let (s1, s2) = sources(n);
        let data = DMatrix::from_fn(n, 2, |r, c| match c {
            0 => 1.0 * s1[r] + 0.6 * s2[r],
            _ => 0.4 * s1[r] + 1.0 * s2[r],
        });
        AnalysisWindow::from_matrix(data)
    }

    fn abs_corr(a: &[f64], b: &[f64]) -> f64 {
        let n = a.len() as f64;
        let ma = a.iter().sum::<f64>() / n;
        let mb = b.iter().sum::<f64>() / n;
        let cov: f64 = a.iter().zip(b).map(|(x, y)| (x - ma) * (y - mb)).sum();
        let va: f64 = a.iter().map(|x| (x - ma).powi(2)).sum();
        let vb: f64 = b.iter().map(|y| (y - mb).powi(2)).sum();
        (cov / (va * vb).sqrt()).abs()
    }

    #[test]
    fn recovers_independent_sources() {
        let n = 2048;
        let engine = FastIca::new(2, &config(500, 1e-6));
        let out = engine.separate(&mixed_window(n)).expect("separation");
        assert_eq!(out.len(), n);
        assert_eq!(out.n_components(), 2);

        let (s1, s2) = sources(n);
        let c0 = out.component(0);
        let c1 = out.component(1);
        let best_s1 = abs_corr(&c0, &s1).max(abs_corr(&c1, &s1));
        let best_s2 = abs_corr(&c0, &s2).max(abs_corr(&c1, &s2));
        assert!(best_s1 > 0.9, "sine recovered with |r| = {best_s1}");
        assert!(best_s2 > 0.9, "square recovered with |r| = {best_s2}");
    }

    #[test]
    fn components_have_unit_variance() {
        let engine = FastIca::new(2, &config(500, 1e-6));
        let out = engine.separate(&mixed_window(1024)).unwrap();
        for c in 0..2 {
            let col = out.component(c);
            let n = col.len() as f64;
            let mean = col.iter().sum::<f64>() / n;
            let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            assert!((var - 1.0).abs() < 1e-6, "variance {var}");
        }
    }

    #[test]
    fn same_window_same_seed_same_output() {
        let engine = FastIca::new(2, &SeparationConfig::default());
        let w = mixed_window(2048);
        let a = engine.separate(&w).unwrap();
        let b = engine.separate(&w).unwrap();
        assert!(a.max_abs_diff(&b).unwrap() < 1e-12);

        // A second engine with the same seed agrees too.
        let other = FastIca::new(2, &SeparationConfig::default());
        let c = other.separate(&w).unwrap();
        assert!(a.max_abs_diff(&c).unwrap() < 1e-12);
    }

    #[test]
    fn identical_channels_fail_cleanly_or_return_valid_matrix() {
        let n = 2048;
        let data = DMatrix::from_fn(n, 2, |r, _| (2.0 * PI * 5.0 * r as f64 / n as f64).sin());
        let window = AnalysisWindow::from_matrix(data);

        let engine = FastIca::new(2, &SeparationConfig::default());
        match engine.separate(&window) {
            Ok(out) => {
                assert_eq!(out.len(), n);
                assert!(out.matrix().iter().all(|v| v.is_finite()));
            }
            Err(e) => assert!(matches!(
                e,
                SeparationError::RankDeficient { .. }
                    | SeparationError::NotConverged { .. }
                    | SeparationError::Numerical(_)
            )),
        }
    }

    #[test]
    fn constant_channel_is_rank_deficient() {
        let n = 512;
        let data = DMatrix::from_fn(n, 2, |r, c| if c == 0 { (r as f64 * 0.1).sin() } else { 3.0 });
        let window = AnalysisWindow::from_matrix(data);

        let engine = FastIca::new(2, &SeparationConfig::default());
        assert!(matches!(
            engine.separate(&window),
            Err(SeparationError::RankDeficient { .. })
        ));
    }

    #[test]
    fn too_many_components_rejected() {
        let engine = FastIca::new(3, &SeparationConfig::default());
        let err = engine.separate(&mixed_window(256)).unwrap_err();
        assert_eq!(
            err,
            SeparationError::InvalidComponents {
                requested: 3,
                channels: 2
            }
        );
    }

    #[test]
    fn iteration_budget_exhaustion_is_reported() {
        let engine = FastIca::new(2, &config(1, 1e-15));
        let err = engine.separate(&mixed_window(1024)).unwrap_err();
        assert!(
            matches!(err, SeparationError::NotConverged { iterations: 1, .. }),
            "{err:?}"
        );
    }

    #[test]
    fn symmetric_decorrelation_orthonormalizes_rows() {
        let w = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 0.5, 3.0]);
        let d = symmetric_decorrelation(w).unwrap();
        let gram = &d * d.transpose();
        assert!((gram[(0, 0)] - 1.0).abs() < 1e-10);
        assert!((gram[(1, 1)] - 1.0).abs() < 1e-10);
        assert!(gram[(0, 1)].abs() < 1e-10);
    }

    #[test]
    fn symmetric_decorrelation_rejects_singular_input() {
        let w = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        assert!(matches!(
            symmetric_decorrelation(w),
            Err(SeparationError::Numerical(_))
        ));
    }
}
