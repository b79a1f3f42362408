//! Pairwise metrics between two separated components.
//!
//! | Metric | Definition |
//! |--------|------------|
//! | Euclidean | `sqrt(Σ (aᵢ − bᵢ)²)` |
//! | Cross Correlation | Pearson `r` |
//! | Pearson | `1 − r` |
//! | MSE | `mean((aᵢ − bᵢ)²)` |
//! | Cosine | `1 − cos(a, b)` |
//! | Cross Entropy | KL divergence of 30-bin histograms |
//!
//! # Example
//!
//! ```rust
//! use live_ica::metrics::{compute, Metric};
//!
//! let a = [1.0, 2.0, 3.0];
//! let b = [2.0, 4.0, 6.0];
//! let set = compute(&a, &b).unwrap();
//! assert!(set.get(Metric::Cosine).abs() < 1e-12);
//! assert!(compute(&a, &b[..2]).is_err());
//! ```

pub mod functions;
pub mod suite;

pub use suite::{compute, Metric, MetricError, MetricSet};
