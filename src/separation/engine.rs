//! Separation engine trait, output type and errors.
//!
//! [`SeparationEngine`] is the interface used by the pipeline.  It is
//! object-safe and `Send + Sync` so it can be held behind an
//! `Arc<dyn SeparationEngine>` and run on tokio's blocking pool.
//!
//! [`MockSeparationEngine`] (available under `#[cfg(test)]`) returns a
//! pre-configured response so the orchestrator can be tested without running
//! the real numerics.

use nalgebra::DMatrix;
use thiserror::Error;

use crate::audio::AnalysisWindow;

// ---------------------------------------------------------------------------
// SeparationError
// ---------------------------------------------------------------------------

/// Why a window could not be separated.  Each variant aborts one cycle only.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SeparationError {
    /// The channels are linearly dependent (or silent), so the covariance
    /// cannot be whitened.
    #[error("input is rank deficient: eigenvalue {eigenvalue:e} of covariance is ~0")]
    RankDeficient { eigenvalue: f64 },

    /// The fixed-point iteration did not settle within the iteration budget.
    #[error("did not converge after {iterations} iterations (last change {last_change:e})")]
    NotConverged { iterations: usize, last_change: f64 },

    /// A non-finite value or failed decomposition.
    #[error("numerical failure: {0}")]
    Numerical(String),

    /// More components were requested than the window has channels.
    #[error("cannot extract {requested} components from {channels} channels")]
    InvalidComponents { requested: usize, channels: usize },
}

// ---------------------------------------------------------------------------
// SeparatedSignals
// ---------------------------------------------------------------------------

/// Engine output: a `window_size × n_components` matrix, one column per
/// estimated source.
#[derive(Debug, Clone, PartialEq)]
pub struct SeparatedSignals {
    data: DMatrix<f64>,
}

impl SeparatedSignals {
    pub fn from_matrix(data: DMatrix<f64>) -> Self {
        Self { data }
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Samples per component.
    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    pub fn n_components(&self) -> usize {
        self.data.ncols()
    }

    /// Copy of one component.
    pub fn component(&self, index: usize) -> Vec<f64> {
        self.data.column(index).iter().copied().collect()
    }

    /// Largest absolute difference to `other`, or `None` if shapes differ.
    pub fn max_abs_diff(&self, other: &SeparatedSignals) -> Option<f64> {
        if self.data.shape() != other.data.shape() {
            return None;
        }
        Some(
            self.data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max),
        )
    }
}

// ---------------------------------------------------------------------------
// SeparationEngine trait
// ---------------------------------------------------------------------------

/// Maps a normalized mixed-signal window to separated components.
///
/// # Contract
///
/// - Each call is independent of earlier windows.
/// - Identical input produces identical output.
/// - On success the output has `window.window_size()` rows.
pub trait SeparationEngine: Send + Sync {
    fn separate(&self, window: &AnalysisWindow) -> Result<SeparatedSignals, SeparationError>;
}

// Compile-time assertion: Box<dyn SeparationEngine> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn SeparationEngine>) {}
};

// ---------------------------------------------------------------------------
// MockSeparationEngine  (test only)
// ---------------------------------------------------------------------------

/// Test double: echoes the window back as the "separated" signals, or fails
/// with a fixed error.
#[cfg(test)]
pub struct MockSeparationEngine {
    failure: Option<SeparationError>,
}

#[cfg(test)]
impl MockSeparationEngine {
    /// A mock that returns the window's own columns.
    pub fn echo() -> Self {
        Self { failure: None }
    }

    /// A mock that always returns `Err(error)`.
    pub fn err(error: SeparationError) -> Self {
        Self {
            failure: Some(error),
        }
    }
}

#[cfg(test)]
impl SeparationEngine for MockSeparationEngine {
    fn separate(&self, window: &AnalysisWindow) -> Result<SeparatedSignals, SeparationError> {
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(SeparatedSignals::from_matrix(window.matrix().clone())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
