//! Analysis windows and per-channel z-score normalization.
//!
//! A captured [`AudioFrame`] is cut down to exactly `window_size` samples per
//! channel, de-interleaved into a `window_size × channels` matrix, scrubbed of
//! non-finite values, and normalized column by column:
//!
//! ```text
//! x' = (x - mean) / std        (population std)
//! std == 0  →  column becomes all zeros
//! ```
//!
//! Frames shorter than `window_size` produce no window; the caller skips the
//! cycle.

use nalgebra::DMatrix;

use super::capture::AudioFrame;

/// Standard deviations at or below this are treated as zero.
const MIN_STD: f64 = f64::EPSILON;

// ---------------------------------------------------------------------------
// AnalysisWindow
// ---------------------------------------------------------------------------

/// A normalized `window_size × channels` block of samples.
///
/// Every value is finite and every column has zero mean and unit standard
/// deviation, except constant columns which are all zeros.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisWindow {
    data: DMatrix<f64>,
}

impl AnalysisWindow {
    /// Build a window from an arbitrary matrix, sanitizing and normalizing it.
    pub fn from_matrix(mut data: DMatrix<f64>) -> Self {
        sanitize(&mut data);
        normalize_columns(&mut data);
        Self { data }
    }

    /// The underlying matrix (rows = samples, columns = channels).
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Samples per channel.
    pub fn window_size(&self) -> usize {
        self.data.nrows()
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.data.ncols()
    }

    /// Copy of one channel.
    pub fn channel(&self, index: usize) -> Vec<f64> {
        self.data.column(index).iter().copied().collect()
    }

    pub fn into_matrix(self) -> DMatrix<f64> {
        self.data
    }
}

// ---------------------------------------------------------------------------
// WindowBuilder
// ---------------------------------------------------------------------------

/// Turns frames into [`AnalysisWindow`]s of a fixed size.
#[derive(Debug, Clone, Copy)]
pub struct WindowBuilder {
    window_size: usize,
}

impl WindowBuilder {
    /// # Panics
    ///
    /// Panics if `window_size == 0`.
    pub fn new(window_size: usize) -> Self {
        assert!(window_size > 0, "window_size must be > 0");
        Self { window_size }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// See [`build_window`].
    pub fn build(&self, frame: &AudioFrame) -> Option<AnalysisWindow> {
        build_window(frame, self.window_size)
    }
}

/// Cut `frame` to `window_size` samples per channel and normalize it.
///
/// Returns `None` when the frame holds fewer than `window_size` samples per
/// channel or has no channels (insufficient data, not an error).
pub fn build_window(frame: &AudioFrame, window_size: usize) -> Option<AnalysisWindow> {
    let channels = frame.channels as usize;
    if channels == 0 || window_size == 0 {
        return None;
    }

    let available = frame.frames();
    if available < window_size {
        log::debug!("window: insufficient data ({available} < {window_size} samples/channel)");
        return None;
    }

    let data = DMatrix::from_fn(window_size, channels, |row, col| {
        frame.samples[row * channels + col] as f64
    });

    Some(AnalysisWindow::from_matrix(data))
}

/// Replace every NaN / ±∞ with zero.
pub fn sanitize(data: &mut DMatrix<f64>) {
    for v in data.iter_mut() {
        if !v.is_finite() {
            *v = 0.0;
        }
    }
}

/// Z-score each column in place; constant columns become zeros.
pub fn normalize_columns(data: &mut DMatrix<f64>) {
    let n = data.nrows();
    if n == 0 {
        return;
    }

    for mut col in data.column_iter_mut() {
        let mean = col.iter().sum::<f64>() / n as f64;
        let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        let std = var.sqrt();

        if std.is_finite() && std > MIN_STD {
            for v in col.iter_mut() {
                *v = (*v - mean) / std;
            }
        } else {
            col.fill(0.0);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
