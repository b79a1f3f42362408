//! The individual distance / similarity functions.
//!
//! Every function takes two equal-length, non-empty slices; length checks are
//! done once by [`crate::metrics::compute`].  Undefined results (zero
//! variance, zero norm) are `NaN`, never a panic.

/// Histogram resolution used by [`cross_entropy`].
pub const HISTOGRAM_BINS: usize = 30;

/// Floor applied to empty reference bins so the divergence stays finite.
const EMPTY_BIN_FLOOR: f64 = 1e-10;

/// `sqrt(Σ (aᵢ − bᵢ)²)`
pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// `mean((aᵢ − bᵢ)²)`
pub fn mean_squared_error(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() {
        return f64::NAN;
    }
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>() / a.len() as f64
}

/// Pearson correlation coefficient; `NaN` when either input is constant.
pub fn pearson_correlation(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() {
        return f64::NAN;
    }
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    let mut sum_sq_a = 0.0;
    let mut sum_sq_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
        sum_sq_a += x * x;
        sum_sq_b += y * y;
    }

    // Rounding in the mean leaves a constant input with a tiny non-zero
    // spread, so zero variance is judged relative to the signal energy.
    if is_negligible(var_a, sum_sq_a) || is_negligible(var_b, sum_sq_b) {
        return f64::NAN;
    }
    let denom = (var_a * var_b).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return f64::NAN;
    }
    (cov / denom).clamp(-1.0, 1.0)
}

fn is_negligible(centered_sq: f64, raw_sq: f64) -> bool {
    centered_sq <= f64::EPSILON * raw_sq
}

/// Correlation distance `1 − r`; `NaN` when either input is constant.
pub fn pearson_distance(a: &[f64], b: &[f64]) -> f64 {
    1.0 - pearson_correlation(a, b)
}

/// `1 − a·b / (‖a‖ ‖b‖)`; `NaN` when either vector is all zeros.
pub fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = (norm_a * norm_b).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return f64::NAN;
    }
    1.0 - (dot / denom).clamp(-1.0, 1.0)
}

/// Probability mass per bin over the signal's own `[min, max]` range.
///
/// Bins are equal width; the last bin is closed on the right.  A constant
/// signal is binned over `[v − 0.5, v + 0.5]`.  Non-finite samples are
/// ignored.
pub fn histogram(signal: &[f64], bins: usize) -> Vec<f64> {
    let mut counts = vec![0.0; bins];
    let finite: Vec<f64> = signal.iter().copied().filter(|v| v.is_finite()).collect();
    if bins == 0 || finite.is_empty() {
        return counts;
    }

    let (mut lo, mut hi) = finite
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }

    let width = hi - lo;
    for &v in &finite {
        let idx = (((v - lo) / width) * bins as f64) as usize;
        counts[idx.min(bins - 1)] += 1.0;
    }

    let total = finite.len() as f64;
    counts.iter_mut().for_each(|c| *c /= total);
    counts
}

/// Kullback–Leibler divergence `Σ pᵢ ln(pᵢ / qᵢ)` between the
/// [`HISTOGRAM_BINS`]-bin histograms of `a` (p) and `b` (q).
///
/// Empty bins of q are floored before renormalizing so the result is finite;
/// bins where p is empty contribute nothing.  Always `≥ 0`.
pub fn cross_entropy(a: &[f64], b: &[f64]) -> f64 {
    let p = histogram(a, HISTOGRAM_BINS);
    let mut q = histogram(b, HISTOGRAM_BINS);

    q.iter_mut().for_each(|v| *v = v.max(EMPTY_BIN_FLOOR));
    let q_total: f64 = q.iter().sum();
    q.iter_mut().for_each(|v| *v /= q_total);

    let kl: f64 = p
        .iter()
        .zip(&q)
        .filter(|(&pi, _)| pi > 0.0)
        .map(|(&pi, &qi)| pi * (pi / qi).ln())
        .sum();
    kl.max(0.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
