//! The fixed metric table and [`MetricSet`].

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use super::functions;

// ---------------------------------------------------------------------------
// MetricError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MetricError {
    #[error("invalid metric input: {0}")]
    InvalidInput(String),
}

// ---------------------------------------------------------------------------
// Metric
// ---------------------------------------------------------------------------

/// One entry of the metric table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Metric {
    Euclidean,
    CrossCorrelation,
    Pearson,
    Mse,
    Cosine,
    CrossEntropy,
}

impl Metric {
    /// Every metric, in report order.
    pub const ALL: [Metric; 6] = [
        Metric::Euclidean,
        Metric::CrossCorrelation,
        Metric::Pearson,
        Metric::Mse,
        Metric::Cosine,
        Metric::CrossEntropy,
    ];

    /// Display name used in logs and archives.
    pub fn name(self) -> &'static str {
        match self {
            Metric::Euclidean => "Euclidean",
            Metric::CrossCorrelation => "Cross Correlation",
            Metric::Pearson => "Pearson",
            Metric::Mse => "MSE",
            Metric::Cosine => "Cosine",
            Metric::CrossEntropy => "Cross Entropy",
        }
    }

    /// The pure function behind this metric.
    pub fn function(self) -> fn(&[f64], &[f64]) -> f64 {
        match self {
            Metric::Euclidean => functions::euclidean,
            Metric::CrossCorrelation => functions::pearson_correlation,
            Metric::Pearson => functions::pearson_distance,
            Metric::Mse => functions::mean_squared_error,
            Metric::Cosine => functions::cosine_distance,
            Metric::CrossEntropy => functions::cross_entropy,
        }
    }

    /// Validate the inputs and evaluate this metric alone.
    pub fn evaluate(self, a: &[f64], b: &[f64]) -> Result<f64, MetricError> {
        check_inputs(a, b)?;
        Ok((self.function())(a, b))
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// MetricSet
// ---------------------------------------------------------------------------

/// One value per [`Metric`], in table order.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSet {
    values: [f64; Metric::ALL.len()],
}

impl MetricSet {
    pub fn get(&self, metric: Metric) -> f64 {
        self.values[metric as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        Metric::ALL.iter().map(move |&m| (m, self.get(m)))
    }

    /// Name → value map (for archives).
    pub fn to_map(&self) -> BTreeMap<&'static str, f64> {
        self.iter().map(|(m, v)| (m.name(), v)).collect()
    }
}

impl fmt::Display for MetricSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (metric, value) in self.iter() {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{metric}: {value:.10}")?;
            first = false;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// compute
// ---------------------------------------------------------------------------

/// Evaluate every metric on `a` versus `b`.
///
/// # Errors
///
/// [`MetricError::InvalidInput`] when either slice is empty or their lengths
/// differ.
pub fn compute(a: &[f64], b: &[f64]) -> Result<MetricSet, MetricError> {
    check_inputs(a, b)?;
    let mut values = [0.0; Metric::ALL.len()];
    for metric in Metric::ALL {
        values[metric as usize] = (metric.function())(a, b);
    }
    Ok(MetricSet { values })
}

fn check_inputs(a: &[f64], b: &[f64]) -> Result<(), MetricError> {
    if a.is_empty() || b.is_empty() {
        return Err(MetricError::InvalidInput(format!(
            "empty sequence (lengths {} and {})",
            a.len(),
            b.len()
        )));
    }
    if a.len() != b.len() {
        return Err(MetricError::InvalidInput(format!(
            "length mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
