//! Whole-sample distribution statistics.

use serde::Serialize;
use std::fmt;

/// Probabilities reported by [`Distribution`], in ascending order.
pub const DISTRIBUTION_PROBS: [f64; 7] = [0.001, 0.01, 0.1, 0.5, 0.9, 0.99, 0.999];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsError {
    /// Quantiles were requested over zero samples.
    EmptySample,
}

impl fmt::Display for StatsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatsError::EmptySample => write!(f, "cannot summarise an empty sample"),
        }
    }
}

impl std::error::Error for StatsError {}

/// Summary of a numeric sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Distribution {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub p0_1: f64,
    pub p1: f64,
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
    pub p99_9: f64,
}

impl Distribution {
    pub fn from_samples(samples: &[f64]) -> Result<Self, StatsError> {
        if samples.is_empty() {
            return Err(StatsError::EmptySample);
        }

        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;

        let sorted = sorted_copy(samples);
        let q = DISTRIBUTION_PROBS.map(|p| quantile_sorted(&sorted, p));

        Ok(Distribution {
            count: samples.len(),
            mean,
            std: variance.sqrt(),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            p0_1: q[0],
            p1: q[1],
            p10: q[2],
            p50: q[3],
            p90: q[4],
            p99: q[5],
            p99_9: q[6],
        })
    }

    /// Quantiles in the order of [`DISTRIBUTION_PROBS`].
    pub fn quantiles(&self) -> [f64; 7] {
        [
            self.p0_1, self.p1, self.p10, self.p50, self.p90, self.p99, self.p99_9,
        ]
    }
}

/// Quantiles of `samples` at each probability in `probs`.
pub fn quantiles(samples: &[f64], probs: &[f64]) -> Result<Vec<f64>, StatsError> {
    if samples.is_empty() {
        return Err(StatsError::EmptySample);
    }
    let sorted = sorted_copy(samples);
    Ok(probs.iter().map(|&p| quantile_sorted(&sorted, p)).collect())
}

/// Linear interpolation between the order statistics around `(n - 1) * p`.
///
/// `sorted` must be non-empty and ascending; `p` is clamped to `[0, 1]`.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let h = (sorted.len() - 1) as f64 * p.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = h - lo as f64;
    let value = sorted[lo] + frac * (sorted[hi] - sorted[lo]);
    // Rounding in the subtraction must not push the result past either neighbour.
    value.clamp(sorted[lo], sorted[hi])
}

fn sorted_copy(samples: &[f64]) -> Vec<f64> {
    let mut sorted = samples.to_vec();
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    sorted
}
