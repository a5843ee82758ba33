// src/stats.rs
//
// Percentile summaries for Monte Carlo sweeps.
//
// Provides:
// - Linear-interpolated quantiles of a sorted sample
// - PercentileSummary (mean, p05, p50, p95) with stable field order
//
// Non-finite samples are dropped before summarizing. Everything here is
// deterministic in the input order of equal values.

use serde::Serialize;

/// Percentile levels reported for every uncertain quantity.
pub const SUMMARY_LEVELS: [f64; 3] = [0.05, 0.50, 0.95];

// ============================================================================
// Quantile computation
// ============================================================================

/// Quantile of a sorted slice with linear interpolation between closest
/// ranks. `p` is clamped to [0, 1]. NaN for an empty slice.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let idx = p.clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi || hi >= n {
        return sorted[lo.min(n - 1)];
    }
    let w = idx - lo as f64;
    sorted[lo] * (1.0 - w) + sorted[hi] * w
}

/// Finite values of `data`, sorted ascending.
pub fn sorted_finite(data: &[f64]) -> Vec<f64> {
    let mut finite: Vec<f64> = data.iter().copied().filter(|x| x.is_finite()).collect();
    finite.sort_by(f64::total_cmp);
    finite
}

// ============================================================================
// Output structures
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PercentileSummary {
    pub mean: f64,
    pub p05: f64,
    pub p50: f64,
    pub p95: f64,
    /// Finite samples the summary was computed from.
    pub samples: usize,
}

impl PercentileSummary {
    pub fn from_samples(data: &[f64]) -> Self {
        let sorted = sorted_finite(data);
        let mean = if sorted.is_empty() {
            f64::NAN
        } else {
            sorted.iter().sum::<f64>() / sorted.len() as f64
        };
        Self {
            mean,
            p05: quantile_sorted(&sorted, SUMMARY_LEVELS[0]),
            p50: quantile_sorted(&sorted, SUMMARY_LEVELS[1]),
            p95: quantile_sorted(&sorted, SUMMARY_LEVELS[2]),
            samples: sorted.len(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
