//! Tail statistics over per-path contract values (profit-positive convention).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    pub var_95: f64,
    pub cvar_95: f64,
}

/// `q`-th percentile (0..=100) with linear interpolation between order statistics.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// Mean of the values at or below `threshold`; `threshold` itself when none are.
pub fn tail_mean(values: &[f64], threshold: f64) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|&&v| v <= threshold)
        .fold((0.0, 0usize), |(s, c), &v| (s + v, c + 1));
    if count == 0 {
        threshold
    } else {
        (sum / count as f64).min(threshold)
    }
}

pub fn summarize(values: &[f64]) -> RiskSummary {
    if values.is_empty() {
        return RiskSummary {
            mean: f64::NAN,
            std_dev: f64::NAN,
            var_95: f64::NAN,
            cvar_95: f64::NAN,
        };
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std_dev = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    let var_95 = percentile(values, 5.0);
    RiskSummary {
        mean,
        std_dev,
        var_95,
        cvar_95: tail_mean(values, var_95),
    }
}
