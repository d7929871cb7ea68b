//! Calibration from history and geometric Brownian motion path generation.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::error::{Result, ValuationError};

/// Daily drift and volatility of simple returns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GbmParameters {
    pub drift: f64,
    pub volatility: f64,
}

pub fn calculate_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .map(|window| (window[1] - window[0]) / window[0])
        .collect()
}

/// Mean and sample standard deviation of simple returns.
pub fn estimate_parameters(prices: &[f64]) -> Result<GbmParameters> {
    if prices.len() < 2 {
        return Err(ValuationError::InsufficientHistory {
            required: 2,
            actual: prices.len(),
        });
    }
    if let Some(bad) = prices.iter().find(|p| !(p.is_finite() && **p > 0.0)) {
        return Err(ValuationError::DegenerateHistory(format!(
            "prices must be positive, found {}",
            bad
        )));
    }

    let returns = calculate_returns(prices);
    let n = returns.len() as f64;
    let drift = returns.iter().sum::<f64>() / n;
    let volatility = if returns.len() > 1 {
        (returns.iter().map(|r| (r - drift).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    } else {
        0.0
    };

    if !(drift.is_finite() && volatility.is_finite()) {
        return Err(ValuationError::DegenerateHistory(
            "returns are not finite".to_string(),
        ));
    }
    Ok(GbmParameters { drift, volatility })
}

/// Simulated prices, one row per path and one column per day. Read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct PathSet {
    prices: Array2<f64>,
}

impl PathSet {
    pub fn n_paths(&self) -> usize {
        self.prices.nrows()
    }

    pub fn n_steps(&self) -> usize {
        self.prices.ncols()
    }

    pub fn path(&self, i: usize) -> ArrayView1<'_, f64> {
        self.prices.row(i)
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.prices
    }

    /// Average price per day across paths.
    pub fn mean_path(&self) -> Vec<f64> {
        self.prices
            .mean_axis(Axis(0))
            .map(|m| m.to_vec())
            .unwrap_or_default()
    }

    /// Up to `k` distinct paths drawn without replacement, for charting.
    pub fn sample_paths(&self, k: usize, seed: u64) -> Vec<Vec<f64>> {
        let k = k.min(self.n_paths());
        let mut rng = StdRng::seed_from_u64(seed);
        rand::seq::index::sample(&mut rng, self.n_paths(), k)
            .into_iter()
            .map(|i| self.path(i).to_vec())
            .collect()
    }
}

/// `n_paths` GBM paths of `n_steps` daily prices starting at `start_price`.
///
/// Shocks are drawn step by step, one standard-normal vector across all paths per step, so a
/// given seed always yields the same matrix.
pub fn simulate_gbm(
    start_price: f64,
    params: GbmParameters,
    n_paths: usize,
    n_steps: usize,
    seed: u64,
) -> PathSet {
    let dt: f64 = 1.0;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut prices = Array2::zeros((n_paths, n_steps));
    if n_steps == 0 {
        return PathSet { prices };
    }

    prices.column_mut(0).fill(start_price);
    let drift_term = (params.drift - 0.5 * params.volatility.powi(2)) * dt;
    let diffusion = params.volatility * dt.sqrt();

    for t in 1..n_steps {
        let shocks: Array1<f64> = Array1::random_using(n_paths, StandardNormal, &mut rng);
        let growth = shocks.mapv(|z| (drift_term + diffusion * z).exp());
        let next = &prices.column(t - 1) * &growth;
        prices.column_mut(t).assign(&next);
    }

    PathSet { prices }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn returns_and_parameters() {
        let prices = [100.0, 110.0, 99.0];
        let r = calculate_returns(&prices);
        assert_relative_eq!(r[0], 0.1);
        assert_relative_eq!(r[1], -0.1);

        let p = estimate_parameters(&prices).unwrap();
        assert_relative_eq!(p.drift, 0.0, epsilon = 1e-12);
        assert_relative_eq!(p.volatility, (0.02f64).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn rejects_short_or_non_positive_history() {
        assert!(matches!(
            estimate_parameters(&[5.0]),
            Err(ValuationError::InsufficientHistory { required: 2, actual: 1 })
        ));
        assert!(matches!(
            estimate_parameters(&[5.0, 0.0, 4.0]),
            Err(ValuationError::DegenerateHistory(_))
        ));
    }

    #[test]
    fn paths_start_at_last_price_and_are_seeded() {
        let params = GbmParameters {
            drift: 0.0005,
            volatility: 0.02,
        };
        let a = simulate_gbm(50.0, params, 200, 30, 7);
        let b = simulate_gbm(50.0, params, 200, 30, 7);
        let c = simulate_gbm(50.0, params, 200, 30, 8);

        assert_eq!(a.n_paths(), 200);
        assert_eq!(a.n_steps(), 30);
        assert!(a.matrix().column(0).iter().all(|&p| p == 50.0));
        assert!(a.matrix().iter().all(|&p| p > 0.0));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn zero_volatility_grows_deterministically() {
        let params = GbmParameters {
            drift: 0.01,
            volatility: 0.0,
        };
        let paths = simulate_gbm(10.0, params, 3, 4, 1);
        for i in 0..3 {
            assert_relative_eq!(paths.path(i)[3], 10.0 * (0.03f64).exp(), epsilon = 1e-12);
        }
        assert_eq!(paths.mean_path().len(), 4);
    }

    #[test]
    fn sampled_paths_are_distinct_rows() {
        let params = GbmParameters {
            drift: 0.0,
            volatility: 0.05,
        };
        let paths = simulate_gbm(10.0, params, 20, 30, 3);
        let sample = paths.sample_paths(5, 99);
        assert_eq!(sample.len(), 5);
        assert!(sample.iter().all(|p| p.len() == 30));
        assert_eq!(paths.sample_paths(50, 1).len(), 20);
    }
}
