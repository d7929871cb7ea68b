//! Monte Carlo valuation of a storage contract against calibrated GBM paths.

use std::time::Instant;

use super::dispatch::value_paths;
use super::error::{Result, ValuationError};
use super::risk::summarize;
use super::simulation::{estimate_parameters, simulate_gbm, GbmParameters, PathSet};
use super::types::{SimulationConfig, StorageContract, ValuationResult};
use crate::forecasting::PriceSeries;
use crate::telemetry::LogContext;

pub struct ValuationEngine {
    ctx: LogContext,
}

impl Default for ValuationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ValuationEngine {
    pub fn new() -> Self {
        Self::with_context(LogContext::new("ValuationEngine"))
    }

    pub fn with_context(ctx: LogContext) -> Self {
        ValuationEngine { ctx }
    }

    pub fn calibrate(&self, series: &PriceSeries) -> Result<GbmParameters> {
        let prices = series.prices();
        let params = estimate_parameters(&prices)?;
        self.ctx.in_scope(|| {
            tracing::debug!(
                drift = params.drift,
                volatility = params.volatility,
                "Calibrated GBM from {} prices",
                prices.len()
            )
        });
        Ok(params)
    }

    /// Calibrated path matrix for `sim`, without valuing it.
    pub fn simulate(&self, series: &PriceSeries, sim: &SimulationConfig) -> Result<PathSet> {
        sim.validate()?;
        let params = self.calibrate(series)?;
        Ok(simulate_gbm(
            series.last_price(),
            params,
            sim.n_simulations,
            sim.horizon_days,
            sim.seed,
        ))
    }

    /// Validate, calibrate, simulate, dispatch every path and aggregate risk statistics.
    pub fn run(
        &self,
        series: &PriceSeries,
        contract: &StorageContract,
        sim: &SimulationConfig,
    ) -> Result<ValuationResult> {
        self.run_with_paths(series, contract, sim)
            .map(|(result, _)| result)
    }

    /// Same as [`run`](Self::run), also handing back the simulated path matrix.
    pub fn run_with_paths(
        &self,
        series: &PriceSeries,
        contract: &StorageContract,
        sim: &SimulationConfig,
    ) -> Result<(ValuationResult, PathSet)> {
        let _guard = self.ctx.span().enter();

        contract.validate()?;
        sim.validate()?;
        if !sim.is_standard_count() {
            tracing::warn!(
                n_simulations = sim.n_simulations,
                "Non-standard simulation count"
            );
        }

        tracing::info!(
            n_simulations = sim.n_simulations,
            horizon_days = sim.horizon_days,
            seed = sim.seed,
            "Starting valuation"
        );
        let started = Instant::now();

        let params = self.calibrate(series)?;
        let paths = simulate_gbm(
            series.last_price(),
            params,
            sim.n_simulations,
            sim.horizon_days,
            sim.seed,
        );
        let path_values = value_paths(&paths, contract, sim.horizon_days);
        let summary = summarize(&path_values);

        if !summary.mean.is_finite() {
            return Err(ValuationError::DegenerateHistory(
                "simulated contract values are not finite".to_string(),
            ));
        }

        tracing::info!(
            contract_value = summary.mean,
            std_dev = summary.std_dev,
            var_95 = summary.var_95,
            cvar_95 = summary.cvar_95,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Valuation finished"
        );

        let result = ValuationResult {
            contract_value: summary.mean,
            std_dev: summary.std_dev,
            var_95: summary.var_95,
            cvar_95: summary.cvar_95,
            path_values,
            drift: params.drift,
            volatility: params.volatility,
            mean_path: paths.mean_path(),
            n_simulations: sim.n_simulations,
            horizon_days: sim.horizon_days,
        };
        Ok((result, paths))
    }
}

/// One-shot valuation with a default engine.
pub fn run_valuation(
    series: &PriceSeries,
    contract: &StorageContract,
    sim: &SimulationConfig,
) -> Result<ValuationResult> {
    ValuationEngine::new().run(series, contract, sim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn history(n: usize) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let prices: Vec<f64> = (0..n)
            .map(|i| 50.0 + 5.0 * (i as f64 * 0.3).sin() + 0.01 * i as f64)
            .collect();
        PriceSeries::from_daily(start, &prices).unwrap()
    }

    fn small_sim() -> SimulationConfig {
        SimulationConfig {
            n_simulations: 1000,
            horizon_days: 30,
            seed: 42,
        }
    }

    #[test]
    fn result_shape_and_ordering() {
        let engine = ValuationEngine::with_context(LogContext::disabled("test"));
        let result = engine
            .run(&history(120), &StorageContract::default(), &small_sim())
            .unwrap();

        assert_eq!(result.path_values.len(), 1000);
        assert_eq!(result.mean_path.len(), 30);
        assert_eq!(result.n_simulations, 1000);
        assert!(result.cvar_95 <= result.var_95);
        assert!(result.std_dev >= 0.0);
        assert!(result.volatility > 0.0);
    }

    #[test]
    fn same_seed_same_result() {
        let series = history(90);
        let a = run_valuation(&series, &StorageContract::default(), &small_sim()).unwrap();
        let b = run_valuation(&series, &StorageContract::default(), &small_sim()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_inputs_fail_before_simulating() {
        let engine = ValuationEngine::new();
        let bad_contract = StorageContract {
            capacity: -1.0,
            ..StorageContract::default()
        };
        assert!(matches!(
            engine.run(&history(60), &bad_contract, &small_sim()),
            Err(ValuationError::InvalidContract { .. })
        ));

        let bad_sim = SimulationConfig {
            horizon_days: 10,
            ..small_sim()
        };
        assert!(matches!(
            engine.run(&history(60), &StorageContract::default(), &bad_sim),
            Err(ValuationError::InvalidSimulation { .. })
        ));

        let one_point = PriceSeries::from_daily(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(), &[10.0]).unwrap();
        assert!(matches!(
            engine.run(&one_point, &StorageContract::default(), &small_sim()),
            Err(ValuationError::InsufficientHistory { .. })
        ));
    }

    #[test]
    fn simulate_matches_run_paths() {
        let engine = ValuationEngine::new();
        let series = history(60);
        let paths = engine.simulate(&series, &small_sim()).unwrap();
        let result = engine.run(&series, &StorageContract::default(), &small_sim()).unwrap();
        assert_eq!(paths.mean_path(), result.mean_path);
        assert_eq!(paths.path(0)[0], series.last_price());
    }

    #[test]
    fn run_with_paths_returns_the_valued_matrix() {
        let engine = ValuationEngine::with_context(LogContext::disabled("test"));
        let series = history(60);
        let (result, paths) = engine
            .run_with_paths(&series, &StorageContract::default(), &small_sim())
            .unwrap();
        assert_eq!(paths.n_paths(), result.n_simulations);
        assert_eq!(paths.n_steps(), result.horizon_days);
        assert_eq!(paths.mean_path(), result.mean_path);

        let plain = engine.run(&series, &StorageContract::default(), &small_sim()).unwrap();
        assert_eq!(plain, result);
    }
}
