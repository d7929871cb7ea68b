//! Chronological holdout evaluation.

use serde::{Deserialize, Serialize};

use super::base::{compute_metrics, log_metrics};
use super::error::{ForecastError, Result};
use super::registry::{self, ForecastConfig, ModelKind};
use super::types::{EvaluationMetrics, ForecastResult, PriceSeries};

pub const MIN_TEST_SIZE: f64 = 0.1;
pub const MAX_TEST_SIZE: f64 = 0.3;

/// Split off the last `test_size` share of the series; both sides keep at least one point.
pub fn train_test_split(series: &PriceSeries, test_size: f64) -> Result<(PriceSeries, PriceSeries)> {
    if !(MIN_TEST_SIZE..=MAX_TEST_SIZE).contains(&test_size) {
        return Err(ForecastError::invalid_parameter(
            "test_size",
            format!(
                "must lie in [{}, {}], got {}",
                MIN_TEST_SIZE, MAX_TEST_SIZE, test_size
            ),
        ));
    }

    let n = series.len();
    if n < 2 {
        return Err(ForecastError::insufficient("backtest", 2, n));
    }
    let test_len = ((n as f64 * test_size).round() as usize).clamp(1, n - 1);
    let split = n - test_len;

    let train = series
        .slice(0, split)
        .ok_or_else(|| ForecastError::InvalidSeries("empty training split".to_string()))?;
    let test = series
        .slice(split, n)
        .ok_or_else(|| ForecastError::InvalidSeries("empty test split".to_string()))?;
    Ok((train, test))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub model: ModelKind,
    pub train_len: usize,
    pub test_len: usize,
    pub metrics: EvaluationMetrics,
    pub forecast: ForecastResult,
}

/// Fit `kind` on the training split and score its forecast against the held-out tail.
pub fn run_backtest(
    kind: ModelKind,
    series: &PriceSeries,
    config: &ForecastConfig,
    test_size: f64,
) -> Result<BacktestReport> {
    let (train, test) = train_test_split(series, test_size)?;
    let mut model = registry::create(kind, config)?;
    model.fit(&train)?;

    let forecast = model.predict(test.len())?;
    let metrics = compute_metrics(&test.prices(), &forecast.forecasts());
    model.log_context().in_scope(|| log_metrics(&metrics));

    Ok(BacktestReport {
        model: kind,
        train_len: train.len(),
        test_len: test.len(),
        metrics,
        forecast,
    })
}
