//! The contract every forecasting model implements.

use super::error::{ForecastError, Result};
use super::types::{EvaluationMetrics, ForecastResult, ModelInfo, PriceSeries};
use crate::telemetry::LogContext;

/// Uniform fit / predict / evaluate lifecycle.
///
/// `fit` always starts from scratch: a failed fit leaves the model unfitted even if it was
/// fitted before.
pub trait Forecaster: Send {
    fn name(&self) -> &'static str;

    /// Shortest series `fit` accepts.
    fn min_points(&self) -> usize;

    fn is_fitted(&self) -> bool;

    fn fit(&mut self, series: &PriceSeries) -> Result<()>;

    /// Exactly `horizon` rows continuing the training series.
    fn predict(&self, horizon: usize) -> Result<ForecastResult>;

    fn model_info(&self) -> ModelInfo;

    fn log_context(&self) -> &LogContext;

    fn forecast(&mut self, series: &PriceSeries, horizon: usize) -> Result<ForecastResult> {
        let ctx = self.log_context().clone();
        ctx.in_scope(|| tracing::info!(horizon, "forecasting {} periods", horizon));
        self.fit(series)?;
        self.predict(horizon)
    }

    /// Metrics over the dates both series share.
    fn evaluate(&self, actual: &PriceSeries, predicted: &PriceSeries) -> Result<EvaluationMetrics> {
        if !self.is_fitted() {
            return Err(ForecastError::not_fitted(self.name()));
        }
        Ok(self
            .log_context()
            .in_scope(|| evaluate_forecast(actual, predicted)))
    }

    /// Predict `test.len()` steps and score them position by position against `test`.
    fn evaluate_holdout(&self, test: &PriceSeries) -> Result<EvaluationMetrics> {
        let forecast = self.predict(test.len())?;
        let metrics = compute_metrics(&test.prices(), &forecast.forecasts());
        self.log_context().in_scope(|| log_metrics(&metrics));
        Ok(metrics)
    }
}

pub(crate) fn check_length(model: &str, series: &PriceSeries, required: usize) -> Result<()> {
    if series.len() < required {
        return Err(ForecastError::insufficient(model, required, series.len()));
    }
    Ok(())
}

pub(crate) fn check_horizon(horizon: usize) -> Result<()> {
    if horizon == 0 {
        return Err(ForecastError::invalid_parameter(
            "horizon",
            "must be a positive number of periods",
        ));
    }
    Ok(())
}

pub(crate) fn check_confidence(confidence_level: f64) -> Result<()> {
    if !(confidence_level > 0.0 && confidence_level < 1.0) {
        return Err(ForecastError::invalid_parameter(
            "confidence_level",
            format!("must lie in (0, 1), got {}", confidence_level),
        ));
    }
    Ok(())
}

/// Align `actual` and `predicted` on their common dates and score them.
///
/// No overlap yields `EvaluationMetrics::empty()` rather than an error.
pub fn evaluate_forecast(actual: &PriceSeries, predicted: &PriceSeries) -> EvaluationMetrics {
    let (a, p) = (actual.points(), predicted.points());
    let mut aligned_actual = Vec::new();
    let mut aligned_predicted = Vec::new();

    // Both series are sorted by date, so a merge walk finds the intersection.
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < p.len() {
        match a[i].date.cmp(&p[j].date) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                aligned_actual.push(a[i].price);
                aligned_predicted.push(p[j].price);
                i += 1;
                j += 1;
            }
        }
    }

    if aligned_actual.is_empty() {
        tracing::warn!("No overlapping data for evaluation");
        return EvaluationMetrics::empty();
    }

    let metrics = compute_metrics(&aligned_actual, &aligned_predicted);
    log_metrics(&metrics);
    metrics
}

/// MSE, RMSE, MAE, MAPE and R² over paired values; zero actuals are left out of MAPE.
pub fn compute_metrics(actual: &[f64], predicted: &[f64]) -> EvaluationMetrics {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return EvaluationMetrics::empty();
    }
    let actual = &actual[..n];
    let predicted = &predicted[..n];

    let mut sq_sum = 0.0;
    let mut abs_sum = 0.0;
    let mut pct_sum = 0.0;
    let mut pct_count = 0usize;

    for (&a, &p) in actual.iter().zip(predicted) {
        let err = a - p;
        sq_sum += err * err;
        abs_sum += err.abs();
        if a != 0.0 {
            pct_sum += (err / a).abs();
            pct_count += 1;
        }
    }

    let mse = sq_sum / n as f64;
    let actual_mean = actual.iter().sum::<f64>() / n as f64;
    let ss_tot: f64 = actual.iter().map(|&a| (a - actual_mean).powi(2)).sum();
    let r2 = if ss_tot == 0.0 { 0.0 } else { 1.0 - sq_sum / ss_tot };

    EvaluationMetrics {
        n,
        mse,
        rmse: mse.sqrt(),
        mae: abs_sum / n as f64,
        mape: (pct_count > 0).then(|| pct_sum / pct_count as f64 * 100.0),
        r2,
    }
}

pub(crate) fn log_metrics(metrics: &EvaluationMetrics) {
    tracing::info!(
        rmse = metrics.rmse,
        mae = metrics.mae,
        mape = ?metrics.mape,
        "evaluation metrics"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn perfect_forecast_scores_zero_error() {
        let actual = [10.0, 12.0, 14.0];
        let metrics = compute_metrics(&actual, &actual);
        assert_eq!(metrics.n, 3);
        assert_eq!(metrics.mse, 0.0);
        assert_eq!(metrics.mape, Some(0.0));
        assert_relative_eq!(metrics.r2, 1.0);
    }

    #[test]
    fn mape_skips_zero_actuals() {
        let metrics = compute_metrics(&[0.0, 10.0], &[1.0, 11.0]);
        assert_relative_eq!(metrics.mape.unwrap(), 10.0, epsilon = 1e-12);
        assert_relative_eq!(metrics.mae, 1.0);

        let all_zero = compute_metrics(&[0.0, 0.0], &[1.0, 2.0]);
        assert_eq!(all_zero.mape, None);
        assert!(all_zero.mse.is_finite());
    }

    #[test]
    fn flat_actual_gives_zero_r2() {
        let metrics = compute_metrics(&[5.0, 5.0, 5.0], &[4.0, 5.0, 6.0]);
        assert_eq!(metrics.r2, 0.0);
    }

    #[test]
    fn aligns_on_common_dates() {
        let actual = PriceSeries::from_daily(start(), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let predicted =
            PriceSeries::from_daily(start() + chrono::Duration::days(2), &[3.0, 5.0, 9.0]).unwrap();
        let metrics = evaluate_forecast(&actual, &predicted);
        assert_eq!(metrics.n, 2);
        assert_relative_eq!(metrics.mae, 0.5);
    }

    #[test]
    fn disjoint_dates_give_empty_metrics() {
        let actual = PriceSeries::from_daily(start(), &[1.0, 2.0]).unwrap();
        let predicted =
            PriceSeries::from_daily(start() + chrono::Duration::days(30), &[1.0, 2.0]).unwrap();
        let metrics = evaluate_forecast(&actual, &predicted);
        assert!(metrics.is_empty());
        assert!(metrics.rmse.is_finite());
    }

    #[test]
    fn rejects_zero_horizon_and_bad_confidence() {
        assert!(check_horizon(0).is_err());
        assert!(check_horizon(1).is_ok());
        assert!(check_confidence(1.0).is_err());
        assert!(check_confidence(0.95).is_ok());
    }
}
