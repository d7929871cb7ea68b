use super::base::{check_horizon, check_length, Forecaster};
use super::error::{ForecastError, Result};
use super::types::{ForecastResult, ModelInfo, PriceSeries};
use super::utils::{constant_bounds, polynomial_fit, polyval, population_std};
use crate::telemetry::LogContext;

const NAME: &str = "Regression";
const MIN_POINTS: usize = 3;
const BAND_Z: f64 = 1.96;

#[derive(Debug, Clone)]
struct FittedLine {
    coeffs: Vec<f64>,
    residual_std: f64,
    training: PriceSeries,
}

/// Straight line through the whole history with a constant +-1.96 sigma band.
pub struct RegressionForecaster {
    state: Option<FittedLine>,
    ctx: LogContext,
}

impl RegressionForecaster {
    pub fn new() -> Self {
        Self::with_context(LogContext::new("RegressionForecaster"))
    }

    pub fn with_context(ctx: LogContext) -> Self {
        ctx.in_scope(|| tracing::debug!("RegressionForecaster initialized"));
        RegressionForecaster { state: None, ctx }
    }

    /// (intercept, slope) per step.
    pub fn coefficients(&self) -> Option<(f64, f64)> {
        self.state
            .as_ref()
            .map(|s| (s.coeffs[0], s.coeffs.get(1).copied().unwrap_or(0.0)))
    }
}

impl Default for RegressionForecaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Forecaster for RegressionForecaster {
    fn name(&self) -> &'static str {
        NAME
    }

    fn min_points(&self) -> usize {
        MIN_POINTS
    }

    fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    fn fit(&mut self, series: &PriceSeries) -> Result<()> {
        self.state = None;
        let ctx = self.ctx.clone();
        let _guard = ctx.span().enter();
        tracing::info!("Fitting Regression model");
        check_length(NAME, series, MIN_POINTS)?;

        let y = series.prices();
        let coeffs = polynomial_fit(&y, 1);
        let residuals: Vec<f64> = y
            .iter()
            .enumerate()
            .map(|(i, v)| v - polyval(&coeffs, i as f64))
            .collect();
        let residual_std = population_std(&residuals);
        if coeffs.iter().any(|c| !c.is_finite()) {
            return Err(ForecastError::fitting(NAME, "line coefficients are not finite"));
        }

        tracing::info!(coefficients = ?coeffs, residual_std, "Regression model fitted");
        self.state = Some(FittedLine {
            coeffs,
            residual_std,
            training: series.clone(),
        });
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<ForecastResult> {
        let state = self.state.as_ref().ok_or_else(|| ForecastError::not_fitted(NAME))?;
        check_horizon(horizon)?;
        let _guard = self.ctx.span().enter();
        tracing::info!(horizon, "predicting {} periods", horizon);

        let n = state.training.len();
        let predictions: Vec<f64> = (n..n + horizon)
            .map(|x| polyval(&state.coeffs, x as f64))
            .collect();
        let (lower, upper) = constant_bounds(&predictions, BAND_Z * state.residual_std);
        let dates = state.training.continuation_dates(horizon)?;

        Ok(ForecastResult::from_columns(NAME, 0.95, &dates, &predictions, &lower, &upper))
    }

    fn model_info(&self) -> ModelInfo {
        let info = ModelInfo::new(NAME, self.is_fitted());
        match &self.state {
            Some(s) => info
                .with("coefficients", s.coeffs.clone())
                .with("residual_std", s.residual_std)
                .with("training_samples", s.training.len()),
            None => info,
        }
    }

    fn log_context(&self) -> &LogContext {
        &self.ctx
    }
}
