use super::base::{check_horizon, check_length, Forecaster};
use super::error::{ForecastError, Result};
use super::types::{ForecastResult, ModelInfo, PriceSeries};
use super::utils::{constant_bounds, mean, sample_std};
use crate::telemetry::LogContext;

const NAME: &str = "Ensemble";
const MIN_POINTS: usize = 2;
const TRAILING_WINDOW: usize = 30;
const BAND_Z: f64 = 1.96;

#[derive(Debug, Clone)]
struct FittedEnsemble {
    level: f64,
    std: f64,
    window: usize,
    training: PriceSeries,
}

/// Flat forecast at the trailing 30-point mean, band of +-1.96 training standard deviations.
pub struct EnsembleForecaster {
    state: Option<FittedEnsemble>,
    ctx: LogContext,
}

impl EnsembleForecaster {
    pub fn new() -> Self {
        Self::with_context(LogContext::new("EnsembleForecaster"))
    }

    pub fn with_context(ctx: LogContext) -> Self {
        ctx.in_scope(|| tracing::debug!("EnsembleForecaster initialized"));
        EnsembleForecaster { state: None, ctx }
    }
}

impl Default for EnsembleForecaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Forecaster for EnsembleForecaster {
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
        tracing::info!("Fitting Ensemble model");
        check_length(NAME, series, MIN_POINTS)?;

        let prices = series.prices();
        let window = TRAILING_WINDOW.min(prices.len());
        let level = mean(&prices[prices.len() - window..]);
        let std = sample_std(&prices);

        tracing::info!(level, std, window, "Ensemble model fitted");
        self.state = Some(FittedEnsemble {
            level,
            std,
            window,
            training: series.clone(),
        });
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<ForecastResult> {
        let state = self.state.as_ref().ok_or_else(|| ForecastError::not_fitted(NAME))?;
        check_horizon(horizon)?;
        let _guard = self.ctx.span().enter();
        tracing::info!(horizon, "predicting {} periods", horizon);

        let predictions = vec![state.level; horizon];
        let (lower, upper) = constant_bounds(&predictions, BAND_Z * state.std);
        let dates = state.training.continuation_dates(horizon)?;
        Ok(ForecastResult::from_columns(NAME, 0.95, &dates, &predictions, &lower, &upper))
    }

    fn model_info(&self) -> ModelInfo {
        let info = ModelInfo::new(NAME, self.is_fitted());
        match &self.state {
            Some(s) => info
                .with("level", s.level)
                .with("std_dev", s.std)
                .with("window", s.window),
            None => info,
        }
    }

    fn log_context(&self) -> &LogContext {
        &self.ctx
    }
}
