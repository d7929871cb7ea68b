use serde::{Deserialize, Serialize};

use super::base::{check_confidence, check_horizon, check_length, Forecaster};
use super::error::{ForecastError, Result};
use super::types::{ForecastResult, ModelInfo, PriceSeries};
use super::utils::{calculate_trend_slope, horizon_bounds, mean, sample_std};
use crate::telemetry::LogContext;

const NAME: &str = "Simple Moving Average";
const MIN_POINTS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleMaConfig {
    /// `None` adapts to a quarter of the history, clamped to 7..=90.
    pub window_size: Option<usize>,
    /// `None` uses the window size.
    pub trend_periods: Option<usize>,
    pub confidence_level: f64,
    pub seasonality_periods: Option<usize>,
}

impl Default for SimpleMaConfig {
    fn default() -> Self {
        SimpleMaConfig {
            window_size: None,
            trend_periods: None,
            confidence_level: 0.95,
            seasonality_periods: None,
        }
    }
}

#[derive(Debug, Clone)]
struct FittedMa {
    window_size: usize,
    trend_periods: usize,
    moving_avg: f64,
    trend: f64,
    std: f64,
    seasonal: Option<Vec<f64>>,
    training: PriceSeries,
}

/// Moving average plus a linear trend, with an optional additive seasonal profile.
pub struct SimpleMaForecaster {
    config: SimpleMaConfig,
    state: Option<FittedMa>,
    ctx: LogContext,
}

impl SimpleMaForecaster {
    pub fn new(config: SimpleMaConfig) -> Self {
        Self::with_context(config, LogContext::new("SimpleMAForecaster"))
    }

    pub fn with_context(config: SimpleMaConfig, ctx: LogContext) -> Self {
        ctx.in_scope(|| tracing::debug!("SimpleMAForecaster initialized"));
        SimpleMaForecaster {
            config,
            state: None,
            ctx,
        }
    }

    pub fn moving_average(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.moving_avg)
    }

    pub fn trend(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.trend)
    }

    pub fn seasonal_component(&self) -> Option<&[f64]> {
        self.state.as_ref().and_then(|s| s.seasonal.as_deref())
    }

    fn fit_state(&self, series: &PriceSeries) -> Result<FittedMa> {
        check_length(NAME, series, MIN_POINTS)?;
        check_confidence(self.config.confidence_level)?;

        let prices = series.prices();
        let n = prices.len();

        let window_size = self
            .config
            .window_size
            .unwrap_or_else(|| (n / 4).clamp(7, 90));
        if window_size == 0 || window_size > n {
            return Err(ForecastError::invalid_parameter(
                "window_size",
                format!("must be between 1 and {}, got {}", n, window_size),
            ));
        }

        let trend_periods = self.config.trend_periods.unwrap_or(window_size).clamp(1, n);

        let moving_avg = mean(&prices[n - window_size..]);
        let trend = calculate_trend_slope(&prices[n - trend_periods..]);
        let std = sample_std(&prices);

        let seasonal = match self.config.seasonality_periods {
            Some(period) if period > 0 && n >= period * 2 => Some(seasonal_profile(&prices, period)),
            _ => None,
        };

        Ok(FittedMa {
            window_size,
            trend_periods,
            moving_avg,
            trend,
            std,
            seasonal,
            training: series.clone(),
        })
    }
}

impl Default for SimpleMaForecaster {
    fn default() -> Self {
        Self::new(SimpleMaConfig::default())
    }
}

/// Mean price of each phase minus the overall mean.
fn seasonal_profile(prices: &[f64], period: usize) -> Vec<f64> {
    let overall = mean(prices);
    (0..period)
        .map(|phase| {
            let values: Vec<f64> = prices.iter().skip(phase).step_by(period).copied().collect();
            mean(&values) - overall
        })
        .collect()
}

impl Forecaster for SimpleMaForecaster {
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

        let state = self.fit_state(series)?;
        tracing::info!(
            window_size = state.window_size,
            trend_periods = state.trend_periods,
            moving_avg = state.moving_avg,
            trend = state.trend,
            seasonal = state.seasonal.is_some(),
            "simple moving average fitted"
        );
        self.state = Some(state);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<ForecastResult> {
        let state = self.state.as_ref().ok_or_else(|| ForecastError::not_fitted(NAME))?;
        check_horizon(horizon)?;
        let _guard = self.ctx.span().enter();
        tracing::info!(horizon, "predicting {} periods", horizon);

        let n = state.training.len();
        let predictions: Vec<f64> = (1..=horizon)
            .map(|i| {
                let mut pred = state.moving_avg + state.trend * i as f64;
                if let Some(seasonal) = &state.seasonal {
                    pred += seasonal[(n + i - 1) % seasonal.len()];
                }
                pred
            })
            .collect();

        let (lower, upper) = horizon_bounds(&predictions, state.std, self.config.confidence_level);
        let dates = state.training.continuation_dates(horizon)?;

        Ok(ForecastResult::from_columns(
            NAME,
            self.config.confidence_level,
            &dates,
            &predictions,
            &lower,
            &upper,
        ))
    }

    fn model_info(&self) -> ModelInfo {
        let info = ModelInfo::new(NAME, self.is_fitted())
            .with("confidence_level", self.config.confidence_level);
        match &self.state {
            Some(s) => info
                .with("window_size", s.window_size)
                .with("trend_periods", s.trend_periods)
                .with("moving_average", s.moving_avg)
                .with("trend", s.trend)
                .with("std_dev", s.std)
                .with("has_seasonality", s.seasonal.is_some())
                .with("training_samples", s.training.len()),
            None => info,
        }
    }

    fn log_context(&self) -> &LogContext {
        &self.ctx
    }
}
