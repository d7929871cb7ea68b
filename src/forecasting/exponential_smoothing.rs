use serde::{Deserialize, Serialize};

use super::base::{check_confidence, check_horizon, check_length, Forecaster};
use super::error::{ForecastError, Result};
use super::optim::{nelder_mead, NelderMeadOptions};
use super::types::{ForecastResult, ModelInfo, PriceSeries};
use super::utils::{horizon_bounds, mean, population_std};
use crate::telemetry::LogContext;

const NAME: &str = "Exponential Smoothing";
const MIN_POINTS: usize = 10;
const WEEKLY: usize = 7;
const PARAM_FLOOR: f64 = 1e-4;
const PARAM_CEIL: f64 = 1.0 - 1e-4;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExponentialSmoothingConfig {
    /// `None` tries weekly seasonality once 14 points are available.
    pub seasonal_periods: Option<usize>,
    /// Additive trend component.
    pub trend: bool,
    /// `None` enables the seasonal component when two full cycles exist.
    pub seasonal: Option<bool>,
    pub confidence_level: f64,
}

impl Default for ExponentialSmoothingConfig {
    fn default() -> Self {
        ExponentialSmoothingConfig {
            seasonal_periods: None,
            trend: true,
            seasonal: None,
            confidence_level: 0.95,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SmoothingParams {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

#[derive(Debug, Clone)]
struct HoltWintersFit {
    params: SmoothingParams,
    period: Option<usize>,
    level: f64,
    trend: f64,
    season: Vec<f64>,
    sse: f64,
    residual_std: f64,
}

#[derive(Debug, Clone)]
struct FittedEts {
    fit: HoltWintersFit,
    training: PriceSeries,
}

/// Additive Holt-Winters. Falls back to trend-only when the seasonal fit fails.
pub struct ExponentialSmoothingForecaster {
    config: ExponentialSmoothingConfig,
    state: Option<FittedEts>,
    ctx: LogContext,
}

impl ExponentialSmoothingForecaster {
    pub fn new(config: ExponentialSmoothingConfig) -> Self {
        Self::with_context(config, LogContext::new("ExponentialSmoothingForecaster"))
    }

    pub fn with_context(config: ExponentialSmoothingConfig, ctx: LogContext) -> Self {
        ctx.in_scope(|| tracing::debug!("ExponentialSmoothingForecaster initialized"));
        ExponentialSmoothingForecaster {
            config,
            state: None,
            ctx,
        }
    }

    pub fn params(&self) -> Option<SmoothingParams> {
        self.state.as_ref().map(|s| s.fit.params)
    }

    /// Seasonal period actually used by the fitted model.
    pub fn seasonal_period(&self) -> Option<usize> {
        self.state.as_ref().and_then(|s| s.fit.period)
    }

    pub fn residual_std(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.fit.residual_std)
    }
}

impl Default for ExponentialSmoothingForecaster {
    fn default() -> Self {
        Self::new(ExponentialSmoothingConfig::default())
    }
}

/// One pass of the additive recursions; returns one-step-ahead fitted values and final state.
fn run_recursion(
    y: &[f64],
    params: &SmoothingParams,
    with_trend: bool,
    period: Option<usize>,
) -> (Vec<f64>, f64, f64, Vec<f64>) {
    let (mut level, mut trend, mut season) = initial_state(y, with_trend, period);
    let m = season.len();
    let mut fitted = Vec::with_capacity(y.len());

    for (t, &obs) in y.iter().enumerate() {
        let s = if m > 0 { season[t % m] } else { 0.0 };
        fitted.push(level + trend + s);

        let prev_level = level;
        level = params.alpha * (obs - s) + (1.0 - params.alpha) * (level + trend);
        if with_trend {
            trend = params.beta * (level - prev_level) + (1.0 - params.beta) * trend;
        }
        if m > 0 {
            season[t % m] = params.gamma * (obs - level) + (1.0 - params.gamma) * s;
        }
    }

    (fitted, level, trend, season)
}

fn initial_state(y: &[f64], with_trend: bool, period: Option<usize>) -> (f64, f64, Vec<f64>) {
    match period {
        Some(m) if y.len() >= 2 * m => {
            let level = mean(&y[..m]);
            let trend = if with_trend {
                (mean(&y[m..2 * m]) - level) / m as f64
            } else {
                0.0
            };
            let season = y[..m].iter().map(|v| v - level).collect();
            (level, trend, season)
        }
        _ => {
            let trend = if with_trend && y.len() > 1 { y[1] - y[0] } else { 0.0 };
            (y[0], trend, Vec::new())
        }
    }
}

fn sse(y: &[f64], fitted: &[f64]) -> f64 {
    y.iter().zip(fitted).map(|(a, f)| (a - f).powi(2)).sum()
}

fn fit_holt_winters(
    y: &[f64],
    with_trend: bool,
    period: Option<usize>,
) -> std::result::Result<HoltWintersFit, String> {
    if let Some(m) = period {
        if m < 2 {
            return Err(format!("seasonal period must be at least 2, got {}", m));
        }
        if y.len() < 2 * m {
            return Err(format!(
                "need two full seasonal cycles of {} points, got {} points",
                m,
                y.len()
            ));
        }
    }

    let seasonal = period.is_some();
    let to_params = |x: &[f64]| SmoothingParams {
        alpha: x[0],
        beta: if with_trend { x[1] } else { 0.0 },
        gamma: if seasonal { x[2] } else { 0.0 },
    };
    let objective = |x: &[f64]| {
        let (fitted, _, _, _) = run_recursion(y, &to_params(x), with_trend, period);
        sse(y, &fitted)
    };

    // Coarse grid to pick a starting simplex, then refine.
    let grid_a = [0.1, 0.3, 0.5, 0.7, 0.9];
    let grid_b: &[f64] = if with_trend { &[0.01, 0.1, 0.3] } else { &[0.0] };
    let grid_g: &[f64] = if seasonal { &[0.01, 0.1, 0.3] } else { &[0.0] };

    let mut start = [0.5, 0.1, 0.1];
    let mut best = f64::INFINITY;
    for &a in &grid_a {
        for &b in grid_b {
            for &g in grid_g {
                let v = objective(&[a, b, g]);
                if v < best {
                    best = v;
                    start = [a, b, g];
                }
            }
        }
    }

    let lower = [PARAM_FLOOR; 3];
    let upper = [PARAM_CEIL; 3];
    let minimum = nelder_mead(&start, &lower, &upper, NelderMeadOptions::default(), objective);

    let params = to_params(&minimum.x);
    let (fitted, level, trend, season) = run_recursion(y, &params, with_trend, period);
    let sse = sse(y, &fitted);
    if !sse.is_finite() {
        return Err("sum of squared errors is not finite".to_string());
    }

    let residuals: Vec<f64> = y.iter().zip(&fitted).map(|(a, f)| a - f).collect();

    Ok(HoltWintersFit {
        params,
        period,
        level,
        trend,
        season,
        sse,
        residual_std: population_std(&residuals),
    })
}

impl Forecaster for ExponentialSmoothingForecaster {
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
        tracing::info!("Fitting Exponential Smoothing model");

        check_length(NAME, series, MIN_POINTS)?;
        check_confidence(self.config.confidence_level)?;

        let y = series.prices();
        let period = self
            .config
            .seasonal_periods
            .or(if y.len() >= 2 * WEEKLY { Some(WEEKLY) } else { None });
        let use_seasonal = self
            .config
            .seasonal
            .unwrap_or_else(|| period.map_or(false, |m| y.len() >= 2 * m));

        let fit = match period.filter(|_| use_seasonal) {
            Some(m) => match fit_holt_winters(&y, self.config.trend, Some(m)) {
                Ok(fit) => fit,
                Err(reason) => {
                    tracing::warn!(%reason, "Failed to fit with seasonal component, retrying without seasonality");
                    fit_holt_winters(&y, self.config.trend, None)
                        .map_err(|reason| ForecastError::fitting(NAME, reason))?
                }
            },
            None => fit_holt_winters(&y, self.config.trend, None)
                .map_err(|reason| ForecastError::fitting(NAME, reason))?,
        };

        tracing::info!(
            alpha = fit.params.alpha,
            beta = fit.params.beta,
            gamma = fit.params.gamma,
            period = ?fit.period,
            residual_std = fit.residual_std,
            "Exponential Smoothing model fitted"
        );

        self.state = Some(FittedEts {
            fit,
            training: series.clone(),
        });
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<ForecastResult> {
        let state = self.state.as_ref().ok_or_else(|| ForecastError::not_fitted(NAME))?;
        check_horizon(horizon)?;
        let _guard = self.ctx.span().enter();
        tracing::info!(horizon, "predicting {} periods", horizon);

        let fit = &state.fit;
        let n = state.training.len();
        let m = fit.season.len();
        let predictions: Vec<f64> = (1..=horizon)
            .map(|h| {
                let s = if m > 0 { fit.season[(n + h - 1) % m] } else { 0.0 };
                fit.level + fit.trend * h as f64 + s
            })
            .collect();

        let (lower, upper) = horizon_bounds(&predictions, fit.residual_std, self.config.confidence_level);
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
            .with("trend", if self.config.trend { "add" } else { "none" });
        match &self.state {
            Some(s) => info
                .with("seasonal", if s.fit.period.is_some() { "add" } else { "none" })
                .with("seasonal_periods", s.fit.period)
                .with("alpha", s.fit.params.alpha)
                .with("beta", s.fit.params.beta)
                .with("gamma", s.fit.params.gamma)
                .with("sse", s.fit.sse)
                .with("residual_std", s.fit.residual_std)
                .with("training_samples", s.training.len()),
            None => info,
        }
    }

    fn log_context(&self) -> &LogContext {
        &self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn model(config: ExponentialSmoothingConfig) -> ExponentialSmoothingForecaster {
        ExponentialSmoothingForecaster::with_context(config, LogContext::disabled("test"))
    }

    fn weekly_pattern(n: usize) -> Vec<f64> {
        let profile = [0.0, 2.0, 4.0, 3.0, 1.0, -3.0, -7.0];
        (0..n).map(|i| 100.0 + 0.2 * i as f64 + profile[i % 7]).collect()
    }

    #[test]
    fn detects_weekly_seasonality() {
        let series = PriceSeries::from_daily(start(), &weekly_pattern(70)).unwrap();
        let mut m = model(ExponentialSmoothingConfig::default());
        m.fit(&series).unwrap();
        assert_eq!(m.seasonal_period(), Some(7));

        let result = m.predict(14).unwrap();
        assert_eq!(result.len(), 14);
        let expected = weekly_pattern(84);
        for (row, actual) in result.rows.iter().zip(&expected[70..]) {
            assert!((row.forecast - actual).abs() < 3.0, "{} vs {}", row.forecast, actual);
        }
    }

    #[test]
    fn short_series_skips_seasonality() {
        let prices: Vec<f64> = (0..12).map(|i| 10.0 + i as f64).collect();
        let series = PriceSeries::from_daily(start(), &prices).unwrap();
        let mut m = model(ExponentialSmoothingConfig::default());
        m.fit(&series).unwrap();
        assert_eq!(m.seasonal_period(), None);
        let forecast = m.predict(3).unwrap().forecasts();
        assert!((forecast[0] - 22.0).abs() < 0.5);
    }

    #[test]
    fn impossible_seasonal_request_falls_back_to_trend_only() {
        let prices: Vec<f64> = (0..20).map(|i| 50.0 + (i % 3) as f64).collect();
        let series = PriceSeries::from_daily(start(), &prices).unwrap();
        let mut m = model(ExponentialSmoothingConfig {
            seasonal_periods: Some(15),
            seasonal: Some(true),
            ..ExponentialSmoothingConfig::default()
        });
        m.fit(&series).unwrap();
        assert!(m.is_fitted());
        assert_eq!(m.seasonal_period(), None);
    }

    #[test]
    fn bounds_contain_forecast_and_widen() {
        let series = PriceSeries::from_daily(start(), &weekly_pattern(40)).unwrap();
        let mut m = model(ExponentialSmoothingConfig::default());
        let result = m.forecast(&series, 10).unwrap();
        let widths = result.widths();
        for row in &result.rows {
            assert!(row.lower_bound <= row.forecast && row.forecast <= row.upper_bound);
        }
        for w in widths.windows(2) {
            assert!(w[1] >= w[0]);
        }
    }

    #[test]
    fn params_stay_in_unit_interval() {
        let series = PriceSeries::from_daily(start(), &weekly_pattern(35)).unwrap();
        let mut m = model(ExponentialSmoothingConfig::default());
        m.fit(&series).unwrap();
        let p = m.params().unwrap();
        for v in [p.alpha, p.beta, p.gamma] {
            assert!(v > 0.0 && v < 1.0);
        }
    }

    #[test]
    fn too_short_is_insufficient() {
        let series = PriceSeries::from_daily(start(), &[1.0; 5]).unwrap();
        let mut m = model(ExponentialSmoothingConfig::default());
        assert!(matches!(m.fit(&series), Err(ForecastError::InsufficientData { .. })));
        assert!(matches!(m.predict(1), Err(ForecastError::NotFitted { .. })));
    }
}
