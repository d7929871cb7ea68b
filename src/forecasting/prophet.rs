//! Additive trend plus seasonality decomposition in the style of Prophet.
//!
//! Trend is piecewise linear with potential changepoints spread over the first part of the
//! history; seasonality is a Fourier series per period. All coefficients are fitted at once by
//! ridge-penalised least squares, the penalty strength coming from the prior scales. Intervals
//! are native: future trend changes and observation noise are simulated and the band is read
//! off the sample quantiles.

use chrono::NaiveDate;
use nalgebra::{DMatrix, DVector};
use ndarray_rand::rand_distr::StandardNormal;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::base::{check_confidence, check_horizon, check_length, Forecaster};
use super::error::{ForecastError, Result};
use super::types::{ForecastResult, ModelInfo, PriceSeries};
use crate::telemetry::LogContext;

const NAME: &str = "Prophet";
const MIN_POINTS: usize = 10;
const WEEKLY_ORDER: usize = 3;
const YEARLY_ORDER: usize = 10;
const DAILY_ORDER: usize = 4;
/// Observation weight relative to the prior scales; y is unit-scaled before fitting.
const NOISE_SCALE: f64 = 0.01;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProphetConfig {
    pub changepoint_prior_scale: f64,
    pub seasonality_prior_scale: f64,
    pub yearly_seasonality: bool,
    pub weekly_seasonality: bool,
    pub daily_seasonality: bool,
    pub n_changepoints: usize,
    /// Share of the history in which changepoints may sit.
    pub changepoint_range: f64,
    pub interval_width: f64,
    pub uncertainty_samples: usize,
    pub seed: u64,
}

impl Default for ProphetConfig {
    fn default() -> Self {
        ProphetConfig {
            changepoint_prior_scale: 0.05,
            seasonality_prior_scale: 10.0,
            yearly_seasonality: true,
            weekly_seasonality: true,
            daily_seasonality: false,
            n_changepoints: 25,
            changepoint_range: 0.8,
            interval_width: 0.80,
            uncertainty_samples: 1000,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Seasonality {
    period_days: f64,
    order: usize,
}

impl ProphetConfig {
    fn seasonalities(&self) -> Vec<Seasonality> {
        let mut out = Vec::new();
        if self.yearly_seasonality {
            out.push(Seasonality {
                period_days: 365.25,
                order: YEARLY_ORDER,
            });
        }
        if self.weekly_seasonality {
            out.push(Seasonality {
                period_days: 7.0,
                order: WEEKLY_ORDER,
            });
        }
        if self.daily_seasonality {
            out.push(Seasonality {
                period_days: 1.0,
                order: DAILY_ORDER,
            });
        }
        out
    }
}

fn epoch_days(date: NaiveDate) -> f64 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN);
    (date - epoch).num_days() as f64
}

fn fourier_terms(day: f64, seasonalities: &[Seasonality], out: &mut Vec<f64>) {
    for s in seasonalities {
        for k in 1..=s.order {
            let x = 2.0 * std::f64::consts::PI * k as f64 * day / s.period_days;
            out.push(x.sin());
            out.push(x.cos());
        }
    }
}

#[derive(Debug, Clone)]
struct FittedProphet {
    first_day: f64,
    span_days: f64,
    y_scale: f64,
    changepoints: Vec<f64>,
    seasonalities: Vec<Seasonality>,
    intercept: f64,
    slope: f64,
    deltas: Vec<f64>,
    seasonal_coefs: Vec<f64>,
    sigma_obs: f64,
    training: PriceSeries,
}

impl FittedProphet {
    fn scaled_time(&self, date: NaiveDate) -> f64 {
        (epoch_days(date) - self.first_day) / self.span_days
    }

    fn trend(&self, t: f64) -> f64 {
        let mut value = self.intercept + self.slope * t;
        for (c, delta) in self.changepoints.iter().zip(&self.deltas) {
            if t > *c {
                value += delta * (t - c);
            }
        }
        value
    }

    fn seasonal(&self, date: NaiveDate) -> f64 {
        let mut terms = Vec::with_capacity(self.seasonal_coefs.len());
        fourier_terms(epoch_days(date), &self.seasonalities, &mut terms);
        terms.iter().zip(&self.seasonal_coefs).map(|(x, b)| x * b).sum()
    }
}

pub struct ProphetForecaster {
    config: ProphetConfig,
    state: Option<FittedProphet>,
    ctx: LogContext,
}

impl ProphetForecaster {
    pub fn new(config: ProphetConfig) -> Self {
        Self::with_context(config, LogContext::new("ProphetForecaster"))
    }

    pub fn with_context(config: ProphetConfig, ctx: LogContext) -> Self {
        ctx.in_scope(|| tracing::debug!("ProphetForecaster initialized"));
        ProphetForecaster {
            config,
            state: None,
            ctx,
        }
    }

    /// Trend slope changes at each changepoint, in the scaled units the model is fitted in.
    pub fn changepoint_deltas(&self) -> Option<&[f64]> {
        self.state.as_ref().map(|s| s.deltas.as_slice())
    }

    fn validate_config(&self) -> Result<()> {
        let c = &self.config;
        if !(c.changepoint_prior_scale > 0.0) {
            return Err(ForecastError::invalid_parameter(
                "changepoint_prior_scale",
                "must be positive",
            ));
        }
        if !(c.seasonality_prior_scale > 0.0) {
            return Err(ForecastError::invalid_parameter(
                "seasonality_prior_scale",
                "must be positive",
            ));
        }
        if !(c.changepoint_range > 0.0 && c.changepoint_range <= 1.0) {
            return Err(ForecastError::invalid_parameter(
                "changepoint_range",
                "must lie in (0, 1]",
            ));
        }
        if c.uncertainty_samples == 0 {
            return Err(ForecastError::invalid_parameter(
                "uncertainty_samples",
                "must be at least 1",
            ));
        }
        check_confidence(c.interval_width)
    }

    fn fit_state(&self, series: &PriceSeries) -> Result<FittedProphet> {
        let points = series.points();
        let n = points.len();
        let first_day = epoch_days(series.first_date());
        let span_days = (epoch_days(series.last_date()) - first_day).max(1.0);

        let y_scale = points
            .iter()
            .map(|p| p.price.abs())
            .fold(0.0, f64::max)
            .max(1e-12);
        let y: Vec<f64> = points.iter().map(|p| p.price / y_scale).collect();
        let t: Vec<f64> = points
            .iter()
            .map(|p| (epoch_days(p.date) - first_day) / span_days)
            .collect();

        // Changepoints sit on observed times, evenly spaced by index.
        let history = ((n as f64) * self.config.changepoint_range).floor() as usize;
        let n_cp = self.config.n_changepoints.min(history.saturating_sub(1));
        let changepoints: Vec<f64> = (1..=n_cp)
            .map(|i| t[i * (history - 1) / n_cp.max(1)].min(t[history - 1]))
            .collect();

        let seasonalities = self.config.seasonalities();
        let n_seasonal: usize = seasonalities.iter().map(|s| 2 * s.order).sum();
        let n_cols = 2 + n_cp + n_seasonal;

        let mut design = DMatrix::zeros(n, n_cols);
        let mut row = Vec::with_capacity(n_cols);
        for (i, p) in points.iter().enumerate() {
            row.clear();
            row.push(1.0);
            row.push(t[i]);
            row.extend(changepoints.iter().map(|c| (t[i] - c).max(0.0)));
            fourier_terms(epoch_days(p.date), &seasonalities, &mut row);
            for (j, v) in row.iter().enumerate() {
                design[(i, j)] = *v;
            }
        }

        let mut penalty = vec![1e-8, 1e-8];
        let cp_lambda = NOISE_SCALE / self.config.changepoint_prior_scale.powi(2);
        let season_lambda = NOISE_SCALE / self.config.seasonality_prior_scale.powi(2);
        penalty.extend(std::iter::repeat(cp_lambda).take(n_cp));
        penalty.extend(std::iter::repeat(season_lambda.max(1e-8)).take(n_seasonal));

        let target = DVector::from_column_slice(&y);
        let mut normal = design.transpose() * &design;
        for (j, lambda) in penalty.iter().enumerate() {
            normal[(j, j)] += lambda;
        }
        let rhs = design.transpose() * &target;
        let beta = match normal.clone().cholesky() {
            Some(chol) => chol.solve(&rhs),
            None => normal
                .lu()
                .solve(&rhs)
                .ok_or_else(|| ForecastError::fitting(NAME, "normal equations are singular"))?,
        };
        if beta.iter().any(|b| !b.is_finite()) {
            return Err(ForecastError::fitting(NAME, "coefficients are not finite"));
        }

        let fitted = &design * &beta;
        let residuals: Vec<f64> = y.iter().zip(fitted.iter()).map(|(a, f)| a - f).collect();
        let sigma_obs = (residuals.iter().map(|r| r * r).sum::<f64>() / n as f64).sqrt();

        Ok(FittedProphet {
            first_day,
            span_days,
            y_scale,
            changepoints,
            seasonalities,
            intercept: beta[0],
            slope: beta[1],
            deltas: beta.iter().skip(2).take(n_cp).copied().collect(),
            seasonal_coefs: beta.iter().skip(2 + n_cp).copied().collect(),
            sigma_obs,
            training: series.clone(),
        })
    }
}

impl Default for ProphetForecaster {
    fn default() -> Self {
        Self::new(ProphetConfig::default())
    }
}

/// Draw from Laplace(0, scale) by inverse CDF.
fn laplace(rng: &mut StdRng, scale: f64) -> f64 {
    let u: f64 = rng.gen_range(-0.5..0.5);
    -scale * u.signum() * (1.0 - 2.0 * u.abs()).max(f64::MIN_POSITIVE).ln()
}

/// Linear-interpolated quantile of an unsorted sample.
fn quantile(values: &mut [f64], q: f64) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let pos = q.clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    values[lo] + (values[hi] - values[lo]) * (pos - lo as f64)
}

impl Forecaster for ProphetForecaster {
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
        tracing::info!("Fitting Prophet model");

        check_length(NAME, series, MIN_POINTS)?;
        self.validate_config()?;

        let state = self.fit_state(series).map_err(|e| {
            tracing::error!(error = %e, "Error fitting Prophet");
            e
        })?;
        tracing::info!(
            changepoints = state.changepoints.len(),
            seasonal_terms = state.seasonal_coefs.len(),
            sigma_obs = state.sigma_obs * state.y_scale,
            "Prophet model fitted"
        );
        self.state = Some(state);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<ForecastResult> {
        let state = self.state.as_ref().ok_or_else(|| ForecastError::not_fitted(NAME))?;
        check_horizon(horizon)?;
        let _guard = self.ctx.span().enter();
        tracing::info!(horizon, "predicting {} periods", horizon);

        let dates = state.training.continuation_dates(horizon)?;
        let times: Vec<f64> = dates.iter().map(|d| state.scaled_time(*d)).collect();
        let seasonal: Vec<f64> = dates.iter().map(|d| state.seasonal(*d)).collect();
        let point: Vec<f64> = times
            .iter()
            .zip(&seasonal)
            .map(|(t, s)| state.trend(*t) + s)
            .collect();

        // Future changepoints arrive at the historical rate with Laplace magnitudes.
        let n_train = state.training.len() as f64;
        let cp_rate = (state.changepoints.len() as f64 / n_train).min(1.0);
        let mean_abs_delta = if state.deltas.is_empty() {
            0.0
        } else {
            state.deltas.iter().map(|d| d.abs()).sum::<f64>() / state.deltas.len() as f64
        } + 1e-8;

        let n_samples = self.config.uncertainty_samples;
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut samples = vec![vec![0.0; n_samples]; horizon];
        for s in 0..n_samples {
            let mut slope_change = 0.0;
            let mut offset = 0.0;
            let mut prev_t = 1.0;
            for (h, &t) in times.iter().enumerate() {
                offset += slope_change * (t - prev_t);
                prev_t = t;
                if rng.gen::<f64>() < cp_rate {
                    slope_change += laplace(&mut rng, mean_abs_delta);
                }
                let noise: f64 = rng.sample(StandardNormal);
                samples[h][s] = point[h] + offset + state.sigma_obs * noise;
            }
        }

        let alpha = (1.0 - self.config.interval_width) / 2.0;
        let mut forecast = Vec::with_capacity(horizon);
        let mut lower = Vec::with_capacity(horizon);
        let mut upper = Vec::with_capacity(horizon);
        for (h, draws) in samples.iter_mut().enumerate() {
            let yhat = point[h] * state.y_scale;
            let lo = quantile(draws, alpha) * state.y_scale;
            let hi = quantile(draws, 1.0 - alpha) * state.y_scale;
            forecast.push(yhat);
            lower.push(lo.min(yhat));
            upper.push(hi.max(yhat));
        }

        Ok(ForecastResult::from_columns(
            NAME,
            self.config.interval_width,
            &dates,
            &forecast,
            &lower,
            &upper,
        ))
    }

    fn model_info(&self) -> ModelInfo {
        let c = &self.config;
        let info = ModelInfo::new(NAME, self.is_fitted())
            .with("changepoint_prior_scale", c.changepoint_prior_scale)
            .with("seasonality_prior_scale", c.seasonality_prior_scale)
            .with("yearly_seasonality", c.yearly_seasonality)
            .with("weekly_seasonality", c.weekly_seasonality)
            .with("daily_seasonality", c.daily_seasonality)
            .with("interval_width", c.interval_width);
        match &self.state {
            Some(s) => info
                .with("n_changepoints", s.changepoints.len())
                .with("sigma_obs", s.sigma_obs * s.y_scale)
                .with("training_samples", s.training.len()),
            None => info,
        }
    }

    fn log_context(&self) -> &LogContext {
        &self.ctx
    }
}
