//! ARIMA(p, d, q) with automatic order selection.
//!
//! The differencing order comes from a lag-1 autocorrelation test, the ARMA part is fitted by
//! Hannan-Rissanen regression (a long autoregression supplies innovation estimates, then one
//! least-squares pass estimates AR and MA terms together), and (p, q) is chosen by a stepwise
//! search over an information criterion. Prediction intervals come from the psi-weights of
//! the integrated model.

use std::collections::BTreeMap;
use std::fmt;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::base::{check_confidence, check_horizon, check_length, Forecaster};
use super::error::{ForecastError, Result};
use super::types::{ForecastResult, ModelInfo, PriceSeries};
use super::utils::{calculate_autocorrelation, difference_series, z_score};
use crate::telemetry::LogContext;

const NAME: &str = "ARIMA";
const MIN_POINTS: usize = 30;
const STATIONARITY_THRESHOLD: f64 = 0.8;
const MAX_STEPWISE_ROUNDS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl ArimaOrder {
    pub fn new(p: usize, d: usize, q: usize) -> Self {
        ArimaOrder { p, d, q }
    }
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ARIMA({},{},{})", self.p, self.d, self.q)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionCriterion {
    Aic,
    Bic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArimaConfig {
    /// Used as-is when `auto_select_order` is false.
    pub order: Option<ArimaOrder>,
    pub auto_select_order: bool,
    pub max_p: usize,
    pub max_d: usize,
    pub max_q: usize,
    pub criterion: SelectionCriterion,
    pub confidence_level: f64,
}

impl Default for ArimaConfig {
    fn default() -> Self {
        ArimaConfig {
            order: None,
            auto_select_order: true,
            max_p: 5,
            max_d: 2,
            max_q: 5,
            criterion: SelectionCriterion::Aic,
            confidence_level: 0.95,
        }
    }
}

/// Fitted ARMA part on the differenced series.
#[derive(Debug, Clone)]
struct ArmaFit {
    p: usize,
    q: usize,
    constant: f64,
    ar: Vec<f64>,
    ma: Vec<f64>,
    sigma2: f64,
    residuals: Vec<f64>,
    log_likelihood: f64,
    aic: f64,
    bic: f64,
}

impl ArmaFit {
    fn score(&self, criterion: SelectionCriterion) -> f64 {
        match criterion {
            SelectionCriterion::Aic => self.aic,
            SelectionCriterion::Bic => self.bic,
        }
    }
}

#[derive(Debug, Clone)]
struct FittedArima {
    order: ArimaOrder,
    arma: ArmaFit,
    /// Last value of the series differenced k times, for k in 0..d.
    tails: Vec<f64>,
    differenced: Vec<f64>,
    training: PriceSeries,
}

pub struct ArimaForecaster {
    config: ArimaConfig,
    state: Option<FittedArima>,
    ctx: LogContext,
}

impl ArimaForecaster {
    pub fn new(config: ArimaConfig) -> Self {
        Self::with_context(config, LogContext::new("ARIMAForecaster"))
    }

    pub fn with_context(config: ArimaConfig, ctx: LogContext) -> Self {
        ctx.in_scope(|| tracing::debug!(auto = config.auto_select_order, "ARIMAForecaster initialized"));
        ArimaForecaster {
            config,
            state: None,
            ctx,
        }
    }

    pub fn order(&self) -> Option<ArimaOrder> {
        self.state.as_ref().map(|s| s.order)
    }

    pub fn aic(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.arma.aic)
    }

    pub fn bic(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.arma.bic)
    }

    pub fn ar_coefficients(&self) -> Option<&[f64]> {
        self.state.as_ref().map(|s| s.arma.ar.as_slice())
    }

    pub fn ma_coefficients(&self) -> Option<&[f64]> {
        self.state.as_ref().map(|s| s.arma.ma.as_slice())
    }

    /// A fixed order must respect the configured maxima and leave data after differencing.
    fn validate_order(&self, n: usize) -> Result<()> {
        let c = &self.config;
        let Some(order) = c.order.filter(|_| !c.auto_select_order) else {
            return Ok(());
        };
        if order.p > c.max_p || order.d > c.max_d || order.q > c.max_q {
            return Err(ForecastError::invalid_parameter(
                "order",
                format!(
                    "{} exceeds the maximum ARIMA({},{},{})",
                    order, c.max_p, c.max_d, c.max_q
                ),
            ));
        }
        if order.d >= n {
            return Err(ForecastError::invalid_parameter(
                "order",
                format!("cannot difference {} points {} times", n, order.d),
            ));
        }
        Ok(())
    }

    fn fit_state(&self, series: &PriceSeries) -> Result<FittedArima> {
        let y = series.prices();

        let fixed = self.config.order.filter(|_| !self.config.auto_select_order);
        let d = match fixed {
            Some(order) => order.d,
            None => select_differencing(&y, self.config.max_d),
        };

        let mut tails = Vec::with_capacity(d);
        let mut w = y.clone();
        for _ in 0..d {
            tails.push(w[w.len() - 1]);
            w = difference_series(&w, 1);
        }
        let with_constant = d == 0;

        let arma = match fixed {
            Some(order) => fit_arma(&w, order.p, order.q, with_constant).ok_or_else(|| {
                ForecastError::fitting(NAME, format!("could not estimate {}", order))
            })?,
            None => stepwise_search(&w, &self.config, with_constant)
                .ok_or_else(|| ForecastError::fitting(NAME, "no candidate order could be estimated"))?,
        };

        Ok(FittedArima {
            order: ArimaOrder::new(arma.p, d, arma.q),
            arma,
            tails,
            differenced: w,
            training: series.clone(),
        })
    }
}

impl Default for ArimaForecaster {
    fn default() -> Self {
        Self::new(ArimaConfig::default())
    }
}

fn is_stationary(data: &[f64]) -> bool {
    calculate_autocorrelation(data, 1).abs() < STATIONARITY_THRESHOLD
}

/// Difference until the lag-1 autocorrelation drops below the threshold, at most `max_d` times.
fn select_differencing(y: &[f64], max_d: usize) -> usize {
    let mut w = y.to_vec();
    let mut d = 0;
    while d < max_d && !is_stationary(&w) {
        w = difference_series(&w, 1);
        d += 1;
    }
    d
}

fn least_squares(rows: &[Vec<f64>], target: &[f64]) -> Option<Vec<f64>> {
    let n_rows = rows.len();
    let n_cols = rows.first().map(|r| r.len())?;
    if n_cols == 0 || n_rows < n_cols {
        return None;
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    let x = DMatrix::from_row_slice(n_rows, n_cols, &flat);
    let y = DVector::from_column_slice(target);
    let beta = x.svd(true, true).solve(&y, 1e-10).ok()?;
    let beta: Vec<f64> = beta.iter().copied().collect();
    beta.iter().all(|b| b.is_finite()).then_some(beta)
}

/// Residuals of a long AR fit, zero where the lags are not available.
fn long_ar_residuals(w: &[f64], m: usize) -> Option<Vec<f64>> {
    let rows: Vec<Vec<f64>> = (m..w.len())
        .map(|t| {
            let mut row = vec![1.0];
            row.extend((1..=m).map(|i| w[t - i]));
            row
        })
        .collect();
    let target = &w[m..];
    let beta = least_squares(&rows, target)?;

    let mut residuals = vec![0.0; w.len()];
    for (t, row) in (m..w.len()).zip(&rows) {
        let fitted: f64 = row.iter().zip(&beta).map(|(a, b)| a * b).sum();
        residuals[t] = w[t] - fitted;
    }
    Some(residuals)
}

/// Innovations implied by an ARMA model, conditional on zero pre-sample errors.
fn arma_residuals(w: &[f64], constant: f64, ar: &[f64], ma: &[f64]) -> Vec<f64> {
    let start = ar.len().max(ma.len());
    let mut e = vec![0.0; w.len()];
    for t in start..w.len() {
        let mut fitted = constant;
        for (i, phi) in ar.iter().enumerate() {
            fitted += phi * w[t - 1 - i];
        }
        for (j, theta) in ma.iter().enumerate() {
            fitted += theta * e[t - 1 - j];
        }
        e[t] = w[t] - fitted;
    }
    e
}

fn fit_arma(w: &[f64], p: usize, q: usize, with_constant: bool) -> Option<ArmaFit> {
    let n = w.len();
    let n_params = p + q + usize::from(with_constant);

    // Long autoregression for the innovation proxies.
    let m = if q > 0 {
        let ln2 = (n as f64).ln().powi(2).round() as usize;
        let lo = p.max(q) + 1;
        let hi = n / 3;
        if lo > hi {
            return None;
        }
        ln2.clamp(lo, hi)
    } else {
        0
    };
    let proxies = if q > 0 { long_ar_residuals(w, m)? } else { vec![0.0; n] };

    let start = (m + q).max(p);
    if n < start + n_params + 5 {
        return None;
    }

    let (constant, ar, ma) = if n_params == 0 {
        (0.0, Vec::new(), Vec::new())
    } else {
        let rows: Vec<Vec<f64>> = (start..n)
            .map(|t| {
                let mut row = Vec::with_capacity(n_params);
                if with_constant {
                    row.push(1.0);
                }
                row.extend((1..=p).map(|i| w[t - i]));
                row.extend((1..=q).map(|j| proxies[t - j]));
                row
            })
            .collect();
        let beta = least_squares(&rows, &w[start..])?;
        let offset = usize::from(with_constant);
        let constant = if with_constant { beta[0] } else { 0.0 };
        (
            constant,
            beta[offset..offset + p].to_vec(),
            beta[offset + p..offset + p + q].to_vec(),
        )
    };

    let residuals = arma_residuals(w, constant, &ar, &ma);
    let effective = &residuals[p.max(q)..];
    if effective.is_empty() {
        return None;
    }
    let n_eff = effective.len() as f64;
    let sigma2 = (effective.iter().map(|e| e * e).sum::<f64>() / n_eff).max(1e-12);
    if !sigma2.is_finite() {
        return None;
    }

    // +1 for the innovation variance.
    let k = (n_params + 1) as f64;
    let log_likelihood = -0.5 * n_eff * ((2.0 * std::f64::consts::PI * sigma2).ln() + 1.0);
    let aic = -2.0 * log_likelihood + 2.0 * k;
    let bic = -2.0 * log_likelihood + k * n_eff.ln();

    Some(ArmaFit {
        p,
        q,
        constant,
        ar,
        ma,
        sigma2,
        residuals,
        log_likelihood,
        aic,
        bic,
    })
}

/// Stepwise (p, q) search: start from a few seed orders, then walk to the best neighbour
/// until nothing improves.
fn stepwise_search(w: &[f64], config: &ArimaConfig, with_constant: bool) -> Option<ArmaFit> {
    let mut tried: BTreeMap<(usize, usize), Option<ArmaFit>> = BTreeMap::new();
    let mut evaluate = |p: usize, q: usize| -> Option<ArmaFit> {
        tried
            .entry((p, q))
            .or_insert_with(|| fit_arma(w, p, q, with_constant))
            .clone()
    };

    let seeds = [(2, 2), (0, 0), (1, 0), (0, 1)];
    let mut best: Option<ArmaFit> = None;
    for (p, q) in seeds {
        let (p, q) = (p.min(config.max_p), q.min(config.max_q));
        if let Some(fit) = evaluate(p, q) {
            if best.as_ref().map_or(true, |b| fit.score(config.criterion) < b.score(config.criterion)) {
                best = Some(fit);
            }
        }
    }
    let mut best = best?;

    for _ in 0..MAX_STEPWISE_ROUNDS {
        let (p, q) = (best.p as i64, best.q as i64);
        let neighbours = [
            (p - 1, q),
            (p + 1, q),
            (p, q - 1),
            (p, q + 1),
            (p - 1, q - 1),
            (p + 1, q + 1),
        ];

        let mut improved = false;
        for (np, nq) in neighbours {
            if np < 0 || nq < 0 || np as usize > config.max_p || nq as usize > config.max_q {
                continue;
            }
            if let Some(fit) = evaluate(np as usize, nq as usize) {
                if fit.score(config.criterion) < best.score(config.criterion) - 1e-9 {
                    best = fit;
                    improved = true;
                }
            }
        }
        if !improved {
            break;
        }
    }

    Some(best)
}

/// Coefficients of phi(B) * (1 - B)^d written as `1 - sum(a_i B^i)`; returns the `a_i`.
fn integrated_ar(ar: &[f64], d: usize) -> Vec<f64> {
    // Polynomial in B, constant term first.
    let mut poly = vec![1.0];
    poly.extend(ar.iter().map(|a| -a));
    for _ in 0..d {
        let mut next = vec![0.0; poly.len() + 1];
        for (i, c) in poly.iter().enumerate() {
            next[i] += c;
            next[i + 1] -= c;
        }
        poly = next;
    }
    poly[1..].iter().map(|c| -c).collect()
}

/// psi_0 = 1, psi_j = theta_j + sum_i a_i psi_{j-i}.
fn psi_weights(ar_integrated: &[f64], ma: &[f64], horizon: usize) -> Vec<f64> {
    let mut psi = vec![0.0; horizon];
    if horizon == 0 {
        return psi;
    }
    psi[0] = 1.0;
    for j in 1..horizon {
        let mut value = ma.get(j - 1).copied().unwrap_or(0.0);
        for (i, a) in ar_integrated.iter().enumerate() {
            if i + 1 <= j {
                value += a * psi[j - 1 - i];
            }
        }
        psi[j] = value;
    }
    psi
}

/// Undo `tails.len()` differences; `tails[k]` is the last value at differencing level k.
fn integrate(mut forecast: Vec<f64>, tails: &[f64]) -> Vec<f64> {
    for &last in tails.iter().rev() {
        let mut level = last;
        for v in forecast.iter_mut() {
            level += *v;
            *v = level;
        }
    }
    forecast
}

impl Forecaster for ArimaForecaster {
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
        tracing::info!("Fitting ARIMA model");

        check_length(NAME, series, MIN_POINTS)?;
        check_confidence(self.config.confidence_level)?;
        self.validate_order(series.len())?;
        if self.config.auto_select_order {
            tracing::info!(
                max_p = self.config.max_p,
                max_d = self.config.max_d,
                max_q = self.config.max_q,
                "Auto-selecting ARIMA order"
            );
        }

        let state = self.fit_state(series).map_err(|e| {
            tracing::error!(error = %e, "Error fitting ARIMA");
            e
        })?;
        tracing::info!(
            order = %state.order,
            aic = state.arma.aic,
            bic = state.arma.bic,
            sigma2 = state.arma.sigma2,
            "ARIMA model fitted"
        );
        self.state = Some(state);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<ForecastResult> {
        let state = self.state.as_ref().ok_or_else(|| ForecastError::not_fitted(NAME))?;
        check_horizon(horizon)?;
        let _guard = self.ctx.span().enter();
        tracing::info!(horizon, "predicting {} periods", horizon);

        let arma = &state.arma;
        let w = &state.differenced;
        let mut history = w.clone();
        let mut errors = arma.residuals.clone();
        let mut diff_forecast = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            let t = history.len();
            let mut next = arma.constant;
            for (i, phi) in arma.ar.iter().enumerate() {
                next += phi * history[t - 1 - i];
            }
            for (j, theta) in arma.ma.iter().enumerate() {
                next += theta * errors[t - 1 - j];
            }
            history.push(next);
            errors.push(0.0);
            diff_forecast.push(next);
        }
        let predictions = integrate(diff_forecast, &state.tails);

        let z = z_score(self.config.confidence_level);
        let psi = psi_weights(&integrated_ar(&arma.ar, state.order.d), &arma.ma, horizon);
        let mut cumulative = 0.0;
        let (lower, upper): (Vec<f64>, Vec<f64>) = predictions
            .iter()
            .zip(&psi)
            .map(|(&f, &weight)| {
                cumulative += weight * weight;
                let margin = z * (arma.sigma2 * cumulative).sqrt();
                (f - margin, f + margin)
            })
            .unzip();

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
            .with("auto_select_order", self.config.auto_select_order);
        match &self.state {
            Some(s) => info
                .with("order", vec![s.order.p, s.order.d, s.order.q])
                .with("aic", s.arma.aic)
                .with("bic", s.arma.bic)
                .with("log_likelihood", s.arma.log_likelihood)
                .with("sigma2", s.arma.sigma2)
                .with("ar", s.arma.ar.clone())
                .with("ma", s.arma.ma.clone())
                .with("training_samples", s.training.len()),
            None => info.with(
                "order",
                self.config.order.map(|o| vec![o.p, o.d, o.q]),
            ),
        }
    }

    fn log_context(&self) -> &LogContext {
        &self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use ndarray_rand::rand_distr::StandardNormal;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()
    }

    fn model(config: ArimaConfig) -> ArimaForecaster {
        ArimaForecaster::with_context(config, LogContext::disabled("test"))
    }

    fn ar1(n: usize, phi: f64, mean: f64, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut x = 0.0;
        (0..n)
            .map(|_| {
                let e: f64 = rng.sample(StandardNormal);
                x = phi * x + e;
                mean + x
            })
            .collect()
    }

    #[test]
    fn recovers_ar1_coefficient() {
        let series = PriceSeries::from_daily(start(), &ar1(600, 0.6, 50.0, 7)).unwrap();
        let mut m = model(ArimaConfig {
            order: Some(ArimaOrder::new(1, 0, 0)),
            auto_select_order: false,
            ..ArimaConfig::default()
        });
        m.fit(&series).unwrap();
        assert_eq!(m.order(), Some(ArimaOrder::new(1, 0, 0)));
        let phi = m.ar_coefficients().unwrap()[0];
        assert!((phi - 0.6).abs() < 0.1, "phi = {}", phi);

        // Long-run forecast reverts towards the mean.
        let result = m.predict(200).unwrap();
        let last = result.rows.last().unwrap().forecast;
        assert!((last - 50.0).abs() < 1.0);
    }

    #[test]
    fn trending_series_is_differenced() {
        let mut rng = StdRng::seed_from_u64(11);
        let prices: Vec<f64> = (0..200)
            .map(|i| 100.0 + 0.5 * i as f64 + rng.gen_range(-1.0..1.0))
            .collect();
        let series = PriceSeries::from_daily(start(), &prices).unwrap();
        let mut m = model(ArimaConfig::default());
        m.fit(&series).unwrap();

        let order = m.order().unwrap();
        assert!(order.d >= 1);
        assert!(order.p <= 5 && order.q <= 5);
        assert!(m.aic().unwrap().is_finite());
        assert!(m.bic().unwrap().is_finite());

        let forecast = m.predict(10).unwrap().forecasts();
        assert!(forecast[9] > prices[199] - 5.0);
    }

    #[test]
    fn intervals_widen_with_horizon() {
        let series = PriceSeries::from_daily(start(), &ar1(120, 0.5, 20.0, 3)).unwrap();
        let mut m = model(ArimaConfig::default());
        let result = m.forecast(&series, 15).unwrap();
        assert_eq!(result.len(), 15);
        for row in &result.rows {
            assert!(row.lower_bound <= row.forecast && row.forecast <= row.upper_bound);
        }
        for w in result.widths().windows(2) {
            assert!(w[1] >= w[0] - 1e-12);
        }
    }

    #[test]
    fn random_walk_psi_weights_are_ones() {
        let a = integrated_ar(&[], 1);
        assert_eq!(a, vec![1.0]);
        let psi = psi_weights(&a, &[], 4);
        assert_eq!(psi, vec![1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn integrated_polynomial_for_ar1_d1() {
        // (1 - 0.5B)(1 - B) = 1 - 1.5B + 0.5B^2
        let a = integrated_ar(&[0.5], 1);
        assert_relative_eq!(a[0], 1.5);
        assert_relative_eq!(a[1], -0.5);
    }

    #[test]
    fn integrate_undoes_differencing() {
        let y = [1.0, 4.0, 9.0, 16.0, 25.0];
        let d1 = difference_series(&y, 1);
        let tails = [y[4], d1[3]];
        // Next second differences are all 2.
        let out = integrate(vec![2.0, 2.0], &tails);
        assert_eq!(out, vec![36.0, 49.0]);
    }

    #[test]
    fn needs_thirty_points() {
        let series = PriceSeries::from_daily(start(), &ar1(29, 0.3, 10.0, 1)).unwrap();
        let mut m = model(ArimaConfig::default());
        assert!(matches!(
            m.fit(&series),
            Err(ForecastError::InsufficientData { required: 30, actual: 29, .. })
        ));
        assert!(m.aic().is_none());
        assert!(matches!(m.predict(3), Err(ForecastError::NotFitted { .. })));
    }

    #[test]
    fn fixed_order_must_respect_maxima() {
        let fixed = |order: ArimaOrder, max_d: usize| ArimaConfig {
            order: Some(order),
            auto_select_order: false,
            max_d,
            ..ArimaConfig::default()
        };

        let series = PriceSeries::from_daily(start(), &ar1(400, 0.3, 10.0, 2)).unwrap();
        let mut m = model(fixed(ArimaOrder::new(9, 3, 9), 2));
        assert!(matches!(
            m.fit(&series),
            Err(ForecastError::InvalidParameter { ref name, .. }) if name == "order"
        ));
        assert!(!m.is_fitted());

        let short = PriceSeries::from_daily(start(), &ar1(35, 0.3, 10.0, 3)).unwrap();
        let mut m = model(fixed(ArimaOrder::new(1, 40, 0), 50));
        assert!(matches!(
            m.fit(&short),
            Err(ForecastError::InvalidParameter { ref name, .. }) if name == "order"
        ));

        let mut m = model(fixed(ArimaOrder::new(1, 1, 0), 2));
        assert!(m.fit(&short).is_ok());
    }
}
