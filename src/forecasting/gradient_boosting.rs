//! Gradient-boosted regression trees over lag and rolling-window features.
//!
//! The series is turned into a supervised problem: each row holds `lag_1..lag_n` plus
//! `rolling_mean_3`, `rolling_std_3` and `rolling_mean_7` of the values strictly before the
//! target. Multi-step forecasts are autoregressive, each prediction is pushed into a
//! fixed-capacity [`RollingWindow`] and feeds the next step's features.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use super::base::{check_confidence, check_horizon, check_length, Forecaster};
use super::error::{ForecastError, Result};
use super::types::{ForecastResult, ModelInfo, PriceSeries};
use super::utils::{horizon_bounds, mean, population_std, sample_std};
use crate::telemetry::LogContext;

const NAME: &str = "Gradient Boosting";
const LONG_WINDOW: usize = 7;
const SHORT_WINDOW: usize = 3;
const MIN_TRAINING_ROWS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientBoostingConfig {
    pub n_lags: usize,
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub confidence_level: f64,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        GradientBoostingConfig {
            n_lags: 7,
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 5,
            min_samples_leaf: 1,
            confidence_level: 0.95,
        }
    }
}

impl GradientBoostingConfig {
    /// Values of history a single feature row needs.
    pub fn lookback(&self) -> usize {
        self.n_lags.max(LONG_WINDOW)
    }

    pub fn min_points(&self) -> usize {
        self.lookback() + MIN_TRAINING_ROWS
    }

    pub fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = (1..=self.n_lags).map(|i| format!("lag_{}", i)).collect();
        names.push("rolling_mean_3".to_string());
        names.push("rolling_std_3".to_string());
        names.push("rolling_mean_7".to_string());
        names
    }
}

/// Fixed-capacity ring of the most recent values, oldest overwritten first.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    buf: Vec<f64>,
    head: usize,
    len: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        RollingWindow {
            buf: vec![0.0; capacity.max(1)],
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, value: f64) {
        self.buf[self.head] = value;
        self.head = (self.head + 1) % self.buf.len();
        self.len = (self.len + 1).min(self.buf.len());
    }

    /// `back(1)` is the newest value; `None` for lag 0 or past the stored length.
    pub fn back(&self, k: usize) -> Option<f64> {
        if k == 0 || k > self.len {
            return None;
        }
        let cap = self.buf.len();
        Some(self.buf[(self.head + cap - k) % cap])
    }

    /// The newest `k` values, oldest first.
    pub fn last(&self, k: usize) -> Vec<f64> {
        (1..=k.min(self.len)).rev().filter_map(|i| self.back(i)).collect()
    }
}

/// Feature row for the value that follows `history`; `history` is oldest first and holds at
/// least `lookback` values.
fn feature_row(history: &[f64], n_lags: usize) -> Vec<f64> {
    let n = history.len();
    let mut row = Vec::with_capacity(n_lags + 3);
    for lag in 1..=n_lags {
        row.push(history[n - lag]);
    }
    let short = &history[n - SHORT_WINDOW..];
    row.push(mean(short));
    row.push(sample_std(short));
    row.push(mean(&history[n - LONG_WINDOW..]));
    row
}

fn build_training_set(prices: &[f64], config: &GradientBoostingConfig) -> (Array2<f64>, Array1<f64>) {
    let lookback = config.lookback();
    let n_features = config.n_lags + 3;
    let n_rows = prices.len() - lookback;

    let mut x = Array2::zeros((n_rows, n_features));
    let mut y = Array1::zeros(n_rows);
    for (row, t) in (lookback..prices.len()).enumerate() {
        for (col, v) in feature_row(&prices[..t], config.n_lags).into_iter().enumerate() {
            x[[row, col]] = v;
        }
        y[row] = prices[t];
    }
    (x, y)
}

/// Column-wise z-score, zero-variance columns keep unit scale.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    means: Array1<f64>,
    scales: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(x: &Array2<f64>) -> Self {
        let n_cols = x.ncols();
        let mut means = Array1::zeros(n_cols);
        let mut scales = Array1::ones(n_cols);
        for (j, column) in x.axis_iter(Axis(1)).enumerate() {
            let values = column.to_vec();
            means[j] = mean(&values);
            let std = population_std(&values);
            if std > 1e-12 {
                scales[j] = std;
            }
        }
        StandardScaler { means, scales }
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = x.clone();
        for mut row in out.axis_iter_mut(Axis(0)) {
            row -= &self.means;
            row /= &self.scales;
        }
        out
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(self.scales.iter()))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }
}

#[derive(Debug, Clone)]
enum TreeNode {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf(value) => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }
}

/// CART regression tree on squared error.
#[derive(Debug, Clone)]
struct RegressionTree {
    root: TreeNode,
}

struct TreeParams {
    max_depth: usize,
    min_samples_leaf: usize,
}

impl RegressionTree {
    fn fit(x: &Array2<f64>, target: &[f64], params: &TreeParams) -> Self {
        let indices: Vec<usize> = (0..target.len()).collect();
        RegressionTree {
            root: grow(x, target, &indices, 0, params),
        }
    }

    fn predict(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.root.predict(row)
    }
}

fn leaf(target: &[f64], indices: &[usize]) -> TreeNode {
    let sum: f64 = indices.iter().map(|&i| target[i]).sum();
    TreeNode::Leaf(sum / indices.len().max(1) as f64)
}

fn grow(
    x: &Array2<f64>,
    target: &[f64],
    indices: &[usize],
    depth: usize,
    params: &TreeParams,
) -> TreeNode {
    if depth >= params.max_depth || indices.len() < 2 * params.min_samples_leaf.max(1) {
        return leaf(target, indices);
    }

    let Some((feature, threshold)) = best_split(x, target, indices, params.min_samples_leaf.max(1)) else {
        return leaf(target, indices);
    };

    let (left, right): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .partition(|&&i| x[[i, feature]] <= threshold);
    if left.is_empty() || right.is_empty() {
        return leaf(target, indices);
    }

    TreeNode::Split {
        feature,
        threshold,
        left: Box::new(grow(x, target, &left, depth + 1, params)),
        right: Box::new(grow(x, target, &right, depth + 1, params)),
    }
}

/// Best (feature, threshold) by squared-error reduction, using sorted prefix sums.
fn best_split(
    x: &Array2<f64>,
    target: &[f64],
    indices: &[usize],
    min_leaf: usize,
) -> Option<(usize, f64)> {
    let n = indices.len();
    let total_sum: f64 = indices.iter().map(|&i| target[i]).sum();
    let total_sq: f64 = indices.iter().map(|&i| target[i] * target[i]).sum();
    let parent_sse = total_sq - total_sum * total_sum / n as f64;
    if parent_sse <= 1e-12 {
        return None;
    }

    let mut best: Option<(usize, f64)> = None;
    let mut best_sse = parent_sse;
    let mut order = indices.to_vec();

    for feature in 0..x.ncols() {
        order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for k in 0..n - 1 {
            let y = target[order[k]];
            left_sum += y;
            left_sq += y * y;

            let n_left = k + 1;
            let n_right = n - n_left;
            if n_left < min_leaf || n_right < min_leaf {
                continue;
            }
            let here = x[[order[k], feature]];
            let next = x[[order[k + 1], feature]];
            if next <= here {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / n_left as f64)
                + (right_sq - right_sum * right_sum / n_right as f64);
            if sse < best_sse - 1e-12 {
                best_sse = sse;
                best = Some((feature, 0.5 * (here + next)));
            }
        }
    }

    best
}

#[derive(Debug, Clone)]
struct Booster {
    base: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl Booster {
    fn fit(x: &Array2<f64>, y: &Array1<f64>, config: &GradientBoostingConfig) -> Self {
        let base = y.mean().unwrap_or(0.0);
        let params = TreeParams {
            max_depth: config.max_depth,
            min_samples_leaf: config.min_samples_leaf,
        };
        let mut current = vec![base; y.len()];
        let mut trees = Vec::with_capacity(config.n_estimators);

        for _ in 0..config.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(&current).map(|(a, p)| a - p).collect();
            let tree = RegressionTree::fit(x, &residuals, &params);
            for (i, row) in x.axis_iter(Axis(0)).enumerate() {
                current[i] += config.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        Booster {
            base,
            learning_rate: config.learning_rate,
            trees,
        }
    }

    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.base
            + self.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }
}

#[derive(Debug, Clone)]
struct FittedGbt {
    scaler: StandardScaler,
    booster: Booster,
    residual_std: f64,
    n_rows: usize,
    training: PriceSeries,
}

pub struct GradientBoostingForecaster {
    config: GradientBoostingConfig,
    state: Option<FittedGbt>,
    ctx: LogContext,
}

impl GradientBoostingForecaster {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self::with_context(config, LogContext::new("GradientBoostingForecaster"))
    }

    pub fn with_context(config: GradientBoostingConfig, ctx: LogContext) -> Self {
        ctx.in_scope(|| {
            tracing::debug!(n_lags = config.n_lags, "GradientBoostingForecaster initialized")
        });
        GradientBoostingForecaster {
            config,
            state: None,
            ctx,
        }
    }

    pub fn residual_std(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.residual_std)
    }

    fn validate_config(&self) -> Result<()> {
        let c = &self.config;
        if c.n_lags == 0 {
            return Err(ForecastError::invalid_parameter("n_lags", "must be at least 1"));
        }
        if c.n_estimators == 0 {
            return Err(ForecastError::invalid_parameter("n_estimators", "must be at least 1"));
        }
        if !(c.learning_rate > 0.0 && c.learning_rate <= 1.0) {
            return Err(ForecastError::invalid_parameter(
                "learning_rate",
                format!("must lie in (0, 1], got {}", c.learning_rate),
            ));
        }
        check_confidence(c.confidence_level)
    }
}

impl Default for GradientBoostingForecaster {
    fn default() -> Self {
        Self::new(GradientBoostingConfig::default())
    }
}

impl Forecaster for GradientBoostingForecaster {
    fn name(&self) -> &'static str {
        NAME
    }

    fn min_points(&self) -> usize {
        self.config.min_points()
    }

    fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    fn fit(&mut self, series: &PriceSeries) -> Result<()> {
        self.state = None;
        let ctx = self.ctx.clone();
        let _guard = ctx.span().enter();
        tracing::info!("Fitting gradient boosting model");

        self.validate_config()?;
        check_length(NAME, series, self.config.min_points())?;

        let prices = series.prices();
        let (x, y) = build_training_set(&prices, &self.config);
        let scaler = StandardScaler::fit(&x);
        let x_scaled = scaler.transform(&x);
        let booster = Booster::fit(&x_scaled, &y, &self.config);

        let residuals: Vec<f64> = x_scaled
            .axis_iter(Axis(0))
            .zip(y.iter())
            .map(|(row, actual)| actual - booster.predict_row(row))
            .collect();
        let residual_std = population_std(&residuals);
        if !residual_std.is_finite() {
            return Err(ForecastError::fitting(NAME, "in-sample residuals are not finite"));
        }

        tracing::info!(
            rows = y.len(),
            trees = booster.trees.len(),
            residual_std,
            "Gradient boosting model fitted"
        );

        self.state = Some(FittedGbt {
            scaler,
            booster,
            residual_std,
            n_rows: y.len(),
            training: series.clone(),
        });
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<ForecastResult> {
        let state = self.state.as_ref().ok_or_else(|| ForecastError::not_fitted(NAME))?;
        check_horizon(horizon)?;
        let _guard = self.ctx.span().enter();
        tracing::info!(horizon, "predicting {} periods", horizon);

        let lookback = self.config.lookback();
        let mut window = RollingWindow::new(lookback);
        let prices = state.training.prices();
        for &p in &prices[prices.len() - lookback..] {
            window.push(p);
        }

        let mut predictions = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            let features = feature_row(&window.last(lookback), self.config.n_lags);
            let scaled = Array1::from(state.scaler.transform_row(&features));
            let next = state.booster.predict_row(scaled.view());
            predictions.push(next);
            window.push(next);
        }

        let (lower, upper) =
            horizon_bounds(&predictions, state.residual_std, self.config.confidence_level);
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
            .with("n_lags", self.config.n_lags)
            .with("n_estimators", self.config.n_estimators)
            .with("learning_rate", self.config.learning_rate)
            .with("max_depth", self.config.max_depth)
            .with("features", self.config.feature_names());
        match &self.state {
            Some(s) => info
                .with("residual_std", s.residual_std)
                .with("training_rows", s.n_rows)
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
        NaiveDate::from_ymd_opt(2022, 6, 1).unwrap()
    }

    fn model(config: GradientBoostingConfig) -> GradientBoostingForecaster {
        GradientBoostingForecaster::with_context(config, LogContext::disabled("test"))
    }

    #[test]
    fn ring_buffer_keeps_newest_values() {
        let mut w = RollingWindow::new(3);
        for v in 1..=5 {
            w.push(v as f64);
        }
        assert_eq!(w.len(), 3);
        assert_eq!(w.capacity(), 3);
        assert_eq!(w.back(1), Some(5.0));
        assert_eq!(w.back(3), Some(3.0));
        assert_eq!(w.back(0), None);
        assert_eq!(w.back(4), None);
        assert_eq!(w.last(3), vec![3.0, 4.0, 5.0]);
        assert_eq!(w.last(10), vec![3.0, 4.0, 5.0]);

        let empty = RollingWindow::new(4);
        assert_eq!(empty.back(1), None);
        assert!(empty.last(2).is_empty());
    }

    #[test]
    fn feature_row_layout() {
        let history: Vec<f64> = (1..=8).map(|v| v as f64).collect();
        let row = feature_row(&history, 2);
        assert_eq!(row.len(), 5);
        assert_eq!(row[0], 8.0);
        assert_eq!(row[1], 7.0);
        assert!((row[2] - 7.0).abs() < 1e-12);
        assert!((row[3] - 1.0).abs() < 1e-12);
        assert!((row[4] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn training_set_drops_incomplete_rows() {
        let prices: Vec<f64> = (0..30).map(|v| v as f64).collect();
        let config = GradientBoostingConfig::default();
        let (x, y) = build_training_set(&prices, &config);
        assert_eq!(x.nrows(), 23);
        assert_eq!(x.ncols(), 10);
        assert_eq!(y[0], 7.0);
        assert_eq!(x[[0, 0]], 6.0);
    }

    #[test]
    fn scaler_handles_constant_columns() {
        let x = Array2::from_shape_vec((3, 2), vec![1.0, 5.0, 2.0, 5.0, 3.0, 5.0]).unwrap();
        let scaler = StandardScaler::fit(&x);
        let out = scaler.transform(&x);
        assert!(out.iter().all(|v| v.is_finite()));
        assert_eq!(out[[0, 1]], 0.0);
        assert!((out[[1, 0]]).abs() < 1e-12);
    }

    #[test]
    fn single_tree_splits_step_function() {
        let x = Array2::from_shape_vec((6, 1), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let y = [1.0, 1.0, 1.0, 9.0, 9.0, 9.0];
        let tree = RegressionTree::fit(
            &x,
            &y,
            &TreeParams {
                max_depth: 3,
                min_samples_leaf: 1,
            },
        );
        assert_eq!(tree.predict(x.row(0)), 1.0);
        assert_eq!(tree.predict(x.row(5)), 9.0);
    }

    #[test]
    fn learns_repeating_pattern() {
        let pattern = [10.0, 12.0, 15.0, 11.0, 9.0, 13.0, 14.0];
        let prices: Vec<f64> = (0..140).map(|i| pattern[i % 7]).collect();
        let series = PriceSeries::from_daily(start(), &prices).unwrap();
        let mut m = model(GradientBoostingConfig::default());
        let result = m.forecast(&series, 7).unwrap();

        for (i, row) in result.rows.iter().enumerate() {
            let expected = pattern[(140 + i) % 7];
            assert!((row.forecast - expected).abs() < 1.0, "{} vs {}", row.forecast, expected);
            assert!(row.lower_bound <= row.forecast && row.forecast <= row.upper_bound);
        }
        assert!(m.residual_std().unwrap() < 0.5);
    }

    #[test]
    fn minimum_length_depends_on_lags() {
        let config = GradientBoostingConfig {
            n_lags: 12,
            ..GradientBoostingConfig::default()
        };
        assert_eq!(config.min_points(), 22);
        let series = PriceSeries::from_daily(start(), &[5.0; 21]).unwrap();
        let mut m = model(config);
        assert!(matches!(
            m.fit(&series),
            Err(ForecastError::InsufficientData { required: 22, actual: 21, .. })
        ));
        assert!(!m.is_fitted());
    }

    #[test]
    fn flat_series_predicts_flat() {
        let series = PriceSeries::from_daily(start(), &[42.0; 30]).unwrap();
        let mut m = model(GradientBoostingConfig::default());
        let result = m.forecast(&series, 5).unwrap();
        for row in &result.rows {
            assert!((row.forecast - 42.0).abs() < 1e-9);
        }
    }
}
