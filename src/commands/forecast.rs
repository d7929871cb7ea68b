use serde::{Deserialize, Serialize};

use crate::forecasting::{
    self, registry, BacktestReport, ForecastConfig, ForecastResult, ForecastSummary, ModelInfo,
    ModelKind, ModelScore, ModelSelector, PricePoint, PriceSeries,
};

pub const DEFAULT_HORIZON: usize = 90;
pub const DEFAULT_TEST_SIZE: f64 = 0.2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub prices: Vec<PricePoint>,
    /// Model id or display name; the selector picks one when absent.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub horizon: Option<usize>,
    #[serde(default)]
    pub confidence_level: Option<f64>,
    #[serde(default)]
    pub config: ForecastConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastResponse {
    pub model: ModelKind,
    /// True when the model was chosen by the selector rather than the caller.
    pub auto_selected: bool,
    pub forecast: ForecastResult,
    pub summary: Option<ForecastSummary>,
    pub model_info: ModelInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub prices: Vec<PricePoint>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub test_size: Option<f64>,
    #[serde(default)]
    pub config: ForecastConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub min_points: usize,
    pub available: bool,
}

fn build_series(prices: Vec<PricePoint>) -> Result<PriceSeries, String> {
    PriceSeries::new(prices).map_err(|e| format!("Invalid price history: {}", e))
}

fn resolve_model(
    requested: Option<&str>,
    series: &PriceSeries,
    config: &ForecastConfig,
) -> Result<(ModelKind, bool), String> {
    match requested {
        Some(name) => name
            .parse::<ModelKind>()
            .map(|kind| (kind, false))
            .map_err(|e| e.to_string()),
        None => Ok((ModelSelector::new(config.clone()).select_best_model(series), true)),
    }
}

pub fn run_forecast(request: ForecastRequest) -> Result<ForecastResponse, String> {
    let series = build_series(request.prices)?;
    let mut config = request.config;
    if let Some(level) = request.confidence_level {
        config.confidence_level = level;
    }
    let horizon = request.horizon.unwrap_or(DEFAULT_HORIZON);
    let (kind, auto_selected) = resolve_model(request.model.as_deref(), &series, &config)?;

    let mut model = registry::create(kind, &config).map_err(|e| e.to_string())?;
    let forecast = model
        .forecast(&series, horizon)
        .map_err(|e| format!("Failed to forecast with {}: {}", kind, e))?;

    Ok(ForecastResponse {
        model: kind,
        auto_selected,
        summary: forecast.summary(),
        model_info: model.model_info(),
        forecast,
    })
}

pub fn run_backtest_command(request: BacktestRequest) -> Result<BacktestReport, String> {
    let series = build_series(request.prices)?;
    let (kind, _) = resolve_model(request.model.as_deref(), &series, &request.config)?;
    forecasting::run_backtest(
        kind,
        &series,
        &request.config,
        request.test_size.unwrap_or(DEFAULT_TEST_SIZE),
    )
    .map_err(|e| format!("Backtest of {} failed: {}", kind, e))
}

/// Holdout ranking of every available model, best first.
pub fn rank_models(request: BacktestRequest) -> Result<Vec<ModelScore>, String> {
    let series = build_series(request.prices)?;
    ModelSelector::new(request.config)
        .evaluate_models(&series, request.test_size.unwrap_or(DEFAULT_TEST_SIZE))
        .map_err(|e| format!("Failed to rank models: {}", e))
}

pub fn list_models() -> Vec<ModelDescriptor> {
    ModelKind::ALL
        .iter()
        .map(|kind| ModelDescriptor {
            id: kind.id().to_string(),
            name: kind.display_name().to_string(),
            description: kind.description().to_string(),
            min_points: kind.min_points(),
            available: registry::is_available(*kind),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn points(n: usize) -> Vec<PricePoint> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n)
            .map(|i| PricePoint::new(start + Duration::days(i as i64), 20.0 + 0.1 * i as f64))
            .collect()
    }

    #[test]
    fn explicit_model_forecast() {
        let response = run_forecast(ForecastRequest {
            prices: points(60),
            model: Some("regression".to_string()),
            horizon: Some(10),
            confidence_level: None,
            config: ForecastConfig::default(),
        })
        .unwrap();

        assert_eq!(response.model, ModelKind::Regression);
        assert!(!response.auto_selected);
        assert_eq!(response.forecast.len(), 10);
        assert!(response.model_info.fitted);
        assert!(response.summary.is_some());
    }

    #[test]
    fn selector_picks_when_model_missing() {
        let response = run_forecast(ForecastRequest {
            prices: points(50),
            model: None,
            horizon: Some(5),
            confidence_level: Some(0.9),
            config: ForecastConfig::default(),
        })
        .unwrap();
        assert!(response.auto_selected);
        assert_eq!(response.model, ModelKind::SimpleMovingAverage);
        assert_eq!(response.forecast.confidence_level, 0.9);
    }

    #[test]
    fn errors_are_strings() {
        let err = run_forecast(ForecastRequest {
            prices: points(60),
            model: Some("lstm".to_string()),
            horizon: None,
            confidence_level: None,
            config: ForecastConfig::default(),
        })
        .unwrap_err();
        assert!(err.contains("lstm"));

        let err = run_forecast(ForecastRequest {
            prices: points(5),
            model: Some("sma".to_string()),
            horizon: Some(3),
            confidence_level: None,
            config: ForecastConfig::default(),
        })
        .unwrap_err();
        assert!(err.contains("Simple Moving Average"));
    }

    #[test]
    fn backtest_and_listing() {
        let report = run_backtest_command(BacktestRequest {
            prices: points(100),
            model: Some("ensemble".to_string()),
            test_size: Some(0.2),
            config: ForecastConfig::default(),
        })
        .unwrap();
        assert_eq!(report.test_len, 20);
        assert_eq!(report.train_len, 80);

        let models = list_models();
        assert_eq!(models.len(), ModelKind::ALL.len());
        assert!(models.iter().any(|m| m.id == "sma" && m.available));
    }
}
