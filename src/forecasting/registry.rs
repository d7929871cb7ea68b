//! Model identifiers and the factory that builds them.
//!
//! Models behind optional cargo features are always listed, but `create` refuses them with
//! `UnavailableModel` when the feature is compiled out. Callers check `is_available` before
//! offering a model.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::base::Forecaster;
use super::ensemble::EnsembleForecaster;
use super::error::{ForecastError, Result};
use super::exponential_smoothing::{ExponentialSmoothingConfig, ExponentialSmoothingForecaster};
use super::gradient_boosting::{GradientBoostingConfig, GradientBoostingForecaster};
use super::regression::RegressionForecaster;
use super::simple_ma::{SimpleMaConfig, SimpleMaForecaster};
use crate::telemetry::LogContext;

#[cfg(feature = "arima")]
use super::arima::{ArimaConfig, ArimaForecaster};
#[cfg(feature = "prophet")]
use super::prophet::{ProphetConfig, ProphetForecaster};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[serde(alias = "sma")]
    SimpleMovingAverage,
    #[serde(alias = "ets")]
    ExponentialSmoothing,
    #[serde(alias = "gbt", alias = "xgboost")]
    GradientBoosting,
    Arima,
    Prophet,
    Regression,
    Ensemble,
}

impl ModelKind {
    pub const ALL: [ModelKind; 7] = [
        ModelKind::SimpleMovingAverage,
        ModelKind::ExponentialSmoothing,
        ModelKind::GradientBoosting,
        ModelKind::Arima,
        ModelKind::Prophet,
        ModelKind::Regression,
        ModelKind::Ensemble,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelKind::SimpleMovingAverage => "Simple Moving Average",
            ModelKind::ExponentialSmoothing => "Exponential Smoothing",
            ModelKind::GradientBoosting => "Gradient Boosting",
            ModelKind::Arima => "ARIMA",
            ModelKind::Prophet => "Prophet",
            ModelKind::Regression => "Regression",
            ModelKind::Ensemble => "Ensemble",
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            ModelKind::SimpleMovingAverage => "sma",
            ModelKind::ExponentialSmoothing => "ets",
            ModelKind::GradientBoosting => "gbt",
            ModelKind::Arima => "arima",
            ModelKind::Prophet => "prophet",
            ModelKind::Regression => "regression",
            ModelKind::Ensemble => "ensemble",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ModelKind::SimpleMovingAverage => "Moving average plus linear trend, optional seasonal profile",
            ModelKind::ExponentialSmoothing => "Additive Holt-Winters with weekly seasonality detection",
            ModelKind::GradientBoosting => "Boosted regression trees over lag and rolling features",
            ModelKind::Arima => "ARIMA with stepwise order selection",
            ModelKind::Prophet => "Piecewise-linear trend with Fourier seasonality",
            ModelKind::Regression => "Linear trend over the full history",
            ModelKind::Ensemble => "Trailing 30-point mean",
        }
    }

    /// Shortest history the model accepts with its default configuration.
    pub fn min_points(&self) -> usize {
        match self {
            ModelKind::SimpleMovingAverage | ModelKind::ExponentialSmoothing => 10,
            ModelKind::GradientBoosting => GradientBoostingConfig::default().min_points(),
            ModelKind::Arima => 30,
            ModelKind::Prophet => 10,
            ModelKind::Regression => 3,
            ModelKind::Ensemble => 2,
        }
    }

    fn feature(&self) -> Option<&'static str> {
        match self {
            ModelKind::Arima => Some("arima"),
            ModelKind::Prophet => Some("prophet"),
            _ => None,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ModelKind {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_lowercase();
        let kind = match key.as_str() {
            "sma" | "simple_ma" | "simple moving average" => ModelKind::SimpleMovingAverage,
            "ets" | "exponential_smoothing" | "exponential smoothing" => {
                ModelKind::ExponentialSmoothing
            }
            "gbt" | "xgboost" | "gradient_boosting" | "gradient boosting" => {
                ModelKind::GradientBoosting
            }
            "arima" => ModelKind::Arima,
            "prophet" => ModelKind::Prophet,
            "regression" => ModelKind::Regression,
            "ensemble" => ModelKind::Ensemble,
            _ => {
                return Err(ForecastError::invalid_parameter(
                    "model",
                    format!("unknown model '{}'", s),
                ))
            }
        };
        Ok(kind)
    }
}

/// Per-model settings plus the shared confidence level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Applied to every model that uses z-score bounds.
    pub confidence_level: f64,
    pub simple_ma: SimpleMaConfig,
    pub exponential_smoothing: ExponentialSmoothingConfig,
    pub gradient_boosting: GradientBoostingConfig,
    #[cfg(feature = "arima")]
    pub arima: ArimaConfig,
    #[cfg(feature = "prophet")]
    pub prophet: ProphetConfig,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        ForecastConfig {
            confidence_level: 0.95,
            simple_ma: SimpleMaConfig::default(),
            exponential_smoothing: ExponentialSmoothingConfig::default(),
            gradient_boosting: GradientBoostingConfig::default(),
            #[cfg(feature = "arima")]
            arima: ArimaConfig::default(),
            #[cfg(feature = "prophet")]
            prophet: ProphetConfig::default(),
        }
    }
}

pub fn is_available(kind: ModelKind) -> bool {
    match kind {
        ModelKind::Arima => cfg!(feature = "arima"),
        ModelKind::Prophet => cfg!(feature = "prophet"),
        _ => true,
    }
}

pub fn available_models() -> Vec<ModelKind> {
    ModelKind::ALL.into_iter().filter(|k| is_available(*k)).collect()
}

/// Build a forecaster with its own log context.
pub fn create(kind: ModelKind, config: &ForecastConfig) -> Result<Box<dyn Forecaster>> {
    create_with_context(kind, config, LogContext::new(kind.display_name()))
}

pub fn create_with_context(
    kind: ModelKind,
    config: &ForecastConfig,
    ctx: LogContext,
) -> Result<Box<dyn Forecaster>> {
    if !is_available(kind) {
        return Err(ForecastError::UnavailableModel {
            model: kind.display_name().to_string(),
            reason: format!(
                "built without the `{}` feature",
                kind.feature().unwrap_or_default()
            ),
        });
    }

    let level = config.confidence_level;
    let model: Box<dyn Forecaster> = match kind {
        ModelKind::SimpleMovingAverage => Box::new(SimpleMaForecaster::with_context(
            SimpleMaConfig {
                confidence_level: level,
                ..config.simple_ma.clone()
            },
            ctx,
        )),
        ModelKind::ExponentialSmoothing => Box::new(ExponentialSmoothingForecaster::with_context(
            ExponentialSmoothingConfig {
                confidence_level: level,
                ..config.exponential_smoothing.clone()
            },
            ctx,
        )),
        ModelKind::GradientBoosting => Box::new(GradientBoostingForecaster::with_context(
            GradientBoostingConfig {
                confidence_level: level,
                ..config.gradient_boosting.clone()
            },
            ctx,
        )),
        #[cfg(feature = "arima")]
        ModelKind::Arima => Box::new(ArimaForecaster::with_context(
            ArimaConfig {
                confidence_level: level,
                ..config.arima.clone()
            },
            ctx,
        )),
        #[cfg(feature = "prophet")]
        ModelKind::Prophet => Box::new(ProphetForecaster::with_context(config.prophet.clone(), ctx)),
        ModelKind::Regression => Box::new(RegressionForecaster::with_context(ctx)),
        ModelKind::Ensemble => Box::new(EnsembleForecaster::with_context(ctx)),
        #[allow(unreachable_patterns)]
        other => {
            return Err(ForecastError::UnavailableModel {
                model: other.display_name().to_string(),
                reason: "not compiled into this build".to_string(),
            })
        }
    };
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ids_and_display_names() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.id().parse::<ModelKind>().unwrap(), kind);
            assert_eq!(kind.display_name().parse::<ModelKind>().unwrap(), kind);
        }
        assert_eq!("XGBoost".parse::<ModelKind>().unwrap(), ModelKind::GradientBoosting);
        assert!("lstm".parse::<ModelKind>().is_err());
    }

    #[test]
    fn created_models_carry_display_names() {
        let config = ForecastConfig::default();
        for kind in available_models() {
            let model = create(kind, &config).unwrap();
            assert_eq!(model.name(), kind.display_name());
            assert_eq!(model.min_points(), kind.min_points());
            assert!(!model.is_fitted());
        }
    }

    #[test]
    fn baseline_models_are_always_available() {
        let models = available_models();
        assert!(models.contains(&ModelKind::SimpleMovingAverage));
        assert!(models.contains(&ModelKind::Regression));
        assert!(models.contains(&ModelKind::Ensemble));
    }

    #[cfg(not(feature = "arima"))]
    #[test]
    fn arima_is_unavailable_without_feature() {
        let err = create(ModelKind::Arima, &ForecastConfig::default()).unwrap_err();
        assert!(matches!(err, ForecastError::UnavailableModel { .. }));
    }

    #[test]
    fn display_matches_name() {
        assert_eq!(ModelKind::Arima.to_string(), "ARIMA");
        assert_eq!(ModelKind::SimpleMovingAverage.to_string(), "Simple Moving Average");
    }
}
