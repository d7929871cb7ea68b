//! Default model choice and holdout ranking.

use serde::{Deserialize, Serialize};

use super::backtest::train_test_split;
use super::error::Result;
use super::registry::{self, ForecastConfig, ModelKind};
use super::types::PriceSeries;
use crate::telemetry::LogContext;

const SHORT_HISTORY: usize = 100;
const MEDIUM_HISTORY: usize = 365;

/// Suggested model for a history of `len` points. Advisory only.
pub fn select_model(len: usize) -> ModelKind {
    if len < SHORT_HISTORY {
        ModelKind::SimpleMovingAverage
    } else if len < MEDIUM_HISTORY {
        ModelKind::Regression
    } else {
        ModelKind::Arima
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelScore {
    pub model: ModelKind,
    pub rmse: Option<f64>,
    pub mape: Option<f64>,
    /// Why the model could not be scored, if it could not.
    pub error: Option<String>,
}

pub struct ModelSelector {
    config: ForecastConfig,
    ctx: LogContext,
}

impl ModelSelector {
    pub fn new(config: ForecastConfig) -> Self {
        Self::with_context(config, LogContext::new("ModelSelector"))
    }

    pub fn with_context(config: ForecastConfig, ctx: LogContext) -> Self {
        ctx.in_scope(|| tracing::debug!("ModelSelector initialized"));
        ModelSelector { config, ctx }
    }

    /// `select_model`, falling back to the moving average when the suggestion is not compiled in.
    pub fn select_best_model(&self, series: &PriceSeries) -> ModelKind {
        let _guard = self.ctx.span().enter();
        let suggested = select_model(series.len());
        let chosen = if registry::is_available(suggested) {
            suggested
        } else {
            tracing::warn!(model = %suggested, "suggested model unavailable, using Simple Moving Average");
            ModelKind::SimpleMovingAverage
        };
        tracing::info!(points = series.len(), model = %chosen, "Selecting best model");
        chosen
    }

    /// Fit every available model on the training part and rank by holdout RMSE, best first.
    /// Models that fail to fit are listed last with their error.
    pub fn evaluate_models(&self, series: &PriceSeries, test_size: f64) -> Result<Vec<ModelScore>> {
        let _guard = self.ctx.span().enter();
        let (train, test) = train_test_split(series, test_size)?;
        tracing::info!(train = train.len(), test = test.len(), "Evaluating models");

        let mut scores: Vec<ModelScore> = registry::available_models()
            .into_iter()
            .map(|kind| {
                let outcome = registry::create_with_context(kind, &self.config, self.ctx.child(kind.display_name()))
                    .and_then(|mut model| {
                        model.fit(&train)?;
                        model.evaluate_holdout(&test)
                    });
                match outcome {
                    Ok(metrics) => ModelScore {
                        model: kind,
                        rmse: Some(metrics.rmse),
                        mape: metrics.mape,
                        error: None,
                    },
                    Err(e) => {
                        tracing::warn!(model = %kind, error = %e, "model skipped during evaluation");
                        ModelScore {
                            model: kind,
                            rmse: None,
                            mape: None,
                            error: Some(e.to_string()),
                        }
                    }
                }
            })
            .collect();

        scores.sort_by(|a, b| match (a.rmse, b.rmse) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.model.cmp(&b.model),
        });
        Ok(scores)
    }
}

impl Default for ModelSelector {
    fn default() -> Self {
        Self::new(ForecastConfig::default())
    }
}
