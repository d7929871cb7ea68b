pub mod backtest;
pub mod base;
pub mod ensemble;
pub mod error;
pub mod exponential_smoothing;
pub mod gradient_boosting;
pub mod optim;
pub mod regression;
pub mod registry;
pub mod selector;
pub mod simple_ma;
pub mod types;
pub mod utils;

#[cfg(feature = "arima")]
pub mod arima;
#[cfg(feature = "prophet")]
pub mod prophet;

pub use backtest::{run_backtest, train_test_split, BacktestReport};
pub use base::{compute_metrics, evaluate_forecast, Forecaster};
pub use ensemble::EnsembleForecaster;
pub use error::{ForecastError, Result};
pub use exponential_smoothing::{ExponentialSmoothingConfig, ExponentialSmoothingForecaster};
pub use gradient_boosting::{GradientBoostingConfig, GradientBoostingForecaster};
pub use regression::RegressionForecaster;
pub use registry::{available_models, create, is_available, ForecastConfig, ModelKind};
pub use selector::{select_model, ModelScore, ModelSelector};
pub use simple_ma::{SimpleMaConfig, SimpleMaForecaster};
pub use types::{
    EvaluationMetrics, ForecastResult, ForecastRow, ForecastSummary, Frequency, ModelInfo,
    PricePoint, PriceSeries,
};

#[cfg(feature = "arima")]
pub use arima::{ArimaConfig, ArimaForecaster, ArimaOrder, SelectionCriterion};
#[cfg(feature = "prophet")]
pub use prophet::{ProphetConfig, ProphetForecaster};
