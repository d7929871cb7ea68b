//! Commodity price forecasting and Monte Carlo valuation of physical storage contracts.
//!
//! [`forecasting`] puts several statistical and machine-learning models behind one
//! [`forecasting::Forecaster`] contract. [`valuation`] simulates GBM price paths calibrated
//! from history and values a storage contract against them.

pub mod commands;
pub mod config;
pub mod forecasting;
pub mod telemetry;
pub mod valuation;

pub use forecasting::{Forecaster, ForecastResult, ModelKind, PricePoint, PriceSeries};
pub use valuation::{run_valuation, SimulationConfig, StorageContract, ValuationResult};
