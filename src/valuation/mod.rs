pub mod dispatch;
pub mod engine;
pub mod error;
pub mod risk;
pub mod simulation;
pub mod types;

pub use dispatch::{dispatch_path, median, value_paths};
pub use engine::{run_valuation, ValuationEngine};
pub use error::{Result, ValuationError};
pub use risk::{percentile, summarize, RiskSummary};
pub use simulation::{estimate_parameters, simulate_gbm, GbmParameters, PathSet};
pub use types::{
    SimulationConfig, StorageContract, ValuationResult, MAX_HORIZON_DAYS, MIN_HORIZON_DAYS,
    STANDARD_SIMULATION_COUNTS,
};
