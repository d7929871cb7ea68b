use thiserror::Error;

/// Precondition and input failures of a valuation run. All are raised before any paths are
/// simulated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValuationError {
    #[error("Invalid contract parameter '{field}': {reason}")]
    InvalidContract { field: String, reason: String },

    #[error("Invalid simulation parameter '{field}': {reason}")]
    InvalidSimulation { field: String, reason: String },

    #[error("Insufficient price history: need at least {required} prices, got {actual}")]
    InsufficientHistory { required: usize, actual: usize },

    #[error("Price history cannot be calibrated: {0}")]
    DegenerateHistory(String),
}

impl ValuationError {
    pub fn contract(field: &str, reason: impl Into<String>) -> Self {
        ValuationError::InvalidContract {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn simulation(field: &str, reason: impl Into<String>) -> Self {
        ValuationError::InvalidSimulation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ValuationError>;
