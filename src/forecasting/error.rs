use thiserror::Error;

/// Errors raised by forecasters, the registry and the backtest helpers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    #[error("{model}: insufficient data, need at least {required} points, got {actual}")]
    InsufficientData {
        model: String,
        required: usize,
        actual: usize,
    },

    #[error("{model}: model must be fitted before prediction")]
    NotFitted { model: String },

    #[error("{model} is not available: {reason}")]
    UnavailableModel { model: String, reason: String },

    #[error("{model}: fitting failed: {reason}")]
    NumericalFitting { model: String, reason: String },

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Invalid price series: {0}")]
    InvalidSeries(String),
}

impl ForecastError {
    pub fn insufficient(model: &str, required: usize, actual: usize) -> Self {
        ForecastError::InsufficientData {
            model: model.to_string(),
            required,
            actual,
        }
    }

    pub fn not_fitted(model: &str) -> Self {
        ForecastError::NotFitted {
            model: model.to_string(),
        }
    }

    pub fn fitting(model: &str, reason: impl Into<String>) -> Self {
        ForecastError::NumericalFitting {
            model: model.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        ForecastError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_message_names_model() {
        let err = ForecastError::insufficient("Simple Moving Average", 10, 4);
        assert_eq!(
            err.to_string(),
            "Simple Moving Average: insufficient data, need at least 10 points, got 4"
        );
    }

    #[test]
    fn not_fitted_message() {
        let err = ForecastError::not_fitted("ARIMA");
        assert_eq!(err.to_string(), "ARIMA: model must be fitted before prediction");
    }

    #[test]
    fn unavailable_message() {
        let err = ForecastError::UnavailableModel {
            model: "Prophet".to_string(),
            reason: "built without the `prophet` feature".to_string(),
        };
        assert!(err.to_string().starts_with("Prophet is not available"));
    }

    #[test]
    fn errors_are_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ForecastError>();
    }

    #[test]
    fn boxes_into_std_error() {
        let boxed: Box<dyn std::error::Error + Send + Sync> =
            Box::new(ForecastError::invalid_parameter("horizon", "must be positive"));
        assert_eq!(boxed.to_string(), "Invalid parameter 'horizon': must be positive");
    }
}
