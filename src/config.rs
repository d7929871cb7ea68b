//! Application settings: JSON file, then environment overrides.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::forecasting::{ForecastConfig, ModelKind};
use crate::valuation::{SimulationConfig, StorageContract};

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub log_level: String,
}

impl Default for AppSection {
    fn default() -> Self {
        AppSection {
            name: "Commodity Valuator".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastingSection {
    pub default_horizon: usize,
    pub min_history_days: usize,
    pub confidence_level: f64,
    pub test_size: f64,
    /// Unset means "let the selector decide".
    pub default_model: Option<ModelKind>,
    pub models: ForecastConfig,
}

impl Default for ForecastingSection {
    fn default() -> Self {
        ForecastingSection {
            default_horizon: 90,
            min_history_days: 365,
            confidence_level: 0.95,
            test_size: 0.2,
            default_model: None,
            models: ForecastConfig::default(),
        }
    }
}

impl ForecastingSection {
    /// Model settings with the section-level confidence level applied.
    pub fn forecast_config(&self) -> ForecastConfig {
        ForecastConfig {
            confidence_level: self.confidence_level,
            ..self.models.clone()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValuationSection {
    pub contract: StorageContract,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub forecasting: ForecastingSection,
    pub valuation: ValuationSection,
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: AppConfig = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// `config.json` in the working directory if present, defaults otherwise.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Path::new(DEFAULT_CONFIG_FILE);
        if path.exists() {
            return Self::load_from(path);
        }
        let mut config = AppConfig::default();
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// `LOG_LEVEL` and `FORECAST_HORIZON`; unparseable values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("LOG_LEVEL").filter(|v| !v.trim().is_empty()) {
            self.app.log_level = level.trim().to_lowercase();
        }
        if let Some(horizon) = lookup("FORECAST_HORIZON").and_then(|v| v.trim().parse::<usize>().ok()) {
            if horizon > 0 {
                self.forecasting.default_horizon = horizon;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = AppConfig::default();
        assert_eq!(config.forecasting.default_horizon, 90);
        assert_eq!(config.forecasting.min_history_days, 365);
        assert_eq!(config.valuation.simulation.n_simulations, 10_000);
        assert_eq!(config.valuation.contract.capacity, 10_000.0);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let path = std::env::temp_dir().join(format!("cv-config-{}.json", std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"forecasting": {{"default_horizon": 30, "default_model": "ets"}},
                "valuation": {{"simulation": {{"n_simulations": 5000}}}}}}"#
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(config.forecasting.default_model, Some(ModelKind::ExponentialSmoothing));
        assert_eq!(config.valuation.simulation.n_simulations, 5000);
        assert_eq!(config.valuation.simulation.horizon_days, 180);
        assert_eq!(config.app.name, "Commodity Valuator");
    }

    #[test]
    fn missing_or_malformed_file_is_an_error() {
        let missing = std::env::temp_dir().join("cv-config-does-not-exist.json");
        assert!(matches!(AppConfig::load_from(&missing), Err(ConfigError::Io { .. })));

        let path = std::env::temp_dir().join(format!("cv-bad-{}.json", std::process::id()));
        fs::write(&path, "{ not json").unwrap();
        let result = AppConfig::load_from(&path);
        fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = [("LOG_LEVEL", "DEBUG"), ("FORECAST_HORIZON", "45")].into();
        let mut config = AppConfig::default();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.app.log_level, "debug");
        assert_eq!(config.forecasting.default_horizon, 45);

        let mut config = AppConfig::default();
        config.apply_env_overrides(|k| (k == "FORECAST_HORIZON").then(|| "soon".to_string()));
        assert_eq!(config.forecasting.default_horizon, 90);
    }

    #[test]
    fn section_confidence_reaches_models() {
        let mut config = AppConfig::default();
        config.forecasting.confidence_level = 0.9;
        assert_eq!(config.forecasting.forecast_config().confidence_level, 0.9);
    }
}
