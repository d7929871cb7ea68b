use serde::{Deserialize, Serialize};

use super::error::{Result, ValuationError};

/// Simulation path counts offered to callers; others run but are flagged.
pub const STANDARD_SIMULATION_COUNTS: [usize; 4] = [1000, 5000, 10000, 50000];
pub const MIN_HORIZON_DAYS: usize = 30;
pub const MAX_HORIZON_DAYS: usize = 365;

/// Physical storage facility terms. Rates are units per day, costs are per unit; the storage
/// cost is per unit per month of the horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageContract {
    pub capacity: f64,
    /// Percent of capacity held at the start, 0 to 100.
    pub initial_inventory_pct: f64,
    pub injection_rate: f64,
    pub withdrawal_rate: f64,
    pub injection_cost: f64,
    pub withdrawal_cost: f64,
    pub storage_cost: f64,
}

impl Default for StorageContract {
    fn default() -> Self {
        StorageContract {
            capacity: 10_000.0,
            initial_inventory_pct: 50.0,
            injection_rate: 1_000.0,
            withdrawal_rate: 1_000.0,
            injection_cost: 0.05,
            withdrawal_cost: 0.05,
            storage_cost: 0.10,
        }
    }
}

impl StorageContract {
    pub fn initial_inventory(&self) -> f64 {
        self.capacity * self.initial_inventory_pct / 100.0
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("capacity", self.capacity),
            ("injection_rate", self.injection_rate),
            ("withdrawal_rate", self.withdrawal_rate),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ValuationError::contract(
                    field,
                    format!("must be positive, got {}", value),
                ));
            }
        }

        let non_negative = [
            ("injection_cost", self.injection_cost),
            ("withdrawal_cost", self.withdrawal_cost),
            ("storage_cost", self.storage_cost),
        ];
        for (field, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ValuationError::contract(
                    field,
                    format!("must be non-negative, got {}", value),
                ));
            }
        }

        if !(0.0..=100.0).contains(&self.initial_inventory_pct) {
            return Err(ValuationError::contract(
                "initial_inventory_pct",
                format!("must lie in [0, 100], got {}", self.initial_inventory_pct),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub n_simulations: usize,
    /// Number of daily price columns per path, the first being the last observed price.
    pub horizon_days: usize,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            n_simulations: 10_000,
            horizon_days: 180,
            seed: 42,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_simulations == 0 {
            return Err(ValuationError::simulation("n_simulations", "must be positive"));
        }
        if !(MIN_HORIZON_DAYS..=MAX_HORIZON_DAYS).contains(&self.horizon_days) {
            return Err(ValuationError::simulation(
                "horizon_days",
                format!(
                    "must lie in [{}, {}], got {}",
                    MIN_HORIZON_DAYS, MAX_HORIZON_DAYS, self.horizon_days
                ),
            ));
        }
        Ok(())
    }

    pub fn is_standard_count(&self) -> bool {
        STANDARD_SIMULATION_COUNTS.contains(&self.n_simulations)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationResult {
    /// Mean of the per-path values.
    pub contract_value: f64,
    pub std_dev: f64,
    /// 5th percentile of the per-path values.
    pub var_95: f64,
    /// Mean of the values at or below `var_95`.
    pub cvar_95: f64,
    pub path_values: Vec<f64>,
    pub drift: f64,
    pub volatility: f64,
    /// Average simulated price per day.
    pub mean_path: Vec<f64>,
    pub n_simulations: usize,
    pub horizon_days: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(StorageContract::default().validate().is_ok());
        assert!(SimulationConfig::default().validate().is_ok());
        assert_eq!(StorageContract::default().initial_inventory(), 5_000.0);
    }

    #[test]
    fn rejects_non_positive_terms() {
        let contract = StorageContract {
            capacity: 0.0,
            ..StorageContract::default()
        };
        assert!(matches!(
            contract.validate(),
            Err(ValuationError::InvalidContract { ref field, .. }) if field == "capacity"
        ));

        let contract = StorageContract {
            withdrawal_rate: -5.0,
            ..StorageContract::default()
        };
        assert!(contract.validate().is_err());

        let contract = StorageContract {
            initial_inventory_pct: 120.0,
            ..StorageContract::default()
        };
        assert!(contract.validate().is_err());
    }

    #[test]
    fn horizon_range_is_enforced() {
        for (horizon, ok) in [(29, false), (30, true), (365, true), (366, false)] {
            let sim = SimulationConfig {
                horizon_days: horizon,
                ..SimulationConfig::default()
            };
            assert_eq!(sim.validate().is_ok(), ok, "horizon {}", horizon);
        }
    }

    #[test]
    fn non_standard_counts_are_flagged_not_rejected() {
        let sim = SimulationConfig {
            n_simulations: 1234,
            ..SimulationConfig::default()
        };
        assert!(sim.validate().is_ok());
        assert!(!sim.is_standard_count());
        assert!(SimulationConfig::default().is_standard_count());
    }

    #[test]
    fn partial_json_takes_defaults() {
        let contract: StorageContract = serde_json::from_str(r#"{"capacity": 500.0}"#).unwrap();
        assert_eq!(contract.capacity, 500.0);
        assert_eq!(contract.injection_rate, 1_000.0);
    }
}
