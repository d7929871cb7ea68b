use serde::{Deserialize, Serialize};

use crate::forecasting::{PricePoint, PriceSeries};
use crate::valuation::{SimulationConfig, StorageContract, ValuationEngine, ValuationResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationRequest {
    pub prices: Vec<PricePoint>,
    #[serde(default)]
    pub contract: StorageContract,
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Number of simulated paths to return for charting.
    #[serde(default)]
    pub sample_paths: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationResponse {
    #[serde(flatten)]
    pub result: ValuationResult,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample_paths: Vec<Vec<f64>>,
}

pub fn value_contract(request: ValuationRequest) -> Result<ValuationResponse, String> {
    let series = PriceSeries::new(request.prices)
        .map_err(|e| format!("Invalid price history: {}", e))?;
    let engine = ValuationEngine::new();

    let (result, paths) = engine
        .run_with_paths(&series, &request.contract, &request.simulation)
        .map_err(|e| format!("Valuation failed: {}", e))?;
    let sample_paths = paths.sample_paths(request.sample_paths, request.simulation.seed);

    Ok(ValuationResponse {
        result,
        sample_paths,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn request(n: usize) -> ValuationRequest {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        ValuationRequest {
            prices: (0..n)
                .map(|i| PricePoint::new(start + Duration::days(i as i64), 3.0 + 0.2 * (i as f64).cos()))
                .collect(),
            contract: StorageContract::default(),
            simulation: SimulationConfig {
                n_simulations: 1000,
                horizon_days: 30,
                seed: 7,
            },
            sample_paths: 3,
        }
    }

    #[test]
    fn values_contract_and_returns_samples() {
        let response = value_contract(request(40)).unwrap();
        assert_eq!(response.result.path_values.len(), 1000);
        assert_eq!(response.sample_paths.len(), 3);
        assert!(response.sample_paths.iter().all(|p| p.len() == 30));
    }

    #[test]
    fn samples_come_from_the_valued_paths() {
        let req = request(40);
        let series = PriceSeries::new(req.prices.clone()).unwrap();
        let (result, paths) = ValuationEngine::new()
            .run_with_paths(&series, &req.contract, &req.simulation)
            .unwrap();

        let response = value_contract(req).unwrap();
        assert_eq!(response.result, result);
        assert_eq!(response.sample_paths, paths.sample_paths(3, 7));
    }

    #[test]
    fn json_request_uses_defaults() {
        let json = r#"{"prices": [
            {"date": "2024-01-01", "price": 3.0},
            {"date": "2024-01-02", "price": 3.1},
            {"date": "2024-01-03", "price": 2.9}
        ], "simulation": {"n_simulations": 1000, "horizon_days": 30}}"#;
        let req: ValuationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.contract, StorageContract::default());
        assert_eq!(req.simulation.seed, 42);
        assert_eq!(req.sample_paths, 0);
        assert!(value_contract(req).unwrap().sample_paths.is_empty());
    }

    #[test]
    fn invalid_contract_is_reported() {
        let mut req = request(40);
        req.contract.injection_rate = 0.0;
        let err = value_contract(req).unwrap_err();
        assert!(err.contains("injection_rate"));
    }
}
