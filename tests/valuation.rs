use chrono::NaiveDate;
use proptest::prelude::*;

use commodity_valuator::forecasting::PriceSeries;
use commodity_valuator::valuation::{
    run_valuation, summarize, SimulationConfig, StorageContract, ValuationEngine, ValuationError,
};

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 6, 1).unwrap()
}

/// Alternating up and down moves: near-zero drift, roughly 2% daily volatility.
fn choppy_history(n: usize) -> PriceSeries {
    let mut price = 40.0;
    let prices: Vec<f64> = (0..n)
        .map(|i| {
            price *= if i % 2 == 0 { 1.02 } else { 1.0 / 1.02 };
            price
        })
        .collect();
    PriceSeries::from_daily(start(), &prices).unwrap()
}

#[test]
fn identical_inputs_are_bit_identical() {
    let series = choppy_history(200);
    let contract = StorageContract::default();
    let sim = SimulationConfig {
        n_simulations: 5000,
        horizon_days: 60,
        seed: 11,
    };
    let a = run_valuation(&series, &contract, &sim).unwrap();
    let b = run_valuation(&series, &contract, &sim).unwrap();

    assert_eq!(a.contract_value.to_bits(), b.contract_value.to_bits());
    assert_eq!(a.var_95.to_bits(), b.var_95.to_bits());
    assert_eq!(a.cvar_95.to_bits(), b.cvar_95.to_bits());
    assert_eq!(a.path_values, b.path_values);

    let c = run_valuation(&series, &contract, &SimulationConfig { seed: 12, ..sim }).unwrap();
    assert_ne!(a.path_values, c.path_values);
}

#[test]
fn zero_cost_contract_has_non_negative_value() {
    let contract = StorageContract {
        capacity: 10_000.0,
        initial_inventory_pct: 50.0,
        injection_rate: 1_000.0,
        withdrawal_rate: 1_000.0,
        injection_cost: 0.0,
        withdrawal_cost: 0.0,
        storage_cost: 0.0,
    };
    let sim = SimulationConfig {
        n_simulations: 1000,
        horizon_days: 30,
        seed: 42,
    };
    let result = run_valuation(&choppy_history(250), &contract, &sim).unwrap();

    assert!(result.volatility > 0.0);
    assert!(result.contract_value >= 0.0, "value {}", result.contract_value);
    assert!(result.cvar_95 <= result.var_95);
}

#[test]
fn costs_reduce_value() {
    let series = choppy_history(250);
    let sim = SimulationConfig {
        n_simulations: 1000,
        horizon_days: 90,
        seed: 5,
    };
    let free = StorageContract {
        injection_cost: 0.0,
        withdrawal_cost: 0.0,
        storage_cost: 0.0,
        ..StorageContract::default()
    };
    let costly = StorageContract {
        injection_cost: 1.0,
        withdrawal_cost: 1.0,
        storage_cost: 0.5,
        ..StorageContract::default()
    };
    let a = run_valuation(&series, &free, &sim).unwrap();
    let b = run_valuation(&series, &costly, &sim).unwrap();
    assert!(b.contract_value < a.contract_value);
}

#[test]
fn validation_happens_before_simulation() {
    let engine = ValuationEngine::new();
    let zero_rate = StorageContract {
        withdrawal_rate: 0.0,
        ..StorageContract::default()
    };
    let err = engine
        .run(&choppy_history(50), &zero_rate, &SimulationConfig::default())
        .unwrap_err();
    assert!(matches!(err, ValuationError::InvalidContract { ref field, .. } if field == "withdrawal_rate"));

    let long = SimulationConfig {
        horizon_days: 400,
        ..SimulationConfig::default()
    };
    assert!(engine.simulate(&choppy_history(50), &long).is_err());
}

#[test]
fn result_serializes_to_json() {
    let sim = SimulationConfig {
        n_simulations: 1000,
        horizon_days: 30,
        seed: 1,
    };
    let result = run_valuation(&choppy_history(40), &StorageContract::default(), &sim).unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert!(json["contract_value"].is_number());
    assert_eq!(json["path_values"].as_array().unwrap().len(), 1000);
}

proptest! {
    #[test]
    fn cvar_at_most_var(values in prop::collection::vec(-1.0e5f64..1.0e5, 1..500)) {
        let summary = summarize(&values);
        prop_assert!(summary.cvar_95 <= summary.var_95);
        prop_assert!(summary.std_dev >= 0.0);
    }
}
