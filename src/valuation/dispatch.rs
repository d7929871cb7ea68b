//! Greedy median-threshold storage dispatch.
//!
//! Each path is valued on its own: inject while the price is under the path's median, withdraw
//! while it is over, then pay holding cost on whatever is left. The median is taken over the
//! whole simulated path, so each decision depends on prices the path has not reached yet. This
//! is a simple intrinsic proxy, not an optimal or non-anticipative policy.

use ndarray::ArrayView1;
use rayon::prelude::*;

use super::simulation::PathSet;
use super::types::StorageContract;

const DAYS_PER_MONTH: f64 = 30.0;

/// Median with the two middle values averaged for even lengths.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        0.5 * (sorted[mid - 1] + sorted[mid])
    } else {
        sorted[mid]
    }
}

/// Net cash flow of one path under the greedy policy, after holding cost.
pub fn dispatch_path(path: ArrayView1<'_, f64>, contract: &StorageContract, horizon_days: usize) -> f64 {
    let prices = path.to_vec();
    let threshold = median(&prices);

    let mut inventory = contract.initial_inventory();
    let mut cash = 0.0;

    for &price in &prices {
        if price < threshold && inventory < contract.capacity {
            let amount = contract.injection_rate.min(contract.capacity - inventory);
            cash -= amount * (price + contract.injection_cost);
            inventory += amount;
        } else if price > threshold && inventory > 0.0 {
            let amount = contract.withdrawal_rate.min(inventory);
            cash += amount * (price - contract.withdrawal_cost);
            inventory -= amount;
        }
    }

    cash - inventory * contract.storage_cost * (horizon_days as f64 / DAYS_PER_MONTH)
}

/// Value every path in parallel; output order follows path order.
pub fn value_paths(paths: &PathSet, contract: &StorageContract, horizon_days: usize) -> Vec<f64> {
    (0..paths.n_paths())
        .into_par_iter()
        .map(|i| dispatch_path(paths.path(i), contract, horizon_days))
        .collect()
}
