//! Box-constrained Nelder-Mead used to tune smoothing parameters.

#[derive(Debug, Clone, Copy)]
pub struct NelderMeadOptions {
    pub max_iterations: usize,
    pub initial_step: f64,
    pub reflection: f64,
    pub expansion: f64,
    pub contraction: f64,
    pub shrink: f64,
    pub tolerance: f64,
}

impl Default for NelderMeadOptions {
    fn default() -> Self {
        NelderMeadOptions {
            max_iterations: 300,
            initial_step: 0.1,
            reflection: 1.0,
            expansion: 2.0,
            contraction: 0.5,
            shrink: 0.5,
            tolerance: 1e-9,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
}

fn clamp(x: &[f64], lower: &[f64], upper: &[f64]) -> Vec<f64> {
    x.iter()
        .zip(lower.iter().zip(upper))
        .map(|(&v, (&lo, &hi))| v.clamp(lo, hi))
        .collect()
}

/// Minimise `objective` inside `[lower, upper]`. Non-finite objective values rank last.
pub fn nelder_mead<F>(
    initial: &[f64],
    lower: &[f64],
    upper: &[f64],
    options: NelderMeadOptions,
    mut objective: F,
) -> Minimum
where
    F: FnMut(&[f64]) -> f64,
{
    let dim = initial.len();
    let mut eval = |x: &[f64]| {
        let v = objective(x);
        if v.is_finite() {
            v
        } else {
            f64::INFINITY
        }
    };

    let x0 = clamp(initial, lower, upper);
    let mut simplex = vec![x0.clone()];
    let mut values = vec![eval(&x0)];

    for d in 0..dim {
        let mut x = x0.clone();
        let step = (upper[d] - lower[d]).abs() * options.initial_step;
        x[d] = (x[d] + step).min(upper[d]);
        if (x[d] - x0[d]).abs() < 1e-14 {
            x[d] = (x[d] - step).max(lower[d]);
        }
        values.push(eval(&x));
        simplex.push(x);
    }

    let mut iterations = 0;
    for iter in 0..options.max_iterations {
        iterations = iter + 1;

        let mut order: Vec<usize> = (0..simplex.len()).collect();
        order.sort_by(|&i, &j| values[i].total_cmp(&values[j]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        if (values[dim] - values[0]).abs() <= options.tolerance {
            break;
        }

        let centroid: Vec<f64> = (0..dim)
            .map(|d| simplex.iter().take(dim).map(|x| x[d]).sum::<f64>() / dim as f64)
            .collect();

        let xr: Vec<f64> = (0..dim)
            .map(|d| centroid[d] + options.reflection * (centroid[d] - simplex[dim][d]))
            .collect();
        let xr = clamp(&xr, lower, upper);
        let fr = eval(&xr);

        if fr < values[0] {
            let xe: Vec<f64> = (0..dim)
                .map(|d| centroid[d] + options.expansion * (xr[d] - centroid[d]))
                .collect();
            let xe = clamp(&xe, lower, upper);
            let fe = eval(&xe);
            if fe < fr {
                simplex[dim] = xe;
                values[dim] = fe;
            } else {
                simplex[dim] = xr;
                values[dim] = fr;
            }
            continue;
        }

        if fr < values[dim - 1] {
            simplex[dim] = xr;
            values[dim] = fr;
            continue;
        }

        let xc: Vec<f64> = (0..dim)
            .map(|d| centroid[d] + options.contraction * (simplex[dim][d] - centroid[d]))
            .collect();
        let xc = clamp(&xc, lower, upper);
        let fc = eval(&xc);
        if fc < values[dim] {
            simplex[dim] = xc;
            values[dim] = fc;
            continue;
        }

        for i in 1..=dim {
            let shrunk: Vec<f64> = (0..dim)
                .map(|d| simplex[0][d] + options.shrink * (simplex[i][d] - simplex[0][d]))
                .collect();
            simplex[i] = clamp(&shrunk, lower, upper);
            values[i] = eval(&simplex[i]);
        }
    }

    let best = (0..values.len())
        .min_by(|&i, &j| values[i].total_cmp(&values[j]))
        .unwrap_or(0);

    Minimum {
        x: simplex[best].clone(),
        value: values[best],
        iterations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_interior_minimum() {
        let out = nelder_mead(
            &[0.9, 0.9],
            &[0.0, 0.0],
            &[1.0, 1.0],
            NelderMeadOptions::default(),
            |x| (x[0] - 0.3).powi(2) + (x[1] - 0.6).powi(2),
        );
        assert!((out.x[0] - 0.3).abs() < 1e-3);
        assert!((out.x[1] - 0.6).abs() < 1e-3);
    }

    #[test]
    fn respects_bounds() {
        let out = nelder_mead(
            &[0.5],
            &[0.2],
            &[0.8],
            NelderMeadOptions::default(),
            |x| (x[0] + 3.0).powi(2),
        );
        assert!((out.x[0] - 0.2).abs() < 1e-6);
    }
}
