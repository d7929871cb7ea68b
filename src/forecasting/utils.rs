pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Population variance (divides by n).
pub fn calculate_variance(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mean = mean(data);
    data.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / data.len() as f64
}

pub fn population_std(data: &[f64]) -> f64 {
    calculate_variance(data).sqrt()
}

/// Sample standard deviation (divides by n - 1), 0 for fewer than two points.
pub fn sample_std(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let mean = mean(data);
    let ss = data.iter().map(|&x| (x - mean).powi(2)).sum::<f64>();
    (ss / (data.len() - 1) as f64).sqrt()
}

/// OLS slope of `data` against 0..n.
pub fn calculate_trend_slope(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let n = data.len() as f64;
    let x_sum: f64 = (0..data.len()).map(|i| i as f64).sum();
    let y_sum: f64 = data.iter().sum();
    let xy_sum: f64 = (0..data.len()).map(|i| i as f64 * data[i]).sum();
    let x2_sum: f64 = (0..data.len()).map(|i| (i as f64).powi(2)).sum();

    let denominator = n * x2_sum - x_sum * x_sum;
    if denominator == 0.0 {
        return 0.0;
    }
    (n * xy_sum - x_sum * y_sum) / denominator
}

pub fn calculate_autocorrelation(data: &[f64], lag: usize) -> f64 {
    if data.len() <= lag || lag == 0 {
        return 0.0;
    }

    let mean = mean(data);
    let mut numerator = 0.0;
    let mut denominator = 0.0;

    for i in lag..data.len() {
        let diff = data[i] - mean;
        let lag_diff = data[i - lag] - mean;
        numerator += diff * lag_diff;
        denominator += lag_diff * lag_diff;
    }

    if denominator == 0.0 {
        return 0.0;
    }

    numerator / denominator
}

/// Least-squares polynomial coefficients, lowest order first.
pub fn polynomial_fit(data: &[f64], degree: usize) -> Vec<f64> {
    let n = data.len();
    if n < degree + 1 {
        return vec![if n > 0 { data[n - 1] } else { 0.0 }];
    }

    let mut x_matrix = vec![vec![0.0; degree + 1]; n];
    for (i, row) in x_matrix.iter_mut().enumerate() {
        let xi = i as f64;
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = xi.powi(j as i32);
        }
    }

    solve_normal_equations(&x_matrix, data)
}

pub fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs
        .iter()
        .enumerate()
        .map(|(j, c)| c * x.powi(j as i32))
        .sum()
}

/// Solve `(X'X) b = X'y` for b.
pub fn solve_normal_equations(x_matrix: &[Vec<f64>], y_vec: &[f64]) -> Vec<f64> {
    let m = x_matrix.first().map(|r| r.len()).unwrap_or(0);

    let mut xtx = vec![vec![0.0; m]; m];
    let mut xty = vec![0.0; m];

    for i in 0..m {
        for j in 0..m {
            xtx[i][j] = x_matrix.iter().map(|row| row[i] * row[j]).sum();
        }
        xty[i] = x_matrix
            .iter()
            .zip(y_vec)
            .map(|(row, &y)| row[i] * y)
            .sum();
    }

    gaussian_elimination(&mut xtx, &mut xty)
}

fn gaussian_elimination(a: &mut [Vec<f64>], b: &mut [f64]) -> Vec<f64> {
    let n = b.len();

    for i in 0..n {
        let mut max_row = i;
        for k in (i + 1)..n {
            if a[k][i].abs() > a[max_row][i].abs() {
                max_row = k;
            }
        }

        if max_row != i {
            a.swap(i, max_row);
            b.swap(i, max_row);
        }

        if a[i][i].abs() < 1e-10 {
            continue;
        }

        for k in (i + 1)..n {
            let factor = a[k][i] / a[i][i];
            for j in i..n {
                a[k][j] -= factor * a[i][j];
            }
            b[k] -= factor * b[i];
        }
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        x[i] = b[i];
        for j in (i + 1)..n {
            x[i] -= a[i][j] * x[j];
        }
        if a[i][i].abs() > 1e-10 {
            x[i] /= a[i][i];
        } else {
            x[i] = 0.0;
        }
    }

    x
}

/// Two-sided z multiplier for the usual confidence levels; 1.960 otherwise.
pub fn z_score(confidence_level: f64) -> f64 {
    const TABLE: [(f64, f64); 3] = [(0.90, 1.645), (0.95, 1.960), (0.99, 2.576)];

    TABLE
        .iter()
        .find(|(level, _)| (level - confidence_level).abs() < 1e-9)
        .map(|(_, z)| *z)
        .unwrap_or(1.960)
}

/// `forecast[i] -/+ z * scale * sqrt(i + 1)`.
pub fn horizon_bounds(forecast: &[f64], scale: f64, confidence_level: f64) -> (Vec<f64>, Vec<f64>) {
    let z = z_score(confidence_level);
    let scale = if scale.is_finite() { scale.abs() } else { 0.0 };

    forecast
        .iter()
        .enumerate()
        .map(|(i, &f)| {
            let margin = z * scale * ((i + 1) as f64).sqrt();
            (f - margin, f + margin)
        })
        .unzip()
}

/// `forecast[i] -/+ margin` with the same margin at every step.
pub fn constant_bounds(forecast: &[f64], margin: f64) -> (Vec<f64>, Vec<f64>) {
    let margin = if margin.is_finite() { margin.abs() } else { 0.0 };
    forecast.iter().map(|&f| (f - margin, f + margin)).unzip()
}

pub fn difference_series(data: &[f64], order: usize) -> Vec<f64> {
    let mut result = data.to_vec();
    for _ in 0..order {
        result = result.windows(2).map(|w| w[1] - w[0]).collect();
    }
    result
}
