//! Weight optimizers over a matrix of per-strategy equity curves.
//!
//! Strategies are identified by name (not [`crate::types::Symbol`]) because
//! the optimizer operates one level up: it allocates capital across
//! strategies, each of which may itself trade many symbols.
//!
//! [`SharpeOptimizer`] reaches the same long-only, Σw=1 maximum-Sharpe
//! portfolio as a constrained SLSQP solve would, via projected gradient
//! ascent onto the unit simplex — no general-purpose NLP solver dependency
//! required for a convex feasible region this simple.

use rustc_hash::FxHashMap;

/// A matrix of equity curves, one column per strategy.
///
/// `rows[t][i]` is the total equity of strategy `columns[i]` at period `t`.
/// Periods must be aligned across columns (same length, same timestamps).
#[derive(Clone, Debug)]
pub struct EquityCurveMatrix {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl EquityCurveMatrix {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Self {
        Self { columns, rows }
    }

    fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Period-over-period simple returns, one row shorter than the equity curve.
    fn pct_change(&self) -> Option<Vec<Vec<f64>>> {
        if self.rows.len() < 2 {
            return None;
        }
        let cols = self.num_columns();
        for row in &self.rows {
            if row.len() != cols {
                return None;
            }
        }
        let mut out = Vec::with_capacity(self.rows.len() - 1);
        for window in self.rows.windows(2) {
            let (prev, cur) = (&window[0], &window[1]);
            let mut ret_row = Vec::with_capacity(cols);
            for i in 0..cols {
                if prev[i].abs() < 1e-12 {
                    return None;
                }
                ret_row.push((cur[i] - prev[i]) / prev[i]);
            }
            out.push(ret_row);
        }
        Some(out)
    }
}

/// Produces target weights across a set of strategies from their equity curves.
pub trait Optimizer: Send + Sync {
    /// Returns a weight for each column in `equity`. Weights are long-only
    /// and sum to 1.0. Returns `None` if `equity` has too few periods or
    /// mismatched row lengths — the caller should keep the previous weights.
    fn optimize(&self, equity: &EquityCurveMatrix) -> Option<FxHashMap<String, f64>>;
}

/// Assigns `1/n` to every strategy, ignoring return history entirely.
#[derive(Clone, Copy, Debug, Default)]
pub struct EqualWeightOptimizer;

impl Optimizer for EqualWeightOptimizer {
    fn optimize(&self, equity: &EquityCurveMatrix) -> Option<FxHashMap<String, f64>> {
        let n = equity.num_columns();
        if n == 0 {
            return None;
        }
        let w = 1.0 / n as f64;
        Some(equity.columns.iter().cloned().map(|c| (c, w)).collect())
    }
}

/// Maximizes the long-only Sharpe ratio via projected gradient ascent.
///
/// `risk_free` is a per-period (not annualized) risk-free rate, matching
/// the period granularity of the equity curve passed to [`Optimizer::optimize`].
#[derive(Clone, Copy, Debug)]
pub struct SharpeOptimizer {
    pub risk_free: f64,
}

impl SharpeOptimizer {
    pub fn new(risk_free: f64) -> Self {
        Self { risk_free }
    }
}

impl Optimizer for SharpeOptimizer {
    fn optimize(&self, equity: &EquityCurveMatrix) -> Option<FxHashMap<String, f64>> {
        let returns = equity.pct_change()?;
        let cols = equity.num_columns();
        if cols == 0 {
            return None;
        }
        if cols == 1 {
            return Some([(equity.columns[0].clone(), 1.0)].into_iter().collect());
        }

        let w = optimize_max_sharpe(&returns, self.risk_free);
        if w.len() != cols {
            return None;
        }
        Some(equity.columns.iter().cloned().zip(w).collect())
    }
}

/// Long-only maximum-Sharpe optimization on the unit simplex.
///
/// Falls back to minimum-variance when every asset has non-positive excess
/// return (maximizing Sharpe is degenerate — there's no direction that
/// improves it without leverage or shorting, both excluded here).
fn optimize_max_sharpe(returns: &[Vec<f64>], risk_free: f64) -> Vec<f64> {
    let Some((_rows, cols)) = matrix_shape(returns) else {
        return Vec::new();
    };

    if cols == 1 {
        return vec![1.0];
    }

    let mu = column_means(returns);
    let excess: Vec<f64> = mu.into_iter().map(|m| m - risk_free).collect();

    if excess.iter().all(|x| *x <= 0.0 || !x.is_finite()) {
        return optimize_min_variance(returns);
    }

    let cov = covariance_matrix(returns);
    let mut w = equal_weights(cols);
    let mut lr = 0.08_f64;

    for _ in 0..450 {
        let sigma_w = mat_vec_mul(&cov, &w);
        let var = dot(&w, &sigma_w).max(1e-12);
        let vol = var.sqrt();
        let num = dot(&w, &excess);

        let grad: Vec<f64> = excess
            .iter()
            .zip(&sigma_w)
            .map(|(a, sw)| a / vol - num * sw / (var * vol))
            .collect();

        let candidate: Vec<f64> = w.iter().zip(&grad).map(|(wi, gi)| wi + lr * gi).collect();
        let projected = project_simplex(&candidate);

        if squared_distance(&projected, &w) < 1e-16 {
            w = projected;
            break;
        }

        w = projected;
        lr *= 0.995;
    }

    normalize_long_only(w)
}

/// Long-only minimum-variance optimization on the unit simplex.
///
/// Used as [`optimize_max_sharpe`]'s fallback when no asset has positive
/// excess return.
fn optimize_min_variance(returns: &[Vec<f64>]) -> Vec<f64> {
    let Some((_rows, cols)) = matrix_shape(returns) else {
        return Vec::new();
    };

    if cols == 1 {
        return vec![1.0];
    }

    let cov = covariance_matrix(returns);
    let mut w = equal_weights(cols);
    let mut lr = 0.20_f64;

    for _ in 0..350 {
        let sigma_w = mat_vec_mul(&cov, &w);
        let grad: Vec<f64> = sigma_w.iter().map(|g| 2.0 * g).collect();
        let candidate: Vec<f64> = w.iter().zip(&grad).map(|(wi, gi)| wi - lr * gi).collect();
        let projected = project_simplex(&candidate);

        if squared_distance(&projected, &w) < 1e-16 {
            w = projected;
            break;
        }

        w = projected;
        lr *= 0.995;
    }

    normalize_long_only(w)
}

fn matrix_shape(matrix: &[Vec<f64>]) -> Option<(usize, usize)> {
    let rows = matrix.len();
    if rows < 2 {
        return None;
    }

    let cols = matrix.first()?.len();
    if cols == 0 {
        return None;
    }

    for row in matrix {
        if row.len() != cols || row.iter().any(|x| !x.is_finite()) {
            return None;
        }
    }

    Some((rows, cols))
}

fn column_means(matrix: &[Vec<f64>]) -> Vec<f64> {
    let rows = matrix.len();
    let cols = matrix[0].len();

    let mut sums = vec![0.0; cols];
    for row in matrix {
        for (j, v) in row.iter().enumerate() {
            sums[j] += *v;
        }
    }

    sums.into_iter().map(|s| s / rows as f64).collect()
}

fn covariance_matrix(matrix: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let rows = matrix.len();
    let cols = matrix[0].len();
    let means = column_means(matrix);

    let mut cov = vec![vec![0.0; cols]; cols];

    for row in matrix {
        for i in 0..cols {
            let di = row[i] - means[i];
            for j in i..cols {
                let dj = row[j] - means[j];
                cov[i][j] += di * dj;
            }
        }
    }

    let denom = (rows as f64 - 1.0).max(1.0);
    for i in 0..cols {
        for j in i..cols {
            let v = cov[i][j] / denom;
            cov[i][j] = v;
            cov[j][i] = v;
        }
        cov[i][i] += 1e-10;
    }

    cov
}

fn mat_vec_mul(matrix: &[Vec<f64>], vec: &[f64]) -> Vec<f64> {
    matrix
        .iter()
        .map(|row| row.iter().zip(vec).map(|(a, b)| a * b).sum::<f64>())
        .collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f64>()
}

fn equal_weights(n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    vec![1.0 / n as f64; n]
}

fn normalize_long_only(mut w: Vec<f64>) -> Vec<f64> {
    if w.is_empty() {
        return w;
    }

    for x in &mut w {
        if !x.is_finite() || *x < 0.0 {
            *x = 0.0;
        }
    }

    let sum = w.iter().sum::<f64>();
    if sum <= 1e-12 {
        return equal_weights(w.len());
    }

    for x in &mut w {
        *x /= sum;
    }
    w
}

fn project_simplex(v: &[f64]) -> Vec<f64> {
    if v.is_empty() {
        return Vec::new();
    }

    let mut u = v.to_vec();
    u.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

    let mut cssv = 0.0;
    let mut rho = 0_usize;

    for (i, ui) in u.iter().enumerate() {
        cssv += *ui;
        let theta = (cssv - 1.0) / (i as f64 + 1.0);
        if *ui - theta > 0.0 {
            rho = i + 1;
        }
    }

    if rho == 0 {
        return equal_weights(v.len());
    }

    let theta = (u[..rho].iter().sum::<f64>() - 1.0) / rho as f64;
    let projected: Vec<f64> = v.iter().map(|x| (x - theta).max(0.0)).collect();
    normalize_long_only(projected)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_equity(n_periods: usize, n_cols: usize) -> impl Strategy<Value = EquityCurveMatrix> {
        prop::collection::vec(
            prop::collection::vec(50.0f64..200.0, n_cols),
            n_periods,
        )
        .prop_map(move |rows| {
            let columns = (0..n_cols).map(|i| format!("s{i}")).collect();
            EquityCurveMatrix::new(columns, rows)
        })
    }

    proptest! {
        #[test]
        fn sharpe_weights_always_on_the_simplex(eq in arb_equity(12, 4)) {
            if let Some(w) = SharpeOptimizer::new(0.0).optimize(&eq) {
                let sum: f64 = w.values().sum();
                prop_assert!((sum - 1.0).abs() < 1e-6);
                prop_assert!(w.values().all(|v| *v >= -1e-9 && v.is_finite()));
            }
        }

        #[test]
        fn equal_weight_always_on_the_simplex(eq in arb_equity(6, 5)) {
            let w = EqualWeightOptimizer.optimize(&eq).unwrap();
            let sum: f64 = w.values().sum();
            prop_assert!((sum - 1.0).abs() < 1e-9);
        }
    }
}
