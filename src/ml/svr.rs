//! Epsilon-insensitive support vector regression with an RBF kernel.
//!
//! The dual is solved over `2n` variables (`alpha_i`, `alpha_i*`) by SMO with
//! second-order working set selection. The bias is unregularized and comes
//! from the KKT conditions at the end. Kernel rows are computed on demand and
//! held in a bounded cache, so memory does not grow with `n^2`.

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{check_columns, check_training_data, ModelType, Regressor};
use crate::error::{ForecastError, Result};

/// Coefficients below this magnitude do not become support vectors.
const SUPPORT_THRESHOLD: f64 = 1e-12;

/// Floor for the curvature of a two-variable subproblem.
const TAU: f64 = 1e-12;

/// Kernel margin regressor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvrParams {
    /// Regularization strength (box constraint C)
    pub c: f64,
    /// Half-width of the epsilon-insensitive tube
    pub epsilon: f64,
    /// Stop once the maximal KKT violation drops below this
    pub tol: f64,
    /// SMO iteration cap; `None` uses `max(10^7, 100 * n)`
    pub max_iter: Option<usize>,
    /// RBF width; `None` uses `1 / (n_features * var(X))`
    pub gamma: Option<f64>,
    /// Kernel row cache size in megabytes
    pub cache_mb: usize,
}

impl Default for SvrParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            epsilon: 0.1,
            tol: 1e-3,
            max_iter: None,
            gamma: None,
            cache_mb: 200,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KernelSvr {
    gamma: f64,
    support_vectors: Vec<Vec<f64>>,
    coefficients: Vec<f64>,
    bias: f64,
}

impl KernelSvr {
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: &SvrParams) -> Result<Self> {
        let n_features = check_training_data(x, y)?;
        let cache_rows = (params.cache_mb.max(1) << 20) / (x.len().max(1) * 8);
        Self::fit_with_cache(x, y, params, n_features, cache_rows)
    }

    fn fit_with_cache(
        x: &[Vec<f64>],
        y: &[f64],
        params: &SvrParams,
        n_features: usize,
        cache_rows: usize,
    ) -> Result<Self> {
        if params.c <= 0.0 || params.epsilon < 0.0 || params.tol <= 0.0 {
            return Err(ForecastError::Input(format!(
                "SVR needs C > 0, epsilon >= 0 and tol > 0, got C={} epsilon={} tol={}",
                params.c, params.epsilon, params.tol
            )));
        }

        let gamma = params.gamma.unwrap_or_else(|| scale_gamma(x, n_features));
        let mut solver = Solver::new(x, y, params, gamma, cache_rows);
        let iterations = solver.solve();
        let bias = -solver.rho();

        let n = x.len();
        let (support_vectors, coefficients): (Vec<_>, Vec<_>) = x
            .iter()
            .enumerate()
            .map(|(i, row)| (row, solver.alpha[i] - solver.alpha[i + n]))
            .filter(|(_, coef)| coef.abs() > SUPPORT_THRESHOLD)
            .map(|(row, coef)| (row.clone(), coef))
            .unzip();

        debug!(
            iterations,
            support_vectors = support_vectors.len(),
            bias,
            "svr solver finished"
        );

        Ok(Self {
            gamma,
            support_vectors,
            coefficients,
            bias,
        })
    }

    pub fn n_support_vectors(&self) -> usize {
        self.support_vectors.len()
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        self.support_vectors
            .iter()
            .zip(self.coefficients.iter())
            .map(|(sv, coef)| coef * rbf(self.gamma, sv, row))
            .sum::<f64>()
            + self.bias
    }
}

impl Regressor for KernelSvr {
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        let n_features = check_columns(x)?;
        if let Some(sv) = self.support_vectors.first() {
            if !x.is_empty() && n_features != sv.len() {
                return Err(ForecastError::Input(format!(
                    "Feature count mismatch: expected {}, got {}",
                    sv.len(),
                    n_features
                )));
            }
        }
        Ok(x.iter().map(|row| self.predict_row(row)).collect())
    }

    fn model_type(&self) -> ModelType {
        ModelType::SupportVectorRegression
    }
}

/// Kernel rows by sample index, evicting the least recently used row.
struct KernelCache<'a> {
    x: &'a [Vec<f64>],
    gamma: f64,
    capacity: usize,
    rows: HashMap<usize, Rc<[f64]>>,
    order: VecDeque<usize>,
}

impl<'a> KernelCache<'a> {
    fn new(x: &'a [Vec<f64>], gamma: f64, capacity: usize) -> Self {
        Self {
            x,
            gamma,
            capacity: capacity.max(2),
            rows: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn row(&mut self, i: usize) -> Rc<[f64]> {
        if let Some(row) = self.rows.get(&i) {
            let row = Rc::clone(row);
            if let Some(pos) = self.order.iter().position(|&k| k == i) {
                self.order.remove(pos);
            }
            self.order.push_back(i);
            return row;
        }

        if self.rows.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.rows.remove(&evicted);
            }
        }
        let xi = &self.x[i];
        let row: Rc<[f64]> = self.x.iter().map(|xj| rbf(self.gamma, xi, xj)).collect();
        self.rows.insert(i, Rc::clone(&row));
        self.order.push_back(i);
        row
    }
}

/// SMO over `alpha[0..n]` (sign +1) and `alpha[n..2n]` (sign -1) with
/// `sum(sign * alpha) = 0` and `0 <= alpha <= C`.
struct Solver<'a> {
    n: usize,
    c: f64,
    tol: f64,
    max_iter: usize,
    alpha: Vec<f64>,
    gradient: Vec<f64>,
    /// K(x_i, x_i) per sample
    diag: Vec<f64>,
    cache: KernelCache<'a>,
}

impl<'a> Solver<'a> {
    fn new(x: &'a [Vec<f64>], y: &[f64], params: &SvrParams, gamma: f64, cache_rows: usize) -> Self {
        let n = x.len();
        let gradient = (0..2 * n)
            .map(|t| {
                if t < n {
                    params.epsilon - y[t]
                } else {
                    params.epsilon + y[t - n]
                }
            })
            .collect();

        Self {
            n,
            c: params.c,
            tol: params.tol,
            max_iter: params.max_iter.unwrap_or_else(|| (100 * n).max(10_000_000)),
            alpha: vec![0.0; 2 * n],
            gradient,
            diag: x.iter().map(|xi| rbf(gamma, xi, xi)).collect(),
            cache: KernelCache::new(x, gamma, cache_rows),
        }
    }

    fn sign(&self, t: usize) -> f64 {
        if t < self.n {
            1.0
        } else {
            -1.0
        }
    }

    fn sample(&self, t: usize) -> usize {
        t % self.n
    }

    fn is_upper(&self, t: usize) -> bool {
        self.alpha[t] >= self.c
    }

    fn is_lower(&self, t: usize) -> bool {
        self.alpha[t] <= 0.0
    }

    /// Returns the number of iterations run.
    fn solve(&mut self) -> usize {
        let mut iter = 0;
        while iter < self.max_iter {
            let Some((i, j)) = self.select_working_set() else {
                break;
            };
            self.update_pair(i, j);
            iter += 1;
        }
        if iter >= self.max_iter {
            warn!(max_iter = self.max_iter, "svr solver hit the iteration cap");
        }
        iter
    }

    /// Maximal violating `i`, then the `j` with the largest second-order gain.
    fn select_working_set(&mut self) -> Option<(usize, usize)> {
        let mut g_max = f64::NEG_INFINITY;
        let mut i_sel = None;
        for t in 0..2 * self.n {
            let score = -self.sign(t) * self.gradient[t];
            let movable = if self.sign(t) > 0.0 {
                !self.is_upper(t)
            } else {
                !self.is_lower(t)
            };
            if movable && score >= g_max {
                g_max = score;
                i_sel = Some(t);
            }
        }
        let i = i_sel?;

        let si = self.sample(i);
        let k_i = self.cache.row(si);
        let k_ii = self.diag[si];
        let mut g_max2 = f64::NEG_INFINITY;
        let mut best_obj = f64::INFINITY;
        let mut j_sel = None;

        for t in 0..2 * self.n {
            let movable = if self.sign(t) > 0.0 {
                !self.is_lower(t)
            } else {
                !self.is_upper(t)
            };
            if !movable {
                continue;
            }
            let score = self.sign(t) * self.gradient[t];
            g_max2 = g_max2.max(score);

            let grad_diff = g_max + score;
            if grad_diff > 0.0 {
                let s = self.sample(t);
                let quad = (k_ii + self.diag[s] - 2.0 * k_i[s]).max(TAU);
                let obj = -(grad_diff * grad_diff) / quad;
                if obj <= best_obj {
                    best_obj = obj;
                    j_sel = Some(t);
                }
            }
        }

        if g_max + g_max2 < self.tol {
            return None;
        }
        j_sel.map(|j| (i, j))
    }

    fn update_pair(&mut self, i: usize, j: usize) {
        let (si, sj) = (self.sample(i), self.sample(j));
        let k_i = self.cache.row(si);
        let k_j = self.cache.row(sj);
        let (y_i, y_j) = (self.sign(i), self.sign(j));
        let c = self.c;

        let (old_i, old_j) = (self.alpha[i], self.alpha[j]);
        let (mut a_i, mut a_j);

        // Q_ij = y_i y_j K(i, j); the curvature is always K_ii + K_jj - 2 K_ij
        let quad = (self.diag[si] + self.diag[sj] - 2.0 * k_i[sj]).max(TAU);

        if y_i != y_j {
            let delta = (-self.gradient[i] - self.gradient[j]) / quad;
            let diff = old_i - old_j;
            a_i = old_i + delta;
            a_j = old_j + delta;
            if diff > 0.0 {
                if a_j < 0.0 {
                    a_j = 0.0;
                    a_i = diff;
                }
            } else if a_i < 0.0 {
                a_i = 0.0;
                a_j = -diff;
            }
            if diff > 0.0 {
                if a_i > c {
                    a_i = c;
                    a_j = c - diff;
                }
            } else if a_j > c {
                a_j = c;
                a_i = c + diff;
            }
        } else {
            let delta = (self.gradient[i] - self.gradient[j]) / quad;
            let sum = old_i + old_j;
            a_i = old_i - delta;
            a_j = old_j + delta;
            if sum > c {
                if a_i > c {
                    a_i = c;
                    a_j = sum - c;
                }
            } else if a_j < 0.0 {
                a_j = 0.0;
                a_i = sum;
            }
            if sum > c {
                if a_j > c {
                    a_j = c;
                    a_i = sum - c;
                }
            } else if a_i < 0.0 {
                a_i = 0.0;
                a_j = sum;
            }
        }

        self.alpha[i] = a_i;
        self.alpha[j] = a_j;

        let (d_i, d_j) = (a_i - old_i, a_j - old_j);
        for t in 0..2 * self.n {
            let s = self.sample(t);
            let y_t = self.sign(t);
            self.gradient[t] += y_t * (y_i * k_i[s] * d_i + y_j * k_j[s] * d_j);
        }
    }

    /// Offset from free variables, else the midpoint of the feasible interval.
    fn rho(&self) -> f64 {
        let mut upper = f64::INFINITY;
        let mut lower = f64::NEG_INFINITY;
        let mut free_sum = 0.0;
        let mut free_count = 0usize;

        for t in 0..2 * self.n {
            let y_t = self.sign(t);
            let yg = y_t * self.gradient[t];
            if self.is_upper(t) {
                if y_t < 0.0 {
                    upper = upper.min(yg);
                } else {
                    lower = lower.max(yg);
                }
            } else if self.is_lower(t) {
                if y_t > 0.0 {
                    upper = upper.min(yg);
                } else {
                    lower = lower.max(yg);
                }
            } else {
                free_sum += yg;
                free_count += 1;
            }
        }

        if free_count > 0 {
            free_sum / free_count as f64
        } else {
            (upper + lower) / 2.0
        }
    }
}

fn rbf(gamma: f64, a: &[f64], b: &[f64]) -> f64 {
    let dist_sq: f64 = a.iter().zip(b.iter()).map(|(u, v)| (u - v).powi(2)).sum();
    (-gamma * dist_sq).exp()
}

/// `1 / (n_features * var(X))` over all entries of `x`; 1.0 for constant input.
fn scale_gamma(x: &[Vec<f64>], n_features: usize) -> f64 {
    let count = (x.len() * n_features) as f64;
    let mean = x.iter().flatten().sum::<f64>() / count;
    let var = x.iter().flatten().map(|v| (v - mean).powi(2)).sum::<f64>() / count;

    if var > 1e-12 {
        1.0 / (n_features as f64 * var)
    } else {
        1.0
    }
}
