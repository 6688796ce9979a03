//! RBF-kernel support vector classifier with Platt-scaled probabilities.
//!
//! The dual is solved by sequential minimal optimisation with second-order
//! working-set selection. Probabilities come from a sigmoid fitted to
//! decision values obtained by internal cross-validation, so the calibration
//! data is never scored by a model that saw it.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{degenerate_probability, BinaryClassifier, ClassWeight};
use crate::stats::total_variance;

const TAU: f64 = 1e-12;
/// Kernel rows are cached when the full matrix stays under this many entries.
const KERNEL_CACHE_LIMIT: usize = 4_000_000;

/// RBF width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Gamma {
    /// `1 / (d * Var(X))` over all entries of the training matrix.
    Scale,
    Fixed(f64),
}

impl Gamma {
    pub fn resolve(&self, x: ArrayView2<'_, f64>) -> f64 {
        match *self {
            Gamma::Fixed(g) => g,
            Gamma::Scale => {
                let var = total_variance(x);
                if var > 0.0 && x.ncols() > 0 {
                    1.0 / (x.ncols() as f64 * var)
                } else {
                    1.0
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SvmConfig {
    pub c: f64,
    pub gamma: Gamma,
    pub class_weight: ClassWeight,
    /// Stopping tolerance on the maximal KKT violation.
    pub tol: f64,
    pub max_iter: usize,
    /// Folds used to collect out-of-fold decision values for calibration.
    pub probability_folds: usize,
}

impl Default for SvmConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            gamma: Gamma::Scale,
            class_weight: ClassWeight::Balanced,
            tol: 1e-3,
            max_iter: 200_000,
            probability_folds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DualModel {
    support: Array2<f64>,
    /// `alpha_i * y_i` for each support vector.
    coef: Vec<f64>,
    rho: f64,
    gamma: f64,
}

impl DualModel {
    fn decision(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.support
            .outer_iter()
            .zip(&self.coef)
            .map(|(sv, &c)| c * rbf(sv, row, self.gamma))
            .sum::<f64>()
            - self.rho
    }
}

/// Sigmoid `P(y = 1 | f) = 1 / (1 + exp(a·f + b))`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlattScaling {
    pub a: f64,
    pub b: f64,
}

impl PlattScaling {
    pub fn probability(&self, decision: f64) -> f64 {
        let fapb = decision * self.a + self.b;
        if fapb >= 0.0 {
            (-fapb).exp() / (1.0 + (-fapb).exp())
        } else {
            1.0 / (1.0 + fapb.exp())
        }
    }

    /// Newton fit with backtracking on smoothed targets.
    pub fn fit(decisions: &[f64], labels: &[usize]) -> Self {
        let prior1 = labels.iter().filter(|&&l| l == 1).count() as f64;
        let prior0 = labels.len() as f64 - prior1;
        let hi_target = (prior1 + 1.0) / (prior1 + 2.0);
        let lo_target = 1.0 / (prior0 + 2.0);
        let t: Vec<f64> = labels
            .iter()
            .map(|&l| if l == 1 { hi_target } else { lo_target })
            .collect();

        let objective = |a: f64, b: f64| -> f64 {
            decisions
                .iter()
                .zip(&t)
                .map(|(&f, &ti)| {
                    let fapb = f * a + b;
                    if fapb >= 0.0 {
                        ti * fapb + (1.0 + (-fapb).exp()).ln()
                    } else {
                        (ti - 1.0) * fapb + (1.0 + fapb.exp()).ln()
                    }
                })
                .sum()
        };

        let mut a = 0.0;
        let mut b = ((prior0 + 1.0) / (prior1 + 1.0)).ln();
        let mut fval = objective(a, b);

        for _ in 0..100 {
            let (mut h11, mut h22, mut h21, mut g1, mut g2) = (1e-12, 1e-12, 0.0, 0.0, 0.0);
            for (&f, &ti) in decisions.iter().zip(&t) {
                let fapb = f * a + b;
                let (p, q) = if fapb >= 0.0 {
                    let e = (-fapb).exp();
                    (e / (1.0 + e), 1.0 / (1.0 + e))
                } else {
                    let e = fapb.exp();
                    (1.0 / (1.0 + e), e / (1.0 + e))
                };
                let d2 = p * q;
                h11 += f * f * d2;
                h22 += d2;
                h21 += f * d2;
                let d1 = ti - p;
                g1 += f * d1;
                g2 += d1;
            }
            if g1.abs() < 1e-5 && g2.abs() < 1e-5 {
                break;
            }

            let det = h11 * h22 - h21 * h21;
            let da = -(h22 * g1 - h21 * g2) / det;
            let db = -(-h21 * g1 + h11 * g2) / det;
            let gd = g1 * da + g2 * db;

            let mut step = 1.0;
            while step >= 1e-10 {
                let new_a = a + step * da;
                let new_b = b + step * db;
                let new_f = objective(new_a, new_b);
                if new_f < fval + 1e-4 * step * gd {
                    a = new_a;
                    b = new_b;
                    fval = new_f;
                    break;
                }
                step /= 2.0;
            }
            if step < 1e-10 {
                warn!("Platt scaling line search failed");
                break;
            }
        }
        Self { a, b }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RbfSvm {
    config: SvmConfig,
    seed: u64,
    model: Option<DualModel>,
    platt: PlattScaling,
    constant: Option<f64>,
}

impl RbfSvm {
    pub fn new(config: SvmConfig, seed: u64) -> Self {
        Self {
            config,
            seed,
            model: None,
            platt: PlattScaling { a: -1.0, b: 0.0 },
            constant: None,
        }
    }

    pub fn n_support(&self) -> usize {
        self.model.as_ref().map_or(0, |m| m.coef.len())
    }

    pub fn platt(&self) -> PlattScaling {
        self.platt
    }

    /// Signed distance to the separating surface; positive favours label 1.
    pub fn decision_function(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        match (&self.model, self.constant) {
            (Some(model), _) => Array1::from_iter(x.outer_iter().map(|row| model.decision(row))),
            (None, Some(p)) if p >= 0.5 => Array1::ones(x.nrows()),
            (None, _) => Array1::from_elem(x.nrows(), -1.0),
        }
    }

    fn out_of_fold_decisions(
        &self,
        x: ArrayView2<'_, f64>,
        y: &[usize],
        costs: &[f64],
        gamma: f64,
    ) -> Vec<f64> {
        let n = y.len();
        let folds = self.config.probability_folds.clamp(2, n.max(2));
        let mut perm: Vec<usize> = (0..n).collect();
        perm.shuffle(&mut StdRng::seed_from_u64(self.seed));

        let mut decisions = vec![0.0; n];
        for fold in 0..folds {
            let begin = fold * n / folds;
            let end = (fold + 1) * n / folds;
            let held_out = &perm[begin..end];
            let train: Vec<usize> = perm[..begin].iter().chain(&perm[end..]).copied().collect();
            let train_y: Vec<usize> = train.iter().map(|&i| y[i]).collect();

            let positives = train_y.iter().filter(|&&l| l == 1).count();
            let fixed = if train.is_empty() {
                Some(0.0)
            } else if positives == train.len() {
                Some(1.0)
            } else if positives == 0 {
                Some(-1.0)
            } else {
                None
            };
            if let Some(value) = fixed {
                for &i in held_out {
                    decisions[i] = value;
                }
                continue;
            }

            let train_x = x.select(Axis(0), &train);
            let train_c: Vec<f64> = train.iter().map(|&i| costs[i]).collect();
            let model = solve(train_x.view(), &train_y, &train_c, gamma, &self.config);
            for &i in held_out {
                decisions[i] = model.decision(x.row(i));
            }
        }
        decisions
    }
}

impl BinaryClassifier for RbfSvm {
    fn name(&self) -> &'static str {
        "svm"
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[usize], sample_weight: Option<&[f64]>) {
        self.model = None;
        self.constant = degenerate_probability(y);
        if self.constant.is_some() {
            return;
        }

        let costs: Vec<f64> = self
            .config
            .class_weight
            .sample_weights(y, sample_weight)
            .into_iter()
            .map(|w| w * self.config.c)
            .collect();
        let gamma = self.config.gamma.resolve(x);

        let decisions = self.out_of_fold_decisions(x, y, &costs, gamma);
        self.platt = PlattScaling::fit(&decisions, y);
        self.model = Some(solve(x, y, &costs, gamma, &self.config));
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        if let Some(p) = self.constant {
            return Array1::from_elem(x.nrows(), p);
        }
        self.decision_function(x)
            .mapv(|f| self.platt.probability(f))
    }
}

fn rbf(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>, gamma: f64) -> f64 {
    let dist2: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
    (-gamma * dist2).exp()
}

struct KernelRows<'a> {
    x: ArrayView2<'a, f64>,
    gamma: f64,
    cache: Option<Vec<Option<Vec<f64>>>>,
}

impl<'a> KernelRows<'a> {
    fn new(x: ArrayView2<'a, f64>, gamma: f64) -> Self {
        let n = x.nrows();
        let cache = (n.saturating_mul(n) <= KERNEL_CACHE_LIMIT).then(|| vec![None; n]);
        Self { x, gamma, cache }
    }

    fn compute(&self, i: usize) -> Vec<f64> {
        let row = self.x.row(i);
        self.x
            .outer_iter()
            .map(|other| rbf(row, other, self.gamma))
            .collect()
    }

    fn row(&mut self, i: usize) -> Vec<f64> {
        if let Some(Some(row)) = self.cache.as_ref().map(|cache| &cache[i]) {
            return row.clone();
        }
        let row = self.compute(i);
        if let Some(cache) = self.cache.as_mut() {
            cache[i] = Some(row.clone());
        }
        row
    }
}

/// SMO on `min ½αᵀQα - eᵀα` with `0 ≤ α_i ≤ C_i`, `yᵀα = 0`.
fn solve(
    x: ArrayView2<'_, f64>,
    labels: &[usize],
    costs: &[f64],
    gamma: f64,
    config: &SvmConfig,
) -> DualModel {
    let n = labels.len();
    let y: Vec<f64> = labels
        .iter()
        .map(|&l| if l == 1 { 1.0 } else { -1.0 })
        .collect();
    let mut alpha = vec![0.0; n];
    let mut grad = vec![-1.0; n];
    let mut kernel = KernelRows::new(x, gamma);

    let in_up = |t: usize, alpha: &[f64]| {
        (y[t] > 0.0 && alpha[t] < costs[t]) || (y[t] < 0.0 && alpha[t] > 0.0)
    };
    let in_low = |t: usize, alpha: &[f64]| {
        (y[t] > 0.0 && alpha[t] > 0.0) || (y[t] < 0.0 && alpha[t] < costs[t])
    };

    let mut converged = false;
    for _ in 0..config.max_iter {
        let mut gmax = f64::NEG_INFINITY;
        let mut i_sel = None;
        for t in 0..n {
            if in_up(t, &alpha) && -y[t] * grad[t] >= gmax {
                gmax = -y[t] * grad[t];
                i_sel = Some(t);
            }
        }
        let Some(i) = i_sel else {
            converged = true;
            break;
        };
        let k_i = kernel.row(i);

        let mut gmax2 = f64::NEG_INFINITY;
        let mut j_sel = None;
        let mut best_obj = f64::INFINITY;
        for t in 0..n {
            if !in_low(t, &alpha) {
                continue;
            }
            let yg = y[t] * grad[t];
            gmax2 = gmax2.max(yg);
            let diff = gmax + yg;
            if diff > 0.0 {
                let quad = 2.0 - 2.0 * k_i[t];
                let obj = -(diff * diff) / if quad > 0.0 { quad } else { TAU };
                if obj <= best_obj {
                    best_obj = obj;
                    j_sel = Some(t);
                }
            }
        }
        let Some(j) = j_sel.filter(|_| gmax + gmax2 >= config.tol) else {
            converged = true;
            break;
        };
        let k_j = kernel.row(j);

        let (old_i, old_j) = (alpha[i], alpha[j]);
        let (c_i, c_j) = (costs[i], costs[j]);
        let q_ij = y[i] * y[j] * k_i[j];
        if y[i] != y[j] {
            let quad = (2.0 + 2.0 * q_ij).max(TAU);
            let delta = (-grad[i] - grad[j]) / quad;
            let diff = alpha[i] - alpha[j];
            alpha[i] += delta;
            alpha[j] += delta;
            if diff > 0.0 {
                if alpha[j] < 0.0 {
                    alpha[j] = 0.0;
                    alpha[i] = diff;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = -diff;
            }
            if diff > c_i - c_j {
                if alpha[i] > c_i {
                    alpha[i] = c_i;
                    alpha[j] = c_i - diff;
                }
            } else if alpha[j] > c_j {
                alpha[j] = c_j;
                alpha[i] = c_j + diff;
            }
        } else {
            let quad = (2.0 - 2.0 * q_ij).max(TAU);
            let delta = (grad[i] - grad[j]) / quad;
            let sum = alpha[i] + alpha[j];
            alpha[i] -= delta;
            alpha[j] += delta;
            if sum > c_i {
                if alpha[i] > c_i {
                    alpha[i] = c_i;
                    alpha[j] = sum - c_i;
                }
            } else if alpha[j] < 0.0 {
                alpha[j] = 0.0;
                alpha[i] = sum;
            }
            if sum > c_j {
                if alpha[j] > c_j {
                    alpha[j] = c_j;
                    alpha[i] = sum - c_j;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = sum;
            }
        }

        let (d_i, d_j) = (alpha[i] - old_i, alpha[j] - old_j);
        for t in 0..n {
            grad[t] += y[t] * (y[i] * k_i[t] * d_i + y[j] * k_j[t] * d_j);
        }
    }
    if !converged {
        warn!(max_iter = config.max_iter, "SMO stopped before reaching tolerance");
    }

    let rho = compute_rho(&y, &alpha, &grad, costs);
    let support_idx: Vec<usize> = (0..n).filter(|&t| alpha[t] > 0.0).collect();
    DualModel {
        support: x.select(Axis(0), &support_idx),
        coef: support_idx.iter().map(|&t| alpha[t] * y[t]).collect(),
        rho,
        gamma,
    }
}

fn compute_rho(y: &[f64], alpha: &[f64], grad: &[f64], costs: &[f64]) -> f64 {
    let (mut ub, mut lb) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut free, mut sum_free) = (0usize, 0.0);
    for t in 0..y.len() {
        let yg = y[t] * grad[t];
        if alpha[t] >= costs[t] {
            if y[t] < 0.0 {
                ub = ub.min(yg);
            } else {
                lb = lb.max(yg);
            }
        } else if alpha[t] <= 0.0 {
            if y[t] > 0.0 {
                ub = ub.min(yg);
            } else {
                lb = lb.max(yg);
            }
        } else {
            free += 1;
            sum_free += yg;
        }
    }
    if free > 0 {
        sum_free / free as f64
    } else {
        (ub + lb) / 2.0
    }
}
