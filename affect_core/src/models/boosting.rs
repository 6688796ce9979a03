//! Gradient boosting on the binomial log-loss.
//!
//! Each stage fits a squared-error tree to the residuals `y - p`, then replaces
//! every leaf value with one Newton step `Σ w·r / Σ w·p·(1 - p)` over the
//! samples in that leaf.

use std::collections::BTreeMap;

use ndarray::{Array1, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::tree::{Criterion, DecisionTree, MaxFeatures, TreeParams};
use super::{sigmoid, BinaryClassifier};

/// Prior probabilities are clipped to `[EPS, 1 - EPS]` before taking log-odds.
const PRIOR_EPS: f64 = f32::EPSILON as f64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostingConfig {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 5,
            learning_rate: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoosting {
    config: BoostingConfig,
    seed: u64,
    init: f64,
    trees: Vec<DecisionTree>,
}

impl GradientBoosting {
    pub fn new(config: BoostingConfig, seed: u64) -> Self {
        Self {
            config,
            seed,
            init: 0.0,
            trees: Vec::new(),
        }
    }

    pub fn n_stages(&self) -> usize {
        self.trees.len()
    }

    /// Raw additive score (log-odds of label 1).
    pub fn decision_function(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        let mut raw = Array1::from_elem(x.nrows(), self.init);
        for tree in &self.trees {
            raw.scaled_add(self.config.learning_rate, &tree.predict(x));
        }
        raw
    }
}

impl BinaryClassifier for GradientBoosting {
    fn name(&self) -> &'static str {
        "gradient_boosting"
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[usize], sample_weight: Option<&[f64]>) {
        self.trees.clear();
        let n = y.len();
        let weights: Vec<f64> = sample_weight.map_or_else(|| vec![1.0; n], |w| w.to_vec());
        let targets: Vec<f64> = y.iter().map(|&l| l as f64).collect();

        let total_w: f64 = weights.iter().sum();
        let prior = if total_w > 0.0 {
            targets.iter().zip(&weights).map(|(t, w)| t * w).sum::<f64>() / total_w
        } else {
            0.5
        };
        let prior = prior.clamp(PRIOR_EPS, 1.0 - PRIOR_EPS);
        self.init = (prior / (1.0 - prior)).ln();
        if n == 0 {
            return;
        }

        let params = TreeParams {
            criterion: Criterion::SquaredError,
            max_depth: Some(self.config.max_depth),
            max_features: MaxFeatures::All,
            ..TreeParams::default()
        };
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut raw = vec![self.init; n];

        for _ in 0..self.config.n_estimators {
            let probs: Vec<f64> = raw.iter().map(|&f| sigmoid(f)).collect();
            let residuals: Vec<f64> = targets.iter().zip(&probs).map(|(t, p)| t - p).collect();
            let mut tree = DecisionTree::fit(x, &residuals, &weights, &params, &mut rng);

            let leaves: Vec<usize> = x.outer_iter().map(|row| tree.apply(row)).collect();
            let mut newton: BTreeMap<usize, (f64, f64)> = BTreeMap::new();
            for i in 0..n {
                let entry = newton.entry(leaves[i]).or_insert((0.0, 0.0));
                entry.0 += weights[i] * residuals[i];
                entry.1 += weights[i] * probs[i] * (1.0 - probs[i]);
            }
            for (&leaf, &(num, den)) in &newton {
                let value = if den.abs() < 1e-150 { 0.0 } else { num / den };
                tree.set_leaf_value(leaf, value);
            }

            for i in 0..n {
                raw[i] += self.config.learning_rate * tree.predict_row(x.row(i));
            }
            self.trees.push(tree);
        }
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        self.decision_function(x).mapv(sigmoid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn init_is_prior_log_odds() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let mut model = GradientBoosting::new(
            BoostingConfig {
                n_estimators: 0,
                ..BoostingConfig::default()
            },
            0,
        );
        model.fit(x.view(), &[0, 0, 0, 1], None);
        let p = model.predict_proba(x.view());
        assert!((p[0] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn stages_move_towards_labels() {
        let x = array![[0.0], [1.0], [2.0], [10.0], [11.0], [12.0]];
        let y = [0, 0, 0, 1, 1, 1];
        let mut model = GradientBoosting::new(BoostingConfig::default(), 0);
        model.fit(x.view(), &y, None);
        assert_eq!(model.n_stages(), 100);
        let p = model.predict_proba(x.view());
        assert!(p[0] < 0.2);
        assert!(p[5] > 0.8);
        assert_eq!(model.predict(x.view(), 0.5), y.to_vec());
    }

    #[test]
    fn sample_weights_change_the_prior() {
        let x = array![[0.0], [0.0]];
        let mut model = GradientBoosting::new(
            BoostingConfig {
                n_estimators: 0,
                ..BoostingConfig::default()
            },
            0,
        );
        model.fit(x.view(), &[0, 1], Some(&[3.0, 1.0]));
        assert!((model.predict_proba(x.view())[0] - 0.25).abs() < 1e-12);
    }
}
