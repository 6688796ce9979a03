//! Bagged CART forest with balanced class weights, trees fitted in parallel.

use ndarray::{Array1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::tree::{Criterion, DecisionTree, MaxFeatures, TreeParams};
use super::{degenerate_probability, BinaryClassifier, ClassWeight};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_estimators: usize,
    /// `None` grows trees until leaves are pure.
    pub max_depth: Option<usize>,
    pub max_features: MaxFeatures,
    pub class_weight: ClassWeight,
    pub bootstrap: bool,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: Some(8),
            max_features: MaxFeatures::Sqrt,
            class_weight: ClassWeight::Balanced,
            bootstrap: true,
        }
    }
}

impl ForestConfig {
    /// Smaller, unbounded forest used to score resampling candidates.
    pub fn quick(n_estimators: usize) -> Self {
        Self {
            n_estimators,
            max_depth: None,
            ..Self::default()
        }
    }
}

/// Bagged Gini trees; probabilities are the mean of the trees' leaf frequencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    config: ForestConfig,
    seed: u64,
    trees: Vec<DecisionTree>,
    n_features: usize,
    constant: Option<f64>,
}

impl RandomForest {
    pub fn new(config: ForestConfig, seed: u64) -> Self {
        Self {
            config,
            seed,
            trees: Vec::new(),
            n_features: 0,
            constant: None,
        }
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Mean of the per-tree normalised impurity decreases, renormalised.
    ///
    /// All zeros when no tree managed a split.
    pub fn feature_importances(&self) -> Array1<f64> {
        let mut total = Array1::zeros(self.n_features);
        for tree in &self.trees {
            total += &tree.feature_importances();
        }
        let sum = total.sum();
        if sum > 0.0 {
            total / sum
        } else {
            total
        }
    }
}

impl BinaryClassifier for RandomForest {
    fn name(&self) -> &'static str {
        "random_forest"
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[usize], sample_weight: Option<&[f64]>) {
        self.n_features = x.ncols();
        self.trees.clear();
        self.constant = degenerate_probability(y);
        if self.constant.is_some() {
            return;
        }

        let base_weights = self.config.class_weight.sample_weights(y, sample_weight);
        let targets: Vec<f64> = y.iter().map(|&l| l as f64).collect();
        let params = TreeParams {
            criterion: Criterion::Gini,
            max_depth: self.config.max_depth,
            max_features: self.config.max_features,
            ..TreeParams::default()
        };

        let mut master = StdRng::seed_from_u64(self.seed);
        let tree_seeds: Vec<u64> = (0..self.config.n_estimators).map(|_| master.gen()).collect();
        let n = y.len();
        let bootstrap = self.config.bootstrap;

        self.trees = tree_seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let weights: Vec<f64> = if bootstrap {
                    let mut counts = vec![0usize; n];
                    for _ in 0..n {
                        counts[rng.gen_range(0..n)] += 1;
                    }
                    counts
                        .iter()
                        .zip(&base_weights)
                        .map(|(&c, &w)| c as f64 * w)
                        .collect()
                } else {
                    base_weights.clone()
                };
                DecisionTree::fit(x, &targets, &weights, &params, &mut rng)
            })
            .collect();
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        if let Some(p) = self.constant {
            return Array1::from_elem(x.nrows(), p);
        }
        if self.trees.is_empty() {
            return Array1::from_elem(x.nrows(), 0.5);
        }
        let mut sum = Array1::zeros(x.nrows());
        for tree in &self.trees {
            sum += &tree.predict(x);
        }
        sum / self.trees.len() as f64
    }
}
