//! Soft-voting ensemble of a random forest, gradient boosting and an RBF SVM.

use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{BinaryClassifier, GradientBoosting, RandomForest, RbfSvm};
use crate::balance::balanced_sample_weights;
use crate::config::EnsembleConfig;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VotingWeights {
    pub forest: f64,
    pub boosting: f64,
    pub svm: f64,
}

impl Default for VotingWeights {
    fn default() -> Self {
        Self::new(0.4, 0.4, 0.2)
    }
}

impl VotingWeights {
    pub fn new(forest: f64, boosting: f64, svm: f64) -> Self {
        Self {
            forest,
            boosting,
            svm,
        }
    }

    /// Unit-sum copy, or `None` for negative, non-finite or all-zero weights.
    pub fn normalized(&self) -> Option<Self> {
        let parts = [self.forest, self.boosting, self.svm];
        let sum: f64 = parts.iter().sum();
        if !sum.is_finite() || sum <= 0.0 || parts.iter().any(|w| *w < 0.0) {
            return None;
        }
        Some(Self::new(self.forest / sum, self.boosting / sum, self.svm / sum))
    }
}

/// A feature and its share of the forest's impurity reduction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingEnsemble {
    forest: RandomForest,
    boosting: GradientBoosting,
    svm: RbfSvm,
    weights: VotingWeights,
}

impl VotingEnsemble {
    pub fn new(config: &EnsembleConfig, seed: u64) -> Self {
        Self {
            forest: RandomForest::new(config.forest, seed),
            boosting: GradientBoosting::new(config.boosting, seed),
            svm: RbfSvm::new(config.svm, seed),
            weights: config.weights.normalized().unwrap_or_default(),
        }
    }

    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    pub fn boosting(&self) -> &GradientBoosting {
        &self.boosting
    }

    pub fn svm(&self) -> &RbfSvm {
        &self.svm
    }

    pub fn weights(&self) -> VotingWeights {
        self.weights
    }

    /// Forest importances paired with `names`, most important first.
    ///
    /// Falls back to a uniform share when the forest has no splits to report.
    pub fn feature_importance(&self, names: &[String]) -> Vec<FeatureImportance> {
        let mut importances = self.forest.feature_importances();
        if importances.len() != names.len() || importances.sum() <= 0.0 {
            let share = if names.is_empty() {
                0.0
            } else {
                1.0 / names.len() as f64
            };
            importances = Array1::from_elem(names.len(), share);
        }
        let mut table: Vec<FeatureImportance> = names
            .iter()
            .zip(importances.iter())
            .map(|(name, &importance)| FeatureImportance {
                feature: name.clone(),
                importance,
            })
            .collect();
        table.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        table
    }
}

impl BinaryClassifier for VotingEnsemble {
    fn name(&self) -> &'static str {
        "voting_ensemble"
    }

    /// Fit all three members, then refit boosting with balanced sample weights.
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[usize], sample_weight: Option<&[f64]>) {
        self.forest.fit(x, y, sample_weight);
        self.boosting.fit(x, y, sample_weight);
        self.svm.fit(x, y, sample_weight);
        debug!(
            trees = self.forest.n_trees(),
            support_vectors = self.svm.n_support(),
            "ensemble members fitted"
        );

        let balanced = balanced_sample_weights(y);
        self.boosting.fit(x, y, balanced.as_slice());
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        let w = self.weights;
        self.forest.predict_proba(x) * w.forest
            + self.boosting.predict_proba(x) * w.boosting
            + self.svm.predict_proba(x) * w.svm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoostingConfig, ForestConfig, SvmConfig};
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn small_config() -> EnsembleConfig {
        EnsembleConfig {
            forest: ForestConfig {
                n_estimators: 10,
                ..ForestConfig::default()
            },
            boosting: BoostingConfig {
                n_estimators: 10,
                ..BoostingConfig::default()
            },
            svm: SvmConfig::default(),
            weights: VotingWeights::default(),
        }
    }

    fn imbalanced(seed: u64) -> (Array2<f64>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = 40;
        let mut x = Array2::zeros((n, 3));
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let label = usize::from(i % 4 == 0);
            for j in 0..3 {
                x[[i, j]] = label as f64 * 2.0 + rng.gen_range(-1.0..1.0);
            }
            y.push(label);
        }
        (x, y)
    }

    #[test]
    fn weights_normalise() {
        let w = VotingWeights::new(2.0, 2.0, 1.0).normalized().unwrap();
        assert!((w.forest + w.boosting + w.svm - 1.0).abs() < 1e-12);
        assert!(VotingWeights::new(0.0, 0.0, 0.0).normalized().is_none());
    }

    #[test]
    fn boosting_ends_up_fitted_with_balanced_weights() {
        let (x, y) = imbalanced(1);
        let config = small_config();
        let mut ensemble = VotingEnsemble::new(&config, 42);
        ensemble.fit(x.view(), &y, None);

        let mut reference = GradientBoosting::new(config.boosting, 42);
        reference.fit(x.view(), &y, balanced_sample_weights(&y).as_slice());
        assert_eq!(
            ensemble.boosting().predict_proba(x.view()),
            reference.predict_proba(x.view())
        );
    }

    #[test]
    fn probabilities_are_weighted_average() {
        let (x, y) = imbalanced(2);
        let mut ensemble = VotingEnsemble::new(&small_config(), 42);
        ensemble.fit(x.view(), &y, None);
        let expected = ensemble.forest().predict_proba(x.view()) * 0.4
            + ensemble.boosting().predict_proba(x.view()) * 0.4
            + ensemble.svm().predict_proba(x.view()) * 0.2;
        let got = ensemble.predict_proba(x.view());
        for (a, b) in got.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
        assert!(got.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn importance_table_is_sorted_and_complete() {
        let (x, y) = imbalanced(3);
        let mut ensemble = VotingEnsemble::new(&small_config(), 42);
        ensemble.fit(x.view(), &y, None);
        let names: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let table = ensemble.feature_importance(&names);
        assert_eq!(table.len(), 3);
        assert!(table.windows(2).all(|w| w[0].importance >= w[1].importance));
        let total: f64 = table.iter().map(|f| f.importance).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unfitted_ensemble_reports_uniform_importance() {
        let ensemble = VotingEnsemble::new(&small_config(), 0);
        let names = vec!["x".to_string(), "y".to_string()];
        let table = ensemble.feature_importance(&names);
        assert!(table.iter().all(|f| (f.importance - 0.5).abs() < 1e-12));
    }
}
