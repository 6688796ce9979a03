//! Binary classifiers behind the soft-voting ensemble.
//!
//! Every model outputs the probability of label `1`; hard labels come from
//! comparing that probability with a threshold.

pub mod boosting;
pub mod forest;
pub mod svm;
pub mod tree;
pub mod voting;

use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};

pub use boosting::{BoostingConfig, GradientBoosting};
pub use forest::{ForestConfig, RandomForest};
pub use svm::{Gamma, RbfSvm, SvmConfig};
pub use tree::{Criterion, DecisionTree, MaxFeatures, TreeParams};
pub use voting::{FeatureImportance, VotingEnsemble, VotingWeights};

use crate::balance::balanced_sample_weights;

/// Common interface of the ensemble members.
pub trait BinaryClassifier {
    fn name(&self) -> &'static str;

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[usize], sample_weight: Option<&[f64]>);

    /// Probability of label `1` for every row.
    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array1<f64>;

    /// Label `1` where the probability reaches `threshold`.
    fn predict(&self, x: ArrayView2<'_, f64>, threshold: f64) -> Vec<usize> {
        self.predict_proba(x)
            .iter()
            .map(|&p| usize::from(p >= threshold))
            .collect()
    }
}

/// Per-class reweighting applied on top of any sample weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassWeight {
    Uniform,
    /// `n / (n_classes * count[class])`.
    Balanced,
}

impl ClassWeight {
    /// Combine class weights with optional caller-supplied sample weights.
    pub fn sample_weights(&self, y: &[usize], sample_weight: Option<&[f64]>) -> Vec<f64> {
        let base: Vec<f64> = match self {
            ClassWeight::Uniform => vec![1.0; y.len()],
            ClassWeight::Balanced => balanced_sample_weights(y).to_vec(),
        };
        match sample_weight {
            Some(extra) => base.iter().zip(extra).map(|(a, b)| a * b).collect(),
            None => base,
        }
    }
}

/// Fixed probability for degenerate training sets: 0.5 when empty, the
/// single label otherwise. `None` when both labels are present.
pub(crate) fn degenerate_probability(y: &[usize]) -> Option<f64> {
    let positives = y.iter().filter(|&&l| l == 1).count();
    if y.is_empty() {
        Some(0.5)
    } else if positives == 0 {
        Some(0.0)
    } else if positives == y.len() {
        Some(1.0)
    } else {
        None
    }
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
