//! Held-out evaluation with a decision threshold tuned against class imbalance.

use serde::Serialize;
use tracing::info;

use affect_shared::{DomainPair, FeatureMatrix};

use super::training::{BidirectionalModels, DirectionModel};
use super::LearnerError;
use crate::config::EvaluationConfig;
use crate::metrics::{
    accuracy, balanced_accuracy, pr_auc, roc_auc, weighted_f1, ClassificationReport,
    ConfusionMatrix, ThresholdMetric,
};

/// Outcome of scanning candidate thresholds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdSearch {
    pub threshold: f64,
    pub score: f64,
    pub metric: ThresholdMetric,
    /// `(threshold, score)` for every candidate, in scan order.
    pub curve: Vec<(f64, f64)>,
}

/// Scan `thresholds` in order, keeping the first one with a strictly higher score.
///
/// The search starts from threshold 0.5 with score 0, so 0.5 is returned when
/// no candidate scores above zero.
pub fn find_optimal_threshold(
    y_true: &[usize],
    y_prob: &[f64],
    thresholds: &[f64],
    metric: ThresholdMetric,
) -> ThresholdSearch {
    let mut best_threshold = 0.5;
    let mut best_score = 0.0;
    let mut curve = Vec::with_capacity(thresholds.len());
    for &threshold in thresholds {
        let y_pred: Vec<usize> = y_prob
            .iter()
            .map(|&p| usize::from(p >= threshold))
            .collect();
        let score = metric.score(y_true, &y_pred);
        curve.push((threshold, score));
        if score > best_score {
            best_score = score;
            best_threshold = threshold;
        }
    }
    ThresholdSearch {
        threshold: best_threshold,
        score: best_score,
        metric,
        curve,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub direction: String,
    pub threshold: ThresholdSearch,
    pub accuracy: f64,
    pub weighted_f1: f64,
    pub balanced_accuracy: f64,
    /// `None` when the test labels hold a single class.
    pub roc_auc: Option<f64>,
    pub pr_auc: Option<f64>,
    pub confusion: ConfusionMatrix,
    pub report: ClassificationReport,
    pub y_true: Vec<usize>,
    pub y_pred: Vec<usize>,
    pub y_prob: Vec<f64>,
}

/// Score `model` on `test`, choosing the threshold on the same data.
pub fn evaluate_direction(
    model: &DirectionModel,
    test: &FeatureMatrix,
    config: &EvaluationConfig,
) -> Result<EvaluationReport, LearnerError> {
    if test.n_features() != model.n_features() {
        return Err(LearnerError::FeatureCountMismatch {
            dataset: test.dataset().to_string(),
            expected: model.n_features(),
            found: test.n_features(),
        });
    }

    let y_true = test.labels().to_vec();
    let y_prob = model.predict_proba(test.features()).to_vec();
    let search = find_optimal_threshold(&y_true, &y_prob, &config.thresholds, config.metric);
    let y_pred: Vec<usize> = y_prob
        .iter()
        .map(|&p| usize::from(p >= search.threshold))
        .collect();

    let report = EvaluationReport {
        direction: model.direction(),
        accuracy: accuracy(&y_true, &y_pred),
        weighted_f1: weighted_f1(&y_true, &y_pred),
        balanced_accuracy: balanced_accuracy(&y_true, &y_pred),
        roc_auc: roc_auc(&y_true, &y_prob),
        pr_auc: pr_auc(&y_true, &y_prob),
        confusion: ConfusionMatrix::with_labels(&y_true, &y_pred, vec![0, 1]),
        report: ClassificationReport::new(&y_true, &y_pred),
        threshold: search,
        y_true,
        y_pred,
        y_prob,
    };
    info!(
        direction = %report.direction,
        threshold = report.threshold.threshold,
        accuracy = report.accuracy,
        f1_weighted = report.weighted_f1,
        balanced_accuracy = report.balanced_accuracy,
        roc_auc = ?report.roc_auc,
        "direction evaluated"
    );
    Ok(report)
}

#[derive(Debug, Clone, Serialize)]
pub struct BidirectionalEvaluation {
    /// Forward model scored on the pair's target.
    pub forward: EvaluationReport,
    /// Reverse model scored on the pair's source.
    pub reverse: EvaluationReport,
}

pub fn evaluate_bidirectional(
    models: &BidirectionalModels,
    pair: &DomainPair,
    config: &EvaluationConfig,
) -> Result<BidirectionalEvaluation, LearnerError> {
    Ok(BidirectionalEvaluation {
        forward: evaluate_direction(&models.forward, pair.target(), config)?,
        reverse: evaluate_direction(&models.reverse, pair.source(), config)?,
    })
}
