//! Learner: bidirectional training and threshold-optimising evaluation.
//!
//! One direction trains on a source dataset and is judged on the other. The
//! trainer runs balancing, robust scaling, alignment and the voting ensemble;
//! the evaluator scans decision thresholds on the held-out domain.

pub mod evaluation;
pub mod training;

use thiserror::Error;

pub use evaluation::{
    evaluate_bidirectional, evaluate_direction, find_optimal_threshold, BidirectionalEvaluation,
    EvaluationReport, ThresholdSearch,
};
pub use training::{
    train_bidirectional, train_direction, train_direction_with, BidirectionalModels,
    DirectionModel, TrainingInfo,
};

/// Probability cut-offs 0.20, 0.25, ..., 0.80.
pub fn default_thresholds() -> Vec<f64> {
    (20..=80).step_by(5).map(|t| t as f64 / 100.0).collect()
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LearnerError {
    #[error("model expects {expected} features but '{dataset}' has {found}")]
    FeatureCountMismatch {
        dataset: String,
        expected: usize,
        found: usize,
    },

    #[error("dataset '{dataset}' has no samples")]
    EmptyDataset { dataset: String },
}
