//! # Affect Core
//!
//! Cross-domain training of arousal/valence classifiers on physiological
//! features. Two datasets recorded with different devices share a set of
//! mapped feature columns; a model is trained on one, aligned toward the
//! other, and judged there. Both directions are trained independently.
//!
//! ## Quick Start
//!
//! ```rust
//! use affect_core::adapt::{measure_domain_gap, CoralAligner, DomainAligner};
//! use ndarray::array;
//!
//! let source = array![[0.0, 1.0], [1.0, 0.0], [2.0, 2.0], [3.0, 1.0]];
//! let target = array![[5.0, 6.0], [6.0, 5.0], [7.0, 7.0], [8.0, 6.0]];
//!
//! let aligned = CoralAligner::default().align(source.view(), target.view());
//! let gap = measure_domain_gap(source.view(), target.view(), aligned.view());
//! assert!(gap.gap_after < gap.gap_before);
//! ```
//!
//! ## Core Modules
//!
//! - [`config`] - Pipeline configuration via TOML
//! - [`balance`] - SMOTE, ADASYN and SMOTE-ENN rebalancing
//! - [`adapt`] - CORAL, subspace and ensemble domain aligners
//! - [`models`] - Forest, boosting and SVM members of the voting ensemble
//! - [`learner`] - Bidirectional training and threshold-tuned evaluation
//! - [`pipeline`] - Driver over a [`FeatureSource`]
//! - [`logging`] - JSON line-delimited run records

pub mod adapt;
pub mod balance;
pub mod config;
pub mod learner;
pub mod linalg;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod scaling;
pub mod stats;

pub use adapt::{
    AdaptationMethod, Aligner, AlignmentFailure, AlignmentOutcome, AlignmentReport,
    CoralAligner, DomainAligner, EnsembleAligner, GapReport, SubspaceAligner,
};
pub use affect_shared::{
    ClassDistribution, DomainPair, FeatureMatrix, FeatureSource, SourceError, TargetDimension,
};
pub use balance::{BalanceMethod, BalanceOutcome, ClassBalancer, ResampleError};
pub use config::{
    AlignmentConfig, BalanceConfig, ConfigError, EnsembleConfig, EvaluationConfig, PipelineConfig,
};
pub use learner::{
    evaluate_direction, find_optimal_threshold, train_bidirectional, train_direction,
    DirectionModel, EvaluationReport, LearnerError, TrainingInfo,
};
pub use metrics::{ClassificationReport, ConfusionMatrix, ThresholdMetric};
pub use models::{BinaryClassifier, FeatureImportance, VotingEnsemble, VotingWeights};
pub use pipeline::{CrossDomainPipeline, CrossDomainRun, PipelineError, RunSummary};
pub use scaling::{RobustScaler, StandardScaler};
