//! Pipeline configuration via TOML files.
//!
//! Every key is optional; missing keys take the defaults below. Method names
//! are parsed leniently: an unknown adaptation method disables adaptation and
//! an unknown balancing method falls back to SMOTE, both with a warning.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use toml::Value;

use crate::adapt::{AdaptationMethod, AlignmentWeights, DEFAULT_CORAL_REG};
use crate::balance::BalanceMethod;
use crate::metrics::ThresholdMetric;
use crate::models::{BoostingConfig, ClassWeight, ForestConfig, Gamma, SvmConfig, VotingWeights};

pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Full pipeline configuration.
///
/// # Examples
///
/// ```
/// use affect_core::PipelineConfig;
///
/// let config = PipelineConfig::from_str("seed = 7\n[balance]\nmethod = \"adasyn\"").unwrap();
/// assert_eq!(config.seed, 7);
/// assert_eq!(config.balance.threshold, 0.7);
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    /// Seed for resampling, tree bagging and SVM probability folds.
    pub seed: u64,
    pub alignment: AlignmentConfig,
    pub balance: BalanceConfig,
    pub ensemble: EnsembleConfig,
    pub evaluation: EvaluationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            alignment: AlignmentConfig::default(),
            balance: BalanceConfig::default(),
            ensemble: EnsembleConfig::default(),
            evaluation: EvaluationConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_str(&contents)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(toml_str: &str) -> Result<Self, ConfigError> {
        let raw: RawPipelineConfig =
            toml::from_str(toml_str).map_err(|err| ConfigError::Parse(err.to_string()))?;

        Ok(Self {
            seed: raw.seed,
            alignment: AlignmentConfig::try_from(&raw.alignment)?,
            balance: BalanceConfig::try_from(&raw.balance)?,
            ensemble: EnsembleConfig::try_from(&raw.ensemble)?,
            evaluation: EvaluationConfig::try_from(&raw.evaluation)?,
        })
    }

    pub fn with_method(mut self, method: AdaptationMethod) -> Self {
        self.alignment.method = method;
        self
    }
}

/// Domain adaptation settings.
#[derive(Debug, Clone, Serialize)]
pub struct AlignmentConfig {
    pub method: AdaptationMethod,
    /// Ridge added to both covariance diagonals in CORAL.
    pub coral_reg: f64,
    /// Fixed subspace dimension; derived from the data shape when unset.
    pub subspace_components: Option<usize>,
    pub weights: AlignmentWeights,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            method: AdaptationMethod::default(),
            coral_reg: DEFAULT_CORAL_REG,
            subspace_components: None,
            weights: AlignmentWeights::default(),
        }
    }
}

impl AlignmentConfig {
    fn try_from(raw: &RawAlignment) -> Result<Self, ConfigError> {
        if !raw.coral_reg.is_finite() || raw.coral_reg < 0.0 {
            return Err(invalid("alignment.coral_reg", "must be non-negative"));
        }
        if raw.subspace_components == Some(0) {
            return Err(invalid("alignment.subspace_components", "must be at least 1"));
        }
        let weights = AlignmentWeights::new(raw.weights.subspace, raw.weights.coral, raw.weights.rescale);
        weights
            .normalized()
            .map_err(|err| invalid("alignment.weights", err.to_string()))?;

        Ok(Self {
            method: AdaptationMethod::from_name_or_none(&raw.method),
            coral_reg: raw.coral_reg,
            subspace_components: raw.subspace_components,
            weights,
        })
    }
}

/// Class rebalancing settings.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceConfig {
    /// Resample only when minority/majority falls below this.
    pub threshold: f64,
    pub method: BalanceMethod,
    /// Desired minority/majority ratio after SMOTE and ADASYN.
    pub sampling_strategy: f64,
    pub k_neighbors: usize,
    /// Neighbourhood size of the edited-nearest-neighbours cleaning step.
    pub enn_neighbors: usize,
    /// Validation fraction used when the method is chosen automatically.
    pub cv_test_size: f64,
    /// Trees in the quick forest that scores candidates in automatic mode.
    pub selection_trees: usize,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            method: BalanceMethod::Smote,
            sampling_strategy: 0.8,
            k_neighbors: 5,
            enn_neighbors: 3,
            cv_test_size: 0.2,
            selection_trees: 50,
        }
    }
}

impl BalanceConfig {
    fn try_from(raw: &RawBalance) -> Result<Self, ConfigError> {
        if !(raw.threshold > 0.0 && raw.threshold <= 1.0) {
            return Err(invalid("balance.threshold", "must be in (0, 1]"));
        }
        if !(raw.sampling_strategy > 0.0 && raw.sampling_strategy <= 1.0) {
            return Err(invalid("balance.sampling_strategy", "must be in (0, 1]"));
        }
        if !(raw.cv_test_size > 0.0 && raw.cv_test_size < 1.0) {
            return Err(invalid("balance.cv_test_size", "must be in (0, 1)"));
        }
        if raw.k_neighbors == 0 || raw.enn_neighbors == 0 {
            return Err(invalid("balance.k_neighbors", "neighbour counts must be positive"));
        }
        if raw.selection_trees == 0 {
            return Err(invalid("balance.selection_trees", "must be positive"));
        }

        Ok(Self {
            threshold: raw.threshold,
            method: BalanceMethod::from_name_or_smote(&raw.method),
            sampling_strategy: raw.sampling_strategy,
            k_neighbors: raw.k_neighbors,
            enn_neighbors: raw.enn_neighbors,
            cv_test_size: raw.cv_test_size,
            selection_trees: raw.selection_trees,
        })
    }
}

/// Hyper-parameters of the three voting members.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnsembleConfig {
    pub forest: ForestConfig,
    pub boosting: BoostingConfig,
    pub svm: SvmConfig,
    pub weights: VotingWeights,
}

impl EnsembleConfig {
    fn try_from(raw: &RawEnsemble) -> Result<Self, ConfigError> {
        let forest = &raw.forest;
        if forest.n_estimators == 0 {
            return Err(invalid("ensemble.forest.n_estimators", "must be positive"));
        }
        let boosting = &raw.boosting;
        if boosting.n_estimators == 0 || boosting.max_depth == 0 {
            return Err(invalid("ensemble.boosting", "stages and depth must be positive"));
        }
        if !(boosting.learning_rate > 0.0 && boosting.learning_rate.is_finite()) {
            return Err(invalid("ensemble.boosting.learning_rate", "must be positive"));
        }
        let svm = &raw.svm;
        if !(svm.c > 0.0 && svm.c.is_finite()) {
            return Err(invalid("ensemble.svm.c", "must be positive"));
        }
        let gamma = parse_gamma(&svm.gamma)?;

        let weights = VotingWeights::new(raw.weights.forest, raw.weights.boosting, raw.weights.svm);
        if weights.normalized().is_none() {
            return Err(invalid("ensemble.weights", "must be non-negative with a positive sum"));
        }

        Ok(Self {
            forest: ForestConfig {
                n_estimators: forest.n_estimators,
                max_depth: if forest.max_depth == 0 {
                    None
                } else {
                    Some(forest.max_depth)
                },
                ..ForestConfig::default()
            },
            boosting: BoostingConfig {
                n_estimators: boosting.n_estimators,
                max_depth: boosting.max_depth,
                learning_rate: boosting.learning_rate,
            },
            svm: SvmConfig {
                c: svm.c,
                gamma,
                class_weight: ClassWeight::Balanced,
                max_iter: svm.max_iter,
                ..SvmConfig::default()
            },
            weights,
        })
    }
}

fn parse_gamma(value: &Value) -> Result<Gamma, ConfigError> {
    let gamma = match value {
        Value::String(name) if name.eq_ignore_ascii_case("scale") => Gamma::Scale,
        Value::Float(v) => Gamma::Fixed(*v),
        Value::Integer(v) => Gamma::Fixed(*v as f64),
        other => {
            return Err(invalid(
                "ensemble.svm.gamma",
                format!("expected \"scale\" or a number, got {other}"),
            ))
        }
    };
    if let Gamma::Fixed(v) = gamma {
        if !(v > 0.0 && v.is_finite()) {
            return Err(invalid("ensemble.svm.gamma", "must be positive"));
        }
    }
    Ok(gamma)
}

/// Threshold tuning settings.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationConfig {
    pub metric: ThresholdMetric,
    /// Candidate probability cut-offs, searched in order.
    pub thresholds: Vec<f64>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            metric: ThresholdMetric::MacroF1,
            thresholds: crate::learner::default_thresholds(),
        }
    }
}

impl EvaluationConfig {
    fn try_from(raw: &RawEvaluation) -> Result<Self, ConfigError> {
        let metric = raw
            .metric
            .parse()
            .map_err(|err: String| invalid("evaluation.metric", err))?;
        let thresholds = match &raw.thresholds {
            Some(values) => {
                if values.is_empty() || values.iter().any(|t| !(0.0..=1.0).contains(t)) {
                    return Err(invalid(
                        "evaluation.thresholds",
                        "must be a non-empty list within [0, 1]",
                    ));
                }
                values.clone()
            }
            None => crate::learner::default_thresholds(),
        };
        Ok(Self { metric, thresholds })
    }
}

#[derive(Debug, Deserialize)]
struct RawPipelineConfig {
    #[serde(default = "default_seed")]
    seed: u64,
    #[serde(default)]
    alignment: RawAlignment,
    #[serde(default)]
    balance: RawBalance,
    #[serde(default)]
    ensemble: RawEnsemble,
    #[serde(default)]
    evaluation: RawEvaluation,
}

#[derive(Debug, Deserialize)]
struct RawAlignment {
    #[serde(default = "default_alignment_method")]
    method: String,
    #[serde(default = "default_coral_reg")]
    coral_reg: f64,
    #[serde(default)]
    subspace_components: Option<usize>,
    #[serde(default)]
    weights: RawAlignmentWeights,
}

impl Default for RawAlignment {
    fn default() -> Self {
        Self {
            method: default_alignment_method(),
            coral_reg: default_coral_reg(),
            subspace_components: None,
            weights: RawAlignmentWeights::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawAlignmentWeights {
    #[serde(default = "default_member_weight")]
    subspace: f64,
    #[serde(default = "default_member_weight")]
    coral: f64,
    #[serde(default = "default_rescale_weight")]
    rescale: f64,
}

impl Default for RawAlignmentWeights {
    fn default() -> Self {
        Self {
            subspace: default_member_weight(),
            coral: default_member_weight(),
            rescale: default_rescale_weight(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawBalance {
    #[serde(default = "default_balance_threshold")]
    threshold: f64,
    #[serde(default = "default_balance_method")]
    method: String,
    #[serde(default = "default_sampling_strategy")]
    sampling_strategy: f64,
    #[serde(default = "default_k_neighbors")]
    k_neighbors: usize,
    #[serde(default = "default_enn_neighbors")]
    enn_neighbors: usize,
    #[serde(default = "default_cv_test_size")]
    cv_test_size: f64,
    #[serde(default = "default_selection_trees")]
    selection_trees: usize,
}

impl Default for RawBalance {
    fn default() -> Self {
        Self {
            threshold: default_balance_threshold(),
            method: default_balance_method(),
            sampling_strategy: default_sampling_strategy(),
            k_neighbors: default_k_neighbors(),
            enn_neighbors: default_enn_neighbors(),
            cv_test_size: default_cv_test_size(),
            selection_trees: default_selection_trees(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawEnsemble {
    #[serde(default)]
    forest: RawForest,
    #[serde(default)]
    boosting: RawBoosting,
    #[serde(default)]
    svm: RawSvm,
    #[serde(default)]
    weights: RawVotingWeights,
}

#[derive(Debug, Deserialize)]
struct RawForest {
    #[serde(default = "default_forest_estimators")]
    n_estimators: usize,
    /// Zero means unlimited depth.
    #[serde(default = "default_forest_depth")]
    max_depth: usize,
}

impl Default for RawForest {
    fn default() -> Self {
        Self {
            n_estimators: default_forest_estimators(),
            max_depth: default_forest_depth(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawBoosting {
    #[serde(default = "default_boosting_estimators")]
    n_estimators: usize,
    #[serde(default = "default_boosting_depth")]
    max_depth: usize,
    #[serde(default = "default_learning_rate")]
    learning_rate: f64,
}

impl Default for RawBoosting {
    fn default() -> Self {
        Self {
            n_estimators: default_boosting_estimators(),
            max_depth: default_boosting_depth(),
            learning_rate: default_learning_rate(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSvm {
    #[serde(default = "default_svm_c")]
    c: f64,
    #[serde(default = "default_gamma")]
    gamma: Value,
    #[serde(default = "default_svm_max_iter")]
    max_iter: usize,
}

impl Default for RawSvm {
    fn default() -> Self {
        Self {
            c: default_svm_c(),
            gamma: default_gamma(),
            max_iter: default_svm_max_iter(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawVotingWeights {
    #[serde(default = "default_member_weight")]
    forest: f64,
    #[serde(default = "default_member_weight")]
    boosting: f64,
    #[serde(default = "default_rescale_weight")]
    svm: f64,
}

impl Default for RawVotingWeights {
    fn default() -> Self {
        Self {
            forest: default_member_weight(),
            boosting: default_member_weight(),
            svm: default_rescale_weight(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEvaluation {
    #[serde(default = "default_metric")]
    metric: String,
    #[serde(default)]
    thresholds: Option<Vec<f64>>,
}

impl Default for RawEvaluation {
    fn default() -> Self {
        Self {
            metric: default_metric(),
            thresholds: None,
        }
    }
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_alignment_method() -> String {
    AdaptationMethod::default().as_str().to_string()
}

fn default_coral_reg() -> f64 {
    DEFAULT_CORAL_REG
}

fn default_member_weight() -> f64 {
    0.4
}

fn default_rescale_weight() -> f64 {
    0.2
}

fn default_balance_threshold() -> f64 {
    0.7
}

fn default_balance_method() -> String {
    "smote".to_string()
}

fn default_sampling_strategy() -> f64 {
    0.8
}

fn default_k_neighbors() -> usize {
    5
}

fn default_enn_neighbors() -> usize {
    3
}

fn default_cv_test_size() -> f64 {
    0.2
}

fn default_selection_trees() -> usize {
    50
}

fn default_forest_estimators() -> usize {
    100
}

fn default_forest_depth() -> usize {
    8
}

fn default_boosting_estimators() -> usize {
    100
}

fn default_boosting_depth() -> usize {
    5
}

fn default_learning_rate() -> f64 {
    0.05
}

fn default_svm_c() -> f64 {
    1.0
}

fn default_gamma() -> Value {
    Value::String("scale".to_string())
}

fn default_svm_max_iter() -> usize {
    SvmConfig::default().max_iter
}

fn default_metric() -> String {
    ThresholdMetric::MacroF1.as_str().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = PipelineConfig::from_str("").unwrap();
        assert_eq!(config.seed, 42);
        assert_eq!(config.alignment.method, AdaptationMethod::Ensemble);
        assert_eq!(config.alignment.coral_reg, 0.1);
        assert_eq!(config.balance.method, BalanceMethod::Smote);
        assert_eq!(config.balance.sampling_strategy, 0.8);
        assert_eq!(config.ensemble.forest.n_estimators, 100);
        assert_eq!(config.ensemble.forest.max_depth, Some(8));
        assert_eq!(config.ensemble.boosting.max_depth, 5);
        assert_eq!(config.ensemble.svm.gamma, Gamma::Scale);
        assert_eq!(config.evaluation.metric, ThresholdMetric::MacroF1);
        assert_eq!(config.evaluation.thresholds.len(), 13);
    }

    #[test]
    fn parses_custom_values() {
        let toml = r#"
seed = 7

[alignment]
method = "coral"
coral_reg = 0.5
subspace_components = 3

[alignment.weights]
subspace = 1.0
coral = 1.0
rescale = 2.0

[balance]
method = "smoteenn"
threshold = 0.6

[ensemble.forest]
n_estimators = 20
max_depth = 0

[ensemble.svm]
gamma = 0.25

[evaluation]
metric = "balanced_accuracy"
thresholds = [0.3, 0.5]
"#;
        let config = PipelineConfig::from_str(toml).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.alignment.method, AdaptationMethod::Coral);
        assert_eq!(config.alignment.subspace_components, Some(3));
        assert_eq!(config.alignment.weights.rescale, 2.0);
        assert_eq!(config.balance.method, BalanceMethod::SmoteEnn);
        assert_eq!(config.ensemble.forest.n_estimators, 20);
        assert_eq!(config.ensemble.forest.max_depth, None);
        assert_eq!(config.ensemble.svm.gamma, Gamma::Fixed(0.25));
        assert_eq!(config.evaluation.metric, ThresholdMetric::BalancedAccuracy);
        assert_eq!(config.evaluation.thresholds, vec![0.3, 0.5]);
    }

    #[test]
    fn shipped_file_matches_defaults() {
        let config = PipelineConfig::from_str(include_str!("../config/pipeline.toml")).unwrap();
        let defaults = PipelineConfig::default();
        assert_eq!(config.seed, defaults.seed);
        assert_eq!(config.alignment.method, defaults.alignment.method);
        assert_eq!(config.alignment.weights, defaults.alignment.weights);
        assert_eq!(config.balance.method, defaults.balance.method);
        assert_eq!(config.ensemble.svm.gamma, defaults.ensemble.svm.gamma);
        assert_eq!(config.ensemble.weights, defaults.ensemble.weights);
        assert_eq!(config.evaluation.thresholds, defaults.evaluation.thresholds);
    }

    #[test]
    fn unknown_method_names_fall_back() {
        let toml = "[alignment]\nmethod = \"mmd\"\n[balance]\nmethod = \"tomek\"";
        let config = PipelineConfig::from_str(toml).unwrap();
        assert_eq!(config.alignment.method, AdaptationMethod::None);
        assert_eq!(config.balance.method, BalanceMethod::Smote);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(PipelineConfig::from_str("[balance]\nthreshold = 1.5").is_err());
        assert!(PipelineConfig::from_str("[alignment.weights]\nsubspace = 0.0\ncoral = 0.0\nrescale = 0.0").is_err());
        assert!(PipelineConfig::from_str("[ensemble.svm]\ngamma = \"auto\"").is_err());
        assert!(PipelineConfig::from_str("[evaluation]\nmetric = \"roc\"").is_err());
        assert!(PipelineConfig::from_str("[evaluation]\nthresholds = []").is_err());
    }

    #[test]
    fn invalid_values_name_the_offending_key() {
        let err = PipelineConfig::from_str("[ensemble.weights]\nforest = -1.0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "ensemble.weights", .. }), "{err}");

        let err = PipelineConfig::from_str("[balance]\nthreshold = 0.0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "balance.threshold", .. }));
    }
}
