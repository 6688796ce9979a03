//! Per-direction training: balance, scale, align, fit.

use ndarray::{Array1, Array2, ArrayView2};
use serde::Serialize;
use tracing::{info, info_span, warn};

use affect_shared::{ClassDistribution, DomainPair, FeatureMatrix};

use super::LearnerError;
use crate::adapt::{align_with_report, AdaptationMethod, Aligner, AlignmentReport, DomainAligner};
use crate::balance::ClassBalancer;
use crate::config::PipelineConfig;
use crate::models::{BinaryClassifier, FeatureImportance, VotingEnsemble};
use crate::scaling::RobustScaler;

/// What happened while training one direction.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingInfo {
    pub source_dataset: String,
    pub target_dataset: String,
    pub feature_names: Vec<String>,
    pub method: AdaptationMethod,
    /// Absent when adaptation was disabled.
    pub alignment: Option<AlignmentReport>,
    pub distribution_before: ClassDistribution,
    pub distribution_after: ClassDistribution,
    pub resampler: Option<String>,
    /// Balanced, scaled source before alignment.
    pub original_features: Array2<f64>,
    /// Features the ensemble was fitted on.
    pub adapted_features: Array2<f64>,
    /// Scaled target features used as the alignment reference.
    pub target_features: Array2<f64>,
}

/// A fitted ensemble plus the scaler its inputs must pass through.
#[derive(Debug, Clone)]
pub struct DirectionModel {
    ensemble: VotingEnsemble,
    scaler: RobustScaler,
    info: TrainingInfo,
}

impl DirectionModel {
    pub fn ensemble(&self) -> &VotingEnsemble {
        &self.ensemble
    }

    pub fn scaler(&self) -> &RobustScaler {
        &self.scaler
    }

    pub fn info(&self) -> &TrainingInfo {
        &self.info
    }

    pub fn n_features(&self) -> usize {
        self.scaler.center().len()
    }

    /// `"<source>_to_<target>"`.
    pub fn direction(&self) -> String {
        format!("{}_to_{}", self.info.source_dataset, self.info.target_dataset)
    }

    /// Positive-class probability for unscaled feature rows.
    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        let scaled = self.scaler.transform(x);
        self.ensemble.predict_proba(scaled.view())
    }

    pub fn predict(&self, x: ArrayView2<'_, f64>, threshold: f64) -> Vec<usize> {
        self.predict_proba(x)
            .iter()
            .map(|&p| usize::from(p >= threshold))
            .collect()
    }

    pub fn feature_importance(&self) -> Vec<FeatureImportance> {
        self.ensemble.feature_importance(&self.info.feature_names)
    }
}

/// Train `source -> target` with the aligner configured for `method`.
pub fn train_direction(
    source: &FeatureMatrix,
    target: &FeatureMatrix,
    method: AdaptationMethod,
    config: &PipelineConfig,
) -> Result<DirectionModel, LearnerError> {
    train_direction_with(source, target, method, None, config)
}

/// Train one direction, optionally replacing the aligner configured for
/// `method`. With [`AdaptationMethod::None`] no aligner is ever called, even
/// when `aligner` is given.
///
/// The scaler is fit on the balanced source only and then applied to both
/// domains, so the target never leaks into the scaling statistics.
pub fn train_direction_with(
    source: &FeatureMatrix,
    target: &FeatureMatrix,
    method: AdaptationMethod,
    aligner: Option<&dyn DomainAligner>,
    config: &PipelineConfig,
) -> Result<DirectionModel, LearnerError> {
    if source.n_samples() == 0 {
        return Err(LearnerError::EmptyDataset {
            dataset: source.dataset().to_string(),
        });
    }
    if source.n_features() != target.n_features() {
        return Err(LearnerError::FeatureCountMismatch {
            dataset: target.dataset().to_string(),
            expected: source.n_features(),
            found: target.n_features(),
        });
    }

    let span = info_span!("train", source = source.dataset(), target = target.dataset());
    let _enter = span.enter();

    let balanced = ClassBalancer::new(config.balance.clone(), config.seed)
        .balance(source.features(), source.labels());

    let scaler = RobustScaler::fit(balanced.features.view());
    let original_features = scaler.transform(balanced.features.view());
    let target_features = scaler.transform(target.features());

    let configured;
    let aligner = match (method, aligner) {
        (AdaptationMethod::None, Some(_)) => {
            warn!("adaptation disabled; ignoring supplied aligner");
            None
        }
        (AdaptationMethod::None, None) => None,
        (_, Some(custom)) => Some(custom),
        (_, None) => {
            configured = Aligner::for_method(method, &config.alignment);
            configured.as_ref().map(|a| a as &dyn DomainAligner)
        }
    };

    let (adapted_features, alignment) = match aligner {
        Some(aligner) => {
            let outcome =
                align_with_report(aligner, original_features.view(), target_features.view());
            info!(
                aligner = %outcome.report.aligner,
                gap_before = outcome.report.gap.gap_before,
                gap_after = outcome.report.gap.gap_after,
                reduction_pct = outcome.report.gap.reduction_percent(),
                "domain gap"
            );
            (outcome.features, Some(outcome.report))
        }
        None => (original_features.clone(), None),
    };

    let mut ensemble = VotingEnsemble::new(&config.ensemble, config.seed);
    ensemble.fit(adapted_features.view(), &balanced.labels, None);
    info!(
        samples = balanced.labels.len(),
        features = adapted_features.ncols(),
        method = %method,
        "ensemble trained"
    );

    Ok(DirectionModel {
        ensemble,
        scaler,
        info: TrainingInfo {
            source_dataset: source.dataset().to_string(),
            target_dataset: target.dataset().to_string(),
            feature_names: source.feature_names().to_vec(),
            method,
            alignment,
            distribution_before: balanced.before,
            distribution_after: balanced.after,
            resampler: balanced.applied,
            original_features,
            adapted_features,
            target_features,
        },
    })
}

/// Models for both directions of a domain pair.
#[derive(Debug, Clone)]
pub struct BidirectionalModels {
    /// Trained on the pair's source, aligned toward its target.
    pub forward: DirectionModel,
    /// Trained on the pair's target, aligned toward its source.
    pub reverse: DirectionModel,
}

pub fn train_bidirectional(
    pair: &DomainPair,
    method: AdaptationMethod,
    config: &PipelineConfig,
) -> Result<BidirectionalModels, LearnerError> {
    Ok(BidirectionalModels {
        forward: train_direction(pair.source(), pair.target(), method, config)?,
        reverse: train_direction(pair.target(), pair.source(), method, config)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoostingConfig, ForestConfig};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn quick_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.ensemble.forest = ForestConfig {
            n_estimators: 15,
            ..ForestConfig::default()
        };
        config.ensemble.boosting = BoostingConfig {
            n_estimators: 15,
            ..BoostingConfig::default()
        };
        config
    }

    fn matrix(name: &str, n: usize, shift: f64, seed: u64) -> FeatureMatrix {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut x = Array2::zeros((n, 3));
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let label = usize::from(i % 3 == 0);
            for j in 0..3 {
                x[[i, j]] = shift + label as f64 * 2.5 + rng.gen_range(-1.0..1.0);
            }
            y.push(label);
        }
        let names = (0..3).map(|j| format!("f{j}")).collect();
        FeatureMatrix::new(name, names, x, y).unwrap()
    }

    #[test]
    fn direction_records_balancing_and_alignment() {
        let source = matrix("wesad", 45, 0.0, 1);
        let target = matrix("kemocon", 30, 1.0, 2);
        let model =
            train_direction(&source, &target, AdaptationMethod::Coral, &quick_config()).unwrap();

        let info = model.info();
        assert_eq!(model.direction(), "wesad_to_kemocon");
        assert_eq!(info.distribution_before.counts(), &[30, 15]);
        assert_eq!(info.distribution_after.counts(), &[30, 24]);
        assert_eq!(info.adapted_features.nrows(), 54);
        assert_eq!(info.target_features.nrows(), 30);
        assert_eq!(info.alignment.as_ref().unwrap().aligner, "coral");

        let probs = model.predict_proba(target.features());
        assert_eq!(probs.len(), 30);
        assert!(probs.iter().all(|&p| (0.0..=1.0).contains(&p)));
        assert_eq!(model.feature_importance().len(), 3);
    }

    #[test]
    fn mismatched_widths_are_rejected() {
        let source = matrix("a", 20, 0.0, 1);
        let target = FeatureMatrix::new(
            "b",
            vec!["x".into()],
            Array2::zeros((4, 1)),
            vec![0, 1, 0, 1],
        )
        .unwrap();
        let err = train_direction(&source, &target, AdaptationMethod::None, &quick_config())
            .unwrap_err();
        assert!(matches!(err, LearnerError::FeatureCountMismatch { expected: 3, found: 1, .. }));
    }

    #[test]
    fn disabled_adaptation_ignores_a_supplied_aligner() {
        let source = matrix("wesad", 30, 0.0, 3);
        let target = matrix("kemocon", 24, 4.0, 4);
        let coral = crate::adapt::CoralAligner::default();
        let model = train_direction_with(
            &source,
            &target,
            AdaptationMethod::None,
            Some(&coral),
            &quick_config(),
        )
        .unwrap();
        let info = model.info();
        assert_eq!(info.method, AdaptationMethod::None);
        assert!(info.alignment.is_none());
        assert_eq!(info.adapted_features, info.original_features);
    }

    #[test]
    fn model_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DirectionModel>();
    }
}
