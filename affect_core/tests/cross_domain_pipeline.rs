use std::cell::Cell;

use affect_core::adapt::{AdaptationMethod, AlignmentFailure, CoralAligner, DomainAligner};
use affect_core::balance::ClassBalancer;
use affect_core::learner::{default_thresholds, evaluate_direction, train_direction, train_direction_with};
use affect_core::models::{BoostingConfig, ForestConfig};
use affect_core::{
    CrossDomainPipeline, DomainPair, FeatureMatrix, FeatureSource, PipelineConfig, RobustScaler,
    SourceError, TargetDimension,
};
use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn quick_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.ensemble.forest = ForestConfig {
        n_estimators: 20,
        ..ForestConfig::default()
    };
    config.ensemble.boosting = BoostingConfig {
        n_estimators: 20,
        ..BoostingConfig::default()
    };
    config
}

/// Two clusters at `shift ± separation` on every feature; every `stride`-th row is positive.
fn clusters(
    name: &str,
    n: usize,
    separation: f64,
    shift: f64,
    stride: usize,
    seed: u64,
) -> FeatureMatrix {
    let d = 4;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut x = Array2::zeros((n, d));
    let mut y = Vec::with_capacity(n);
    for i in 0..n {
        let label = usize::from(i % stride == 0);
        let centre = shift + if label == 1 { separation } else { -separation };
        for j in 0..d {
            x[[i, j]] = centre + rng.gen_range(-1.0..1.0);
        }
        y.push(label);
    }
    let names = (0..d).map(|j| format!("feature_{j}")).collect();
    FeatureMatrix::new(name, names, x, y).unwrap()
}

struct CountingAligner {
    calls: Cell<usize>,
}

impl DomainAligner for CountingAligner {
    fn name(&self) -> &str {
        "counting"
    }

    fn try_align(
        &self,
        source: ArrayView2<'_, f64>,
        target: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>, AlignmentFailure> {
        self.calls.set(self.calls.get() + 1);
        CoralAligner::default().try_align(source, target)
    }
}

#[test]
fn separable_clusters_are_learned() {
    let source = clusters("wesad", 80, 3.0, 0.0, 2, 1);
    let target = clusters("kemocon", 60, 3.0, 0.5, 2, 2);
    let config = quick_config();
    let model = train_direction(&source, &target, AdaptationMethod::Coral, &config).unwrap();
    let report = evaluate_direction(&model, &target, &config.evaluation).unwrap();
    assert!(report.accuracy >= 0.95, "accuracy {}", report.accuracy);
    assert!(report.roc_auc.unwrap() >= 0.95);
    assert_eq!(report.confusion.total(), 60);
}

#[test]
fn separable_clusters_score_on_their_own_domain() {
    let data = clusters("wesad", 80, 3.0, 0.0, 2, 9);
    let config = quick_config();
    let model = train_direction(&data, &data, AdaptationMethod::Ensemble, &config).unwrap();
    let report = evaluate_direction(&model, &data, &config.evaluation).unwrap();
    assert!(report.accuracy >= 0.95, "accuracy {}", report.accuracy);
    assert_eq!(model.direction(), "wesad_to_wesad");
}

#[test]
fn disabled_adaptation_skips_the_aligner_and_scales_on_source() {
    let source = clusters("wesad", 60, 1.5, 0.0, 4, 3);
    let target = clusters("kemocon", 40, 1.5, 5.0, 4, 4);
    let config = quick_config();

    let counter = CountingAligner {
        calls: Cell::new(0),
    };
    let model = train_direction_with(
        &source,
        &target,
        AdaptationMethod::None,
        Some(&counter),
        &config,
    )
    .unwrap();
    assert_eq!(counter.calls.get(), 0);
    assert!(model.info().alignment.is_none());
    assert_eq!(model.info().adapted_features, model.info().original_features);

    let balanced = ClassBalancer::new(config.balance.clone(), config.seed)
        .balance(source.features(), source.labels());
    assert_eq!(model.scaler(), &RobustScaler::fit(balanced.features.view()));
    assert!(balanced.labels.len() > source.n_samples());

    let aligned =
        train_direction_with(&source, &target, AdaptationMethod::Coral, Some(&counter), &config)
            .unwrap();
    assert_eq!(counter.calls.get(), 1);
    assert_eq!(aligned.scaler(), model.scaler());
}

#[test]
fn repeated_training_is_deterministic() {
    let source = clusters("wesad", 50, 1.0, 0.0, 3, 5);
    let target = clusters("kemocon", 40, 1.0, 1.0, 3, 6);
    let config = quick_config();
    let a = train_direction(&source, &target, AdaptationMethod::Ensemble, &config).unwrap();
    let b = train_direction(&source, &target, AdaptationMethod::Ensemble, &config).unwrap();
    assert_eq!(
        a.predict_proba(target.features()),
        b.predict_proba(target.features())
    );
    assert_eq!(
        a.predict_proba(target.features()),
        a.predict_proba(target.features())
    );
}

#[test]
fn chosen_threshold_is_optimal_on_the_grid() {
    let source = clusters("wesad", 60, 0.6, 0.0, 3, 7);
    let target = clusters("kemocon", 45, 0.6, 0.3, 3, 8);
    let config = quick_config();
    let model = train_direction(&source, &target, AdaptationMethod::Subspace, &config).unwrap();
    let report = evaluate_direction(&model, &target, &config.evaluation).unwrap();

    let metric = config.evaluation.metric;
    for t in default_thresholds() {
        let y_pred: Vec<usize> = report.y_prob.iter().map(|&p| usize::from(p >= t)).collect();
        assert!(metric.score(&report.y_true, &y_pred) <= report.threshold.score + 1e-12);
    }
    assert!(default_thresholds().contains(&report.threshold.threshold) || report.threshold.threshold == 0.5);
    assert_eq!(report.y_pred.len(), 45);
}

struct SyntheticSource;

impl FeatureSource for SyntheticSource {
    fn domain_pair(&self, dimension: TargetDimension) -> Result<DomainPair, SourceError> {
        let seed = match dimension {
            TargetDimension::Arousal => 10,
            TargetDimension::Valence => 20,
        };
        DomainPair::new(
            clusters("wesad", 50, 2.0, 0.0, 3, seed),
            clusters("kemocon", 40, 2.0, 2.0, 2, seed + 1),
        )
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

#[test]
fn pipeline_runs_both_dimensions_and_directions() {
    let pipeline = CrossDomainPipeline::new(quick_config());
    let runs = pipeline.run_all(&SyntheticSource).unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].dimension, TargetDimension::Arousal);

    let run = &runs[1];
    assert_eq!(run.evaluation.forward.direction, "wesad_to_kemocon");
    assert_eq!(run.evaluation.reverse.direction, "kemocon_to_wesad");
    assert_eq!(run.evaluation.forward.y_true.len(), 40);
    assert_eq!(run.evaluation.reverse.y_true.len(), 50);
    assert_eq!(run.feature_importance().len(), 4);
    // The target side is already balanced and must come through untouched.
    assert!(run.models.reverse.info().resampler.is_none());

    let path = std::env::temp_dir()
        .join(format!("affect_pipeline_{}", std::process::id()))
        .join("runs.jsonl");
    pipeline.log(run, &path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 4);
    for line in text.lines() {
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(value["dimension"], "valence");
    }
    std::fs::remove_file(&path).unwrap();
}
