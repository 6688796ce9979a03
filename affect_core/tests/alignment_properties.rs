use affect_core::adapt::{
    domain_discrepancy, measure_domain_gap, AlignmentWeights, CoralAligner, DomainAligner,
    EnsembleAligner, SubspaceAligner, WEIGHT_GRID,
};
use affect_core::balance::{BalanceMethod, ClassBalancer};
use affect_core::BalanceConfig;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn noise(n: usize, d: usize, shift: f64, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((n, d), |(_, j)| shift + rng.gen_range(-1.0..1.0) * (1.0 + j as f64 * 0.3))
}

#[test]
fn coral_closes_a_shifted_mean() {
    let source = noise(50, 5, 0.0, 1);
    let target = noise(50, 5, 3.0, 2);
    let aligned = CoralAligner::default().try_align(source.view(), target.view()).unwrap();
    assert_eq!(aligned.dim(), source.dim());

    let gap = measure_domain_gap(source.view(), target.view(), aligned.view());
    assert!(gap.gap_before > 5.0);
    assert!(gap.gap_after < gap.gap_before);
    assert!(gap.gap_after < 1e-9);
    assert!(gap.gap_reduction_fraction > 0.99);
}

#[test]
fn every_aligner_preserves_shape() {
    let source = noise(40, 6, 0.0, 3);
    let target = noise(30, 6, 1.5, 4);
    let aligners: [&dyn DomainAligner; 3] = [
        &CoralAligner::default(),
        &SubspaceAligner::default(),
        &EnsembleAligner::default(),
    ];
    for aligner in aligners {
        let aligned = aligner.align(source.view(), target.view());
        assert_eq!(aligned.dim(), (40, 6), "{}", aligner.name());
        assert!(aligned.iter().all(|v| v.is_finite()));
    }
}

#[test]
fn gap_is_non_negative_with_zero_sentinel() {
    let a = noise(20, 3, 0.0, 5);
    let b = noise(25, 3, -2.0, 6);
    assert!(domain_discrepancy(a.view(), b.view()) >= 0.0);

    let same = measure_domain_gap(a.view(), a.view(), b.view());
    assert_eq!(same.gap_before, 0.0);
    assert_eq!(same.gap_reduction_fraction, 0.0);
}

#[test]
fn renormalised_weights_sum_to_one() {
    for weights in WEIGHT_GRID
        .iter()
        .copied()
        .chain([AlignmentWeights::new(3.0, 1.0, 0.5), AlignmentWeights::default()])
    {
        let normalized = weights.normalized().unwrap();
        assert!((normalized.sum() - 1.0).abs() < 1e-12);
    }
    assert!(AlignmentWeights::new(0.0, 0.0, 0.0).normalized().is_err());
}

fn labels(n_majority: usize, n_minority: usize) -> Vec<usize> {
    let mut y = vec![0; n_majority];
    y.extend(std::iter::repeat(1).take(n_minority));
    y
}

#[test]
fn balancer_leaves_mild_imbalance_alone() {
    let y = labels(20, 14);
    let x = noise(34, 3, 0.0, 7);
    for method in [BalanceMethod::Smote, BalanceMethod::Auto] {
        let config = BalanceConfig {
            method,
            ..BalanceConfig::default()
        };
        let outcome = ClassBalancer::new(config, 1).balance(x.view(), &y);
        assert_eq!(outcome.features, x);
        assert_eq!(outcome.labels, y);
    }
}

#[test]
fn resampling_never_lowers_the_ratio() {
    let mut x = noise(80, 4, 0.0, 8);
    let y = labels(64, 16);
    for i in 64..80 {
        for j in 0..4 {
            x[[i, j]] += 1.0;
        }
    }
    for method in [
        BalanceMethod::Smote,
        BalanceMethod::Adasyn,
        BalanceMethod::SmoteEnn,
        BalanceMethod::Auto,
    ] {
        let config = BalanceConfig {
            method,
            selection_trees: 10,
            ..BalanceConfig::default()
        };
        let outcome = ClassBalancer::new(config, 3).balance(x.view(), &y);
        assert!(
            outcome.after.minority_ratio() >= outcome.before.minority_ratio(),
            "{method}: {} -> {}",
            outcome.before,
            outcome.after
        );
    }
}
