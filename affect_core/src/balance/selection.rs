//! Automatic resampler choice by held-out macro F1.

use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use affect_shared::ClassDistribution;

use super::{resample_guarded, ClassBalancer, Resampled};
use crate::metrics::macro_f1;
use crate::models::{BinaryClassifier, ForestConfig, RandomForest};
use crate::stats::select_rows;

/// Held-out macro F1 of one candidate, `None` when resampling failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateScore {
    pub method: String,
    pub macro_f1: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub chosen: String,
    pub data: Resampled,
    pub scores: Vec<CandidateScore>,
}

/// Stratified shuffle split into `(train, test)` row indices, both sorted.
///
/// Each class sends `round(count · test_size)` rows to the test side while
/// keeping at least one row for training.
pub fn stratified_split(y: &[usize], test_size: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let dist = ClassDistribution::from_labels(y);
    let mut train = Vec::new();
    let mut test = Vec::new();
    for label in 0..dist.counts().len() {
        let mut rows: Vec<usize> = (0..y.len()).filter(|&i| y[i] == label).collect();
        if rows.is_empty() {
            continue;
        }
        rows.shuffle(&mut rng);
        let n_test = ((rows.len() as f64 * test_size).round() as usize).min(rows.len() - 1);
        test.extend_from_slice(&rows[..n_test]);
        train.extend_from_slice(&rows[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

/// Try every candidate on a training split, keep the best on the test split,
/// then apply it to all of `x`.
///
/// Candidates are compared from negative infinity, so the first candidate
/// that succeeds is always eligible. Returns `None` when all of them fail.
pub fn select_resampler(
    balancer: &ClassBalancer,
    x: ArrayView2<'_, f64>,
    y: &[usize],
) -> Option<Selection> {
    let config = balancer.config();
    let (train_rows, test_rows) = stratified_split(y, config.cv_test_size, balancer.seed);
    let x_train = select_rows(x, &train_rows);
    let y_train: Vec<usize> = train_rows.iter().map(|&i| y[i]).collect();
    let x_test = select_rows(x, &test_rows);
    let y_test: Vec<usize> = test_rows.iter().map(|&i| y[i]).collect();

    let mut scores = Vec::new();
    let mut best: Option<(usize, f64, Resampled)> = None;
    let mut best_score = f64::NEG_INFINITY;
    let candidates = balancer.candidates();

    for (idx, candidate) in candidates.iter().enumerate() {
        let resampled = match resample_guarded(candidate.as_ref(), x_train.view(), &y_train) {
            Ok(data) => data,
            Err(err) => {
                debug!(method = candidate.name(), error = %err, "candidate skipped");
                scores.push(CandidateScore {
                    method: candidate.name().to_string(),
                    macro_f1: None,
                });
                continue;
            }
        };

        let mut forest = RandomForest::new(ForestConfig::quick(config.selection_trees), balancer.seed);
        forest.fit(resampled.0.view(), &resampled.1, None);
        let score = macro_f1(&y_test, &forest.predict(x_test.view(), 0.5));
        debug!(method = candidate.name(), macro_f1 = score, "candidate scored");
        scores.push(CandidateScore {
            method: candidate.name().to_string(),
            macro_f1: Some(score),
        });

        if score > best_score {
            best_score = score;
            best = Some((idx, score, resampled));
        }
    }

    let (idx, score, split_result) = best?;
    let chosen = &candidates[idx];
    info!(method = chosen.name(), macro_f1 = score, "selected resampler");

    let data = match resample_guarded(chosen.as_ref(), x, y) {
        Ok(data) => data,
        Err(err) => {
            let full_ratio = ClassDistribution::from_labels(y).minority_ratio();
            let split_ratio = ClassDistribution::from_labels(&split_result.1).minority_ratio();
            if split_ratio < full_ratio {
                warn!(error = %err, "selected resampler failed on full data");
                return None;
            }
            warn!(error = %err, "selected resampler failed on full data, keeping split result");
            split_result
        }
    };

    Some(Selection {
        chosen: chosen.name().to_string(),
        data,
        scores,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::BalanceMethod;
    use crate::config::BalanceConfig;
    use ndarray::Array2;
    use rand::Rng;

    #[test]
    fn split_is_stratified_and_disjoint() {
        let y: Vec<usize> = (0..50).map(|i| usize::from(i % 5 == 0)).collect();
        let (train, test) = stratified_split(&y, 0.2, 3);
        assert_eq!(train.len() + test.len(), 50);
        assert!(train.iter().all(|i| !test.contains(i)));
        let test_pos = test.iter().filter(|&&i| y[i] == 1).count();
        assert_eq!(test_pos, 2);
        assert_eq!(test.len(), 10);
        assert_eq!(stratified_split(&y, 0.2, 3), (train, test));
    }

    #[test]
    fn tiny_class_keeps_a_training_row() {
        let y = [0, 0, 0, 0, 1];
        let (train, _) = stratified_split(&y, 0.9, 0);
        assert!(train.contains(&4));
    }

    #[test]
    fn auto_mode_scores_every_candidate() {
        let mut rng = StdRng::seed_from_u64(5);
        let n = 90;
        let mut x = Array2::zeros((n, 2));
        let mut y = vec![0; n];
        for i in 0..n {
            let label = usize::from(i >= 70);
            y[i] = label;
            for j in 0..2 {
                x[[i, j]] = label as f64 * 1.2 + rng.gen_range(-1.0..1.0);
            }
        }
        let config = BalanceConfig {
            method: BalanceMethod::Auto,
            selection_trees: 10,
            ..BalanceConfig::default()
        };
        let balancer = ClassBalancer::new(config, 42);
        let selection = select_resampler(&balancer, x.view(), &y).unwrap();
        assert_eq!(selection.scores.len(), 3);
        assert!(selection
            .scores
            .iter()
            .any(|s| s.method == selection.chosen && s.macro_f1.is_some()));
        assert_eq!(selection.data.0.nrows(), selection.data.1.len());
    }
}
