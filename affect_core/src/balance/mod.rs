//! Class rebalancing of a training matrix before alignment and fitting.
//!
//! The balancer leaves data alone when the minority/majority ratio is already
//! at or above the configured threshold. Otherwise it runs the configured
//! resampler, or in automatic mode picks the resampler that scores best on a
//! held-out split. Resampling never makes the balance worse: a result whose
//! ratio drops below the input's is discarded.

pub mod neighbors;
pub mod resample;
pub mod selection;

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use affect_shared::ClassDistribution;

pub use resample::{Adasyn, ResampleError, Resampled, Resampler, Smote, SmoteEnn};
pub use selection::{select_resampler, stratified_split, CandidateScore, Selection};

use crate::config::BalanceConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceMethod {
    Smote,
    Adasyn,
    SmoteEnn,
    /// Choose among the others by held-out macro F1.
    Auto,
}

impl BalanceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceMethod::Smote => "smote",
            BalanceMethod::Adasyn => "adasyn",
            BalanceMethod::SmoteEnn => "smoteenn",
            BalanceMethod::Auto => "auto",
        }
    }

    /// Parse a user-supplied name, warning and using SMOTE when unknown.
    pub fn from_name_or_smote(name: &str) -> Self {
        name.parse().unwrap_or_else(|err: String| {
            warn!(%err, "falling back to smote");
            BalanceMethod::Smote
        })
    }
}

impl fmt::Display for BalanceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BalanceMethod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "smote" => Ok(BalanceMethod::Smote),
            "adasyn" => Ok(BalanceMethod::Adasyn),
            "smoteenn" | "smote_enn" | "smote-enn" => Ok(BalanceMethod::SmoteEnn),
            "auto" => Ok(BalanceMethod::Auto),
            other => Err(format!("unknown balancing method '{other}'")),
        }
    }
}

/// Per-sample weights `n / (n_classes · count[label])`.
pub fn balanced_sample_weights(y: &[usize]) -> Array1<f64> {
    let dist = ClassDistribution::from_labels(y);
    let n_classes = dist.n_present() as f64;
    let n = y.len() as f64;
    y.iter()
        .map(|&label| n / (n_classes * dist.count(label) as f64))
        .collect()
}

/// Whether `y` needs resampling under `threshold`, with its distribution.
pub fn check_class_imbalance(y: &[usize], threshold: f64) -> (bool, ClassDistribution) {
    let dist = ClassDistribution::from_labels(y);
    let imbalanced = dist.minority_ratio() < threshold;
    debug!(
        distribution = %dist,
        ratio = dist.minority_ratio(),
        imbalanced,
        "class distribution"
    );
    (imbalanced, dist)
}

/// Data after balancing plus the bookkeeping the trainer reports.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceOutcome {
    pub features: Array2<f64>,
    pub labels: Vec<usize>,
    pub before: ClassDistribution,
    pub after: ClassDistribution,
    /// Name of the resampler whose output was kept, if any.
    pub applied: Option<String>,
}

impl BalanceOutcome {
    fn unchanged(x: ArrayView2<'_, f64>, y: &[usize], before: ClassDistribution) -> Self {
        Self {
            features: x.to_owned(),
            labels: y.to_vec(),
            after: before.clone(),
            before,
            applied: None,
        }
    }
}

/// Runs `resampler` and rejects results that lower the minority ratio.
pub fn resample_guarded(
    resampler: &dyn Resampler,
    x: ArrayView2<'_, f64>,
    y: &[usize],
) -> Result<Resampled, ResampleError> {
    let before = ClassDistribution::from_labels(y).minority_ratio();
    let (features, labels) = resampler.fit_resample(x, y)?;
    let after = ClassDistribution::from_labels(&labels).minority_ratio();
    if after < before {
        return Err(ResampleError::RatioRegressed { before, after });
    }
    Ok((features, labels))
}

#[derive(Debug, Clone)]
pub struct ClassBalancer {
    config: BalanceConfig,
    seed: u64,
}

impl ClassBalancer {
    pub fn new(config: BalanceConfig, seed: u64) -> Self {
        Self { config, seed }
    }

    pub fn config(&self) -> &BalanceConfig {
        &self.config
    }

    /// Resampler for a concrete method. `Auto` has none of its own.
    pub fn resampler(&self, method: BalanceMethod) -> Option<Box<dyn Resampler + Send + Sync>> {
        let c = &self.config;
        match method {
            BalanceMethod::Smote => Some(Box::new(Smote {
                k_neighbors: c.k_neighbors,
                sampling_strategy: c.sampling_strategy,
                seed: self.seed,
            })),
            BalanceMethod::Adasyn => Some(Box::new(Adasyn {
                n_neighbors: c.k_neighbors,
                sampling_strategy: c.sampling_strategy,
                seed: self.seed,
            })),
            BalanceMethod::SmoteEnn => Some(Box::new(SmoteEnn {
                k_neighbors: c.k_neighbors,
                enn_neighbors: c.enn_neighbors,
                seed: self.seed,
            })),
            BalanceMethod::Auto => None,
        }
    }

    /// Candidates tried in automatic mode, in tie-breaking order.
    pub fn candidates(&self) -> Vec<Box<dyn Resampler + Send + Sync>> {
        [BalanceMethod::Smote, BalanceMethod::Adasyn, BalanceMethod::SmoteEnn]
            .into_iter()
            .filter_map(|m| self.resampler(m))
            .collect()
    }

    pub fn balance(&self, x: ArrayView2<'_, f64>, y: &[usize]) -> BalanceOutcome {
        let (imbalanced, before) = check_class_imbalance(y, self.config.threshold);
        if !imbalanced {
            debug!(ratio = before.minority_ratio(), "classes balanced enough, skipping");
            return BalanceOutcome::unchanged(x, y, before);
        }

        let result = match self.resampler(self.config.method) {
            Some(resampler) => resample_guarded(resampler.as_ref(), x, y)
                .map(|data| (data, resampler.name().to_string()))
                .map_err(|err| {
                    warn!(method = resampler.name(), error = %err, "resampling failed");
                }),
            None => select_resampler(self, x, y)
                .map(|selection| (selection.data, selection.chosen))
                .ok_or_else(|| {
                    warn!("every resampling candidate failed");
                }),
        };

        match result {
            Ok(((features, labels), name)) => {
                let after = ClassDistribution::from_labels(&labels);
                info!(
                    method = %name,
                    before = %before,
                    after = %after,
                    "rebalanced training data"
                );
                BalanceOutcome {
                    features,
                    labels,
                    before,
                    after,
                    applied: Some(name),
                }
            }
            Err(()) => BalanceOutcome::unchanged(x, y, before),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn imbalanced(n_maj: usize, n_min: usize, seed: u64) -> (Array2<f64>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = n_maj + n_min;
        let mut x = Array2::zeros((n, 3));
        let mut y = vec![0; n];
        for i in 0..n {
            let label = usize::from(i >= n_maj);
            y[i] = label;
            for j in 0..3 {
                x[[i, j]] = label as f64 * 1.5 + rng.gen_range(-1.0..1.0);
            }
        }
        (x, y)
    }

    #[test]
    fn method_names_parse() {
        assert_eq!("SMOTE".parse::<BalanceMethod>(), Ok(BalanceMethod::Smote));
        assert_eq!("smote_enn".parse::<BalanceMethod>(), Ok(BalanceMethod::SmoteEnn));
        assert_eq!(BalanceMethod::from_name_or_smote("tomek"), BalanceMethod::Smote);
        assert_eq!(BalanceMethod::Auto.to_string(), "auto");
    }

    #[test]
    fn balanced_weights_equalise_class_mass() {
        let y = [0, 0, 0, 1];
        let w = balanced_sample_weights(&y);
        assert!((w[0] - 4.0 / 6.0).abs() < 1e-12);
        assert!((w[3] - 2.0).abs() < 1e-12);
        let mass0: f64 = w.iter().take(3).sum();
        assert!((mass0 - w[3]).abs() < 1e-12);
    }

    #[test]
    fn balanced_enough_data_is_returned_unchanged() {
        let (x, y) = imbalanced(20, 15, 1);
        let outcome = ClassBalancer::new(BalanceConfig::default(), 42).balance(x.view(), &y);
        assert_eq!(outcome.features, x);
        assert_eq!(outcome.labels, y);
        assert_eq!(outcome.before, outcome.after);
        assert!(outcome.applied.is_none());
    }

    #[test]
    fn single_class_needs_no_balancing() {
        let x = Array2::zeros((5, 2));
        let y = [1; 5];
        let outcome = ClassBalancer::new(BalanceConfig::default(), 42).balance(x.view(), &y);
        assert_eq!(outcome.labels, y.to_vec());
        assert!(outcome.applied.is_none());
    }

    #[test]
    fn smote_raises_the_ratio() {
        let (x, y) = imbalanced(50, 10, 2);
        let outcome = ClassBalancer::new(BalanceConfig::default(), 42).balance(x.view(), &y);
        assert_eq!(outcome.applied.as_deref(), Some("smote"));
        assert_eq!(outcome.after.counts(), &[50, 40]);
        assert!(outcome.after.minority_ratio() >= outcome.before.minority_ratio());
    }

    #[test]
    fn failing_resampler_returns_original() {
        let (x, y) = imbalanced(30, 3, 3);
        let outcome = ClassBalancer::new(BalanceConfig::default(), 42).balance(x.view(), &y);
        assert!(outcome.applied.is_none());
        assert_eq!(outcome.labels, y);
    }

    #[test]
    fn every_method_keeps_ratio_non_decreasing() {
        let (x, y) = imbalanced(60, 12, 4);
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
            let outcome = ClassBalancer::new(config, 7).balance(x.view(), &y);
            assert!(
                outcome.after.minority_ratio() >= outcome.before.minority_ratio(),
                "{method} lowered the ratio"
            );
            assert_eq!(outcome.features.nrows(), outcome.labels.len());
        }
    }
}
