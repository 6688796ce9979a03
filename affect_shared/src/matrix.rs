//! Labeled feature matrices exchanged between the feature provider and the pipeline.
//!
//! A [`FeatureMatrix`] is validated once at construction and never mutated
//! afterwards. Transformations elsewhere in the workspace always allocate a new
//! array.

use std::fmt;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation failures raised while building a [`FeatureMatrix`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatrixError {
    #[error("feature matrix has {rows} rows but {labels} labels")]
    LabelCountMismatch { rows: usize, labels: usize },

    #[error("feature matrix has {columns} columns but {names} feature names")]
    NameCountMismatch { columns: usize, names: usize },

    #[error("label {value} at row {row} is not binary")]
    NonBinaryLabel { row: usize, value: usize },

    #[error("non-finite value at row {row}, column {column}")]
    NonFinite { row: usize, column: usize },
}

/// An n×d real matrix with named columns and one binary label per row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureMatrix {
    dataset: String,
    feature_names: Vec<String>,
    features: Array2<f64>,
    labels: Vec<usize>,
}

impl FeatureMatrix {
    /// Build a matrix, rejecting shape mismatches, non-binary labels and NaN/Inf cells.
    pub fn new(
        dataset: impl Into<String>,
        feature_names: Vec<String>,
        features: Array2<f64>,
        labels: Vec<usize>,
    ) -> Result<Self, MatrixError> {
        let (rows, columns) = features.dim();
        if rows != labels.len() {
            return Err(MatrixError::LabelCountMismatch {
                rows,
                labels: labels.len(),
            });
        }
        if columns != feature_names.len() {
            return Err(MatrixError::NameCountMismatch {
                columns,
                names: feature_names.len(),
            });
        }
        if let Some((row, &value)) = labels.iter().enumerate().find(|&(_, &v)| v > 1) {
            return Err(MatrixError::NonBinaryLabel { row, value });
        }
        if let Some(((row, column), _)) = features.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(MatrixError::NonFinite { row, column });
        }

        Ok(Self {
            dataset: dataset.into(),
            feature_names,
            features,
            labels,
        })
    }

    /// Name of the dataset the rows were drawn from (e.g. "wesad").
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn class_distribution(&self) -> ClassDistribution {
        ClassDistribution::from_labels(&self.labels)
    }

    /// Consume the matrix and hand back its owned parts.
    pub fn into_parts(self) -> (Array2<f64>, Vec<usize>) {
        (self.features, self.labels)
    }
}

/// Count of samples per label, indexed by label value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDistribution {
    counts: Vec<usize>,
}

impl ClassDistribution {
    /// Bin-count the labels; the vector is as long as the largest label plus one.
    pub fn from_labels(labels: &[usize]) -> Self {
        let len = labels.iter().copied().max().map(|m| m + 1).unwrap_or(0);
        let mut counts = vec![0; len];
        for &label in labels {
            counts[label] += 1;
        }
        Self { counts }
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn count(&self, label: usize) -> usize {
        self.counts.get(label).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Number of labels that actually occur.
    pub fn n_present(&self) -> usize {
        self.counts.iter().filter(|&&c| c > 0).count()
    }

    /// Minority count divided by majority count over the labels present.
    ///
    /// A single-class (or empty) distribution is treated as balanced and reports `1.0`.
    pub fn minority_ratio(&self) -> f64 {
        if self.n_present() < 2 {
            return 1.0;
        }
        let present = self.counts.iter().copied().filter(|&c| c > 0);
        let (min, max) = present.fold((usize::MAX, 0), |(lo, hi), c| (lo.min(c), hi.max(c)));
        min as f64 / max as f64
    }

    /// Present label with the fewest samples (lowest label wins ties).
    pub fn minority_label(&self) -> Option<usize> {
        self.counts
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c > 0)
            .min_by_key(|&(_, &c)| c)
            .map(|(label, _)| label)
    }

    /// Present label with the most samples (lowest label wins ties).
    pub fn majority_label(&self) -> Option<usize> {
        self.counts
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c > 0)
            .fold(None, |best: Option<(usize, usize)>, (label, &c)| match best {
                Some((_, best_count)) if best_count >= c => best,
                _ => Some((label, c)),
            })
            .map(|(label, _)| label)
    }
}

impl fmt::Display for ClassDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.counts)
    }
}
