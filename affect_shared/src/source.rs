//! Interface to the upstream feature provider.
//!
//! Signal ingestion, windowing and per-channel feature extraction live outside
//! this workspace. Whatever performs them hands the pipeline a [`DomainPair`]
//! through the [`FeatureSource`] trait.

use thiserror::Error;

use crate::dimension::TargetDimension;
use crate::matrix::{FeatureMatrix, MatrixError};

/// Failures reported by a feature provider.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    #[error("source has {source_features} features but target has {target_features}")]
    FeatureCountMismatch {
        source_features: usize,
        target_features: usize,
    },

    #[error("column '{column}' is missing from dataset '{dataset}'")]
    MissingColumn { dataset: String, column: String },

    #[error("no mapped features survived quality filtering")]
    NoCommonFeatures,

    #[error("table '{dataset}' has {columns} column names for {width} data columns")]
    MalformedTable {
        dataset: String,
        columns: usize,
        width: usize,
    },

    #[error(transparent)]
    Matrix(#[from] MatrixError),

    #[error("feature source unavailable: {0}")]
    Unavailable(String),
}

/// Source and target matrices restricted to the same mapped feature columns.
#[derive(Debug, Clone)]
pub struct DomainPair {
    source: FeatureMatrix,
    target: FeatureMatrix,
}

impl DomainPair {
    pub fn new(source: FeatureMatrix, target: FeatureMatrix) -> Result<Self, SourceError> {
        if source.n_features() != target.n_features() {
            return Err(SourceError::FeatureCountMismatch {
                source_features: source.n_features(),
                target_features: target.n_features(),
            });
        }
        Ok(Self { source, target })
    }

    pub fn source(&self) -> &FeatureMatrix {
        &self.source
    }

    pub fn target(&self) -> &FeatureMatrix {
        &self.target
    }

    pub fn into_parts(self) -> (FeatureMatrix, FeatureMatrix) {
        (self.source, self.target)
    }
}

/// Produces mapped, NaN-free feature matrices for a target dimension.
pub trait FeatureSource {
    fn domain_pair(&self, dimension: TargetDimension) -> Result<DomainPair, SourceError>;

    /// Provider name for logging.
    fn name(&self) -> &str {
        "UnknownSource"
    }
}
