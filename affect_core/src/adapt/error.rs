use serde::Serialize;
use thiserror::Error;

use crate::linalg::LinalgError;

/// Reasons an aligner could not produce a transformed source matrix.
///
/// The infallible [`DomainAligner::align`](super::DomainAligner::align) path
/// logs these and returns the source unchanged; callers that need to know
/// which case occurred use `try_align` and inspect the variant.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum AlignmentFailure {
    #[error("source has {source_features} features but target has {target_features}")]
    DimensionMismatch {
        source_features: usize,
        target_features: usize,
    },

    #[error("{domain} domain has {got} samples, at least {needed} required")]
    TooFewSamples {
        domain: &'static str,
        needed: usize,
        got: usize,
    },

    #[error("input contains non-finite values")]
    NonFiniteInput,

    #[error("covariance matrix is singular or ill-conditioned")]
    SingularCovariance,

    #[error("no usable subspace dimension (k = {components})")]
    DegenerateSubspace { components: usize },

    #[error("decomposition failed: {0}")]
    Decomposition(String),

    #[error("aligned output contains non-finite values")]
    NonFiniteOutput,

    #[error("blend weights sum to {sum}, expected a positive finite total")]
    InvalidWeights { sum: f64 },
}

impl From<LinalgError> for AlignmentFailure {
    fn from(err: LinalgError) -> Self {
        match err {
            LinalgError::Singular => AlignmentFailure::SingularCovariance,
            other => AlignmentFailure::Decomposition(other.to_string()),
        }
    }
}
