//! Unsupervised domain adaptation of source features toward a target domain.
//!
//! Every aligner consumes a source matrix and a target matrix with the same
//! columns and returns a new matrix shaped like the source. Target labels are
//! never consulted.

pub mod coral;
pub mod ensemble;
pub mod error;
pub mod gap;
pub mod subspace;

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub use coral::{CoralAligner, DEFAULT_CORAL_REG};
pub use ensemble::{
    AlignmentWeights, EnsembleAligner, EnsembleAlignment, MemberStatus, WeightSearch, WEIGHT_GRID,
};
pub use error::AlignmentFailure;
pub use gap::{domain_discrepancy, measure_domain_gap, GapReport};
pub use subspace::{analyze_subspace_similarity, subspace_error, SubspaceAligner, SubspaceSimilarity};

use crate::config::AlignmentConfig;

/// Adaptation strategy selected for a training direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdaptationMethod {
    Coral,
    Subspace,
    Ensemble,
    None,
}

impl Default for AdaptationMethod {
    fn default() -> Self {
        AdaptationMethod::Ensemble
    }
}

impl AdaptationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdaptationMethod::Coral => "coral",
            AdaptationMethod::Subspace => "subspace",
            AdaptationMethod::Ensemble => "ensemble",
            AdaptationMethod::None => "none",
        }
    }

    /// Parse a user-supplied name, warning and disabling adaptation when unknown.
    pub fn from_name_or_none(name: &str) -> Self {
        name.parse().unwrap_or_else(|err: String| {
            warn!(%err, "adaptation disabled");
            AdaptationMethod::None
        })
    }
}

impl fmt::Display for AdaptationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdaptationMethod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "coral" => Ok(AdaptationMethod::Coral),
            "subspace" => Ok(AdaptationMethod::Subspace),
            "ensemble" => Ok(AdaptationMethod::Ensemble),
            "none" => Ok(AdaptationMethod::None),
            other => Err(format!("unknown adaptation method '{other}'")),
        }
    }
}

/// Maps source features toward a target domain.
pub trait DomainAligner {
    fn name(&self) -> &str;

    fn try_align(
        &self,
        source: ArrayView2<'_, f64>,
        target: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>, AlignmentFailure>;

    /// Infallible variant: on failure, log and return the source unchanged.
    fn align(&self, source: ArrayView2<'_, f64>, target: ArrayView2<'_, f64>) -> Array2<f64> {
        match self.try_align(source, target) {
            Ok(aligned) => aligned,
            Err(err) => {
                warn!(aligner = self.name(), error = %err, "alignment failed, using source as-is");
                source.to_owned()
            }
        }
    }
}

/// Closed set of aligners the pipeline knows how to build from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Aligner {
    Coral(CoralAligner),
    Subspace(SubspaceAligner),
    Ensemble(EnsembleAligner),
}

impl Aligner {
    /// `None` for [`AdaptationMethod::None`].
    pub fn for_method(method: AdaptationMethod, config: &AlignmentConfig) -> Option<Self> {
        let coral = CoralAligner::new(config.coral_reg);
        let subspace = SubspaceAligner {
            n_components: config.subspace_components,
        };
        match method {
            AdaptationMethod::Coral => Some(Aligner::Coral(coral)),
            AdaptationMethod::Subspace => Some(Aligner::Subspace(subspace)),
            AdaptationMethod::Ensemble => Some(Aligner::Ensemble(EnsembleAligner::new(
                config.weights,
                subspace,
                coral,
            ))),
            AdaptationMethod::None => None,
        }
    }

    fn inner(&self) -> &dyn DomainAligner {
        match self {
            Aligner::Coral(a) => a as &dyn DomainAligner,
            Aligner::Subspace(a) => a,
            Aligner::Ensemble(a) => a,
        }
    }
}

impl DomainAligner for Aligner {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn try_align(
        &self,
        source: ArrayView2<'_, f64>,
        target: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>, AlignmentFailure> {
        self.inner().try_align(source, target)
    }
}

/// Summary of one alignment call kept alongside the trained model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignmentReport {
    pub aligner: String,
    pub gap: GapReport,
    /// Set when the aligner failed and the source was used unchanged.
    pub failure: Option<AlignmentFailure>,
}

/// Aligned features plus the report describing how they were produced.
#[derive(Debug, Clone)]
pub struct AlignmentOutcome {
    pub features: Array2<f64>,
    pub report: AlignmentReport,
}

/// Run `aligner`, falling back to the source on failure, and measure the gap.
pub fn align_with_report(
    aligner: &dyn DomainAligner,
    source: ArrayView2<'_, f64>,
    target: ArrayView2<'_, f64>,
) -> AlignmentOutcome {
    let (features, failure) = match aligner.try_align(source, target) {
        Ok(aligned) => (aligned, None),
        Err(err) => {
            warn!(aligner = aligner.name(), error = %err, "alignment failed, using source as-is");
            (source.to_owned(), Some(err))
        }
    };
    let gap = measure_domain_gap(source, target, features.view());
    AlignmentOutcome {
        features,
        report: AlignmentReport {
            aligner: aligner.name().to_string(),
            gap,
            failure,
        },
    }
}

/// Shape and finiteness checks shared by the aligners.
pub(crate) fn validate_inputs(
    source: ArrayView2<'_, f64>,
    target: ArrayView2<'_, f64>,
    min_samples: usize,
) -> Result<(), AlignmentFailure> {
    if source.ncols() != target.ncols() {
        return Err(AlignmentFailure::DimensionMismatch {
            source_features: source.ncols(),
            target_features: target.ncols(),
        });
    }
    if source.nrows() < min_samples {
        return Err(AlignmentFailure::TooFewSamples {
            domain: "source",
            needed: min_samples,
            got: source.nrows(),
        });
    }
    if target.nrows() < min_samples {
        return Err(AlignmentFailure::TooFewSamples {
            domain: "target",
            needed: min_samples,
            got: target.nrows(),
        });
    }
    if source.iter().chain(target.iter()).any(|v| !v.is_finite()) {
        return Err(AlignmentFailure::NonFiniteInput);
    }
    Ok(())
}
