//! Weighted blend of subspace alignment, CORAL and target rescaling.
//!
//! Each member runs independently; a member that fails contributes the
//! untouched source so the blend still has three inputs. If the blend itself
//! fails the rescaled source is returned on its own.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::coral::CoralAligner;
use super::error::AlignmentFailure;
use super::gap::{domain_discrepancy, GapReport};
use super::subspace::SubspaceAligner;
use super::{validate_inputs, DomainAligner};
use crate::scaling::StandardScaler;

/// Blend weights for the three ensemble members.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentWeights {
    pub subspace: f64,
    pub coral: f64,
    pub rescale: f64,
}

impl Default for AlignmentWeights {
    fn default() -> Self {
        Self::new(0.4, 0.4, 0.2)
    }
}

impl AlignmentWeights {
    pub const fn new(subspace: f64, coral: f64, rescale: f64) -> Self {
        Self {
            subspace,
            coral,
            rescale,
        }
    }

    pub fn equal() -> Self {
        Self::new(1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0)
    }

    pub fn sum(&self) -> f64 {
        self.subspace + self.coral + self.rescale
    }

    /// Rescale to a unit sum. Negative, non-finite or all-zero weights are rejected.
    pub fn normalized(&self) -> Result<Self, AlignmentFailure> {
        let sum = self.sum();
        let parts = [self.subspace, self.coral, self.rescale];
        if !sum.is_finite() || sum <= 0.0 || parts.iter().any(|w| *w < 0.0) {
            return Err(AlignmentFailure::InvalidWeights { sum });
        }
        Ok(Self::new(
            self.subspace / sum,
            self.coral / sum,
            self.rescale / sum,
        ))
    }
}

/// Candidate weightings tried by [`EnsembleAligner::optimize_adaptation_weights`].
pub const WEIGHT_GRID: [AlignmentWeights; 7] = [
    AlignmentWeights::new(0.8, 0.1, 0.1),
    AlignmentWeights::new(0.1, 0.8, 0.1),
    AlignmentWeights::new(0.1, 0.1, 0.8),
    AlignmentWeights::new(0.4, 0.4, 0.2),
    AlignmentWeights::new(0.33, 0.33, 0.34),
    AlignmentWeights::new(0.6, 0.2, 0.2),
    AlignmentWeights::new(0.2, 0.6, 0.2),
];

/// Whether an ensemble member produced its own output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MemberStatus {
    Aligned,
    FellBack(AlignmentFailure),
}

impl MemberStatus {
    pub fn is_aligned(&self) -> bool {
        matches!(self, MemberStatus::Aligned)
    }
}

/// Ensemble output together with how each member fared.
#[derive(Debug, Clone, Serialize)]
pub struct EnsembleAlignment {
    pub features: Array2<f64>,
    pub subspace: MemberStatus,
    pub coral: MemberStatus,
    /// False when the blend failed and only the rescaled source was returned.
    pub blended: bool,
}

/// Result of a weight grid search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightSearch {
    pub weights: AlignmentWeights,
    pub gap_reduction_fraction: f64,
}

struct MemberOutputs {
    subspace: Array2<f64>,
    subspace_status: MemberStatus,
    coral: Array2<f64>,
    coral_status: MemberStatus,
    rescaled: Array2<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EnsembleAligner {
    pub weights: AlignmentWeights,
    pub subspace: SubspaceAligner,
    pub coral: CoralAligner,
}

impl EnsembleAligner {
    pub fn new(weights: AlignmentWeights, subspace: SubspaceAligner, coral: CoralAligner) -> Self {
        Self {
            weights,
            subspace,
            coral,
        }
    }

    pub fn with_weights(weights: AlignmentWeights) -> Self {
        Self {
            weights,
            ..Self::default()
        }
    }

    pub fn align_detailed(
        &self,
        source: ArrayView2<'_, f64>,
        target: ArrayView2<'_, f64>,
    ) -> Result<EnsembleAlignment, AlignmentFailure> {
        validate_inputs(source, target, 1)?;
        let members = self.member_outputs(source, target);

        match blend(&members, &self.weights) {
            Ok(features) => Ok(EnsembleAlignment {
                features,
                subspace: members.subspace_status,
                coral: members.coral_status,
                blended: true,
            }),
            Err(err) => {
                warn!(error = %err, "ensemble blend failed, using rescaled source only");
                Ok(EnsembleAlignment {
                    features: members.rescaled,
                    subspace: members.subspace_status,
                    coral: members.coral_status,
                    blended: false,
                })
            }
        }
    }

    /// Try each weighting in `grid` and keep the one with the largest gap reduction.
    ///
    /// Falls back to equal weights when no candidate reduces the gap.
    pub fn optimize_adaptation_weights(
        &self,
        source: ArrayView2<'_, f64>,
        target: ArrayView2<'_, f64>,
        grid: &[AlignmentWeights],
    ) -> Result<WeightSearch, AlignmentFailure> {
        validate_inputs(source, target, 1)?;
        let members = self.member_outputs(source, target);
        let gap_before = domain_discrepancy(source, target);

        let mut best = WeightSearch {
            weights: AlignmentWeights::equal(),
            gap_reduction_fraction: 0.0,
        };
        for candidate in grid {
            let Ok(blended) = blend(&members, candidate) else {
                continue;
            };
            let gap_after = domain_discrepancy(blended.view(), target);
            let reduction = GapReport::from_gaps(gap_before, gap_after).gap_reduction_fraction;
            debug!(?candidate, reduction, "weight candidate");
            if reduction > best.gap_reduction_fraction {
                best = WeightSearch {
                    weights: *candidate,
                    gap_reduction_fraction: reduction,
                };
            }
        }
        Ok(best)
    }

    fn member_outputs(
        &self,
        source: ArrayView2<'_, f64>,
        target: ArrayView2<'_, f64>,
    ) -> MemberOutputs {
        let (subspace, subspace_status) = run_member(&self.subspace, source, target);
        let (coral, coral_status) = run_member(&self.coral, source, target);
        let rescaled = StandardScaler::fit(target).transform(source);
        MemberOutputs {
            subspace,
            subspace_status,
            coral,
            coral_status,
            rescaled,
        }
    }
}

fn run_member(
    aligner: &dyn DomainAligner,
    source: ArrayView2<'_, f64>,
    target: ArrayView2<'_, f64>,
) -> (Array2<f64>, MemberStatus) {
    match aligner.try_align(source, target) {
        Ok(aligned) => (aligned, MemberStatus::Aligned),
        Err(err) => {
            warn!(member = aligner.name(), error = %err, "ensemble member fell back to source");
            (source.to_owned(), MemberStatus::FellBack(err))
        }
    }
}

fn blend(
    members: &MemberOutputs,
    weights: &AlignmentWeights,
) -> Result<Array2<f64>, AlignmentFailure> {
    let w = weights.normalized()?;
    let blended = &members.subspace * w.subspace
        + &members.coral * w.coral
        + &members.rescaled * w.rescale;
    if blended.iter().any(|v| !v.is_finite()) {
        return Err(AlignmentFailure::NonFiniteOutput);
    }
    Ok(blended)
}

impl DomainAligner for EnsembleAligner {
    fn name(&self) -> &str {
        "ensemble"
    }

    fn try_align(
        &self,
        source: ArrayView2<'_, f64>,
        target: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>, AlignmentFailure> {
        self.align_detailed(source, target).map(|result| result.features)
    }
}
