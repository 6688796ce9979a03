//! Subspace alignment.
//!
//! Both domains are reduced to their top `k` principal directions. Source
//! coordinates are rotated by `Ws·Wtᵀ` into the target basis and lifted back to
//! the original feature space through `Wt`. Means are not restored, so the
//! output is centred.

use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::error::AlignmentFailure;
use super::{validate_inputs, DomainAligner};
use crate::linalg;
use crate::stats::{column_means, covariance};

/// Largest subspace dimension probed by [`analyze_subspace_similarity`] (exclusive).
pub const MAX_ANALYZED_COMPONENTS: usize = 10;

/// Principal component basis fitted on one domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pca {
    mean: Array1<f64>,
    /// One unit component per row, ordered by explained variance.
    components: Array2<f64>,
    explained_variance: Array1<f64>,
}

impl Pca {
    pub fn fit(x: ArrayView2<'_, f64>, k: usize) -> Result<Self, AlignmentFailure> {
        let d = x.ncols();
        if k == 0 || k > d {
            return Err(AlignmentFailure::DegenerateSubspace { components: k });
        }
        if x.nrows() < 2 {
            return Err(AlignmentFailure::TooFewSamples {
                domain: "pca",
                needed: 2,
                got: x.nrows(),
            });
        }

        let decomposition = linalg::symmetric_eigen(covariance(x).view())?;
        let mut components = decomposition.eigenvectors.slice(s![.., ..k]).t().to_owned();
        // Deterministic orientation: the largest-magnitude loading is positive.
        for mut row in components.axis_iter_mut(Axis(0)) {
            let pivot = row
                .iter()
                .copied()
                .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
            if pivot < 0.0 {
                row.mapv_inplace(|v| -v);
            }
        }
        let explained_variance = decomposition
            .eigenvalues
            .slice(s![..k])
            .mapv(|v| v.max(0.0));

        Ok(Self {
            mean: column_means(x),
            components,
            explained_variance,
        })
    }

    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        (&x - &self.mean).dot(&self.components.t())
    }

    pub fn components(&self) -> &Array2<f64> {
        &self.components
    }

    pub fn explained_variance(&self) -> &Array1<f64> {
        &self.explained_variance
    }

    /// d×d orthogonal projector onto the component span.
    pub fn projector(&self) -> Array2<f64> {
        self.components.t().dot(&self.components)
    }
}

/// Largest `k` both domains support: `min(d, ns - 1, nt - 1)`.
pub fn max_components(d: usize, n_source: usize, n_target: usize) -> usize {
    d.min(n_source.saturating_sub(1))
        .min(n_target.saturating_sub(1))
}

/// `min(d/2 + 1, min(ns, nt) - 1)` clamped to `[2, max_components]`.
///
/// When fewer than two components are available the upper bound wins.
pub fn component_count(d: usize, n_source: usize, n_target: usize) -> usize {
    let upper = max_components(d, n_source, n_target);
    if upper < 2 {
        return upper;
    }
    let preferred = (d / 2 + 1).min(n_source.min(n_target).saturating_sub(1));
    preferred.clamp(2, upper)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubspaceAligner {
    /// Fixed subspace dimension; chosen from the data shape when `None`.
    pub n_components: Option<usize>,
}

impl SubspaceAligner {
    pub fn with_components(n_components: usize) -> Self {
        Self {
            n_components: Some(n_components),
        }
    }

    fn resolve_components(&self, d: usize, n_source: usize, n_target: usize) -> usize {
        let upper = max_components(d, n_source, n_target);
        match self.n_components {
            Some(k) => k.min(upper),
            None => component_count(d, n_source, n_target),
        }
    }
}

impl DomainAligner for SubspaceAligner {
    fn name(&self) -> &str {
        "subspace"
    }

    fn try_align(
        &self,
        source: ArrayView2<'_, f64>,
        target: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>, AlignmentFailure> {
        validate_inputs(source, target, 2)?;
        let k = self.resolve_components(source.ncols(), source.nrows(), target.nrows());
        if k == 0 {
            return Err(AlignmentFailure::DegenerateSubspace { components: k });
        }

        let source_pca = Pca::fit(source, k)?;
        let target_pca = Pca::fit(target, k)?;
        let rotation = source_pca.components().dot(&target_pca.components().t());
        let aligned = source_pca
            .transform(source)
            .dot(&rotation)
            .dot(target_pca.components());

        if aligned.iter().any(|v| !v.is_finite()) {
            return Err(AlignmentFailure::NonFiniteOutput);
        }
        Ok(aligned)
    }
}

/// Frobenius distance between the two domains' `k`-dimensional projectors.
///
/// Zero when the principal subspaces coincide, `sqrt(2k)` when orthogonal.
pub fn subspace_error(
    source: ArrayView2<'_, f64>,
    target: ArrayView2<'_, f64>,
    k: usize,
) -> Result<f64, AlignmentFailure> {
    validate_inputs(source, target, 2)?;
    let source_pca = Pca::fit(source, k)?;
    let target_pca = Pca::fit(target, k)?;
    let diff = source_pca.projector() - target_pca.projector();
    Ok(diff.iter().map(|v| v * v).sum::<f64>().sqrt())
}

/// Subspace error for each candidate dimension and the dimension that minimises it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubspaceSimilarity {
    pub errors: Vec<(usize, f64)>,
    pub optimal_components: usize,
    pub optimal_error: f64,
}

/// Scan `k` in `2..min(10, max_components)` and report the best match.
///
/// Returns `None` when the range is empty or every probe failed.
pub fn analyze_subspace_similarity(
    source: ArrayView2<'_, f64>,
    target: ArrayView2<'_, f64>,
) -> Option<SubspaceSimilarity> {
    let upper = max_components(source.ncols(), source.nrows(), target.nrows())
        .min(MAX_ANALYZED_COMPONENTS);
    let errors: Vec<(usize, f64)> = (2..upper)
        .filter_map(|k| subspace_error(source, target, k).ok().map(|e| (k, e)))
        .collect();

    let &(optimal_components, optimal_error) = errors
        .iter()
        .min_by(|a, b| a.1.total_cmp(&b.1))?;
    Some(SubspaceSimilarity {
        errors,
        optimal_components,
        optimal_error,
    })
}
