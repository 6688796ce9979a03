//! CORrelation ALignment.
//!
//! Whitens the centred source with `Cs^-1/2`, recolours it with `Ct^1/2` and
//! moves it onto the target mean, where `Cs`/`Ct` are the regularised sample
//! covariances of the two domains.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use super::error::AlignmentFailure;
use super::{validate_inputs, DomainAligner};
use crate::linalg;
use crate::stats::{column_means, covariance};

pub const DEFAULT_CORAL_REG: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoralAligner {
    /// Added to the covariance diagonals before taking roots.
    pub reg: f64,
}

impl Default for CoralAligner {
    fn default() -> Self {
        Self {
            reg: DEFAULT_CORAL_REG,
        }
    }
}

impl CoralAligner {
    pub fn new(reg: f64) -> Self {
        Self { reg }
    }

    /// The d×d map applied to centred source rows.
    pub fn transform_matrix(
        &self,
        source: ArrayView2<'_, f64>,
        target: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>, AlignmentFailure> {
        let d = source.ncols();
        let identity = Array2::<f64>::eye(d) * self.reg;
        let cs = covariance(source) + &identity;
        let ct = covariance(target) + &identity;

        let cs_sqrt = linalg::principal_sqrt(cs.view())?;
        let cs_inv_sqrt = linalg::inverse(cs_sqrt.view())?;
        let ct_sqrt = linalg::principal_sqrt(ct.view())?;
        Ok(cs_inv_sqrt.dot(&ct_sqrt))
    }
}

impl DomainAligner for CoralAligner {
    fn name(&self) -> &str {
        "coral"
    }

    fn try_align(
        &self,
        source: ArrayView2<'_, f64>,
        target: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>, AlignmentFailure> {
        validate_inputs(source, target, 2)?;
        let transform = self.transform_matrix(source, target)?;
        let centered = &source - &column_means(source);
        let aligned = centered.dot(&transform) + &column_means(target);
        if aligned.iter().any(|v| !v.is_finite()) {
            return Err(AlignmentFailure::NonFiniteOutput);
        }
        Ok(aligned)
    }
}
