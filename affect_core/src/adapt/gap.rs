//! Domain gap: Euclidean distance between the per-feature mean vectors.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::stats::{column_means, euclidean_distance};

pub fn domain_discrepancy(source: ArrayView2<'_, f64>, target: ArrayView2<'_, f64>) -> f64 {
    let source_mean = column_means(source);
    let target_mean = column_means(target);
    euclidean_distance(source_mean.view(), target_mean.view())
}

/// Gap to the target before and after alignment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GapReport {
    pub gap_before: f64,
    pub gap_after: f64,
    /// `1 - after / before`; zero when the gap was already zero.
    pub gap_reduction_fraction: f64,
}

impl GapReport {
    pub fn from_gaps(gap_before: f64, gap_after: f64) -> Self {
        let gap_reduction_fraction = if gap_before > 0.0 {
            1.0 - gap_after / gap_before
        } else {
            0.0
        };
        Self {
            gap_before,
            gap_after,
            gap_reduction_fraction,
        }
    }

    pub fn reduction_percent(&self) -> f64 {
        self.gap_reduction_fraction * 100.0
    }
}

pub fn measure_domain_gap(
    source: ArrayView2<'_, f64>,
    target: ArrayView2<'_, f64>,
    aligned: ArrayView2<'_, f64>,
) -> GapReport {
    GapReport::from_gaps(
        domain_discrepancy(source, target),
        domain_discrepancy(aligned, target),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn identical_means_give_zero_gap() {
        let a = array![[1.0, 2.0], [3.0, 4.0]];
        let b = array![[2.0, 3.0], [2.0, 3.0]];
        assert_eq!(domain_discrepancy(a.view(), b.view()), 0.0);
        let report = measure_domain_gap(a.view(), b.view(), a.view());
        assert_eq!(report.gap_reduction_fraction, 0.0);
    }

    #[test]
    fn reduction_is_relative_to_initial_gap() {
        let report = GapReport::from_gaps(4.0, 1.0);
        assert!((report.gap_reduction_fraction - 0.75).abs() < 1e-12);
        assert!((report.reduction_percent() - 75.0).abs() < 1e-9);
        assert!(GapReport::from_gaps(1.0, 2.0).gap_reduction_fraction < 0.0);
    }
}
