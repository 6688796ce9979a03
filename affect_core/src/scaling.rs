//! Per-feature scalers fit on one matrix and applied to another.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::stats;

/// Scales below this are treated as zero and replaced by 1.
const MIN_SCALE: f64 = 10.0 * f64::EPSILON;

fn guard_scale(scale: f64) -> f64 {
    if scale.abs() < MIN_SCALE || !scale.is_finite() {
        1.0
    } else {
        scale
    }
}

/// Centre on the median and divide by the inter-quartile range (25th to 75th percentile).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustScaler {
    center: Array1<f64>,
    scale: Array1<f64>,
}

impl RobustScaler {
    pub fn fit(x: ArrayView2<'_, f64>) -> Self {
        let mut center = Array1::zeros(x.ncols());
        let mut scale = Array1::ones(x.ncols());
        for (j, column) in x.axis_iter(Axis(1)).enumerate() {
            center[j] = stats::quantile(column, 0.5);
            scale[j] = guard_scale(stats::quantile(column, 0.75) - stats::quantile(column, 0.25));
        }
        Self { center, scale }
    }

    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        (&x - &self.center) / &self.scale
    }

    pub fn center(&self) -> &Array1<f64> {
        &self.center
    }

    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }
}

/// Zero mean, unit population variance per feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(x: ArrayView2<'_, f64>) -> Self {
        Self {
            mean: stats::column_means(x),
            scale: stats::column_std(x).mapv(guard_scale),
        }
    }

    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        (&x - &self.mean) / &self.scale
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }
}
