//! Column statistics shared by the scalers, aligners and gap metric.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Per-feature mean. An empty matrix yields zeros.
pub fn column_means(x: ArrayView2<'_, f64>) -> Array1<f64> {
    x.mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(x.ncols()))
}

/// Per-feature population standard deviation (`ddof = 0`).
pub fn column_std(x: ArrayView2<'_, f64>) -> Array1<f64> {
    if x.nrows() == 0 {
        return Array1::zeros(x.ncols());
    }
    x.std_axis(Axis(0), 0.0)
}

/// Sample covariance of the columns (`n - 1` denominator).
pub fn covariance(x: ArrayView2<'_, f64>) -> Array2<f64> {
    let n = x.nrows();
    let d = x.ncols();
    if n < 2 {
        return Array2::zeros((d, d));
    }
    let centered = &x - &column_means(x);
    centered.t().dot(&centered) / (n as f64 - 1.0)
}

/// Linear-interpolation quantile of a column, `q` in `[0, 1]`.
pub fn quantile(values: ArrayView1<'_, f64>, q: f64) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

pub fn euclidean_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Variance of every element of the matrix taken together.
pub fn total_variance(x: ArrayView2<'_, f64>) -> f64 {
    let n = x.len();
    if n == 0 {
        return 0.0;
    }
    let mean = x.sum() / n as f64;
    x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64
}

/// Copy of the selected rows, in the given order.
pub fn select_rows(x: ArrayView2<'_, f64>, rows: &[usize]) -> Array2<f64> {
    x.select(Axis(0), rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn covariance_matches_hand_computation() {
        let x = array![[1.0, 2.0], [3.0, 6.0], [5.0, 10.0]];
        let cov = covariance(x.view());
        assert!((cov[[0, 0]] - 4.0).abs() < 1e-12);
        assert!((cov[[0, 1]] - 8.0).abs() < 1e-12);
        assert!((cov[[1, 1]] - 16.0).abs() < 1e-12);
    }

    #[test]
    fn quantile_interpolates() {
        let v = array![1.0, 2.0, 3.0, 4.0];
        assert!((quantile(v.view(), 0.5) - 2.5).abs() < 1e-12);
        assert!((quantile(v.view(), 0.25) - 1.75).abs() < 1e-12);
        assert!((quantile(v.view(), 0.75) - 3.25).abs() < 1e-12);
    }

    #[test]
    fn distance_is_euclidean() {
        let a = array![0.0, 3.0];
        let b = array![4.0, 0.0];
        assert!((euclidean_distance(a.view(), b.view()) - 5.0).abs() < 1e-12);
    }
}
