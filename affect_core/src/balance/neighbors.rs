//! Brute-force Euclidean nearest neighbours.

use ndarray::{ArrayView1, ArrayView2};

pub fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Row indices of the `k` rows of `pool` closest to `query`, nearest first.
///
/// `exclude` removes one pool row (the query itself when it belongs to the
/// pool). Equal distances are ordered by row index.
pub fn k_nearest(
    pool: ArrayView2<'_, f64>,
    query: ArrayView1<'_, f64>,
    k: usize,
    exclude: Option<usize>,
) -> Vec<usize> {
    let mut candidates: Vec<(f64, usize)> = pool
        .outer_iter()
        .enumerate()
        .filter(|&(idx, _)| Some(idx) != exclude)
        .map(|(idx, row)| (squared_distance(query, row), idx))
        .collect();
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    candidates.into_iter().take(k).map(|(_, idx)| idx).collect()
}

/// `k_nearest` for every row of `pool`, each excluding itself.
pub fn neighbor_table(pool: ArrayView2<'_, f64>, k: usize) -> Vec<Vec<usize>> {
    (0..pool.nrows())
        .map(|i| k_nearest(pool, pool.row(i), k, Some(i)))
        .collect()
}
