//! Dense symmetric linear algebra on top of nalgebra.
//!
//! Feature matrices travel through the pipeline as `ndarray` arrays; the
//! eigen-decompositions needed by the aligners are delegated to nalgebra and
//! converted back at the boundary.

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, ArrayView2};
use num_complex::Complex64;
use thiserror::Error;

const EIGEN_EPS: f64 = 1e-12;
const EIGEN_MAX_ITER: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinalgError {
    #[error("expected a square matrix, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("matrix contains non-finite entries")]
    NonFinite,

    #[error("symmetric eigen-decomposition did not converge")]
    NoConvergence,

    #[error("matrix is singular")]
    Singular,
}

/// Eigenvalues in descending order with the matching unit eigenvectors as columns.
#[derive(Debug, Clone)]
pub struct SymmetricDecomposition {
    pub eigenvalues: Array1<f64>,
    pub eigenvectors: Array2<f64>,
}

pub fn to_dmatrix(a: ArrayView2<'_, f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

pub fn from_dmatrix(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

fn check_square(a: ArrayView2<'_, f64>) -> Result<(), LinalgError> {
    if a.nrows() != a.ncols() {
        return Err(LinalgError::NotSquare {
            rows: a.nrows(),
            cols: a.ncols(),
        });
    }
    if a.iter().any(|v| !v.is_finite()) {
        return Err(LinalgError::NonFinite);
    }
    Ok(())
}

pub fn symmetric_eigen(a: ArrayView2<'_, f64>) -> Result<SymmetricDecomposition, LinalgError> {
    check_square(a)?;
    let eigen = SymmetricEigen::try_new(to_dmatrix(a), EIGEN_EPS, EIGEN_MAX_ITER)
        .ok_or(LinalgError::NoConvergence)?;

    let n = a.nrows();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| eigen.eigenvalues[j].total_cmp(&eigen.eigenvalues[i]));

    let eigenvalues = Array1::from_iter(order.iter().map(|&i| eigen.eigenvalues[i]));
    let eigenvectors = Array2::from_shape_fn((n, n), |(row, col)| eigen.eigenvectors[(row, order[col])]);
    Ok(SymmetricDecomposition {
        eigenvalues,
        eigenvectors,
    })
}

/// Principal square root of a symmetric matrix, keeping only the real part.
///
/// Slightly negative eigenvalues from round-off map to an imaginary root whose
/// real part is zero.
pub fn principal_sqrt(a: ArrayView2<'_, f64>) -> Result<Array2<f64>, LinalgError> {
    let decomposition = symmetric_eigen(a)?;
    let roots = decomposition
        .eigenvalues
        .mapv(|lambda| Complex64::new(lambda, 0.0).sqrt().re);
    Ok(reconstruct(&decomposition.eigenvectors, &roots))
}

/// General inverse. Fails on singular input or when the result is not finite.
pub fn inverse(a: ArrayView2<'_, f64>) -> Result<Array2<f64>, LinalgError> {
    check_square(a)?;
    let inverse = to_dmatrix(a).try_inverse().ok_or(LinalgError::Singular)?;
    let out = from_dmatrix(&inverse);
    if out.iter().any(|v| !v.is_finite()) {
        return Err(LinalgError::Singular);
    }
    Ok(out)
}

fn reconstruct(vectors: &Array2<f64>, values: &Array1<f64>) -> Array2<f64> {
    let scaled = vectors * values;
    scaled.dot(&vectors.t())
}
