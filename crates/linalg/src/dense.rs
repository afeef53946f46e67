//! Conversions between `ndarray` containers and `nalgebra` matrices.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};
use num_complex::Complex64;

/// Copies an `ndarray` matrix into a `nalgebra` matrix.
pub fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
    let (r, c) = a.dim();
    DMatrix::from_fn(r, c, |i, j| a[[i, j]])
}

/// Copies a real `nalgebra` matrix into an `ndarray` matrix.
pub fn to_array2(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn(m.shape(), |(i, j)| m[(i, j)])
}

/// Copies a complex `nalgebra` matrix into an `ndarray` matrix.
pub fn to_array2_complex(m: &DMatrix<Complex64>) -> Array2<Complex64> {
    Array2::from_shape_fn(m.shape(), |(i, j)| m[(i, j)])
}

/// Copies an `ndarray` vector into a `nalgebra` vector.
pub fn to_dvector(v: &Array1<f64>) -> DVector<f64> {
    DVector::from_iterator(v.len(), v.iter().copied())
}

/// Copies a `nalgebra` vector into an `ndarray` vector.
pub fn to_array1(v: &DVector<f64>) -> Array1<f64> {
    v.iter().copied().collect()
}
