//! Square linear operators consumed by the iterative solvers.

use nalgebra::DMatrix;
use ndarray::Array2;

use crate::csr::CsrMatrix;

/// A square real linear operator `x -> A x`.
///
/// Implementations must be deterministic: the same input always yields the
/// same output bit for bit.
pub trait LinearOperator: Sync {
    /// Dimension of the operator.
    fn dim(&self) -> usize;

    /// Writes `A x` into `y`. Both slices have length [`dim`](Self::dim).
    fn apply(&self, x: &[f64], y: &mut [f64]);
}

impl LinearOperator for CsrMatrix {
    fn dim(&self) -> usize {
        self.nrows()
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) {
        self.matvec(x, y);
    }
}

impl LinearOperator for Array2<f64> {
    fn dim(&self) -> usize {
        self.nrows()
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) {
        for (yi, row) in y.iter_mut().zip(self.rows()) {
            *yi = row.iter().zip(x).map(|(a, b)| a * b).sum();
        }
    }
}

impl LinearOperator for DMatrix<f64> {
    fn dim(&self) -> usize {
        self.nrows()
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) {
        for (i, yi) in y.iter_mut().enumerate() {
            *yi = (0..self.ncols()).map(|j| self[(i, j)] * x[j]).sum();
        }
    }
}

/// The operator `I - A`.
#[derive(Debug, Clone, Copy)]
pub struct IdentityMinus<'a, A: ?Sized>(pub &'a A);

impl<A: LinearOperator + ?Sized> LinearOperator for IdentityMinus<'_, A> {
    fn dim(&self) -> usize {
        self.0.dim()
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) {
        self.0.apply(x, y);
        for (yi, xi) in y.iter_mut().zip(x) {
            *yi = xi - *yi;
        }
    }
}
