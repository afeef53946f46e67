//! Validated row-stochastic transition matrices.

use metastate_linalg::{CsrMatrix, LinearOperator};
use ndarray::{Array1, Array2};

use crate::error::ChainError;

/// Allowed deviation of a row sum from one.
pub const ROW_SUM_TOLERANCE: f64 = 1e-6;

/// Backing storage of a matrix over states.
#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    /// Dense row-major storage.
    Dense(Array2<f64>),
    /// Compressed sparse row storage.
    Sparse(CsrMatrix),
}

impl Storage {
    /// Number of rows.
    pub fn nrows(&self) -> usize {
        match self {
            Self::Dense(a) => a.nrows(),
            Self::Sparse(m) => m.nrows(),
        }
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        match self {
            Self::Dense(a) => a.ncols(),
            Self::Sparse(m) => m.ncols(),
        }
    }

    /// Returns `true` for sparse storage.
    pub fn is_sparse(&self) -> bool {
        matches!(self, Self::Sparse(_))
    }

    /// Entry `(i, j)`.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        match self {
            Self::Dense(a) => a.get((i, j)).copied().unwrap_or(0.0),
            Self::Sparse(m) => m.get(i, j),
        }
    }

    /// Nonzero `(column, value)` pairs of row `i`.
    pub fn row(&self, i: usize) -> Vec<(usize, f64)> {
        match self {
            Self::Dense(a) => a
                .row(i)
                .iter()
                .enumerate()
                .filter(|(_, v)| **v != 0.0)
                .map(|(j, v)| (j, *v))
                .collect(),
            Self::Sparse(m) => m.row(i).collect(),
        }
    }

    /// Dense copy.
    pub fn to_dense(&self) -> Array2<f64> {
        match self {
            Self::Dense(a) => a.clone(),
            Self::Sparse(m) => m.to_dense(),
        }
    }

    /// Transpose in the same storage kind.
    pub fn transpose(&self) -> Self {
        match self {
            Self::Dense(a) => Self::Dense(a.t().to_owned()),
            Self::Sparse(m) => Self::Sparse(m.transpose()),
        }
    }

    /// Returns `diag(left) A diag(right)` in the same storage kind.
    pub fn scale(&self, left: &[f64], right: &[f64]) -> Result<Self, ChainError> {
        match self {
            Self::Dense(a) => {
                let (r, c) = a.dim();
                if left.len() != r || right.len() != c {
                    return Err(ChainError::InvalidDistribution {
                        reason: format!(
                            "scaling vectors of length {} and {} do not fit a {r}x{c} matrix",
                            left.len(),
                            right.len()
                        ),
                    });
                }
                Ok(Self::Dense(Array2::from_shape_fn((r, c), |(i, j)| {
                    left[i] * a[[i, j]] * right[j]
                })))
            }
            Self::Sparse(m) => Ok(Self::Sparse(m.scale(left, right)?)),
        }
    }

    /// Extracts the block with the given rows and columns.
    pub fn submatrix(&self, rows: &[usize], cols: &[usize]) -> Result<Self, ChainError> {
        match self {
            Self::Dense(a) => {
                let (nr, nc) = a.dim();
                if let Some(&bad) = rows.iter().find(|&&i| i >= nr) {
                    return Err(ChainError::StateOutOfRange {
                        state: bad,
                        n_states: nr,
                    });
                }
                if let Some(&bad) = cols.iter().find(|&&j| j >= nc) {
                    return Err(ChainError::StateOutOfRange {
                        state: bad,
                        n_states: nc,
                    });
                }
                Ok(Self::Dense(Array2::from_shape_fn(
                    (rows.len(), cols.len()),
                    |(i, j)| a[[rows[i], cols[j]]],
                )))
            }
            Self::Sparse(m) => Ok(Self::Sparse(m.submatrix(rows, cols)?)),
        }
    }
}

impl LinearOperator for Storage {
    fn dim(&self) -> usize {
        self.nrows()
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) {
        match self {
            Self::Dense(a) => a.apply(x, y),
            Self::Sparse(m) => m.apply(x, y),
        }
    }
}

/// A square, non-negative, row-stochastic matrix.
///
/// Immutable once constructed; every constructor validates its input.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionMatrix {
    storage: Storage,
}

impl TransitionMatrix {
    /// Validates and wraps a dense matrix.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError`] if the matrix is empty or not square, has a
    /// non-finite or negative entry, or has a row whose sum differs from one
    /// by more than [`ROW_SUM_TOLERANCE`].
    pub fn from_dense(a: Array2<f64>) -> Result<Self, ChainError> {
        let (rows, cols) = a.dim();
        check_shape(rows, cols)?;
        for (i, row) in a.rows().into_iter().enumerate() {
            let mut sum = 0.0;
            for (j, &v) in row.iter().enumerate() {
                check_entry(i, j, v)?;
                sum += v;
            }
            check_row_sum(i, sum)?;
        }
        Ok(Self {
            storage: Storage::Dense(a),
        })
    }

    /// Validates and wraps a sparse matrix.
    ///
    /// # Errors
    ///
    /// Same conditions as [`TransitionMatrix::from_dense`].
    pub fn from_sparse(m: CsrMatrix) -> Result<Self, ChainError> {
        check_shape(m.nrows(), m.ncols())?;
        for i in 0..m.nrows() {
            let mut sum = 0.0;
            for (j, v) in m.row(i) {
                check_entry(i, j, v)?;
                sum += v;
            }
            check_row_sum(i, sum)?;
        }
        Ok(Self {
            storage: Storage::Sparse(m),
        })
    }

    /// Number of states `N`.
    pub fn n_states(&self) -> usize {
        self.storage.nrows()
    }

    /// Returns `true` when the matrix is stored sparsely.
    pub fn is_sparse(&self) -> bool {
        self.storage.is_sparse()
    }

    /// The underlying storage.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Transition probability from `i` to `j`.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.storage.get(i, j)
    }

    /// Nonzero `(target, probability)` pairs out of state `i`.
    pub fn row(&self, i: usize) -> Vec<(usize, f64)> {
        self.storage.row(i)
    }

    /// States reachable in one step from `i`.
    pub fn successors(&self, i: usize) -> Vec<usize> {
        self.storage.row(i).into_iter().map(|(j, _)| j).collect()
    }

    /// Dense copy of the matrix.
    pub fn to_dense(&self) -> Array2<f64> {
        self.storage.to_dense()
    }

    /// `P^T`, sparse when `P` is.
    pub fn transposed(&self) -> Storage {
        self.storage.transpose()
    }

    /// The similarity transform `D^{1/2} P D^{-1/2}` with `D = diag(eta)`.
    ///
    /// `eta` must be a valid, strictly positive distribution over states
    /// (see [`validate_distribution`]). For uniform `eta` this is `P`
    /// itself.
    pub fn weighted(&self, eta: &Array1<f64>) -> Result<Storage, ChainError> {
        validate_distribution(eta, self.n_states())?;
        let sqrt: Vec<f64> = eta.iter().map(|v| v.sqrt()).collect();
        let inv: Vec<f64> = sqrt.iter().map(|v| 1.0 / v).collect();
        self.storage.scale(&sqrt, &inv)
    }

    /// Computes `y = P x`.
    pub fn apply(&self, x: &[f64], y: &mut [f64]) {
        self.storage.apply(x, y);
    }

    /// Computes `y = x P`, i.e. `P^T x`.
    pub fn apply_transpose(&self, x: &[f64], y: &mut [f64]) {
        y.iter_mut().for_each(|v| *v = 0.0);
        for i in 0..self.n_states() {
            if x[i] == 0.0 {
                continue;
            }
            for (j, v) in self.storage.row(i) {
                y[j] += x[i] * v;
            }
        }
    }
}

impl LinearOperator for TransitionMatrix {
    fn dim(&self) -> usize {
        self.n_states()
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) {
        self.storage.apply(x, y);
    }
}

fn check_shape(rows: usize, cols: usize) -> Result<(), ChainError> {
    if rows == 0 || cols == 0 {
        return Err(ChainError::Empty);
    }
    if rows != cols {
        return Err(ChainError::NotSquare { rows, cols });
    }
    Ok(())
}

fn check_entry(row: usize, col: usize, value: f64) -> Result<(), ChainError> {
    if !value.is_finite() {
        return Err(ChainError::NonFinite { row, col });
    }
    if value < 0.0 {
        return Err(ChainError::Negative { row, col, value });
    }
    Ok(())
}

fn check_row_sum(row: usize, sum: f64) -> Result<(), ChainError> {
    if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
        return Err(ChainError::RowSum { row, sum });
    }
    Ok(())
}

/// Checks that `eta` is a strictly positive probability vector of length
/// `n`.
pub fn validate_distribution(eta: &Array1<f64>, n: usize) -> Result<(), ChainError> {
    if eta.len() != n {
        return Err(ChainError::InvalidDistribution {
            reason: format!("expected {n} entries, got {}", eta.len()),
        });
    }
    if let Some((i, v)) = eta
        .iter()
        .enumerate()
        .find(|(_, v)| !v.is_finite() || **v <= 0.0)
    {
        return Err(ChainError::InvalidDistribution {
            reason: format!("entry {i} is {v}, all entries must be finite and positive"),
        });
    }
    let sum = eta.sum();
    if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
        return Err(ChainError::InvalidDistribution {
            reason: format!("entries sum to {sum}, expected 1"),
        });
    }
    Ok(())
}

/// The uniform distribution over `n` states.
pub fn uniform_distribution(n: usize) -> Array1<f64> {
    Array1::from_elem(n, 1.0 / n as f64)
}
