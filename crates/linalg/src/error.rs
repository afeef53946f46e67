//! Error types for the metastate-linalg crate.

/// Error type for all fallible operations in the metastate-linalg crate.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LinalgError {
    /// Returned when a square matrix was required.
    #[error("matrix is not square: {rows}x{cols}")]
    NotSquare {
        /// Number of rows.
        rows: usize,
        /// Number of columns.
        cols: usize,
    },

    /// Returned when a vector or matrix has the wrong length.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        got: usize,
    },

    /// Returned when a matrix entry lies outside the matrix shape.
    #[error("entry ({row}, {col}) is outside a {rows}x{cols} matrix")]
    IndexOutOfBounds {
        /// Row index of the entry.
        row: usize,
        /// Column index of the entry.
        col: usize,
        /// Number of rows.
        rows: usize,
        /// Number of columns.
        cols: usize,
    },

    /// Returned when raw CSR arrays are inconsistent.
    #[error("invalid sparse structure: {reason}")]
    InvalidStructure {
        /// Description of the problem.
        reason: String,
    },

    /// Returned when the requested subspace sizes are unusable.
    #[error("invalid Krylov parameters: {reason}")]
    InvalidKrylov {
        /// Description of the problem.
        reason: String,
    },

    /// Returned when an iterative method exhausts its iteration budget.
    #[error("{method} did not converge within {iterations} iterations")]
    NotConverged {
        /// Name of the iterative method.
        method: &'static str,
        /// Iterations (or restarts) performed.
        iterations: usize,
    },

    /// Returned when two diagonal blocks of a Schur form cannot be exchanged.
    #[error("cannot reorder Schur form: blocks at {position} have inseparable eigenvalues")]
    ReorderFailed {
        /// Row/column index of the first block.
        position: usize,
    },

    /// Returned when a linear system has no unique solution.
    #[error("matrix is singular")]
    Singular,
}

impl LinalgError {
    /// Returns `true` for iteration-budget failures that may succeed with a
    /// larger subspace or budget.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotConverged { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_not_square() {
        let e = LinalgError::NotSquare { rows: 3, cols: 4 };
        assert_eq!(e.to_string(), "matrix is not square: 3x4");
    }

    #[test]
    fn error_dimension_mismatch() {
        let e = LinalgError::DimensionMismatch {
            expected: 5,
            got: 4,
        };
        assert_eq!(e.to_string(), "dimension mismatch: expected 5, got 4");
    }

    #[test]
    fn error_index_out_of_bounds() {
        let e = LinalgError::IndexOutOfBounds {
            row: 7,
            col: 1,
            rows: 3,
            cols: 3,
        };
        assert_eq!(e.to_string(), "entry (7, 1) is outside a 3x3 matrix");
    }

    #[test]
    fn error_not_converged() {
        let e = LinalgError::NotConverged {
            method: "Krylov-Schur",
            iterations: 300,
        };
        assert_eq!(
            e.to_string(),
            "Krylov-Schur did not converge within 300 iterations"
        );
        assert!(e.is_retryable());
    }

    #[test]
    fn error_singular_not_retryable() {
        assert!(!LinalgError::Singular.is_retryable());
        assert_eq!(LinalgError::Singular.to_string(), "matrix is singular");
    }

    #[test]
    fn error_is_std_error() {
        fn assert_impl<T: std::error::Error>() {}
        assert_impl::<LinalgError>();
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_impl<T: Send + Sync>() {}
        assert_impl::<LinalgError>();
    }
}
