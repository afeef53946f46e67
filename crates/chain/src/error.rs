//! Error types for the metastate-chain crate.

use metastate_linalg::LinalgError;

/// Error type for all fallible operations in the metastate-chain crate.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChainError {
    /// Returned when the transition matrix has no states.
    #[error("transition matrix is empty")]
    Empty,

    /// Returned when the transition matrix is not square.
    #[error("transition matrix is not square: {rows}x{cols}")]
    NotSquare {
        /// Number of rows.
        rows: usize,
        /// Number of columns.
        cols: usize,
    },

    /// Returned when an entry is NaN or infinite.
    #[error("transition matrix entry ({row}, {col}) is not finite")]
    NonFinite {
        /// Row of the entry.
        row: usize,
        /// Column of the entry.
        col: usize,
    },

    /// Returned when an entry is negative.
    #[error("transition matrix entry ({row}, {col}) is negative: {value}")]
    Negative {
        /// Row of the entry.
        row: usize,
        /// Column of the entry.
        col: usize,
        /// The negative value.
        value: f64,
    },

    /// Returned when a row does not sum to one.
    #[error("row {row} sums to {sum}, expected 1")]
    RowSum {
        /// Index of the row.
        row: usize,
        /// The actual row sum.
        sum: f64,
    },

    /// Returned when the number of labels differs from the number of states.
    #[error("label count mismatch: {n_states} states, {n_labels} labels")]
    LabelLengthMismatch {
        /// Number of states.
        n_states: usize,
        /// Number of labels supplied.
        n_labels: usize,
    },

    /// Returned when a probability distribution over states is invalid.
    #[error("invalid distribution: {reason}")]
    InvalidDistribution {
        /// Description of the problem.
        reason: String,
    },

    /// Returned when a state index is out of range.
    #[error("state {state} is out of range for {n_states} states")]
    StateOutOfRange {
        /// The offending index.
        state: usize,
        /// Number of states.
        n_states: usize,
    },

    /// Propagated from a numerical kernel.
    #[error(transparent)]
    Linalg(#[from] LinalgError),
}

impl ChainError {
    /// Returns `true` when the caller supplied invalid input.
    pub fn is_contract_violation(&self) -> bool {
        !matches!(self, Self::Linalg(e) if e.is_retryable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_empty() {
        assert_eq!(ChainError::Empty.to_string(), "transition matrix is empty");
    }

    #[test]
    fn error_not_square() {
        let e = ChainError::NotSquare { rows: 2, cols: 3 };
        assert_eq!(e.to_string(), "transition matrix is not square: 2x3");
    }

    #[test]
    fn error_negative() {
        let e = ChainError::Negative {
            row: 1,
            col: 0,
            value: -0.5,
        };
        assert_eq!(
            e.to_string(),
            "transition matrix entry (1, 0) is negative: -0.5"
        );
    }

    #[test]
    fn error_row_sum() {
        let e = ChainError::RowSum { row: 3, sum: 0.9 };
        assert_eq!(e.to_string(), "row 3 sums to 0.9, expected 1");
        assert!(e.is_contract_violation());
    }

    #[test]
    fn error_label_mismatch() {
        let e = ChainError::LabelLengthMismatch {
            n_states: 4,
            n_labels: 3,
        };
        assert_eq!(e.to_string(), "label count mismatch: 4 states, 3 labels");
    }

    #[test]
    fn error_transparent_linalg() {
        let e: ChainError = LinalgError::Singular.into();
        assert_eq!(e.to_string(), "matrix is singular");
    }

    #[test]
    fn error_is_std_error() {
        fn assert_impl<T: std::error::Error>() {}
        assert_impl::<ChainError>();
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_impl<T: Send + Sync>() {}
        assert_impl::<ChainError>();
    }
}
