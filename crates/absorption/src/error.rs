//! Error types for the metastate-absorption crate.

use metastate_chain::ChainError;
use metastate_linalg::LinalgError;

/// Error type for all fallible operations in the metastate-absorption crate.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AbsorptionError {
    /// Returned when a configuration value is out of range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Name of the parameter.
        name: &'static str,
        /// Description of the problem.
        reason: String,
    },

    /// Returned when there is no terminal state to be absorbed in.
    #[error("no terminal states given")]
    NoTerminalStates,

    /// Returned when inputs describe a different number of states.
    #[error("{what} covers {got} states, the transition matrix has {expected}")]
    StateCountMismatch {
        /// Which input disagrees.
        what: &'static str,
        /// Number of states of the transition matrix.
        expected: usize,
        /// Number of states of the input.
        got: usize,
    },

    /// Returned when `I - Q` is singular: some states can reach neither a
    /// terminal state nor a trap.
    #[error("absorption system is singular: {reason}")]
    Singular {
        /// Description of the problem.
        reason: String,
    },

    /// Returned when the iterative solver exhausts its budget.
    #[error("{method} did not converge within {iterations} iterations")]
    NotConverged {
        /// Name of the iterative method.
        method: &'static str,
        /// Iterations performed.
        iterations: usize,
    },

    /// Propagated from transition-matrix handling.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Propagated from a numerical kernel.
    #[error(transparent)]
    Linalg(LinalgError),
}

impl From<LinalgError> for AbsorptionError {
    fn from(e: LinalgError) -> Self {
        match e {
            LinalgError::NotConverged { method, iterations } => {
                Self::NotConverged { method, iterations }
            }
            LinalgError::Singular => Self::Singular {
                reason: "the linear solver found a singular system".to_string(),
            },
            other => Self::Linalg(other),
        }
    }
}

impl AbsorptionError {
    /// Returns `true` when the caller supplied invalid input.
    pub fn is_contract_violation(&self) -> bool {
        match self {
            Self::InvalidParameter { .. }
            | Self::NoTerminalStates
            | Self::StateCountMismatch { .. } => true,
            Self::Chain(e) => e.is_contract_violation(),
            Self::Singular { .. } | Self::NotConverged { .. } | Self::Linalg(_) => false,
        }
    }

    /// Returns `true` for numerical non-convergence, which may succeed with
    /// a larger budget or a looser tolerance.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotConverged { .. })
    }

    /// Returns `true` for structural singularity; never approximated.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Singular { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_singular() {
        let e = AbsorptionError::Singular {
            reason: "1 state cannot reach a terminal state, first is 4".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "absorption system is singular: 1 state cannot reach a terminal state, first is 4"
        );
        assert!(e.is_fatal());
        assert!(!e.is_retryable());
        assert!(!e.is_contract_violation());
    }

    #[test]
    fn error_not_converged_from_linalg() {
        let e: AbsorptionError = LinalgError::NotConverged {
            method: "GMRES",
            iterations: 10_000,
        }
        .into();
        assert_eq!(e.to_string(), "GMRES did not converge within 10000 iterations");
        assert!(e.is_retryable());
        assert!(!e.is_fatal());
    }

    #[test]
    fn error_singular_from_linalg() {
        let e: AbsorptionError = LinalgError::Singular.into();
        assert!(e.is_fatal());
    }

    #[test]
    fn error_state_count_mismatch() {
        let e = AbsorptionError::StateCountMismatch {
            what: "terminal states",
            expected: 5,
            got: 4,
        };
        assert_eq!(
            e.to_string(),
            "terminal states covers 4 states, the transition matrix has 5"
        );
        assert!(e.is_contract_violation());
    }

    #[test]
    fn error_is_std_error() {
        fn assert_error<E: std::error::Error + Send + Sync + 'static>() {}
        assert_error::<AbsorptionError>();
    }
}
