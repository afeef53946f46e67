//! Error types for the metastate-spectral crate.

use metastate_chain::ChainError;
use metastate_linalg::LinalgError;

/// Error type for all fallible operations in the metastate-spectral crate.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SpectralError {
    /// Returned when a configuration value is out of range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Name of the parameter.
        name: &'static str,
        /// Description of the problem.
        reason: String,
    },

    /// Returned when an iterative eigensolver exhausts its budget.
    #[error("{method} did not converge within {iterations} iterations")]
    NotConverged {
        /// Name of the iterative method.
        method: &'static str,
        /// Iterations (or restarts) performed.
        iterations: usize,
    },

    /// Propagated from a numerical kernel.
    #[error(transparent)]
    Linalg(LinalgError),

    /// Propagated from transition-matrix handling.
    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl From<LinalgError> for SpectralError {
    fn from(e: LinalgError) -> Self {
        match e {
            LinalgError::NotConverged { method, iterations } => {
                Self::NotConverged { method, iterations }
            }
            other => Self::Linalg(other),
        }
    }
}

impl SpectralError {
    /// Returns `true` when the caller supplied invalid input.
    pub fn is_contract_violation(&self) -> bool {
        match self {
            Self::InvalidParameter { .. } => true,
            Self::Chain(e) => e.is_contract_violation(),
            Self::NotConverged { .. } | Self::Linalg(_) => false,
        }
    }

    /// Returns `true` for numerical non-convergence, which may succeed with
    /// a larger Krylov subspace or budget.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotConverged { .. })
    }
}
