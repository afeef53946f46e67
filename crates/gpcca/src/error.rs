//! Error types for the metastate-gpcca crate.

use metastate_chain::ChainError;
use metastate_spectral::SpectralError;

/// Error type for all fallible operations in the metastate-gpcca crate.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GpccaError {
    /// Returned when a configuration value is out of range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Name of the parameter.
        name: &'static str,
        /// Description of the problem.
        reason: String,
    },

    /// Returned when the requested number of macrostates ends inside a 2x2
    /// block of the Schur matrix.
    #[error(
        "{m} macrostates would split a block of complex conjugate eigenvalues, use {} or {} instead",
        .m - 1,
        .m + 1
    )]
    SplitsConjugatePair {
        /// Requested number of macrostates.
        m: usize,
    },

    /// Returned when the Schur vectors cannot be turned into a basis whose
    /// first vector is `sqrt(eta)`.
    #[error("degenerate Schur subspace: {reason}")]
    DegenerateSubspace {
        /// Description of the problem.
        reason: String,
    },

    /// Returned when the initial rotation matrix is not feasible.
    #[error("initial rotation matrix is infeasible: first row has non-positive entries")]
    InfeasibleRotation,

    /// Returned when a macrostate name or index does not exist.
    #[error("unknown macrostate `{name}`")]
    UnknownMacrostate {
        /// The name as given.
        name: String,
    },

    /// Propagated from spectral analysis.
    #[error(transparent)]
    Spectral(#[from] SpectralError),

    /// Propagated from transition-matrix handling.
    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl GpccaError {
    /// Returns `true` when the caller supplied invalid input.
    pub fn is_contract_violation(&self) -> bool {
        match self {
            Self::InvalidParameter { .. }
            | Self::SplitsConjugatePair { .. }
            | Self::UnknownMacrostate { .. } => true,
            Self::DegenerateSubspace { .. } | Self::InfeasibleRotation => false,
            Self::Spectral(e) => e.is_contract_violation(),
            Self::Chain(e) => e.is_contract_violation(),
        }
    }

    /// Returns `true` for numerical non-convergence upstream.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Spectral(e) if e.is_retryable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_splits_conjugate_pair() {
        let e = GpccaError::SplitsConjugatePair { m: 3 };
        assert_eq!(
            e.to_string(),
            "3 macrostates would split a block of complex conjugate eigenvalues, use 2 or 4 instead"
        );
        assert!(e.is_contract_violation());
    }

    #[test]
    fn error_unknown_macrostate() {
        let e = GpccaError::UnknownMacrostate {
            name: "Gamma".to_string(),
        };
        assert_eq!(e.to_string(), "unknown macrostate `Gamma`");
    }

    #[test]
    fn error_degenerate_is_not_contract_violation() {
        let e = GpccaError::DegenerateSubspace {
            reason: "sqrt(eta) is not in the span".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "degenerate Schur subspace: sqrt(eta) is not in the span"
        );
        assert!(!e.is_contract_violation());
        assert!(!e.is_retryable());
    }

    #[test]
    fn error_chain_propagates() {
        let e: GpccaError = ChainError::Empty.into();
        assert_eq!(e.to_string(), "transition matrix is empty");
        assert!(e.is_contract_violation());
    }

    #[test]
    fn error_is_std_error() {
        fn assert_error<E: std::error::Error + Send + Sync + 'static>() {}
        assert_error::<GpccaError>();
    }
}
