//! Error types for the metastate-estimator crate.

use metastate_absorption::AbsorptionError;
use metastate_chain::ChainError;
use metastate_gpcca::GpccaError;
use metastate_spectral::SpectralError;

/// Error type for all fallible operations in the metastate-estimator crate.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EstimatorError {
    /// Returned when a stage runs before the stage it depends on.
    #[error("cannot compute {stage}: {requires} has not been computed")]
    MissingPrerequisite {
        /// The stage that was requested.
        stage: &'static str,
        /// The missing upstream stage.
        requires: &'static str,
    },

    /// Returned when an estimator does not support a terminal-state
    /// selection method.
    #[error("the {estimator} estimator does not support {selection} terminal-state selection")]
    UnsupportedSelection {
        /// Estimator name.
        estimator: &'static str,
        /// Selection method.
        selection: &'static str,
    },

    /// Returned when externally supplied terminal states cover a different
    /// number of states.
    #[error("terminal states cover {got} states, the chain has {expected}")]
    StateCountMismatch {
        /// Number of states of the chain.
        expected: usize,
        /// Number of states covered.
        got: usize,
    },

    /// Propagated from transition-matrix handling.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Propagated from spectral analysis.
    #[error(transparent)]
    Spectral(#[from] SpectralError),

    /// Propagated from macrostate extraction.
    #[error(transparent)]
    Gpcca(#[from] GpccaError),

    /// Propagated from the absorption solver.
    #[error(transparent)]
    Absorption(#[from] AbsorptionError),
}

impl EstimatorError {
    /// Returns `true` when the caller supplied invalid input or called
    /// stages out of order.
    pub fn is_contract_violation(&self) -> bool {
        match self {
            Self::MissingPrerequisite { .. }
            | Self::UnsupportedSelection { .. }
            | Self::StateCountMismatch { .. } => true,
            Self::Chain(e) => e.is_contract_violation(),
            Self::Spectral(e) => e.is_contract_violation(),
            Self::Gpcca(e) => e.is_contract_violation(),
            Self::Absorption(e) => e.is_contract_violation(),
        }
    }

    /// Returns `true` for numerical non-convergence.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Spectral(e) => e.is_retryable(),
            Self::Gpcca(e) => e.is_retryable(),
            Self::Absorption(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Returns `true` for structural singularity of the absorption system.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Absorption(e) if e.is_fatal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_missing_prerequisite() {
        let e = EstimatorError::MissingPrerequisite {
            stage: "macrostates",
            requires: "the Schur decomposition",
        };
        assert_eq!(
            e.to_string(),
            "cannot compute macrostates: the Schur decomposition has not been computed"
        );
        assert!(e.is_contract_violation());
        assert!(!e.is_retryable());
        assert!(!e.is_fatal());
    }

    #[test]
    fn error_unsupported_selection() {
        let e = EstimatorError::UnsupportedSelection {
            estimator: "exact",
            selection: "eigengap",
        };
        assert_eq!(
            e.to_string(),
            "the exact estimator does not support eigengap terminal-state selection"
        );
    }

    #[test]
    fn error_fatal_absorption() {
        let e: EstimatorError = AbsorptionError::Singular {
            reason: "test".to_string(),
        }
        .into();
        assert!(e.is_fatal());
        assert!(!e.is_contract_violation());
    }

    #[test]
    fn error_is_std_error() {
        fn assert_error<E: std::error::Error + Send + Sync + 'static>() {}
        assert_error::<EstimatorError>();
    }
}
