//! Capabilities shared by the estimators.

use metastate_absorption::{AbsorptionConfig, AbsorptionProbabilities, compute_absorption};
use metastate_chain::{CommunicationClasses, StateLabels, TransitionMatrix};
use metastate_gpcca::{AssignmentRule, TerminalSelection, TerminalStates};

use crate::error::EstimatorError;

/// Holds a transition matrix and what is known about its states.
pub trait ChainHolder {
    /// The transition matrix.
    fn transition_matrix(&self) -> &TransitionMatrix;

    /// Per-state labels, if any.
    fn labels(&self) -> Option<&StateLabels>;

    /// Recurrent and transient classes, if computed.
    fn partition(&self) -> Option<&CommunicationClasses>;

    /// Computes and stores the recurrent and transient classes.
    fn compute_partition(&mut self) -> &CommunicationClasses;

    /// Number of states.
    fn n_states(&self) -> usize {
        self.transition_matrix().n_states()
    }
}

/// Finds terminal states of the chain.
pub trait TerminalStateEstimator: ChainHolder {
    /// Computes terminal states and stores them, replacing earlier ones.
    fn compute_terminal_states(
        &mut self,
        selection: &TerminalSelection,
        rule: AssignmentRule,
    ) -> Result<&TerminalStates, EstimatorError>;

    /// The current terminal states, if any.
    fn terminal_states(&self) -> Option<&TerminalStates>;

    /// Replaces the terminal states with externally defined ones. Results
    /// derived from the previous terminal states are dropped.
    fn set_terminal_states(&mut self, terminal: TerminalStates) -> Result<(), EstimatorError>;
}

/// Computes absorption probabilities towards the terminal states.
pub trait AbsorptionEstimator: TerminalStateEstimator {
    /// The current absorption probabilities, if any.
    fn absorption_probabilities(&self) -> Option<&AbsorptionProbabilities>;

    /// Stores freshly computed absorption probabilities.
    fn store_absorption_probabilities(
        &mut self,
        absorption: AbsorptionProbabilities,
    ) -> &AbsorptionProbabilities;

    /// Computes absorption probabilities towards the current terminal
    /// states, computing the partition first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`EstimatorError::MissingPrerequisite`] without terminal
    /// states, and propagates errors of the absorption solver.
    fn compute_absorption_probabilities(
        &mut self,
        config: &AbsorptionConfig,
    ) -> Result<&AbsorptionProbabilities, EstimatorError> {
        if self.partition().is_none() {
            self.compute_partition();
        }
        let terminal = self
            .terminal_states()
            .ok_or(EstimatorError::MissingPrerequisite {
                stage: "absorption probabilities",
                requires: "terminal states",
            })?;
        let classes = self
            .partition()
            .ok_or(EstimatorError::MissingPrerequisite {
                stage: "absorption probabilities",
                requires: "the partition",
            })?;
        let absorption = compute_absorption(self.transition_matrix(), classes, terminal, config)?;
        Ok(self.store_absorption_probabilities(absorption))
    }
}
