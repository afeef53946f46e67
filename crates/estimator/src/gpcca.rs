//! Macrostate-based estimator: spectrum, Schur vectors, GPCCA memberships
//! and terminal states chosen among the macrostates.

use metastate_absorption::AbsorptionProbabilities;
use metastate_chain::{
    ChainError, CommunicationClasses, StateLabels, TransitionMatrix, compute_partition,
};
use metastate_gpcca::{
    AssignmentRule, CoarseTransitionMatrix, MacrostateMembership, MembershipConfig,
    TerminalSelection, TerminalStates, coarse_grain, compute_memberships, select_terminal,
};
use metastate_spectral::{
    EigenConfig, EigenDecomposition, SchurConfig, SchurDecomposition, eigendecompose,
    schur_decompose,
};
use ndarray::Array1;
use tracing::{debug, info};

use crate::error::EstimatorError;
use crate::traits::{AbsorptionEstimator, ChainHolder, TerminalStateEstimator};

/// Estimator that finds metastable macrostates with GPCCA and picks the
/// terminal states among them.
///
/// Stages build on each other:
///
/// ```text
/// eigendecomposition ─┐ (eigengap)
/// schur ─> macrostates ─┴> terminal states ─> absorption probabilities
/// ```
///
/// Recomputing a stage drops every result downstream of it. The
/// eigendecomposition only feeds the eigengap and the coarse stationary
/// distribution, so recomputing it keeps the other results.
#[derive(Debug, Clone)]
pub struct GpccaEstimator {
    matrix: TransitionMatrix,
    labels: Option<StateLabels>,
    partition: Option<CommunicationClasses>,
    eigen: Option<EigenDecomposition>,
    schur: Option<SchurDecomposition>,
    macrostates: Option<MacrostateMembership>,
    coarse: Option<CoarseTransitionMatrix>,
    terminal: Option<TerminalStates>,
    absorption: Option<AbsorptionProbabilities>,
}

impl GpccaEstimator {
    /// Wraps a validated transition matrix.
    pub fn new(matrix: TransitionMatrix) -> Self {
        Self {
            matrix,
            labels: None,
            partition: None,
            eigen: None,
            schur: None,
            macrostates: None,
            coarse: None,
            terminal: None,
            absorption: None,
        }
    }

    /// Attaches one label per state, used to name macrostates.
    ///
    /// # Errors
    ///
    /// Returns [`EstimatorError::Chain`] if the label count differs from the
    /// number of states.
    pub fn with_labels(mut self, labels: StateLabels) -> Result<Self, EstimatorError> {
        labels.check_len(self.matrix.n_states())?;
        self.labels = Some(labels);
        Ok(self)
    }

    // --- Stages ---

    /// Computes the leading eigenvalues and eigenvectors.
    ///
    /// Existing macrostates are kept; their coarse-grained matrix is rebuilt
    /// so its stationary distribution comes from the new decomposition.
    pub fn compute_eigendecomposition(
        &mut self,
        config: &EigenConfig,
    ) -> Result<&EigenDecomposition, EstimatorError> {
        let eigen = eigendecompose(&self.matrix, config)?;
        if let Some(membership) = &self.macrostates {
            let stationary = strictly_positive(eigen.stationary_distribution());
            self.coarse = Some(coarse_grain(&self.matrix, membership, stationary)?);
            debug!(
                with_stationary = stationary.is_some(),
                "rebuilt coarse transition matrix"
            );
        }
        Ok(self.eigen.insert(eigen))
    }

    /// Computes the real Schur decomposition and drops the macrostates and
    /// everything derived from them.
    pub fn compute_schur(
        &mut self,
        config: &SchurConfig,
    ) -> Result<&SchurDecomposition, EstimatorError> {
        let schur = schur_decompose(&self.matrix, config)?;
        self.clear_macrostates();
        Ok(self.schur.insert(schur))
    }

    /// Computes fuzzy macrostates and their coarse-grained transition
    /// matrix, dropping the terminal states and absorption probabilities.
    ///
    /// Macrostates are named after the majority label of their core states
    /// when labels are attached, and by index otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`EstimatorError::MissingPrerequisite`] before
    /// [`compute_schur`](Self::compute_schur), and propagates GPCCA errors.
    pub fn compute_macrostates(
        &mut self,
        config: &MembershipConfig,
    ) -> Result<&MacrostateMembership, EstimatorError> {
        let schur = self
            .schur
            .as_ref()
            .ok_or(EstimatorError::MissingPrerequisite {
                stage: "macrostates",
                requires: "the Schur decomposition",
            })?;
        let mut membership = compute_memberships(schur, config)?;
        if let Some(labels) = &self.labels {
            membership = membership.with_labels(labels)?;
        }
        let stationary = strictly_positive(
            self.eigen
                .as_ref()
                .and_then(EigenDecomposition::stationary_distribution),
        );
        if stationary.is_none() {
            debug!("no strictly positive stationary distribution, coarse stationary distribution skipped");
        }
        let coarse = coarse_grain(&self.matrix, &membership, stationary)?;
        info!(
            names = ?membership.names(),
            crispness = membership.crispness(),
            "computed macrostates"
        );
        self.clear_macrostates();
        self.coarse = Some(coarse);
        Ok(self.macrostates.insert(membership))
    }

    // --- Accessors ---

    /// The eigendecomposition, if computed.
    pub fn eigendecomposition(&self) -> Option<&EigenDecomposition> {
        self.eigen.as_ref()
    }

    /// The Schur decomposition, if computed.
    pub fn schur(&self) -> Option<&SchurDecomposition> {
        self.schur.as_ref()
    }

    /// The macrostate memberships, if computed.
    pub fn macrostates(&self) -> Option<&MacrostateMembership> {
        self.macrostates.as_ref()
    }

    /// The coarse-grained transition matrix, if macrostates were computed.
    pub fn coarse_transition_matrix(&self) -> Option<&CoarseTransitionMatrix> {
        self.coarse.as_ref()
    }

    /// Eigengap of the eigendecomposition, falling back to the Schur
    /// decomposition's.
    fn eigengap(&self) -> Option<usize> {
        self.eigen
            .as_ref()
            .map(EigenDecomposition::eigengap)
            .or_else(|| self.schur.as_ref().map(SchurDecomposition::eigengap))
    }

    fn clear_macrostates(&mut self) {
        self.macrostates = None;
        self.coarse = None;
        self.clear_terminal();
    }

    fn clear_terminal(&mut self) {
        self.terminal = None;
        self.absorption = None;
    }
}

impl ChainHolder for GpccaEstimator {
    fn transition_matrix(&self) -> &TransitionMatrix {
        &self.matrix
    }

    fn labels(&self) -> Option<&StateLabels> {
        self.labels.as_ref()
    }

    fn partition(&self) -> Option<&CommunicationClasses> {
        self.partition.as_ref()
    }

    fn compute_partition(&mut self) -> &CommunicationClasses {
        let classes = compute_partition(&self.matrix);
        self.partition.insert(classes)
    }
}

impl TerminalStateEstimator for GpccaEstimator {
    /// Chooses terminal states among the macrostates. Category selection
    /// needs no macrostates.
    fn compute_terminal_states(
        &mut self,
        selection: &TerminalSelection,
        rule: AssignmentRule,
    ) -> Result<&TerminalStates, EstimatorError> {
        let terminal = if let TerminalSelection::Categories(categories) = selection {
            let n = self.matrix.n_states();
            if categories.len() != n {
                return Err(ChainError::LabelLengthMismatch {
                    n_states: n,
                    n_labels: categories.len(),
                }
                .into());
            }
            TerminalStates::from_categories(categories)
        } else {
            let missing = EstimatorError::MissingPrerequisite {
                stage: "terminal states",
                requires: "macrostates",
            };
            let (Some(membership), Some(coarse)) = (&self.macrostates, &self.coarse) else {
                return Err(missing);
            };
            let eigengap = self.eigengap().ok_or(missing)?;
            select_terminal(coarse, membership, eigengap, selection, rule)?
        };
        info!(names = ?terminal.names(), "computed terminal states");
        self.clear_terminal();
        Ok(self.terminal.insert(terminal))
    }

    fn terminal_states(&self) -> Option<&TerminalStates> {
        self.terminal.as_ref()
    }

    fn set_terminal_states(&mut self, terminal: TerminalStates) -> Result<(), EstimatorError> {
        let n = self.matrix.n_states();
        if terminal.n_states() != n {
            return Err(EstimatorError::StateCountMismatch {
                expected: n,
                got: terminal.n_states(),
            });
        }
        self.clear_terminal();
        self.terminal = Some(terminal);
        Ok(())
    }
}

impl AbsorptionEstimator for GpccaEstimator {
    fn absorption_probabilities(&self) -> Option<&AbsorptionProbabilities> {
        self.absorption.as_ref()
    }

    fn store_absorption_probabilities(
        &mut self,
        absorption: AbsorptionProbabilities,
    ) -> &AbsorptionProbabilities {
        self.absorption.insert(absorption)
    }
}

fn strictly_positive(pi: Option<&Array1<f64>>) -> Option<&Array1<f64>> {
    pi.filter(|pi| pi.iter().all(|&p| p > 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use metastate_absorption::AbsorptionConfig;
    use metastate_spectral::SchurMethod;
    use ndarray::array;

    fn blocks() -> TransitionMatrix {
        TransitionMatrix::from_dense(array![
            [0.89, 0.1, 0.01, 0.0],
            [0.1, 0.89, 0.0, 0.01],
            [0.01, 0.0, 0.89, 0.1],
            [0.0, 0.01, 0.1, 0.89]
        ])
        .unwrap()
    }

    fn schur_config() -> SchurConfig {
        SchurConfig::new()
            .with_n_components(2)
            .with_method(SchurMethod::Direct)
    }

    #[test]
    fn macrostates_require_schur() {
        let mut est = GpccaEstimator::new(blocks());
        let err = est.compute_macrostates(&MembershipConfig::new(2)).unwrap_err();
        assert!(matches!(err, EstimatorError::MissingPrerequisite { .. }));
        assert!(err.is_contract_violation());
    }

    #[test]
    fn terminal_states_require_macrostates() {
        let mut est = GpccaEstimator::new(blocks());
        let err = est
            .compute_terminal_states(&TerminalSelection::TopN(1), AssignmentRule::default())
            .unwrap_err();
        assert!(matches!(err, EstimatorError::MissingPrerequisite { .. }));
    }

    #[test]
    fn categories_need_no_macrostates() {
        let mut est = GpccaEstimator::new(blocks());
        let categories = vec![None, Some("A".to_string()), None, Some("B".to_string())];
        let t = est
            .compute_terminal_states(
                &TerminalSelection::Categories(categories),
                AssignmentRule::default(),
            )
            .unwrap();
        assert_eq!(t.names(), ["A", "B"]);
    }

    #[test]
    fn recomputing_schur_drops_downstream() {
        let mut est = GpccaEstimator::new(blocks());
        est.compute_schur(&schur_config()).unwrap();
        est.compute_macrostates(&MembershipConfig::new(2).with_n_cells(1))
            .unwrap();
        est.compute_terminal_states(
            &TerminalSelection::TopN(2),
            AssignmentRule::TopN { n_cells: 1 },
        )
        .unwrap();
        est.compute_absorption_probabilities(&AbsorptionConfig::new())
            .unwrap();
        assert!(est.absorption_probabilities().is_some());

        est.compute_schur(&schur_config()).unwrap();
        assert!(est.macrostates().is_none());
        assert!(est.coarse_transition_matrix().is_none());
        assert!(est.terminal_states().is_none());
        assert!(est.absorption_probabilities().is_none());
        assert!(est.schur().is_some());
    }

    #[test]
    fn late_eigendecomposition_fills_coarse_stationary() {
        let mut est = GpccaEstimator::new(blocks());
        est.compute_schur(&schur_config()).unwrap();
        est.compute_macrostates(&MembershipConfig::new(2).with_n_cells(1))
            .unwrap();
        let coarse = est.coarse_transition_matrix().unwrap();
        assert!(coarse.stationary_distribution().is_none());

        est.compute_eigendecomposition(&EigenConfig::new().with_k(2))
            .unwrap();
        assert!(est.macrostates().is_some());
        let coarse = est.coarse_transition_matrix().unwrap();
        let pi = coarse.stationary_distribution().unwrap();
        assert_eq!(pi.len(), 2);
        for &p in pi.iter() {
            assert!((p - 0.5).abs() < 1e-8, "{pi}");
        }
    }

    #[test]
    fn set_terminal_states_checks_size() {
        let mut est = GpccaEstimator::new(blocks());
        let t = TerminalStates::from_categories(&[Some("A".to_string()), None]);
        let err = est.set_terminal_states(t).unwrap_err();
        assert!(matches!(
            err,
            EstimatorError::StateCountMismatch {
                expected: 4,
                got: 2
            }
        ));
    }

    #[test]
    fn labels_must_cover_every_state() {
        let labels = StateLabels::new(vec!["a".to_string(); 3]);
        assert!(GpccaEstimator::new(blocks()).with_labels(labels).is_err());
    }
}
