//! Estimator whose terminal states are the recurrent classes of the chain.

use metastate_absorption::AbsorptionProbabilities;
use metastate_chain::{
    ChainError, CommunicationClasses, StateLabels, TransitionMatrix, compute_partition,
    deduplicate_names,
};
use metastate_gpcca::{AssignmentRule, GpccaError, TerminalSelection, TerminalStates};
use tracing::{info, warn};

use crate::error::EstimatorError;
use crate::traits::{AbsorptionEstimator, ChainHolder, TerminalStateEstimator};

/// Estimator for reducible chains: every recurrent class is a terminal
/// state and absorption probabilities are exact.
///
/// Classes are named after the majority label of their states when labels
/// are attached, and by index otherwise.
#[derive(Debug, Clone)]
pub struct ExactEstimator {
    matrix: TransitionMatrix,
    labels: Option<StateLabels>,
    partition: Option<CommunicationClasses>,
    terminal: Option<TerminalStates>,
    absorption: Option<AbsorptionProbabilities>,
}

impl ExactEstimator {
    /// Wraps a validated transition matrix.
    pub fn new(matrix: TransitionMatrix) -> Self {
        Self {
            matrix,
            labels: None,
            partition: None,
            terminal: None,
            absorption: None,
        }
    }

    /// Attaches one label per state, used to name recurrent classes.
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
}

/// Names of the recurrent classes, in partition order.
fn class_names(labels: Option<&StateLabels>, classes: &CommunicationClasses) -> Vec<String> {
    let names = classes
        .recurrent_classes()
        .iter()
        .enumerate()
        .map(|(i, class)| {
            labels
                .and_then(|l| l.majority(class))
                .map_or_else(|| i.to_string(), str::to_string)
        })
        .collect();
    deduplicate_names(names)
}

/// Terminal states from all recurrent classes, or from the named ones.
fn recurrent_terminal_states(
    n_states: usize,
    labels: Option<&StateLabels>,
    classes: &CommunicationClasses,
    wanted: Option<&[String]>,
) -> Result<TerminalStates, EstimatorError> {
    let all_names = class_names(labels, classes);
    let all_groups = classes.recurrent_classes();
    let Some(entries) = wanted else {
        return Ok(TerminalStates::from_groups(n_states, all_names, all_groups.to_vec())?);
    };
    let mut names = Vec::with_capacity(entries.len());
    let mut groups = Vec::with_capacity(entries.len());
    for entry in entries {
        let mut group = Vec::new();
        let mut parts = Vec::new();
        for part in entry.split(',').map(str::trim) {
            let c = all_names
                .iter()
                .position(|n| n == part)
                .ok_or_else(|| GpccaError::UnknownMacrostate {
                    name: part.to_string(),
                })?;
            group.extend_from_slice(&all_groups[c]);
            parts.push(all_names[c].as_str());
        }
        names.push(parts.join(", "));
        groups.push(group);
    }
    Ok(TerminalStates::from_groups(n_states, names, groups)?)
}

impl ChainHolder for ExactEstimator {
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

impl TerminalStateEstimator for ExactEstimator {
    /// [`TerminalSelection::Eigengap`] takes every recurrent class;
    /// [`TerminalSelection::Macrostates`] takes the named classes, merging
    /// comma-separated names. The assignment rule is unused.
    fn compute_terminal_states(
        &mut self,
        selection: &TerminalSelection,
        _rule: AssignmentRule,
    ) -> Result<&TerminalStates, EstimatorError> {
        let terminal = match selection {
            TerminalSelection::Categories(categories) => {
                let n = self.matrix.n_states();
                if categories.len() != n {
                    return Err(ChainError::LabelLengthMismatch {
                        n_states: n,
                        n_labels: categories.len(),
                    }
                    .into());
                }
                TerminalStates::from_categories(categories)
            }
            TerminalSelection::TopN(_) => {
                return Err(EstimatorError::UnsupportedSelection {
                    estimator: "exact",
                    selection: "top-n",
                });
            }
            TerminalSelection::Eigengap | TerminalSelection::Macrostates(_) => {
                let wanted = match selection {
                    TerminalSelection::Macrostates(entries) => Some(entries.as_slice()),
                    _ => None,
                };
                let matrix = &self.matrix;
                let classes = self
                    .partition
                    .get_or_insert_with(|| compute_partition(matrix));
                recurrent_terminal_states(
                    matrix.n_states(),
                    self.labels.as_ref(),
                    classes,
                    wanted,
                )?
            }
        };
        if terminal.n_terminal() == 0 {
            warn!("no terminal states found");
        }
        info!(names = ?terminal.names(), "computed terminal states");
        self.absorption = None;
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
        self.absorption = None;
        self.terminal = Some(terminal);
        Ok(())
    }
}

impl AbsorptionEstimator for ExactEstimator {
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
