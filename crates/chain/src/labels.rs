//! Per-state labels used to name macrostates and terminal states.

use std::collections::HashMap;

use crate::error::ChainError;

/// One label per state, e.g. an annotated cell type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLabels(Vec<String>);

impl StateLabels {
    /// Wraps a label vector.
    pub fn new(labels: Vec<String>) -> Self {
        Self(labels)
    }

    /// Checks that there is exactly one label per state.
    pub fn check_len(&self, n_states: usize) -> Result<(), ChainError> {
        if self.0.len() != n_states {
            return Err(ChainError::LabelLengthMismatch {
                n_states,
                n_labels: self.0.len(),
            });
        }
        Ok(())
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no labels.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Label of state `i`.
    pub fn get(&self, i: usize) -> Option<&str> {
        self.0.get(i).map(String::as_str)
    }

    /// All labels in state order.
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Most frequent label among `states`; ties go to the label seen first.
    pub fn majority(&self, states: &[usize]) -> Option<&str> {
        let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
        for (order, &s) in states.iter().enumerate() {
            if let Some(label) = self.get(s) {
                let entry = counts.entry(label).or_insert((0, order));
                entry.0 += 1;
            }
        }
        counts
            .into_iter()
            .max_by(|a, b| a.1.0.cmp(&b.1.0).then(b.1.1.cmp(&a.1.1)))
            .map(|(label, _)| label)
    }
}

impl From<Vec<String>> for StateLabels {
    fn from(labels: Vec<String>) -> Self {
        Self::new(labels)
    }
}

/// Makes names unique by appending `_1`, `_2`, ... to repeated ones.
///
/// Every member of a repeated group is suffixed, in order of appearance.
pub fn deduplicate_names(names: Vec<String>) -> Vec<String> {
    let mut totals: HashMap<String, usize> = HashMap::new();
    for n in &names {
        *totals.entry(n.clone()).or_default() += 1;
    }
    let mut seen: HashMap<String, usize> = HashMap::new();
    names
        .into_iter()
        .map(|n| {
            if totals.get(&n).copied().unwrap_or(0) > 1 {
                let count = seen.entry(n.clone()).or_default();
                *count += 1;
                format!("{n}_{count}")
            } else {
                n
            }
        })
        .collect()
}
