//! Decomposition of a chain into communication classes.

use tracing::{info, warn};

use crate::matrix::TransitionMatrix;

/// Whether a communication class is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKind {
    /// No transition leaves the class.
    Recurrent,
    /// Some transition leaves the class.
    Transient,
}

/// The communication classes of a chain.
///
/// Classes and the states within them are sorted by state index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunicationClasses {
    recurrent: Vec<Vec<usize>>,
    transient: Vec<Vec<usize>>,
    lookup: Vec<(ClassKind, usize)>,
}

impl CommunicationClasses {
    /// Closed classes.
    pub fn recurrent_classes(&self) -> &[Vec<usize>] {
        &self.recurrent
    }

    /// Strongly connected components that can be left.
    pub fn transient_classes(&self) -> &[Vec<usize>] {
        &self.transient
    }

    /// All transient states in increasing order.
    pub fn transient_states(&self) -> Vec<usize> {
        let mut states: Vec<usize> = self.transient.iter().flatten().copied().collect();
        states.sort_unstable();
        states
    }

    /// All recurrent states in increasing order.
    pub fn recurrent_states(&self) -> Vec<usize> {
        let mut states: Vec<usize> = self.recurrent.iter().flatten().copied().collect();
        states.sort_unstable();
        states
    }

    /// Returns `true` for exactly one recurrent class and no transient
    /// states.
    pub fn is_irreducible(&self) -> bool {
        self.recurrent.len() == 1 && self.transient.is_empty()
    }

    /// Kind and index of the class containing `state`.
    pub fn class_of(&self, state: usize) -> Option<(ClassKind, usize)> {
        self.lookup.get(state).copied()
    }

    /// Returns `true` if `state` belongs to a recurrent class.
    pub fn is_recurrent(&self, state: usize) -> bool {
        matches!(self.class_of(state), Some((ClassKind::Recurrent, _)))
    }

    /// Number of states covered.
    pub fn n_states(&self) -> usize {
        self.lookup.len()
    }
}

/// Splits the states of `matrix` into recurrent and transient classes.
///
/// There is an edge `i -> j` whenever `P[i, j] > 0`. Strongly connected
/// components are found with an iterative Tarjan search; a component with no
/// edge to another component is recurrent.
#[tracing::instrument(skip_all, fields(n_states = matrix.n_states()))]
pub fn compute_partition(matrix: &TransitionMatrix) -> CommunicationClasses {
    let n = matrix.n_states();
    let adjacency: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            matrix
                .row(i)
                .into_iter()
                .filter(|&(_, v)| v > 0.0)
                .map(|(j, _)| j)
                .collect()
        })
        .collect();

    let components = strongly_connected_components(&adjacency);
    let mut component_of = vec![0usize; n];
    for (c, members) in components.iter().enumerate() {
        for &s in members {
            component_of[s] = c;
        }
    }

    let mut recurrent = Vec::new();
    let mut transient = Vec::new();
    for (c, mut members) in components.into_iter().enumerate() {
        members.sort_unstable();
        let closed = members
            .iter()
            .all(|&s| adjacency[s].iter().all(|&t| component_of[t] == c));
        if closed {
            recurrent.push(members);
        } else {
            transient.push(members);
        }
    }
    recurrent.sort_by_key(|c| c[0]);
    transient.sort_by_key(|c| c[0]);

    let mut lookup = vec![(ClassKind::Transient, 0); n];
    for (idx, class) in recurrent.iter().enumerate() {
        for &s in class {
            lookup[s] = (ClassKind::Recurrent, idx);
        }
    }
    for (idx, class) in transient.iter().enumerate() {
        for &s in class {
            lookup[s] = (ClassKind::Transient, idx);
        }
    }

    let classes = CommunicationClasses {
        recurrent,
        transient,
        lookup,
    };
    if classes.is_irreducible() {
        warn!("chain is irreducible, all states form a single recurrent class");
    } else {
        info!(
            n_recurrent = classes.recurrent.len(),
            n_transient = classes.transient.len(),
            "partitioned chain into communication classes"
        );
    }
    classes
}

// Iterative Tarjan search. Components are returned in reverse topological
// order of the condensation.
fn strongly_connected_components(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    const UNVISITED: usize = usize::MAX;
    let n = adjacency.len();
    let mut index = vec![UNVISITED; n];
    let mut lowlink = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut components = Vec::new();
    let mut counter = 0;

    for root in 0..n {
        if index[root] != UNVISITED {
            continue;
        }
        // (node, position of the next successor to visit)
        let mut calls: Vec<(usize, usize)> = vec![(root, 0)];
        index[root] = counter;
        lowlink[root] = counter;
        counter += 1;
        stack.push(root);
        on_stack[root] = true;

        while let Some(frame) = calls.last_mut() {
            let v = frame.0;
            if frame.1 < adjacency[v].len() {
                let w = adjacency[v][frame.1];
                frame.1 += 1;
                if index[w] == UNVISITED {
                    index[w] = counter;
                    lowlink[w] = counter;
                    counter += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    calls.push((w, 0));
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w]);
                }
                continue;
            }

            calls.pop();
            if let Some(&(parent, _)) = calls.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[v]);
            }
            if lowlink[v] == index[v] {
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                components.push(component);
            }
        }
    }
    components
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn single_state_is_recurrent() {
        let p = TransitionMatrix::from_dense(array![[1.0]]).unwrap();
        let c = compute_partition(&p);
        assert_eq!(c.recurrent_classes(), &[vec![0]]);
        assert!(c.transient_classes().is_empty());
        assert!(c.is_irreducible());
    }

    #[test]
    fn irreducible_cycle() {
        let p = TransitionMatrix::from_dense(array![
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 0.0]
        ])
        .unwrap();
        let c = compute_partition(&p);
        assert!(c.is_irreducible());
        assert_eq!(c.recurrent_classes(), &[vec![0, 1, 2]]);
    }

    #[test]
    fn transient_chain_of_classes() {
        // {0, 1} -> {2} -> {3} absorbing
        let p = TransitionMatrix::from_dense(array![
            [0.5, 0.5, 0.0, 0.0],
            [0.4, 0.4, 0.2, 0.0],
            [0.0, 0.0, 0.5, 0.5],
            [0.0, 0.0, 0.0, 1.0]
        ])
        .unwrap();
        let c = compute_partition(&p);
        assert_eq!(c.recurrent_classes(), &[vec![3]]);
        assert_eq!(c.transient_classes(), &[vec![0, 1], vec![2]]);
        assert_eq!(c.transient_states(), vec![0, 1, 2]);
        assert_eq!(c.class_of(2), Some((ClassKind::Transient, 1)));
        assert_eq!(c.class_of(3), Some((ClassKind::Recurrent, 0)));
        assert_eq!(c.class_of(4), None);
        assert!(!c.is_irreducible());
    }

    #[test]
    fn zero_weight_entries_are_not_edges() {
        let p = TransitionMatrix::from_dense(array![[1.0, 0.0], [0.0, 1.0]]).unwrap();
        let c = compute_partition(&p);
        assert_eq!(c.recurrent_classes(), &[vec![0], vec![1]]);
    }

    #[test]
    fn deep_path_does_not_recurse() {
        let n = 20_000;
        let mut triplets = Vec::with_capacity(n);
        for i in 0..n - 1 {
            triplets.push((i, i + 1, 1.0));
        }
        triplets.push((n - 1, n - 1, 1.0));
        let m = metastate_linalg::CsrMatrix::from_triplets(n, n, triplets).unwrap();
        let p = TransitionMatrix::from_sparse(m).unwrap();
        let c = compute_partition(&p);
        assert_eq!(c.recurrent_classes(), &[vec![n - 1]]);
        assert_eq!(c.transient_classes().len(), n - 1);
    }
}
