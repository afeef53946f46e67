//! Naming macrostates after the labels of their most representative states.

use metastate_chain::{StateLabels, deduplicate_names};
use ndarray::{Array2, ArrayView1, Axis};

/// Indices of the `n` largest entries of `column`, largest first; ties go to
/// the lower index.
pub(crate) fn top_states(column: ArrayView1<'_, f64>, n: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..column.len()).collect();
    order.sort_by(|&a, &b| column[b].total_cmp(&column[a]).then(a.cmp(&b)));
    order.truncate(n);
    order
}

/// Default names `"0"`, `"1"`, ...
pub(crate) fn index_names(m: usize) -> Vec<String> {
    (0..m).map(|i| i.to_string()).collect()
}

/// Names each column after the majority label among its `n_cells`
/// highest-membership states. Columns without a majority keep their index.
pub(crate) fn names_from_labels(
    memberships: &Array2<f64>,
    labels: &StateLabels,
    n_cells: usize,
) -> Vec<String> {
    let names = memberships
        .axis_iter(Axis(1))
        .enumerate()
        .map(|(j, column)| {
            let top = top_states(column, n_cells);
            labels
                .majority(&top)
                .map_or_else(|| j.to_string(), str::to_string)
        })
        .collect();
    deduplicate_names(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn top_states_breaks_ties_by_index() {
        let col = array![0.2, 0.9, 0.2, 0.5];
        assert_eq!(top_states(col.view(), 3), vec![1, 3, 0]);
        assert_eq!(top_states(col.view(), 10).len(), 4);
    }

    #[test]
    fn names_follow_majority_labels() {
        let chi = array![[0.9, 0.1], [0.8, 0.2], [0.3, 0.7], [0.1, 0.9]];
        let labels = StateLabels::new(
            ["Alpha", "Alpha", "Beta", "Beta"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        assert_eq!(names_from_labels(&chi, &labels, 2), vec!["Alpha", "Beta"]);
    }

    #[test]
    fn repeated_names_are_suffixed() {
        let chi = array![[0.9, 0.6], [0.8, 0.7], [0.3, 0.2], [0.1, 0.1]];
        let labels = StateLabels::new(
            ["Alpha", "Alpha", "Beta", "Beta"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        assert_eq!(
            names_from_labels(&chi, &labels, 2),
            vec!["Alpha_1", "Alpha_2"]
        );
    }

    #[test]
    fn index_names_are_decimal() {
        assert_eq!(index_names(3), vec!["0", "1", "2"]);
    }
}
