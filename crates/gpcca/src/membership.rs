//! Fuzzy macrostate memberships from a Schur decomposition.

use metastate_chain::StateLabels;
use metastate_linalg::{to_array2, to_dmatrix};
use metastate_spectral::SchurDecomposition;
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};
use tracing::{debug, info};

use crate::config::MembershipConfig;
use crate::error::GpccaError;
use crate::naming::{index_names, names_from_labels};
use crate::rotation::{
    crispness_trace, index_search, initial_rotation, optimize_rotation, orthonormalize_with,
};

/// Membership of every state in every macrostate.
///
/// Rows of [`memberships`](Self::memberships) are non-negative and sum to one.
#[derive(Debug, Clone)]
pub struct MacrostateMembership {
    memberships: Array2<f64>,
    rotation: Array2<f64>,
    crispness: f64,
    representatives: Vec<usize>,
    initial_distribution: Array1<f64>,
    names: Vec<String>,
    n_cells: usize,
}

impl MacrostateMembership {
    /// Membership matrix `chi` (`N x m`).
    pub fn memberships(&self) -> &Array2<f64> {
        &self.memberships
    }

    /// Number of macrostates `m`.
    pub fn n_macrostates(&self) -> usize {
        self.memberships.ncols()
    }

    /// Number of states `N`.
    pub fn n_states(&self) -> usize {
        self.memberships.nrows()
    }

    /// Crispness in `(0, 1]`; one means a hard partition.
    pub fn crispness(&self) -> f64 {
        self.crispness
    }

    /// Rotation matrix `A` with `chi = X A`.
    pub fn rotation(&self) -> &Array2<f64> {
        &self.rotation
    }

    /// States picked by the index search, one per macrostate.
    pub fn representatives(&self) -> &[usize] {
        &self.representatives
    }

    /// Distribution `eta` inherited from the Schur decomposition.
    pub fn initial_distribution(&self) -> &Array1<f64> {
        &self.initial_distribution
    }

    /// Macrostate names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// States per macrostate used for naming.
    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    /// Position of the macrostate called `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Renames the macrostates after the majority label among their
    /// `n_cells` highest-membership states.
    ///
    /// # Errors
    ///
    /// Returns [`GpccaError::Chain`] if there is not one label per state.
    pub fn with_labels(mut self, labels: &StateLabels) -> Result<Self, GpccaError> {
        labels.check_len(self.n_states())?;
        self.names = names_from_labels(&self.memberships, labels, self.n_cells);
        debug!(names = ?self.names, "named macrostates from labels");
        Ok(self)
    }
}

/// Computes `m` fuzzy macrostates from the leading Schur vectors (GPCCA).
///
/// # Algorithm
///
/// 1. Take the first `m` Schur vectors; `m` must not split a 2x2 block.
/// 2. Re-orthonormalise them with `sqrt(eta)` first and rescale by
///    `D^{-1/2}`, giving `X` with a constant first column.
/// 3. Pick `m` representative states by index search and set
///    `A = X[index]^{-1}`, made feasible.
/// 4. Maximise crispness over `A` with Nelder-Mead.
/// 5. `chi = X A`, with round-off negatives clipped and rows renormalised.
///
/// # Errors
///
/// Returns [`GpccaError::InvalidParameter`] for fewer than two macrostates
/// or more than the decomposition retains;
/// [`GpccaError::SplitsConjugatePair`] if `m` ends inside a 2x2 block;
/// [`GpccaError::DegenerateSubspace`] if `sqrt(eta)` is not spanned by the
/// Schur vectors (eigenvalue one was not captured).
#[tracing::instrument(
    skip_all,
    fields(n_states = schur.basis().nrows(), n_macrostates = config.n_macrostates())
)]
pub fn compute_memberships(
    schur: &SchurDecomposition,
    config: &MembershipConfig,
) -> Result<MacrostateMembership, GpccaError> {
    config.validate()?;
    let m = config.n_macrostates();
    let available = schur.n_components();
    if m > available {
        return Err(GpccaError::InvalidParameter {
            name: "n_macrostates",
            reason: format!(
                "{m} requested but only {available} Schur vectors were computed; recompute the Schur decomposition"
            ),
        });
    }
    if schur.splits_conjugate_pair(m) {
        return Err(GpccaError::SplitsConjugatePair { m });
    }

    let eta = schur.initial_distribution();
    let sqrt_eta = DVector::from_iterator(eta.len(), eta.iter().map(|v| v.sqrt()));
    let q = to_dmatrix(schur.basis()).columns(0, m).clone_owned();
    let q = orthonormalize_with(&q, &sqrt_eta)?;
    let mut x = q;
    for (i, mut row) in x.row_iter_mut().enumerate() {
        row /= sqrt_eta[i];
    }

    let representatives = index_search(&x);
    let a0 = initial_rotation(&x, &representatives)?;
    let a = if config.optimize() {
        optimize_rotation(&x, &a0, config.max_iterations())
    } else {
        a0
    };
    let crispness = crispness_trace(&a) / m as f64;

    let chi = normalize_rows(&x * &a);
    info!(crispness, representatives = ?representatives, "computed macrostate memberships");

    Ok(MacrostateMembership {
        memberships: to_array2(&chi),
        rotation: to_array2(&a),
        crispness,
        representatives,
        initial_distribution: eta.clone(),
        names: index_names(m),
        n_cells: config.n_cells(),
    })
}

// Clips round-off negatives and rescales every row to sum one. A row with no
// positive mass becomes uniform.
fn normalize_rows(mut chi: DMatrix<f64>) -> DMatrix<f64> {
    let m = chi.ncols();
    for mut row in chi.row_iter_mut() {
        row.apply(|v| *v = v.max(0.0));
        let total = row.sum();
        if total > 0.0 {
            row /= total;
        } else {
            row.fill(1.0 / m as f64);
        }
    }
    chi
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use metastate_chain::TransitionMatrix;
    use metastate_spectral::{SchurConfig, SchurMethod, schur_decompose};
    use ndarray::array;

    fn blocks() -> TransitionMatrix {
        TransitionMatrix::from_dense(array![
            [0.6, 0.39, 0.01, 0.0],
            [0.39, 0.6, 0.0, 0.01],
            [0.01, 0.0, 0.6, 0.39],
            [0.0, 0.01, 0.39, 0.6]
        ])
        .unwrap()
    }

    fn schur(m: usize) -> SchurDecomposition {
        schur_decompose(
            &blocks(),
            &SchurConfig::new()
                .with_n_components(m)
                .with_method(SchurMethod::Direct),
        )
        .unwrap()
    }

    #[test]
    fn two_blocks_are_separated() {
        let chi = compute_memberships(&schur(2), &MembershipConfig::new(2)).unwrap();
        let mem = chi.memberships();
        assert_eq!(mem.dim(), (4, 2));
        for row in mem.rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-12);
            assert!(row.iter().all(|&v| v >= 0.0));
        }
        // States 0 and 1 share a macrostate, 2 and 3 the other.
        let a = if mem[[0, 0]] > 0.5 { 0 } else { 1 };
        assert!(mem[[0, a]] > 0.9);
        assert!(mem[[1, a]] > 0.9);
        assert!(mem[[2, 1 - a]] > 0.9);
        assert!(mem[[3, 1 - a]] > 0.9);
        assert!(chi.crispness() > 0.8 && chi.crispness() <= 1.0 + 1e-12);
        assert_eq!(chi.names(), ["0", "1"]);
    }

    #[test]
    fn too_many_macrostates_rejected() {
        let err = compute_memberships(&schur(2), &MembershipConfig::new(3)).unwrap_err();
        assert!(matches!(
            err,
            GpccaError::InvalidParameter {
                name: "n_macrostates",
                ..
            }
        ));
    }

    #[test]
    fn labels_name_macrostates() {
        let labels = StateLabels::new(
            ["Alpha", "Alpha", "Beta", "Beta"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        let chi = compute_memberships(&schur(2), &MembershipConfig::new(2).with_n_cells(2))
            .unwrap()
            .with_labels(&labels)
            .unwrap();
        let mut names = chi.names().to_vec();
        names.sort();
        assert_eq!(names, vec!["Alpha", "Beta"]);
        let alpha = chi.position("Alpha").unwrap();
        assert!(chi.memberships()[[0, alpha]] > 0.9);
    }

    #[test]
    fn wrong_label_count_rejected() {
        let labels = StateLabels::new(vec!["a".to_string()]);
        let err = compute_memberships(&schur(2), &MembershipConfig::new(2))
            .unwrap()
            .with_labels(&labels)
            .unwrap_err();
        assert!(matches!(err, GpccaError::Chain(_)));
    }

    #[test]
    fn normalize_rows_clips_and_rescales() {
        let chi = normalize_rows(DMatrix::from_row_slice(2, 2, &[-1e-14, 2.0, 0.0, 0.0]));
        assert_eq!(chi[(0, 0)], 0.0);
        assert_eq!(chi[(0, 1)], 1.0);
        assert_eq!(chi[(1, 0)], 0.5);
    }
}
