//! Coarse-grained transition matrix between macrostates.

use metastate_chain::{TransitionMatrix, validate_distribution};
use ndarray::{Array1, Array2, Axis};
use tracing::{debug, warn};

use crate::error::GpccaError;
use crate::membership::MacrostateMembership;

/// Row-stochastic `m x m` transition matrix between macrostates.
#[derive(Debug, Clone)]
pub struct CoarseTransitionMatrix {
    matrix: Array2<f64>,
    names: Vec<String>,
    stationary_distribution: Option<Array1<f64>>,
    initial_distribution: Array1<f64>,
}

impl CoarseTransitionMatrix {
    /// The coarse matrix.
    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    /// Macrostate names, one per row.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Coarse stationary distribution `chi^T pi`, if `pi` was supplied.
    pub fn stationary_distribution(&self) -> Option<&Array1<f64>> {
        self.stationary_distribution.as_ref()
    }

    /// Coarse initial distribution `chi^T eta`.
    pub fn initial_distribution(&self) -> &Array1<f64> {
        &self.initial_distribution
    }

    /// Self-transition probabilities.
    pub fn diagonal(&self) -> Array1<f64> {
        self.matrix.diag().to_owned()
    }

    /// Number of macrostates.
    pub fn n_macrostates(&self) -> usize {
        self.matrix.nrows()
    }
}

/// Projects `matrix` onto the macrostates: `chi^T D P chi`, `D = diag(eta)`,
/// with rows normalised to sum one.
///
/// A row without mass becomes the identity row. When `stationary` is given,
/// the coarse stationary distribution `chi^T pi` is recorded as well.
///
/// # Errors
///
/// Returns [`GpccaError::InvalidParameter`] if the memberships do not have
/// one row per state, and [`GpccaError::Chain`] if `stationary` is not a
/// probability vector over the states.
#[tracing::instrument(skip_all, fields(n_macrostates = membership.n_macrostates()))]
pub fn coarse_grain(
    matrix: &TransitionMatrix,
    membership: &MacrostateMembership,
    stationary: Option<&Array1<f64>>,
) -> Result<CoarseTransitionMatrix, GpccaError> {
    let n = matrix.n_states();
    let chi = membership.memberships();
    if chi.nrows() != n {
        return Err(GpccaError::InvalidParameter {
            name: "memberships",
            reason: format!("{} rows for {n} states", chi.nrows()),
        });
    }
    let m = chi.ncols();
    let eta = membership.initial_distribution();

    // P chi, one column at a time so sparse storage stays sparse.
    let mut p_chi = Array2::<f64>::zeros((n, m));
    let mut x = vec![0.0; n];
    let mut y = vec![0.0; n];
    for j in 0..m {
        for (xi, c) in x.iter_mut().zip(chi.column(j)) {
            *xi = *c;
        }
        matrix.apply(&x, &mut y);
        for (dst, v) in p_chi.column_mut(j).iter_mut().zip(&y) {
            *dst = *v;
        }
    }

    let weighted = chi * &eta.view().insert_axis(Axis(1));
    let mut coarse = weighted.t().dot(&p_chi);
    for (k, mut row) in coarse.rows_mut().into_iter().enumerate() {
        let total = row.sum();
        if total > 0.0 {
            row /= total;
        } else {
            warn!(macrostate = k, "macrostate carries no mass, using an identity row");
            row.fill(0.0);
            row[k] = 1.0;
        }
    }

    let initial = project(chi, eta);
    let stationary = match stationary {
        Some(pi) => {
            validate_distribution(pi, n)?;
            Some(project(chi, pi))
        }
        None => None,
    };
    debug!(diagonal = ?coarse.diag().to_vec(), "coarse-grained transition matrix");

    Ok(CoarseTransitionMatrix {
        matrix: coarse,
        names: membership.names().to_vec(),
        stationary_distribution: stationary,
        initial_distribution: initial,
    })
}

// chi^T v, normalised to sum one.
fn project(chi: &Array2<f64>, v: &Array1<f64>) -> Array1<f64> {
    let out = chi.t().dot(v);
    let total = out.sum();
    if total > 0.0 { out / total } else { out }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MembershipConfig;
    use crate::membership::compute_memberships;
    use approx::assert_abs_diff_eq;
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

    fn membership() -> MacrostateMembership {
        let schur = schur_decompose(
            &blocks(),
            &SchurConfig::new()
                .with_n_components(2)
                .with_method(SchurMethod::Direct),
        )
        .unwrap();
        compute_memberships(&schur, &MembershipConfig::new(2)).unwrap()
    }

    #[test]
    fn coarse_matrix_is_row_stochastic() {
        let c = coarse_grain(&blocks(), &membership(), None).unwrap();
        assert_eq!(c.matrix().dim(), (2, 2));
        for row in c.matrix().rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-12);
            assert!(row.iter().all(|&v| v >= 0.0));
        }
        // Each block keeps 99% of its mass.
        for d in c.diagonal().iter() {
            assert_abs_diff_eq!(*d, 0.99, epsilon = 1e-6);
        }
        assert!(c.stationary_distribution().is_none());
        assert_abs_diff_eq!(c.initial_distribution().sum(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn stationary_is_projected() {
        let pi = array![0.25, 0.25, 0.25, 0.25];
        let c = coarse_grain(&blocks(), &membership(), Some(&pi)).unwrap();
        let coarse_pi = c.stationary_distribution().unwrap();
        assert_abs_diff_eq!(coarse_pi[0], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(coarse_pi[1], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn invalid_stationary_rejected() {
        let pi = array![0.5, 0.5];
        assert!(coarse_grain(&blocks(), &membership(), Some(&pi)).is_err());
    }
}
