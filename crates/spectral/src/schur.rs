//! Sorted partial Schur decomposition of the eta-weighted transition matrix.

use metastate_chain::{TransitionMatrix, uniform_distribution};
use metastate_linalg::{
    Which, krylov_schur, quasi_triangular_eigenvalues, sorted_schur, splits_conjugate_pair,
    to_array2, to_dmatrix,
};
use ndarray::{Array1, Array2};
use num_complex::Complex64;
use tracing::{info, warn};

use crate::config::{SchurConfig, SchurMethod};
use crate::eigen::{EigenDecomposition, EigenParams};
use crate::eigengap::eigengap;
use crate::error::SpectralError;

/// Real Schur vectors and Schur matrix spanning the dominant invariant
/// subspace of `D^{1/2} P D^{-1/2}`, `D = diag(eta)`.
#[derive(Debug, Clone)]
pub struct SchurDecomposition {
    basis: Array2<f64>,
    matrix: Array2<f64>,
    eigenvalues: Array1<Complex64>,
    eigengap: usize,
    initial_distribution: Array1<f64>,
    which: Which,
    method: SchurMethod,
    requested: usize,
    alpha: f64,
}

impl SchurDecomposition {
    /// Orthonormal Schur vectors (`N x M`).
    pub fn basis(&self) -> &Array2<f64> {
        &self.basis
    }

    /// Quasi-upper-triangular Schur matrix (`M x M`).
    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    /// Eigenvalues of the diagonal blocks, sorted.
    pub fn eigenvalues(&self) -> &Array1<Complex64> {
        &self.eigenvalues
    }

    /// Eigengap of [`eigenvalues`](Self::eigenvalues).
    pub fn eigengap(&self) -> usize {
        self.eigengap
    }

    /// Distribution `eta` the matrix was weighted with.
    pub fn initial_distribution(&self) -> &Array1<f64> {
        &self.initial_distribution
    }

    /// Ordering criterion.
    pub fn which(&self) -> Which {
        self.which
    }

    /// Method used.
    pub fn method(&self) -> SchurMethod {
        self.method
    }

    /// Number of Schur vectors `M` actually retained.
    pub fn n_components(&self) -> usize {
        self.matrix.nrows()
    }

    /// Number of Schur vectors requested.
    pub fn requested_components(&self) -> usize {
        self.requested
    }

    /// Returns `true` when one more vector than requested was retained to
    /// keep a complex conjugate pair together.
    pub fn n_components_adjusted(&self) -> bool {
        self.n_components() > self.requested
    }

    /// Returns `true` if keeping the first `m` vectors would split a 2x2
    /// block.
    pub fn splits_conjugate_pair(&self, m: usize) -> bool {
        m > 0 && m < self.matrix.nrows() && self.matrix[[m, m - 1]] != 0.0
    }

    /// Eigenvalue-only decomposition over the retained subspace.
    pub fn eigen(&self) -> EigenDecomposition {
        EigenDecomposition::new(
            self.eigenvalues.clone(),
            None,
            None,
            None,
            self.eigengap,
            EigenParams {
                which: self.which,
                k: self.eigenvalues.len(),
                alpha: self.alpha,
            },
        )
    }
}

/// Computes a sorted real Schur decomposition of the weighted matrix
/// `D^{1/2} P D^{-1/2}` for `n_components` leading eigenvalues.
///
/// If `n_components` would split a complex conjugate pair, one more vector
/// is retained and [`SchurDecomposition::n_components_adjusted`] reports it.
///
/// # Errors
///
/// Returns [`SpectralError::InvalidParameter`] for `n_components < 2`, for
/// `n_components >= N` with the Krylov method, or an invalid alpha;
/// [`SpectralError::Chain`] for an invalid initial distribution;
/// [`SpectralError::NotConverged`] if the Krylov iteration fails.
#[tracing::instrument(
    skip_all,
    fields(n_states = matrix.n_states(), n_components = config.n_components(), method = %config.method())
)]
pub fn schur_decompose(
    matrix: &TransitionMatrix,
    config: &SchurConfig,
) -> Result<SchurDecomposition, SpectralError> {
    let n = matrix.n_states();
    config.validate_for(n)?;
    let eta = config
        .initial_distribution()
        .cloned()
        .unwrap_or_else(|| uniform_distribution(n));
    let weighted = matrix.weighted(&eta)?;
    let which = config.which();
    let requested = config.n_components();

    let (q, t) = match config.method() {
        SchurMethod::Krylov => {
            let start: Vec<f64> = eta.iter().map(|v| v.sqrt()).collect();
            let partial = krylov_schur(&weighted, requested, which, config.krylov(), Some(&start))?;
            (partial.basis, partial.t)
        }
        SchurMethod::Direct => {
            let m = if requested > n {
                warn!(requested, n_states = n, "n_components exceeds the number of states, using N");
                n
            } else {
                requested
            };
            let full = sorted_schur(to_dmatrix(&weighted.to_dense()), which, m)?;
            let count = if splits_conjugate_pair(&full.t, m) {
                m + 1
            } else {
                m
            };
            (
                full.q.columns(0, count).clone_owned(),
                full.t.view((0, 0), (count, count)).clone_owned(),
            )
        }
    };

    if t.nrows() > requested {
        warn!(
            requested,
            used = t.nrows(),
            "n_components would split a block of complex conjugate eigenvalues, increasing it by one"
        );
    }

    let eigenvalues: Array1<Complex64> = quasi_triangular_eigenvalues(&t).into_iter().collect();
    let gap = eigengap(eigenvalues.as_slice().unwrap_or(&[]), which, config.alpha())?;
    info!(n_components = t.nrows(), eigengap = gap, "computed Schur decomposition");

    Ok(SchurDecomposition {
        basis: to_array2(&q),
        matrix: to_array2(&t),
        eigenvalues,
        eigengap: gap,
        initial_distribution: eta,
        which,
        method: config.method(),
        requested,
        alpha: config.alpha(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn blocks() -> TransitionMatrix {
        // Two weakly coupled blocks of two states each.
        TransitionMatrix::from_dense(array![
            [0.6, 0.39, 0.01, 0.0],
            [0.39, 0.6, 0.0, 0.01],
            [0.01, 0.0, 0.6, 0.39],
            [0.0, 0.01, 0.39, 0.6]
        ])
        .unwrap()
    }

    #[test]
    fn direct_basis_is_orthonormal() {
        let config = SchurConfig::new()
            .with_n_components(2)
            .with_method(SchurMethod::Direct);
        let s = schur_decompose(&blocks(), &config).unwrap();
        assert_eq!(s.basis().dim(), (4, 2));
        assert_eq!(s.matrix().dim(), (2, 2));
        let gram = s.basis().t().dot(s.basis());
        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(gram[[i, j]], expected, epsilon = 1e-12);
            }
        }
        assert_abs_diff_eq!(s.eigenvalues()[0].re, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s.eigenvalues()[1].re, 0.98, epsilon = 1e-12);
        assert!(!s.n_components_adjusted());
    }

    #[test]
    fn invariant_subspace() {
        let config = SchurConfig::new()
            .with_n_components(2)
            .with_method(SchurMethod::Direct);
        let s = schur_decompose(&blocks(), &config).unwrap();
        // Uniform eta: P X = X R
        let p = blocks().to_dense();
        let lhs = p.dot(s.basis());
        let rhs = s.basis().dot(s.matrix());
        for (a, b) in lhs.iter().zip(rhs.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn one_component_rejected() {
        let config = SchurConfig::new().with_n_components(1);
        let err = schur_decompose(&blocks(), &config).unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn direct_caps_components() {
        let config = SchurConfig::new()
            .with_n_components(10)
            .with_method(SchurMethod::Direct);
        let s = schur_decompose(&blocks(), &config).unwrap();
        assert_eq!(s.n_components(), 4);
        assert_eq!(s.requested_components(), 10);
    }

    #[test]
    fn eigen_view_has_no_vectors() {
        let config = SchurConfig::new()
            .with_n_components(3)
            .with_method(SchurMethod::Direct);
        let s = schur_decompose(&blocks(), &config).unwrap();
        let e = s.eigen();
        assert_eq!(e.len(), 3);
        assert!(e.left_eigenvectors().is_none());
        assert_eq!(e.params().k, 3);
        assert_eq!(e.eigengap(), s.eigengap());
    }
}
