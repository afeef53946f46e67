//! Leading eigenvalues and eigenvectors of a transition matrix.

use metastate_chain::{Storage, TransitionMatrix};
use metastate_linalg::{
    KrylovOptions, LinearOperator, Which, krylov_schur, quasi_triangular_eigenvalues,
    schur_eigenvectors, sorted_schur, splits_conjugate_pair, to_array2_complex, to_dmatrix,
};
use nalgebra::DMatrix;
use ndarray::{Array1, Array2};
use num_complex::Complex64;
use tracing::{debug, info, warn};

use crate::config::EigenConfig;
use crate::eigengap::eigengap;
use crate::error::SpectralError;

/// Parameters an [`EigenDecomposition`] was computed with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EigenParams {
    /// Ordering criterion.
    pub which: Which,
    /// Number of eigenvalues requested.
    pub k: usize,
    /// Eigengap weight.
    pub alpha: f64,
}

/// Leading part of the spectrum of a transition matrix.
///
/// Eigenvalues are sorted in descending order under [`EigenParams::which`];
/// complex conjugate pairs are adjacent, positive imaginary part first.
/// Column `i` of each eigenvector matrix belongs to eigenvalue `i`.
#[derive(Debug, Clone)]
pub struct EigenDecomposition {
    eigenvalues: Array1<Complex64>,
    left: Option<Array2<Complex64>>,
    right: Option<Array2<Complex64>>,
    stationary_distribution: Option<Array1<f64>>,
    eigengap: usize,
    params: EigenParams,
}

impl EigenDecomposition {
    pub(crate) fn new(
        eigenvalues: Array1<Complex64>,
        left: Option<Array2<Complex64>>,
        right: Option<Array2<Complex64>>,
        stationary_distribution: Option<Array1<f64>>,
        eigengap: usize,
        params: EigenParams,
    ) -> Self {
        Self {
            eigenvalues,
            left,
            right,
            stationary_distribution,
            eigengap,
            params,
        }
    }

    /// The eigenvalues, sorted.
    pub fn eigenvalues(&self) -> &Array1<Complex64> {
        &self.eigenvalues
    }

    /// Number of eigenvalues.
    pub fn len(&self) -> usize {
        self.eigenvalues.len()
    }

    /// Returns `true` if no eigenvalues were computed.
    pub fn is_empty(&self) -> bool {
        self.eigenvalues.is_empty()
    }

    /// Left eigenvectors (`N x K`), unless only eigenvalues were requested.
    pub fn left_eigenvectors(&self) -> Option<&Array2<Complex64>> {
        self.left.as_ref()
    }

    /// Right eigenvectors (`N x K`), unless only eigenvalues were requested.
    pub fn right_eigenvectors(&self) -> Option<&Array2<Complex64>> {
        self.right.as_ref()
    }

    /// Stationary distribution, when an eigenvalue numerically equal to one
    /// was found and eigenvectors were computed.
    pub fn stationary_distribution(&self) -> Option<&Array1<f64>> {
        self.stationary_distribution.as_ref()
    }

    /// Eigengap index.
    pub fn eigengap(&self) -> usize {
        self.eigengap
    }

    /// Parameters used.
    pub fn params(&self) -> EigenParams {
        self.params
    }
}

// Leading eigenvalues of `storage` together with the Schur data needed for
// eigenvectors.
struct Leading {
    basis: DMatrix<f64>,
    t: DMatrix<f64>,
}

impl Leading {
    fn eigenvalues(&self) -> Vec<Complex64> {
        quasi_triangular_eigenvalues(&self.t)
    }

    fn eigenvectors(&self) -> Array2<Complex64> {
        to_array2_complex(&schur_eigenvectors(&self.basis, &self.t))
    }
}

fn leading_sparse(
    storage: &Storage,
    k: usize,
    which: Which,
    krylov: &KrylovOptions,
) -> Result<Leading, SpectralError> {
    let partial = krylov_schur(storage, k, which, krylov, None)?;
    debug!(
        k,
        returned = partial.t.nrows(),
        restarts = partial.restarts,
        "partial Schur form computed"
    );
    Ok(Leading {
        basis: partial.basis,
        t: partial.t,
    })
}

fn leading_dense(storage: &Storage, k: usize, which: Which) -> Result<Leading, SpectralError> {
    let n = storage.dim();
    let full = sorted_schur(to_dmatrix(&storage.to_dense()), which, k)?;
    let count = if splits_conjugate_pair(&full.t, k) {
        k + 1
    } else {
        k
    };
    let count = count.min(n);
    Ok(Leading {
        basis: full.q.columns(0, count).clone_owned(),
        t: full.t.view((0, 0), (count, count)).clone_owned(),
    })
}

/// Computes the leading eigenvalues and eigenvectors of `matrix`.
///
/// Sparse matrices use Krylov-Schur iteration on `P^T` (left vectors) and
/// `P` (right vectors); dense matrices use a full ordered Schur
/// decomposition. If the `k`-th eigenvalue is one half of a complex pair,
/// `k + 1` eigenvalues are returned.
///
/// # Errors
///
/// Returns [`SpectralError::InvalidParameter`] for an invalid
/// configuration or, for sparse storage, `k >= N`;
/// [`SpectralError::NotConverged`] if the Krylov iteration exhausts its
/// restarts.
#[tracing::instrument(skip_all, fields(n_states = matrix.n_states(), k = config.k()))]
pub fn eigendecompose(
    matrix: &TransitionMatrix,
    config: &EigenConfig,
) -> Result<EigenDecomposition, SpectralError> {
    config.validate()?;
    let n = matrix.n_states();
    let which = config.which();
    info!("computing eigendecomposition of the transition matrix");

    let (right, left) = if matrix.is_sparse() {
        let k = config.k();
        if k >= n {
            return Err(SpectralError::InvalidParameter {
                name: "k",
                reason: format!(
                    "sparse eigendecomposition needs k < {n}, got {k}; use dense storage for the full spectrum"
                ),
            });
        }
        let right = leading_sparse(matrix.storage(), k, which, config.krylov())?;
        let left = if config.only_eigenvalues() {
            None
        } else {
            let wanted = right.t.nrows();
            let k_left = if wanted < n { wanted } else { k };
            Some(leading_sparse(&matrix.transposed(), k_left, which, config.krylov())?)
        };
        (right, left)
    } else {
        warn!("transition matrix is not sparse, computing the full Schur decomposition");
        let k = if config.k() > n {
            warn!(requested = config.k(), n_states = n, "k exceeds the number of states, using k = N");
            n
        } else {
            config.k()
        };
        let right = leading_dense(matrix.storage(), k, which)?;
        let left = if config.only_eigenvalues() {
            None
        } else {
            Some(leading_dense(&matrix.transposed(), k, which)?)
        };
        (right, left)
    };

    let eigenvalues = right.eigenvalues();
    if eigenvalues.len() > config.k() {
        info!(
            k = config.k(),
            returned = eigenvalues.len(),
            "k would split a complex conjugate pair, returning one more eigenvalue"
        );
    }
    let gap = eigengap(&eigenvalues, which, config.alpha())?;
    let params = EigenParams {
        which,
        k: config.k(),
        alpha: config.alpha(),
    };

    let Some(left) = left else {
        return Ok(EigenDecomposition::new(
            eigenvalues.into_iter().collect(),
            None,
            None,
            None,
            gap,
            params,
        ));
    };

    let count = eigenvalues.len().min(left.t.nrows());
    let v_r = right.eigenvectors();
    let v_l = left.eigenvectors();
    let v_r = v_r.slice(ndarray::s![.., ..count]).to_owned();
    let v_l = v_l.slice(ndarray::s![.., ..count]).to_owned();
    let eigenvalues: Array1<Complex64> = eigenvalues.into_iter().take(count).collect();

    let stationary = stationary_from_left(&eigenvalues, &v_l);
    if stationary.is_none() {
        warn!("no eigenvalue close to 1 found, stationary distribution not available");
    }

    Ok(EigenDecomposition::new(
        eigenvalues,
        Some(v_l),
        Some(v_r),
        stationary,
        gap,
        params,
    ))
}

/// Normalised modulus of the left eigenvector whose eigenvalue is closest
/// to one, if that eigenvalue lies within `sqrt(f64::EPSILON)` of one.
pub(crate) fn stationary_from_left(
    eigenvalues: &Array1<Complex64>,
    left: &Array2<Complex64>,
) -> Option<Array1<f64>> {
    let tol = f64::EPSILON.sqrt();
    let (idx, dist) = eigenvalues
        .iter()
        .map(|z| (*z - 1.0).norm())
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(&b.1))?;
    if dist > tol {
        return None;
    }
    let pi: Array1<f64> = left.column(idx).iter().map(|z| z.norm()).collect();
    let total = pi.sum();
    if total <= 0.0 || !total.is_finite() {
        return None;
    }
    Some(pi / total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use metastate_linalg::CsrMatrix;
    use ndarray::array;

    fn three_state() -> TransitionMatrix {
        TransitionMatrix::from_dense(array![[0.8, 0.15, 0.05], [0.1, 0.8, 0.1], [0.05, 0.15, 0.8]])
            .unwrap()
    }

    #[test]
    fn dense_top_eigenvalue_is_one() {
        let d = eigendecompose(&three_state(), &EigenConfig::new().with_k(3)).unwrap();
        assert_eq!(d.len(), 3);
        assert_abs_diff_eq!(d.eigenvalues()[0].re, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(d.eigenvalues()[0].im, 0.0, epsilon = 1e-12);
        let pi = d.stationary_distribution().unwrap();
        assert_abs_diff_eq!(pi.sum(), 1.0, epsilon = 1e-12);
        assert!(pi.iter().all(|&v| v >= 0.0));

        // pi P = pi
        let p = three_state().to_dense();
        let pi_p = pi.dot(&p);
        for (a, b) in pi_p.iter().zip(pi.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn dense_k_capped() {
        let d = eigendecompose(&three_state(), &EigenConfig::new()).unwrap();
        assert_eq!(d.len(), 3);
        assert_eq!(d.params().k, 20);
    }

    #[test]
    fn only_eigenvalues_skips_vectors() {
        let d = eigendecompose(
            &three_state(),
            &EigenConfig::new().with_k(2).with_only_eigenvalues(true),
        )
        .unwrap();
        assert_eq!(d.len(), 2);
        assert!(d.left_eigenvectors().is_none());
        assert!(d.right_eigenvectors().is_none());
        assert!(d.stationary_distribution().is_none());
    }

    #[test]
    fn sparse_k_must_be_below_n() {
        let p = TransitionMatrix::from_sparse(CsrMatrix::from_dense(&three_state().to_dense()))
            .unwrap();
        let err = eigendecompose(&p, &EigenConfig::new().with_k(3)).unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn right_vector_of_unit_eigenvalue_is_constant() {
        let d = eigendecompose(&three_state(), &EigenConfig::new().with_k(2)).unwrap();
        let v = d.right_eigenvectors().unwrap();
        let first = v[[0, 0]];
        for i in 0..3 {
            assert_abs_diff_eq!(v[[i, 0]].re, first.re, epsilon = 1e-10);
        }
    }

    #[test]
    fn stationary_requires_unit_eigenvalue() {
        let ev = array![Complex64::new(0.9, 0.0)];
        let left = array![[Complex64::new(1.0, 0.0)], [Complex64::new(1.0, 0.0)]];
        assert!(stationary_from_left(&ev, &left).is_none());
    }
}
