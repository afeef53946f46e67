//! Krylov-Schur iteration for a leading partial real Schur form.
//!
//! Builds an Arnoldi factorisation `A V_m = V_m H_m + h v_m e_m^T`, orders
//! the Schur form of `H_m` and truncates it, keeping the wanted part of the
//! spectrum. The process is repeated until the residuals of the wanted Ritz
//! values fall below the tolerance.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use tracing::{debug, warn};

use crate::error::LinalgError;
use crate::operator::LinearOperator;
use crate::schur::{quasi_triangular_eigenvalues, sorted_schur, splits_conjugate_pair};
use crate::which::Which;

/// Options for [`krylov_schur`].
#[derive(Debug, Clone, PartialEq)]
pub struct KrylovOptions {
    krylov_dim: Option<usize>,
    tolerance: f64,
    max_restarts: usize,
}

impl KrylovOptions {
    /// Creates options with defaults.
    ///
    /// Defaults: `krylov_dim = None` (use `max(2k + 1, 20)` capped at the
    /// operator dimension), `tolerance = 1e-10`, `max_restarts = 300`.
    pub fn new() -> Self {
        Self {
            krylov_dim: None,
            tolerance: 1e-10,
            max_restarts: 300,
        }
    }

    /// Sets the size of the Krylov subspace.
    pub fn with_krylov_dim(mut self, dim: usize) -> Self {
        self.krylov_dim = Some(dim);
        self
    }

    /// Sets the relative residual tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the maximum number of restarts.
    pub fn with_max_restarts(mut self, max_restarts: usize) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    /// Returns the requested Krylov subspace size, if any.
    pub fn krylov_dim(&self) -> Option<usize> {
        self.krylov_dim
    }

    /// Returns the relative residual tolerance.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Returns the maximum number of restarts.
    pub fn max_restarts(&self) -> usize {
        self.max_restarts
    }

    /// Subspace size used for `k` wanted values of an `n`-dimensional
    /// operator.
    pub fn subspace_dim(&self, k: usize, n: usize) -> usize {
        self.krylov_dim.unwrap_or((2 * k + 1).max(20)).min(n)
    }

    /// Validates these options.
    ///
    /// Checks that the tolerance is finite and positive and that an
    /// explicit subspace size is at least 2.
    pub fn validate(&self) -> Result<(), LinalgError> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(LinalgError::InvalidKrylov {
                reason: format!("tolerance must be finite and positive, got {}", self.tolerance),
            });
        }
        if let Some(dim) = self.krylov_dim {
            if dim < 2 {
                return Err(LinalgError::InvalidKrylov {
                    reason: format!("krylov_dim must be at least 2, got {dim}"),
                });
            }
        }
        Ok(())
    }
}

impl Default for KrylovOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// A partial real Schur form `A basis = basis t`.
#[derive(Debug, Clone)]
pub struct PartialSchur {
    /// Orthonormal basis of the invariant subspace (`n x k`).
    pub basis: DMatrix<f64>,
    /// Quasi-upper-triangular restriction of the operator (`k x k`).
    pub t: DMatrix<f64>,
    /// Number of restarts used.
    pub restarts: usize,
}

/// Deterministic start vector with no special structure.
///
/// The all-ones vector is an exact eigenvector of every stochastic matrix,
/// so it cannot start an Arnoldi process on one.
pub fn default_start_vector(n: usize, offset: usize) -> Vec<f64> {
    let phi = 0.618_033_988_749_895;
    (0..n)
        .map(|i| ((i + 1 + offset) as f64 * phi).fract() - 0.5 + 1e-3)
        .collect()
}

/// Computes a partial real Schur form for the `k` leading eigenvalues of
/// `op` under `which`.
///
/// The returned form has `k` columns, or `k + 1` when the `k`-th eigenvalue
/// is one half of a complex conjugate pair.
///
/// # Errors
///
/// Returns [`LinalgError::InvalidKrylov`] if `k == 0`, `k >= n`, or the
/// subspace is not larger than `k`; [`LinalgError::DimensionMismatch`] for
/// a start vector of the wrong length; and [`LinalgError::NotConverged`]
/// when `max_restarts` is exhausted.
pub fn krylov_schur<A: LinearOperator + ?Sized>(
    op: &A,
    k: usize,
    which: Which,
    options: &KrylovOptions,
    start: Option<&[f64]>,
) -> Result<PartialSchur, LinalgError> {
    let mut partial = match run(op, k, which, options, start)? {
        Outcome::Converged(partial) => partial,
        Outcome::Exhausted { .. } => {
            return Err(LinalgError::NotConverged {
                method: "Krylov-Schur",
                iterations: options.max_restarts(),
            });
        }
    };

    // A single start vector only sees one copy of a repeated eigenvalue.
    // Search the orthogonal complement for wanted values that were missed.
    for pass in 0..k {
        match recover_missing(op, &partial, k, which, options)? {
            Some(merged) => {
                debug!(pass, "Krylov-Schur recovered a repeated eigenvalue");
                partial = merged;
            }
            None => break,
        }
    }
    Ok(partial)
}

/// The operator `(I - B B^T) A (I - B B^T)` for an orthonormal `B`.
struct Deflated<'a, A: ?Sized> {
    op: &'a A,
    basis: &'a DMatrix<f64>,
}

impl<A: LinearOperator + ?Sized> LinearOperator for Deflated<'_, A> {
    fn dim(&self) -> usize {
        self.op.dim()
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) {
        let xv = project_out(DVector::from_column_slice(x), self.basis);
        self.op.apply(xv.as_slice(), y);
        let yv = project_out(DVector::from_column_slice(y), self.basis);
        y.copy_from_slice(yv.as_slice());
    }
}

fn project_out(mut x: DVector<f64>, basis: &DMatrix<f64>) -> DVector<f64> {
    for _ in 0..2 {
        let c = basis.tr_mul(&x);
        x -= basis * c;
    }
    x
}

// Looks for a wanted eigenvalue outside the converged invariant subspace and
// returns the enlarged, re-truncated form when one is found. Only the
// leading value of the deflated operator matters. A search that exhausts its
// restarts finds nothing, since the form passed in has already converged.
fn recover_missing<A: LinearOperator + ?Sized>(
    op: &A,
    partial: &PartialSchur,
    k: usize,
    which: Which,
    options: &KrylovOptions,
) -> Result<Option<PartialSchur>, LinalgError> {
    let n = op.dim();
    let kk = partial.t.nrows();
    if n < kk + 2 || options.subspace_dim(1, n - kk) <= 1 {
        return Ok(None);
    }
    let kept = quasi_triangular_eigenvalues(&partial.t);
    let Some(&last) = kept.last() else {
        return Ok(None);
    };
    let slack = options.tolerance().max(1e-8) * which.key(last).abs().max(1.0);

    let deflated = Deflated {
        op,
        basis: &partial.basis,
    };
    let start = project_out(DVector::from_vec(default_start_vector(n, 101)), &partial.basis);
    let extra = match run(&deflated, 1, which, options, Some(start.as_slice()))? {
        Outcome::Converged(extra) => extra,
        Outcome::Exhausted { leading } => {
            if which.key(leading) > which.key(last) + slack {
                warn!(
                    leading_re = leading.re,
                    leading_im = leading.im,
                    "deflated search did not converge, keeping the converged Schur form"
                );
            }
            return Ok(None);
        }
    };
    let found = quasi_triangular_eigenvalues(&extra.t);
    let Some(&best) = found.first() else {
        return Ok(None);
    };
    if which.key(best) <= which.key(last) + slack {
        return Ok(None);
    }

    // span [basis, extra] is invariant under A; take its ordered Schur form.
    let mut joined = DMatrix::<f64>::zeros(n, kk + extra.basis.ncols());
    joined.columns_mut(0, kk).copy_from(&partial.basis);
    joined
        .columns_mut(kk, extra.basis.ncols())
        .copy_from(&extra.basis);
    let b = joined.qr().q();
    let cols = b.ncols();
    let mut ab = DMatrix::<f64>::zeros(n, cols);
    let mut y = vec![0.0; n];
    for j in 0..cols {
        let x: Vec<f64> = b.column(j).iter().copied().collect();
        op.apply(&x, &mut y);
        ab.set_column(j, &DVector::from_column_slice(&y));
    }
    let rayleigh = b.transpose() * ab;
    let schur = sorted_schur(rayleigh, which, cols)?;
    let keep = if splits_conjugate_pair(&schur.t, k) {
        k + 1
    } else {
        k
    };
    let keep = keep.min(cols);

    Ok(Some(PartialSchur {
        basis: &b * schur.q.columns(0, keep),
        t: schur.t.view((0, 0), (keep, keep)).clone_owned(),
        restarts: partial.restarts + extra.restarts,
    }))
}

// Result of one single-vector Krylov-Schur run.
enum Outcome {
    Converged(PartialSchur),
    // Restarts exhausted; `leading` is the best current Ritz value.
    Exhausted { leading: Complex64 },
}

fn run<A: LinearOperator + ?Sized>(
    op: &A,
    k: usize,
    which: Which,
    options: &KrylovOptions,
    start: Option<&[f64]>,
) -> Result<Outcome, LinalgError> {
    options.validate()?;
    let n = op.dim();
    if k == 0 || k >= n {
        return Err(LinalgError::InvalidKrylov {
            reason: format!("number of wanted values must be in 1..{n}, got {k}"),
        });
    }
    let m = options.subspace_dim(k, n);
    if m <= k {
        return Err(LinalgError::InvalidKrylov {
            reason: format!("subspace size {m} must exceed the number of wanted values {k}"),
        });
    }

    let mut v = DMatrix::<f64>::zeros(n, m + 1);
    let mut h = DMatrix::<f64>::zeros(m + 1, m);

    let mut v0 = match start {
        Some(s) if s.len() != n => {
            return Err(LinalgError::DimensionMismatch {
                expected: n,
                got: s.len(),
            });
        }
        Some(s) => DVector::from_column_slice(s),
        None => DVector::from_vec(default_start_vector(n, 0)),
    };
    let norm = v0.norm();
    if norm == 0.0 || !norm.is_finite() {
        v0 = DVector::from_vec(default_start_vector(n, 0));
    }
    let norm = v0.norm();
    v.set_column(0, &(v0 / norm));

    let eps23 = f64::EPSILON.powf(2.0 / 3.0);
    let mut first = 0;
    let mut leading = Complex64::new(0.0, 0.0);

    for restart in 0..=options.max_restarts() {
        arnoldi(op, &mut v, &mut h, first, m);

        let hm = h.view((0, 0), (m, m)).clone_owned();
        let schur = sorted_schur(hm, which, m)?;
        let (y, s) = (schur.q, schur.t);
        let b = h.row(m) * &y;
        let ritz = quasi_triangular_eigenvalues(&s);
        if let Some(&z) = ritz.first() {
            leading = z;
        }

        let kk = if splits_conjugate_pair(&s, k) { k + 1 } else { k };
        let converged = (0..kk.min(m))
            .all(|i| b[i].abs() <= options.tolerance() * ritz[i].norm().max(eps23));

        if converged {
            debug!(restarts = restart, kept = kk, "Krylov-Schur converged");
            let basis = v.columns(0, m) * y.columns(0, kk);
            let t = s.view((0, 0), (kk, kk)).clone_owned();
            return Ok(Outcome::Converged(PartialSchur {
                basis,
                t,
                restarts: restart,
            }));
        }
        if kk >= m {
            break;
        }

        let mut keep = kk + (m - kk) / 2;
        if splits_conjugate_pair(&s, keep) {
            keep += 1;
        }
        if keep >= m {
            keep = kk;
        }

        let last = v.column(m).clone_owned();
        let kept = v.columns(0, m) * y.columns(0, keep);
        v.fill(0.0);
        v.columns_mut(0, keep).copy_from(&kept);
        v.set_column(keep, &last);
        h.fill(0.0);
        h.view_mut((0, 0), (keep, keep))
            .copy_from(&s.view((0, 0), (keep, keep)));
        for i in 0..keep {
            h[(keep, i)] = b[i];
        }
        first = keep;
    }

    Ok(Outcome::Exhausted { leading })
}

// Extends the Arnoldi factorisation from column `first` to `m` columns.
// Gram-Schmidt is applied twice; on breakdown a deterministic vector
// orthogonal to the current basis continues the process.
fn arnoldi<A: LinearOperator + ?Sized>(
    op: &A,
    v: &mut DMatrix<f64>,
    h: &mut DMatrix<f64>,
    first: usize,
    m: usize,
) {
    let n = v.nrows();
    let mut x = vec![0.0; n];
    let mut ax = vec![0.0; n];

    for j in first..m {
        for (xi, vi) in x.iter_mut().zip(v.column(j).iter()) {
            *xi = *vi;
        }
        op.apply(&x, &mut ax);
        let mut w = DVector::from_column_slice(&ax);
        let w_norm = w.norm();

        let basis = v.columns(0, j + 1);
        let mut coeffs = basis.tr_mul(&w);
        w -= &basis * &coeffs;
        let correction = basis.tr_mul(&w);
        w -= &basis * &correction;
        coeffs += correction;

        for i in 0..=j {
            h[(i, j)] = coeffs[i];
        }

        let beta = w.norm();
        if beta > 1e-12 * w_norm.max(f64::MIN_POSITIVE) {
            h[(j + 1, j)] = beta;
            v.set_column(j + 1, &(w / beta));
            continue;
        }

        // Invariant subspace found: the residual is zero and the next basis
        // vector is any unit vector orthogonal to the current ones.
        h[(j + 1, j)] = 0.0;
        let mut replacement = DVector::<f64>::zeros(n);
        for attempt in 0..4 {
            let mut r = DVector::from_vec(default_start_vector(n, 7 * (j + 1) + 13 * attempt));
            let r_norm = r.norm();
            let basis = v.columns(0, j + 1);
            for _ in 0..2 {
                let c = basis.tr_mul(&r);
                r -= &basis * c;
            }
            let norm = r.norm();
            if norm > 1e-8 * r_norm {
                replacement = r / norm;
                break;
            }
        }
        v.set_column(j + 1, &replacement);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csr::CsrMatrix;
    use crate::eigvec::schur_eigenvectors;
    use approx::assert_abs_diff_eq;
    use num_complex::Complex64;

    // Lazy random walk on a path with a weak link in the middle.
    fn path_chain(n: usize) -> CsrMatrix {
        let mut triplets = Vec::new();
        for i in 0..n {
            let left = if i > 0 { if i == n / 2 { 0.01 } else { 0.25 } } else { 0.0 };
            let right = if i + 1 < n { if i + 1 == n / 2 { 0.01 } else { 0.25 } } else { 0.0 };
            if i > 0 {
                triplets.push((i, i - 1, left));
            }
            if i + 1 < n {
                triplets.push((i, i + 1, right));
            }
            triplets.push((i, i, 1.0 - left - right));
        }
        CsrMatrix::from_triplets(n, n, triplets).unwrap()
    }

    #[test]
    fn options_defaults_and_validation() {
        let opts = KrylovOptions::new();
        assert_eq!(opts.krylov_dim(), None);
        assert_eq!(opts.max_restarts(), 300);
        assert_eq!(opts.subspace_dim(3, 100), 20);
        assert_eq!(opts.subspace_dim(15, 100), 31);
        assert_eq!(opts.subspace_dim(15, 25), 25);
        assert!(opts.validate().is_ok());
        assert!(KrylovOptions::new().with_tolerance(0.0).validate().is_err());
        assert!(KrylovOptions::new().with_krylov_dim(1).validate().is_err());
    }

    #[test]
    fn leading_values_match_dense() {
        let p = path_chain(30);
        let opts = KrylovOptions::new();
        let partial = krylov_schur(&p, 4, Which::LargestReal, &opts, None).unwrap();
        assert_eq!(partial.basis.shape(), (30, 4));

        let dense = crate::dense::to_dmatrix(&p.to_dense());
        let full = sorted_schur(dense, Which::LargestReal, 30).unwrap();
        let expected = quasi_triangular_eigenvalues(&full.t);
        let got = quasi_triangular_eigenvalues(&partial.t);
        for i in 0..4 {
            assert_abs_diff_eq!(got[i].re, expected[i].re, epsilon = 1e-8);
        }
        assert_abs_diff_eq!(got[0].re, 1.0, epsilon = 1e-10);
    }

    #[test]
    fn basis_is_orthonormal_and_invariant() {
        let p = path_chain(25);
        let partial = krylov_schur(&p, 3, Which::LargestMagnitude, &KrylovOptions::new(), None).unwrap();
        let k = partial.basis.ncols();
        let gram = partial.basis.transpose() * &partial.basis;
        assert!((gram - DMatrix::identity(k, k)).norm() < 1e-10);

        let dense = crate::dense::to_dmatrix(&p.to_dense());
        let residual = &dense * &partial.basis - &partial.basis * &partial.t;
        assert!(residual.norm() < 1e-8);
    }

    #[test]
    fn eigenvectors_from_partial_form() {
        let p = path_chain(20);
        let partial = krylov_schur(&p, 2, Which::LargestReal, &KrylovOptions::new(), None).unwrap();
        let x = schur_eigenvectors(&partial.basis, &partial.t);
        let lambda = quasi_triangular_eigenvalues(&partial.t);
        let dense = crate::dense::to_dmatrix(&p.to_dense()).map(|v| Complex64::new(v, 0.0));
        for j in 0..lambda.len() {
            let col = x.column(j).clone_owned();
            let r = &dense * &col - col.map(|v| v * lambda[j]);
            assert!(r.norm() < 1e-8);
        }
    }

    #[test]
    fn rotation_pair_not_split() {
        // Directed cycle with laziness: the second and third eigenvalues
        // form a complex pair.
        let n = 8;
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 0.5));
            triplets.push((i, (i + 1) % n, 0.5));
        }
        let p = CsrMatrix::from_triplets(n, n, triplets).unwrap();
        let opts = KrylovOptions::new().with_krylov_dim(7);
        let partial = krylov_schur(&p, 2, Which::LargestMagnitude, &opts, None).unwrap();
        assert_eq!(partial.t.nrows(), 3);
        let ev = quasi_triangular_eigenvalues(&partial.t);
        assert_abs_diff_eq!(ev[0].re, 1.0, epsilon = 1e-10);
        assert!(ev[1].im > 0.0);
        assert_abs_diff_eq!(ev[1].im, -ev[2].im, epsilon = 1e-10);
    }

    #[test]
    fn repeated_unit_eigenvalue_is_found_twice() {
        // Two disconnected copies of the same chain: eigenvalue 1 twice.
        let block = path_chain(15);
        let mut triplets = Vec::new();
        for i in 0..15 {
            for (j, v) in block.row(i) {
                triplets.push((i, j, v));
                triplets.push((i + 15, j + 15, v));
            }
        }
        let p = CsrMatrix::from_triplets(30, 30, triplets).unwrap();
        let partial = krylov_schur(&p, 3, Which::LargestReal, &KrylovOptions::new(), None).unwrap();
        let ev = quasi_triangular_eigenvalues(&partial.t);
        assert_eq!(ev.len(), 3);
        assert_abs_diff_eq!(ev[0].re, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(ev[1].re, 1.0, epsilon = 1e-9);
        assert!(ev[2].re < 1.0 - 1e-6);

        let dense = crate::dense::to_dmatrix(&p.to_dense());
        let residual = &dense * &partial.basis - &partial.basis * &partial.t;
        assert!(residual.norm() < 1e-8);
    }

    #[test]
    fn invalid_requests() {
        let p = path_chain(10);
        let opts = KrylovOptions::new();
        assert!(matches!(
            krylov_schur(&p, 0, Which::LargestReal, &opts, None),
            Err(LinalgError::InvalidKrylov { .. })
        ));
        assert!(matches!(
            krylov_schur(&p, 10, Which::LargestReal, &opts, None),
            Err(LinalgError::InvalidKrylov { .. })
        ));
        assert!(matches!(
            krylov_schur(&p, 3, Which::LargestReal, &opts.clone().with_krylov_dim(3), None),
            Err(LinalgError::InvalidKrylov { .. })
        ));
        assert!(matches!(
            krylov_schur(&p, 3, Which::LargestReal, &opts, Some(&[1.0; 4])),
            Err(LinalgError::DimensionMismatch { expected: 10, got: 4 })
        ));
    }

    #[test]
    fn exhausted_budget_is_reported() {
        let p = path_chain(60);
        let opts = KrylovOptions::new()
            .with_krylov_dim(6)
            .with_max_restarts(0)
            .with_tolerance(1e-15);
        let err = krylov_schur(&p, 4, Which::LargestReal, &opts, None).unwrap_err();
        assert!(err.is_retryable());
    }
}
