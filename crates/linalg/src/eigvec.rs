//! Eigenvectors from a (partial) real Schur form.
//!
//! Given `A Q = Q T` with `T` quasi-upper-triangular, the real form is first
//! converted to a complex triangular one, then each eigenvector of the
//! triangular factor is obtained by back-substitution and mapped back
//! through the Schur vectors.

use nalgebra::DMatrix;
use num_complex::Complex64;

/// Eigenvectors of `A` restricted to the invariant subspace spanned by `q`.
///
/// `q` is `n x k` with orthonormal columns and `t` is the `k x k`
/// quasi-upper-triangular matrix with `A q = q t`. Column `j` of the result
/// belongs to the `j`-th eigenvalue as listed by
/// [`quasi_triangular_eigenvalues`](crate::schur::quasi_triangular_eigenvalues).
/// Each column has unit 2-norm and its largest-modulus entry is real and
/// positive.
///
/// # Panics
///
/// Panics if `t` is not square or does not match the number of columns of
/// `q`.
pub fn schur_eigenvectors(q: &DMatrix<f64>, t: &DMatrix<f64>) -> DMatrix<Complex64> {
    let k = t.nrows();
    assert_eq!(t.ncols(), k, "Schur factor must be square");
    assert_eq!(q.ncols(), k, "Schur vectors do not match the Schur factor");

    let (z, u) = to_complex_schur(q, t);
    let tol = 1e-10 * t.norm().max(1.0);
    let n = q.nrows();
    let mut out = DMatrix::<Complex64>::zeros(n, k);

    for j in 0..k {
        let lambda = u[(j, j)];
        let mut y = vec![Complex64::new(0.0, 0.0); j + 1];
        y[j] = Complex64::new(1.0, 0.0);
        for i in (0..j).rev() {
            let mut s = Complex64::new(0.0, 0.0);
            for l in (i + 1)..=j {
                s += u[(i, l)] * y[l];
            }
            let denom = u[(i, i)] - lambda;
            y[i] = if denom.norm() > tol {
                -s / denom
            } else if s.norm() <= tol {
                Complex64::new(0.0, 0.0)
            } else {
                -s / tol
            };
        }

        let mut x: Vec<Complex64> = (0..n)
            .map(|r| (0..=j).map(|l| z[(r, l)] * y[l]).sum())
            .collect();
        normalize_phase(&mut x);
        for (r, v) in x.into_iter().enumerate() {
            out[(r, j)] = v;
        }
    }
    out
}

// Converts the real quasi-triangular form into a complex triangular one,
// returning the transformed Schur vectors and triangular factor.
fn to_complex_schur(q: &DMatrix<f64>, t: &DMatrix<f64>) -> (DMatrix<Complex64>, DMatrix<Complex64>) {
    let k = t.nrows();
    let n = q.nrows();
    let mut u = t.map(|v| Complex64::new(v, 0.0));
    let mut z = q.map(|v| Complex64::new(v, 0.0));

    let mut i = 0;
    while i + 1 < k {
        if t[(i + 1, i)] == 0.0 {
            i += 1;
            continue;
        }
        let (a, b, c, d) = (t[(i, i)], t[(i, i + 1)], t[(i + 1, i)], t[(i + 1, i + 1)]);
        let mean = 0.5 * (a + d);
        let half = 0.5 * (a - d);
        let disc = half * half + b * c;
        let lambda = if disc < 0.0 {
            Complex64::new(mean, (-disc).sqrt())
        } else {
            Complex64::new(mean + disc.sqrt(), 0.0)
        };

        // First column of the unitary rotation is the eigenvector
        // (lambda - d, c) of the block.
        let mu = lambda - d;
        let r = (mu.norm_sqr() + c * c).sqrt();
        let cs = mu / r;
        let sn = c / r;

        for col in 0..k {
            let x = u[(i, col)];
            let y = u[(i + 1, col)];
            u[(i, col)] = cs.conj() * x + y * sn;
            u[(i + 1, col)] = x * (-sn) + cs * y;
        }
        for row in 0..k {
            let x = u[(row, i)];
            let y = u[(row, i + 1)];
            u[(row, i)] = cs * x + y * sn;
            u[(row, i + 1)] = x * (-sn) + cs.conj() * y;
        }
        for row in 0..n {
            let x = z[(row, i)];
            let y = z[(row, i + 1)];
            z[(row, i)] = cs * x + y * sn;
            z[(row, i + 1)] = x * (-sn) + cs.conj() * y;
        }
        u[(i + 1, i)] = Complex64::new(0.0, 0.0);
        i += 2;
    }
    (z, u)
}

// Scales to unit norm and rotates the largest-modulus entry onto the
// positive real axis.
fn normalize_phase(x: &mut [Complex64]) {
    let norm = x.iter().map(|v| v.norm_sqr()).sum::<f64>().sqrt();
    if norm == 0.0 {
        return;
    }
    let pivot = x
        .iter()
        .copied()
        .fold(Complex64::new(0.0, 0.0), |best, v| {
            if v.norm() > best.norm() { v } else { best }
        });
    let phase = pivot.conj() / pivot.norm();
    for v in x.iter_mut() {
        *v = *v * phase / norm;
    }
}
