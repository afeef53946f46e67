//! Ordered real Schur decomposition.
//!
//! A real matrix `A` is factored as `A = Q T Q^T` with `Q` orthogonal and
//! `T` quasi-upper-triangular: 1x1 diagonal blocks carry real eigenvalues,
//! 2x2 blocks carry complex conjugate pairs. The blocks are then reordered
//! by direct swapping so that the leading eigenvalues are the largest
//! under a [`Which`] criterion.

use nalgebra::DMatrix;
use num_complex::Complex64;
use tracing::trace;

use crate::error::LinalgError;
use crate::which::Which;

/// Result of [`sorted_schur`].
#[derive(Debug, Clone)]
pub struct OrderedSchur {
    /// Orthogonal Schur vectors, one per column.
    pub q: DMatrix<f64>,
    /// Quasi-upper-triangular Schur form.
    pub t: DMatrix<f64>,
}

impl OrderedSchur {
    /// Eigenvalues in the order of the diagonal blocks.
    pub fn eigenvalues(&self) -> Vec<Complex64> {
        quasi_triangular_eigenvalues(&self.t)
    }
}

/// Computes a real Schur form of `a` whose leading `select` eigenvalues are
/// the largest under `which`, in descending order.
///
/// Pass `select = a.nrows()` for a fully ordered form. Conjugate pairs are
/// kept together, so the ordered prefix may be one eigenvalue longer than
/// requested.
///
/// # Errors
///
/// Returns [`LinalgError::NotSquare`] for a non-square input,
/// [`LinalgError::NotConverged`] if the QR iteration fails, and
/// [`LinalgError::ReorderFailed`] if two blocks cannot be exchanged stably.
pub fn sorted_schur(
    a: DMatrix<f64>,
    which: Which,
    select: usize,
) -> Result<OrderedSchur, LinalgError> {
    let (rows, cols) = a.shape();
    if rows != cols {
        return Err(LinalgError::NotSquare { rows, cols });
    }
    let n = rows;
    if n == 0 {
        return Ok(OrderedSchur {
            q: DMatrix::zeros(0, 0),
            t: DMatrix::zeros(0, 0),
        });
    }
    if n == 1 {
        return Ok(OrderedSchur {
            q: DMatrix::identity(1, 1),
            t: a,
        });
    }

    let max_iterations = 100 * n;
    let schur = a
        .try_schur(f64::EPSILON, max_iterations)
        .ok_or(LinalgError::NotConverged {
            method: "Schur QR iteration",
            iterations: max_iterations,
        })?;
    let (mut q, mut t) = schur.unpack();

    clean_quasi_triangular(&mut t);
    let mut sizes = split_real_blocks(&mut q, &mut t);
    order_blocks(&mut q, &mut t, &mut sizes, which, select.min(n))?;

    Ok(OrderedSchur { q, t })
}

/// Returns `true` if cutting `t` after `m` rows and columns would separate
/// the two halves of a 2x2 block.
pub fn splits_conjugate_pair(t: &DMatrix<f64>, m: usize) -> bool {
    m > 0 && m < t.nrows() && t[(m, m - 1)] != 0.0
}

/// Eigenvalues of a quasi-upper-triangular matrix in block order.
///
/// For each 2x2 block the member with positive imaginary part is listed
/// first.
pub fn quasi_triangular_eigenvalues(t: &DMatrix<f64>) -> Vec<Complex64> {
    let n = t.nrows();
    let mut out = Vec::with_capacity(n);
    let mut i = 0;
    while i < n {
        if i + 1 < n && t[(i + 1, i)] != 0.0 {
            let (l1, l2) = block_eigenvalues(t[(i, i)], t[(i, i + 1)], t[(i + 1, i)], t[(i + 1, i + 1)]);
            out.push(l1);
            out.push(l2);
            i += 2;
        } else {
            out.push(Complex64::new(t[(i, i)], 0.0));
            i += 1;
        }
    }
    out
}

// Eigenvalues of [[a, b], [c, d]], positive imaginary part (or larger real
// value) first.
fn block_eigenvalues(a: f64, b: f64, c: f64, d: f64) -> (Complex64, Complex64) {
    let mean = 0.5 * (a + d);
    let half = 0.5 * (a - d);
    let disc = half * half + b * c;
    if disc < 0.0 {
        let im = (-disc).sqrt();
        (Complex64::new(mean, im), Complex64::new(mean, -im))
    } else {
        let root = disc.sqrt();
        (Complex64::new(mean + root, 0.0), Complex64::new(mean - root, 0.0))
    }
}

// Zeroes entries below the subdiagonal and negligible subdiagonal entries.
fn clean_quasi_triangular(t: &mut DMatrix<f64>) {
    let n = t.nrows();
    for j in 0..n {
        for i in (j + 2)..n {
            t[(i, j)] = 0.0;
        }
    }
    for i in 1..n {
        let scale = t[(i - 1, i - 1)].abs() + t[(i, i)].abs();
        if t[(i, i - 1)].abs() <= f64::EPSILON * scale.max(f64::MIN_POSITIVE) {
            t[(i, i - 1)] = 0.0;
        }
    }
    // Two consecutive nonzero subdiagonals cannot occur in a Schur form.
    for i in 1..n.saturating_sub(1) {
        if t[(i, i - 1)] != 0.0 && t[(i + 1, i)] != 0.0 {
            if t[(i + 1, i)].abs() < t[(i, i - 1)].abs() {
                t[(i + 1, i)] = 0.0;
            } else {
                t[(i, i - 1)] = 0.0;
            }
        }
    }
}

// Applies the rotation [[c, -s], [s, c]] as T <- G^T T G on rows/columns
// (i, i + 1) and accumulates Q <- Q G.
fn rotate(q: &mut DMatrix<f64>, t: &mut DMatrix<f64>, i: usize, c: f64, s: f64) {
    let n = t.nrows();
    for j in 0..n {
        let x = t[(i, j)];
        let y = t[(i + 1, j)];
        t[(i, j)] = c * x + s * y;
        t[(i + 1, j)] = -s * x + c * y;
    }
    for r in 0..n {
        let x = t[(r, i)];
        let y = t[(r, i + 1)];
        t[(r, i)] = c * x + s * y;
        t[(r, i + 1)] = -s * x + c * y;
    }
    for r in 0..q.nrows() {
        let x = q[(r, i)];
        let y = q[(r, i + 1)];
        q[(r, i)] = c * x + s * y;
        q[(r, i + 1)] = -s * x + c * y;
    }
}

// Triangularises 2x2 blocks that carry two real eigenvalues and returns the
// resulting block sizes.
fn split_real_blocks(q: &mut DMatrix<f64>, t: &mut DMatrix<f64>) -> Vec<usize> {
    let n = t.nrows();
    let mut sizes = Vec::with_capacity(n);
    let mut i = 0;
    while i < n {
        if i + 1 < n && t[(i + 1, i)] != 0.0 {
            let (a, b, c, d) = (t[(i, i)], t[(i, i + 1)], t[(i + 1, i)], t[(i + 1, i + 1)]);
            let (l1, _) = block_eigenvalues(a, b, c, d);
            if l1.im == 0.0 {
                let lambda = l1.re;
                let (mut x, mut y) = (b, lambda - a);
                if x.hypot(y) <= f64::EPSILON * (a.abs() + d.abs()).max(f64::MIN_POSITIVE) {
                    x = lambda - d;
                    y = c;
                }
                let r = x.hypot(y);
                if r > 0.0 {
                    rotate(q, t, i, x / r, y / r);
                    t[(i + 1, i)] = 0.0;
                    sizes.push(1);
                    sizes.push(1);
                    i += 2;
                    continue;
                }
            }
            sizes.push(2);
            i += 2;
        } else {
            sizes.push(1);
            i += 1;
        }
    }
    sizes
}

fn block_key(t: &DMatrix<f64>, pos: usize, size: usize, which: Which) -> f64 {
    if size == 1 {
        which.key(Complex64::new(t[(pos, pos)], 0.0))
    } else {
        let (l1, _) = block_eigenvalues(
            t[(pos, pos)],
            t[(pos, pos + 1)],
            t[(pos + 1, pos)],
            t[(pos + 1, pos + 1)],
        );
        which.key(l1)
    }
}

// Selection sort over diagonal blocks: the best remaining block is bubbled
// up to the front until `select` eigenvalues are in place.
fn order_blocks(
    q: &mut DMatrix<f64>,
    t: &mut DMatrix<f64>,
    sizes: &mut [usize],
    which: Which,
    select: usize,
) -> Result<(), LinalgError> {
    let scale = t.norm().max(1.0);
    let mut placed = 0;
    let mut target = 0;
    let mut target_pos = 0;

    while placed < select && target < sizes.len() {
        let mut best = target;
        let mut best_pos = target_pos;
        let mut best_key = block_key(t, target_pos, sizes[target], which);
        let mut pos = target_pos + sizes[target];
        for b in (target + 1)..sizes.len() {
            let key = block_key(t, pos, sizes[b], which);
            if key > best_key + 1e-12 * scale {
                best = b;
                best_pos = pos;
                best_key = key;
            }
            pos += sizes[b];
        }

        let mut b = best;
        let mut b_pos = best_pos;
        while b > target {
            let prev_pos = b_pos - sizes[b - 1];
            swap_blocks(q, t, prev_pos, sizes[b - 1], sizes[b], scale)?;
            sizes.swap(b - 1, b);
            b -= 1;
            b_pos = prev_pos;
        }
        if best != target {
            trace!(from = best, to = target, "moved Schur block");
        }

        placed += sizes[target];
        target_pos += sizes[target];
        target += 1;
    }
    Ok(())
}

// Exchanges the adjacent diagonal blocks of sizes `p` (at `k`) and `r`
// (at `k + p`).
fn swap_blocks(
    q: &mut DMatrix<f64>,
    t: &mut DMatrix<f64>,
    k: usize,
    p: usize,
    r: usize,
    scale: f64,
) -> Result<(), LinalgError> {
    if p == 1 && r == 1 {
        let a = t[(k, k)];
        let b = t[(k, k + 1)];
        let d = t[(k + 1, k + 1)];
        // Eigenvector of the trailing eigenvalue d.
        let (x, y) = (b, d - a);
        let norm = x.hypot(y);
        if norm == 0.0 {
            return Ok(());
        }
        rotate(q, t, k, x / norm, y / norm);
        t[(k + 1, k)] = 0.0;
        t[(k, k)] = d;
        t[(k + 1, k + 1)] = a;
        return Ok(());
    }

    let s = p + r;
    let a11 = t.view((k, k), (p, p)).clone_owned();
    let a12 = t.view((k, k + p), (p, r)).clone_owned();
    let a22 = t.view((k + p, k + p), (r, r)).clone_owned();

    // Sylvester equation A11 X - X A22 = A12, unknowns in column-major order.
    let mut sys = DMatrix::<f64>::zeros(p * r, p * r);
    let mut rhs = nalgebra::DVector::<f64>::zeros(p * r);
    for j in 0..r {
        for i in 0..p {
            let row = i + j * p;
            rhs[row] = a12[(i, j)];
            for l in 0..p {
                sys[(row, l + j * p)] += a11[(i, l)];
            }
            for l in 0..r {
                sys[(row, i + l * p)] -= a22[(l, j)];
            }
        }
    }
    let sol = sys
        .lu()
        .solve(&rhs)
        .ok_or(LinalgError::ReorderFailed { position: k })?;

    // [-X; I_r] spans the invariant subspace of A22; complete it to a
    // square basis before the QR factorisation.
    let mut basis = DMatrix::<f64>::zeros(s, s);
    for j in 0..r {
        for i in 0..p {
            basis[(i, j)] = -sol[i + j * p];
        }
        basis[(p + j, j)] = 1.0;
    }
    for i in 0..p {
        basis[(i, r + i)] = 1.0;
    }
    let qs = basis.qr().q();

    let n = t.nrows();
    let rows = t.view((k, 0), (s, n)).clone_owned();
    t.view_mut((k, 0), (s, n)).copy_from(&(qs.transpose() * rows));
    let cols = t.view((0, k), (n, s)).clone_owned();
    t.view_mut((0, k), (n, s)).copy_from(&(cols * &qs));
    let qcols = q.view((0, k), (q.nrows(), s)).clone_owned();
    q.view_mut((0, k), (q.nrows(), s)).copy_from(&(qcols * &qs));

    let residual = t.view((k + r, k), (p, r)).norm();
    if residual > 1e-8 * scale {
        return Err(LinalgError::ReorderFailed { position: k });
    }
    t.view_mut((k + r, k), (p, r)).fill(0.0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn reconstruct(s: &OrderedSchur) -> DMatrix<f64> {
        &s.q * &s.t * s.q.transpose()
    }

    fn sorted_keys(values: &[Complex64], which: Which) -> bool {
        values
            .windows(2)
            .all(|w| which.key(w[0]) >= which.key(w[1]) - 1e-10)
    }

    #[test]
    fn diagonal_matrix_is_reordered() {
        let a = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![0.1, 0.9, -0.5, 0.4]));
        let s = sorted_schur(a.clone(), Which::LargestReal, 4).unwrap();
        let ev: Vec<f64> = s.eigenvalues().iter().map(|z| z.re).collect();
        assert_eq!(ev.len(), 4);
        assert_abs_diff_eq!(ev[0], 0.9, epsilon = 1e-12);
        assert_abs_diff_eq!(ev[1], 0.4, epsilon = 1e-12);
        assert_abs_diff_eq!(ev[2], 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(ev[3], -0.5, epsilon = 1e-12);
        assert!((reconstruct(&s) - a).norm() < 1e-12);
    }

    #[test]
    fn largest_magnitude_prefers_negative() {
        let a = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![0.1, 0.9, -0.95, 0.4]));
        let s = sorted_schur(a, Which::LargestMagnitude, 4).unwrap();
        let ev = s.eigenvalues();
        assert_abs_diff_eq!(ev[0].re, -0.95, epsilon = 1e-12);
        assert_abs_diff_eq!(ev[1].re, 0.9, epsilon = 1e-12);
    }

    #[test]
    fn rotation_block_kept_together() {
        // Rotation by 90 degrees scaled by 0.5 has eigenvalues +-0.5i;
        // a real eigenvalue 0.8 must come first under LR and 0.3 last.
        let a = DMatrix::from_row_slice(
            4,
            4,
            &[
                0.3, 0.0, 0.0, 0.0, //
                0.0, 0.0, -0.5, 0.0, //
                0.0, 0.5, 0.0, 0.0, //
                0.0, 0.0, 0.0, 0.8,
            ],
        );
        let s = sorted_schur(a.clone(), Which::LargestReal, 4).unwrap();
        let ev = s.eigenvalues();
        assert_abs_diff_eq!(ev[0].re, 0.8, epsilon = 1e-10);
        assert_abs_diff_eq!(ev[1].re, 0.3, epsilon = 1e-10);
        assert_abs_diff_eq!(ev[2].im, 0.5, epsilon = 1e-10);
        assert_abs_diff_eq!(ev[3].im, -0.5, epsilon = 1e-10);
        assert!((reconstruct(&s) - a).norm() < 1e-10);

        let m = sorted_schur(
            DMatrix::from_row_slice(
                4,
                4,
                &[
                    0.3, 0.0, 0.0, 0.0, //
                    0.0, 0.0, -0.5, 0.0, //
                    0.0, 0.5, 0.0, 0.0, //
                    0.0, 0.0, 0.0, 0.8,
                ],
            ),
            Which::LargestMagnitude,
            4,
        )
        .unwrap();
        let ev = m.eigenvalues();
        assert_abs_diff_eq!(ev[0].re, 0.8, epsilon = 1e-10);
        assert_abs_diff_eq!(ev[1].norm(), 0.5, epsilon = 1e-10);
        assert_abs_diff_eq!(ev[2].norm(), 0.5, epsilon = 1e-10);
        assert!(ev[1].im > 0.0);
        assert!(splits_conjugate_pair(&m.t, 2));
        assert!(!splits_conjugate_pair(&m.t, 1));
        assert!(!splits_conjugate_pair(&m.t, 3));
    }

    #[test]
    fn stochastic_matrix_full_order() {
        let a = DMatrix::from_row_slice(
            4,
            4,
            &[
                0.7, 0.2, 0.1, 0.0, //
                0.1, 0.6, 0.2, 0.1, //
                0.0, 0.3, 0.5, 0.2, //
                0.2, 0.0, 0.3, 0.5,
            ],
        );
        let s = sorted_schur(a.clone(), Which::LargestReal, 4).unwrap();
        let ev = s.eigenvalues();
        assert_abs_diff_eq!(ev[0].re, 1.0, epsilon = 1e-10);
        assert!(sorted_keys(&ev, Which::LargestReal));
        assert!((reconstruct(&s) - a).norm() < 1e-10);
        let qtq = s.q.transpose() * &s.q;
        assert!((qtq - DMatrix::identity(4, 4)).norm() < 1e-10);
    }

    #[test]
    fn partial_selection_places_leading_values() {
        let a = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![
            0.2, 0.1, 0.7, 0.3, 0.9, 0.5,
        ]));
        let s = sorted_schur(a, Which::LargestReal, 2).unwrap();
        let ev = s.eigenvalues();
        assert_abs_diff_eq!(ev[0].re, 0.9, epsilon = 1e-12);
        assert_abs_diff_eq!(ev[1].re, 0.7, epsilon = 1e-12);
    }

    #[test]
    fn non_square_rejected() {
        let err = sorted_schur(DMatrix::zeros(2, 3), Which::LargestReal, 2).unwrap_err();
        assert!(matches!(err, LinalgError::NotSquare { rows: 2, cols: 3 }));
    }

    #[test]
    fn block_eigenvalue_order() {
        let t = DMatrix::from_row_slice(2, 2, &[1.0, -2.0, 2.0, 1.0]);
        let ev = quasi_triangular_eigenvalues(&t);
        assert_abs_diff_eq!(ev[0].im, 2.0, epsilon = 1e-15);
        assert_abs_diff_eq!(ev[1].im, -2.0, epsilon = 1e-15);
    }
}
