//! Simplex rotation of the Schur basis (the numerical core of GPCCA).
//!
//! Given `X` (`N x m`, first column constant one), find `A` (`m x m`) such
//! that `chi = X A` is a non-negative, row-stochastic membership matrix that
//! is as crisp as possible.
//!
//! **Not part of the public API.**

use argmin::core::{CostFunction, Executor, State};
use argmin::solver::neldermead::NelderMead;
use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use crate::error::GpccaError;

/// Relative residual allowed when checking that `sqrt(eta)` lies in the span
/// of the Schur vectors.
const SPAN_TOLERANCE: f64 = 1e-6;

/// Re-orthonormalises `q` so that its first column is `sqrt(eta)`.
///
/// The Schur vector with the largest component along `sqrt(eta)` is
/// exchanged for `sqrt(eta)`, which keeps the span; the result is then
/// orthonormalised by modified Gram-Schmidt.
pub(crate) fn orthonormalize_with(
    q: &DMatrix<f64>,
    sqrt_eta: &DVector<f64>,
) -> Result<DMatrix<f64>, GpccaError> {
    let (n, m) = q.shape();
    let s_norm = sqrt_eta.norm();
    if s_norm == 0.0 || sqrt_eta.len() != n {
        return Err(GpccaError::DegenerateSubspace {
            reason: "sqrt(eta) is zero or has the wrong length".to_string(),
        });
    }
    let coeffs = q.tr_mul(sqrt_eta);
    let residual = (sqrt_eta - q * &coeffs).norm() / s_norm;
    if residual > SPAN_TOLERANCE {
        return Err(GpccaError::DegenerateSubspace {
            reason: format!(
                "sqrt(eta) is not in the span of the Schur vectors (relative residual {residual:.3e})"
            ),
        });
    }
    let pivot = coeffs.iamax();

    let mut columns: Vec<DVector<f64>> = Vec::with_capacity(m);
    columns.push(sqrt_eta / s_norm);
    columns.extend((0..m).filter(|&j| j != pivot).map(|j| q.column(j).clone_owned()));

    let mut out = DMatrix::<f64>::zeros(n, m);
    for (j, mut v) in columns.into_iter().enumerate() {
        let before = v.norm();
        // Two passes keep the basis orthonormal to working precision.
        for _ in 0..2 {
            for i in 0..j {
                let qi = out.column(i);
                let r = qi.dot(&v);
                v -= qi * r;
            }
        }
        let norm = v.norm();
        if norm <= 1e-10 * before.max(f64::MIN_POSITIVE) {
            return Err(GpccaError::DegenerateSubspace {
                reason: format!("Schur vector {j} is linearly dependent on the others"),
            });
        }
        out.set_column(j, &(v / norm));
    }
    Ok(out)
}

/// Picks `m` rows of `x` that approximate the vertices of the simplex
/// spanned by the rows.
pub(crate) fn index_search(x: &DMatrix<f64>) -> Vec<usize> {
    let (n, m) = x.shape();
    let mut index = Vec::with_capacity(m);
    if n == 0 || m == 0 {
        return index;
    }

    let first = argmax_row_norm(x);
    index.push(first);
    let anchor = x.row(first).clone_owned();
    let mut ortho = x.clone();
    for mut row in ortho.row_iter_mut() {
        row -= &anchor;
    }

    for _ in 1..m {
        let ind = argmax_row_norm(&ortho);
        index.push(ind);
        let norm = ortho.row(ind).norm();
        if norm == 0.0 {
            continue;
        }
        let direction = ortho.row(ind).transpose() / norm;
        let proj = &ortho * &direction;
        ortho -= proj * direction.transpose();
    }
    index
}

fn argmax_row_norm(x: &DMatrix<f64>) -> usize {
    let mut best = 0;
    let mut best_norm = f64::NEG_INFINITY;
    for (i, row) in x.row_iter().enumerate() {
        let norm = row.norm();
        if norm > best_norm {
            best = i;
            best_norm = norm;
        }
    }
    best
}

/// Initial rotation `A = X[index]^{-1}`, made feasible.
pub(crate) fn initial_rotation(
    x: &DMatrix<f64>,
    index: &[usize],
) -> Result<DMatrix<f64>, GpccaError> {
    let m = x.ncols();
    let vertices = DMatrix::from_fn(m, m, |i, j| x[(index[i], j)]);
    let mut a = match vertices.clone().try_inverse() {
        Some(inv) => inv,
        None => {
            warn!("representative states are linearly dependent, using the pseudo-inverse");
            vertices
                .pseudo_inverse(1e-12)
                .map_err(|e| GpccaError::DegenerateSubspace {
                    reason: e.to_string(),
                })?
        }
    };
    if !fill_matrix(&mut a, x) {
        return Err(GpccaError::InfeasibleRotation);
    }
    Ok(a)
}

/// Completes `A` from its lower-right block so that `X A` is row-stochastic
/// and non-negative, then rescales it. Returns `false` if the first row is
/// not strictly positive afterwards.
pub(crate) fn fill_matrix(a: &mut DMatrix<f64>, x: &DMatrix<f64>) -> bool {
    let m = a.ncols();
    if m < 2 {
        return false;
    }
    for i in 1..m {
        let rest: f64 = (1..m).map(|j| a[(i, j)]).sum();
        a[(i, 0)] = -rest;
    }
    let prod = x.columns(1, m - 1) * a.rows(1, m - 1);
    for j in 0..m {
        a[(0, j)] = prod
            .column(j)
            .iter()
            .map(|v| -v)
            .fold(f64::NEG_INFINITY, f64::max);
    }
    let total = a.row(0).sum();
    if !total.is_finite() || total == 0.0 {
        return false;
    }
    *a /= total;
    a.row(0).iter().all(|v| v.is_finite() && *v > 0.0)
}

/// `trace(diag(1 / A[0, :]) A^T A)`; equals `m` for a perfectly crisp
/// membership.
pub(crate) fn crispness_trace(a: &DMatrix<f64>) -> f64 {
    let m = a.ncols();
    let mut total = 0.0;
    for i in 0..m {
        let col: f64 = a.column(i).iter().map(|v| v * v).sum();
        total += col / a[(0, i)];
    }
    total
}

/// Cost function for argmin: the GPCCA objective `m - trace(...)` over the
/// free block `A[1:, 1:]`, row-major.
struct RotationCost<'a> {
    x: &'a DMatrix<f64>,
}

impl RotationCost<'_> {
    fn rotation(&self, params: &[f64]) -> DMatrix<f64> {
        let m = self.x.ncols();
        let k = m - 1;
        let mut a = DMatrix::zeros(m, m);
        for i in 0..k {
            for j in 0..k {
                a[(i + 1, j + 1)] = params[i * k + j];
            }
        }
        a
    }
}

impl CostFunction for RotationCost<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        let mut a = self.rotation(params);
        if !fill_matrix(&mut a, self.x) {
            return Ok(f64::MAX);
        }
        let value = self.x.ncols() as f64 - crispness_trace(&a);
        Ok(if value.is_finite() { value } else { f64::MAX })
    }
}

/// Optimises the crispness of `a0` with Nelder-Mead. Returns the better of
/// the optimised and the initial rotation.
pub(crate) fn optimize_rotation(
    x: &DMatrix<f64>,
    a0: &DMatrix<f64>,
    max_iterations: u64,
) -> DMatrix<f64> {
    let m = x.ncols();
    let k = m - 1;
    let mut start = Vec::with_capacity(k * k);
    for i in 1..m {
        for j in 1..m {
            start.push(a0[(i, j)]);
        }
    }

    // Initial simplex: the start point plus one perturbed vertex per
    // coordinate, 5% relative or 0.00025 absolute for zero entries.
    let mut simplex = Vec::with_capacity(start.len() + 1);
    simplex.push(start.clone());
    for i in 0..start.len() {
        let mut vertex = start.clone();
        vertex[i] = if vertex[i] != 0.0 {
            1.05 * vertex[i]
        } else {
            0.00025
        };
        simplex.push(vertex);
    }

    let cost = RotationCost { x };
    let initial = m as f64 - crispness_trace(a0);
    let solver = match NelderMead::new(simplex).with_sd_tolerance(1e-10) {
        Ok(solver) => solver,
        Err(e) => {
            warn!(error = %e, "could not set up the rotation optimisation, keeping the initial rotation");
            return a0.clone();
        }
    };
    let result = Executor::new(cost, solver)
        .configure(|state| state.max_iters(max_iterations))
        .run();
    let result = match result {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "rotation optimisation failed, keeping the initial rotation");
            return a0.clone();
        }
    };

    let state = result.state();
    let Some(best) = state.best_param.as_ref() else {
        return a0.clone();
    };
    let mut a = RotationCost { x }.rotation(best);
    if !fill_matrix(&mut a, x) {
        debug!("optimised rotation is infeasible, keeping the initial rotation");
        return a0.clone();
    }
    let optimised = m as f64 - crispness_trace(&a);
    debug!(
        initial,
        optimised,
        iterations = state.get_iter(),
        "rotation optimised"
    );
    if optimised <= initial { a } else { a0.clone() }
}
