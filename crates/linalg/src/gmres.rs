//! Restarted GMRES for non-symmetric linear systems.

use tracing::debug;

use crate::error::LinalgError;
use crate::operator::LinearOperator;

/// Options for [`gmres`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GmresOptions {
    /// Relative residual tolerance `||b - A x|| <= tolerance * ||b||`.
    pub tolerance: f64,
    /// Krylov subspace size between restarts.
    pub restart: usize,
    /// Total number of operator applications allowed.
    pub max_iterations: usize,
}

impl Default for GmresOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-12,
            restart: 30,
            max_iterations: 10_000,
        }
    }
}

/// Solution returned by [`gmres`].
#[derive(Debug, Clone)]
pub struct GmresSolution {
    /// Approximate solution.
    pub x: Vec<f64>,
    /// Operator applications used.
    pub iterations: usize,
    /// Final relative residual.
    pub relative_residual: f64,
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// Solves `A x = b` with restarted GMRES.
///
/// # Errors
///
/// Returns [`LinalgError::DimensionMismatch`] for vectors of the wrong
/// length, [`LinalgError::Singular`] when the least-squares problem becomes
/// rank deficient before the tolerance is met, and
/// [`LinalgError::NotConverged`] when `max_iterations` is exhausted.
pub fn gmres<A: LinearOperator + ?Sized>(
    op: &A,
    b: &[f64],
    x0: Option<&[f64]>,
    options: &GmresOptions,
) -> Result<GmresSolution, LinalgError> {
    let n = op.dim();
    if b.len() != n {
        return Err(LinalgError::DimensionMismatch {
            expected: n,
            got: b.len(),
        });
    }
    let mut x = match x0 {
        Some(x0) if x0.len() != n => {
            return Err(LinalgError::DimensionMismatch {
                expected: n,
                got: x0.len(),
            });
        }
        Some(x0) => x0.to_vec(),
        None => vec![0.0; n],
    };

    let b_norm = norm(b);
    if b_norm == 0.0 {
        return Ok(GmresSolution {
            x: vec![0.0; n],
            iterations: 0,
            relative_residual: 0.0,
        });
    }

    let restart = options.restart.max(1);
    let mut total = 0;
    let mut ax = vec![0.0; n];

    loop {
        op.apply(&x, &mut ax);
        let r: Vec<f64> = b.iter().zip(&ax).map(|(bi, ai)| bi - ai).collect();
        let beta = norm(&r);
        if beta <= options.tolerance * b_norm {
            debug!(iterations = total, residual = beta / b_norm, "GMRES converged");
            return Ok(GmresSolution {
                x,
                iterations: total,
                relative_residual: beta / b_norm,
            });
        }
        if total >= options.max_iterations {
            return Err(LinalgError::NotConverged {
                method: "GMRES",
                iterations: total,
            });
        }

        let mut basis: Vec<Vec<f64>> = Vec::with_capacity(restart + 1);
        basis.push(r.iter().map(|v| v / beta).collect());
        // Column-major upper Hessenberg matrix, rotated in place.
        let mut h: Vec<Vec<f64>> = Vec::with_capacity(restart);
        let mut cs: Vec<f64> = Vec::with_capacity(restart);
        let mut sn: Vec<f64> = Vec::with_capacity(restart);
        let mut g = vec![0.0; restart + 1];
        g[0] = beta;
        let mut steps = 0;

        for j in 0..restart {
            let mut w = vec![0.0; n];
            op.apply(&basis[j], &mut w);
            total += 1;

            let mut col = vec![0.0; j + 2];
            for (i, v) in basis.iter().enumerate() {
                let hij = dot(&w, v);
                col[i] = hij;
                for (wk, vk) in w.iter_mut().zip(v) {
                    *wk -= hij * vk;
                }
            }
            let h_next = norm(&w);
            col[j + 1] = h_next;

            for i in 0..j {
                let temp = cs[i] * col[i] + sn[i] * col[i + 1];
                col[i + 1] = -sn[i] * col[i] + cs[i] * col[i + 1];
                col[i] = temp;
            }
            let denom = col[j].hypot(col[j + 1]);
            let (c, s) = if denom == 0.0 {
                (1.0, 0.0)
            } else {
                (col[j] / denom, col[j + 1] / denom)
            };
            col[j] = denom;
            col[j + 1] = 0.0;
            cs.push(c);
            sn.push(s);
            g[j + 1] = -s * g[j];
            g[j] *= c;

            h.push(col);
            steps = j + 1;

            let lucky = h_next <= f64::EPSILON * beta;
            if !lucky {
                basis.push(w.iter().map(|v| v / h_next).collect());
            }
            if g[j + 1].abs() <= options.tolerance * b_norm
                || lucky
                || total >= options.max_iterations
            {
                break;
            }
        }

        // Back-substitution on the triangular factor.
        let mut y = vec![0.0; steps];
        for i in (0..steps).rev() {
            let mut s = g[i];
            for l in (i + 1)..steps {
                s -= h[l][i] * y[l];
            }
            let diag = h[i][i];
            if diag.abs() <= f64::EPSILON * beta {
                return Err(LinalgError::Singular);
            }
            y[i] = s / diag;
        }
        for (i, yi) in y.iter().enumerate() {
            for (xk, vk) in x.iter_mut().zip(&basis[i]) {
                *xk += yi * vk;
            }
        }
    }
}
