//! Absorption probabilities towards terminal states.

use std::collections::VecDeque;

use faer::Mat;
use faer::prelude::Solve;
use faer::sparse::{SparseColMat, Triplet};
use metastate_chain::{CommunicationClasses, Storage, TransitionMatrix};
use metastate_gpcca::TerminalStates;
use metastate_linalg::{CsrMatrix, IdentityMinus, gmres, to_array2, to_dmatrix};
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, ArrayView1};
use tracing::{debug, info};

use crate::config::{AbsorptionConfig, AbsorptionSolver};
use crate::error::AbsorptionError;
use crate::potential::{RESIDUAL_TOLERANCE, differentiation_potential};

/// Probability of every state to be absorbed in every terminal state.
#[derive(Debug, Clone)]
pub struct AbsorptionProbabilities {
    probabilities: Array2<f64>,
    names: Vec<String>,
    differentiation_potential: Array1<f64>,
}

impl AbsorptionProbabilities {
    /// Absorption probabilities (`N x T`), in `[0, 1]`.
    pub fn probabilities(&self) -> &Array2<f64> {
        &self.probabilities
    }

    /// Terminal-state names, one per column.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Normalised entropy of every row.
    pub fn differentiation_potential(&self) -> &Array1<f64> {
        &self.differentiation_potential
    }

    /// Total absorption probability of every state.
    pub fn row_sums(&self) -> Array1<f64> {
        self.probabilities.sum_axis(ndarray::Axis(1))
    }

    /// Probability of never reaching a terminal state, per state.
    pub fn residual(&self) -> Array1<f64> {
        self.row_sums().mapv(|s| (1.0 - s).max(0.0))
    }

    /// Column of the terminal state called `name`.
    pub fn get(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        let t = self.names.iter().position(|n| n == name)?;
        Some(self.probabilities.column(t))
    }
}

/// Role of a state in the absorption problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Terminal(usize),
    Trap,
    Unknown,
}

/// Computes absorption probabilities by solving `(I - Q) X = R`.
///
/// States assigned to a terminal state are absorbing. Recurrent classes that
/// contain no terminal state are traps: their states get zero rows, and
/// mass flowing into them is never absorbed. Every other state is solved
/// for, with `Q` its block of the transition matrix and `R[i, t]` its
/// one-step probability into terminal state `t`.
///
/// Dense matrices are solved by a dense LU decomposition. Sparse ones use a
/// sparse LU decomposition, or GMRES column by column when the configuration
/// asks for [`AbsorptionSolver::Gmres`].
///
/// # Errors
///
/// Returns [`AbsorptionError::NoTerminalStates`] or
/// [`AbsorptionError::StateCountMismatch`] for inconsistent inputs;
/// [`AbsorptionError::Singular`] if some state can reach neither a terminal
/// state nor a trap or the factorization breaks down;
/// [`AbsorptionError::NotConverged`] if GMRES exhausts its budget.
#[tracing::instrument(
    skip_all,
    fields(n_states = matrix.n_states(), n_terminal = terminal.n_terminal())
)]
pub fn compute_absorption(
    matrix: &TransitionMatrix,
    classes: &CommunicationClasses,
    terminal: &TerminalStates,
    config: &AbsorptionConfig,
) -> Result<AbsorptionProbabilities, AbsorptionError> {
    config.validate()?;
    let n = matrix.n_states();
    if terminal.n_terminal() == 0 {
        return Err(AbsorptionError::NoTerminalStates);
    }
    if terminal.n_states() != n {
        return Err(AbsorptionError::StateCountMismatch {
            what: "terminal states",
            expected: n,
            got: terminal.n_states(),
        });
    }
    if classes.n_states() != n {
        return Err(AbsorptionError::StateCountMismatch {
            what: "communication classes",
            expected: n,
            got: classes.n_states(),
        });
    }
    let t_count = terminal.n_terminal();
    if let Some(t) = (0..t_count).find(|&t| terminal.states_of(t).is_empty()) {
        return Err(AbsorptionError::InvalidParameter {
            name: "terminal",
            reason: format!("terminal state `{}` has no states", terminal.names()[t]),
        });
    }

    let roles = assign_roles(classes, terminal);
    check_reachability(matrix, &roles)?;

    let unknown: Vec<usize> = (0..n).filter(|&s| roles[s] == Role::Unknown).collect();
    let n_trap = roles.iter().filter(|r| **r == Role::Trap).count();
    debug!(n_unknown = unknown.len(), n_trap, "absorption problem set up");

    let mut probabilities = Array2::<f64>::zeros((n, t_count));
    for (s, role) in roles.iter().enumerate() {
        if let Role::Terminal(t) = role {
            probabilities[[s, *t]] = 1.0;
        }
    }

    if !unknown.is_empty() {
        let rhs = one_step_into_terminal(matrix, &unknown, &roles, t_count);
        let q = matrix.storage().submatrix(&unknown, &unknown)?;
        let solution = match (&q, config.solver()) {
            (Storage::Dense(a), _) => solve_direct(a, &rhs)?,
            (Storage::Sparse(a), AbsorptionSolver::Direct) => solve_sparse_direct(a, &rhs)?,
            (Storage::Sparse(_), AbsorptionSolver::Gmres) => solve_iterative(&q, &rhs, config)?,
        };
        for (i, &s) in unknown.iter().enumerate() {
            for t in 0..t_count {
                probabilities[[s, t]] = solution[[i, t]].clamp(0.0, 1.0);
            }
        }
    }

    let potential = differentiation_potential(&probabilities);
    let trapped = probabilities
        .rows()
        .into_iter()
        .filter(|row| 1.0 - row.sum() > RESIDUAL_TOLERANCE)
        .count();
    info!(
        n_unknown = unknown.len(),
        n_partially_absorbed = trapped,
        "computed absorption probabilities"
    );

    Ok(AbsorptionProbabilities {
        probabilities,
        names: terminal.names().to_vec(),
        differentiation_potential: potential,
    })
}

fn assign_roles(classes: &CommunicationClasses, terminal: &TerminalStates) -> Vec<Role> {
    let mut roles: Vec<Role> = terminal
        .assignment()
        .iter()
        .map(|a| a.map_or(Role::Unknown, Role::Terminal))
        .collect();
    for class in classes.recurrent_classes() {
        let holds_terminal = class.iter().any(|&s| matches!(roles[s], Role::Terminal(_)));
        if !holds_terminal {
            for &s in class {
                roles[s] = Role::Trap;
            }
        }
    }
    roles
}

// Every unknown state must reach a terminal state or a trap, otherwise
// `I - Q` is singular.
fn check_reachability(matrix: &TransitionMatrix, roles: &[Role]) -> Result<(), AbsorptionError> {
    let n = roles.len();
    let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
    for i in 0..n {
        for j in matrix.successors(i) {
            predecessors[j].push(i);
        }
    }
    let mut reached = vec![false; n];
    let mut queue: VecDeque<usize> = VecDeque::new();
    for (s, role) in roles.iter().enumerate() {
        if *role != Role::Unknown {
            reached[s] = true;
            queue.push_back(s);
        }
    }
    while let Some(s) = queue.pop_front() {
        for &p in &predecessors[s] {
            if !reached[p] {
                reached[p] = true;
                queue.push_back(p);
            }
        }
    }
    let stranded: Vec<usize> = (0..n).filter(|&s| !reached[s]).collect();
    match stranded.first() {
        None => Ok(()),
        Some(first) => Err(AbsorptionError::Singular {
            reason: format!(
                "{} state(s) cannot reach a terminal state or a recurrent class, first is {first}",
                stranded.len()
            ),
        }),
    }
}

fn one_step_into_terminal(
    matrix: &TransitionMatrix,
    unknown: &[usize],
    roles: &[Role],
    t_count: usize,
) -> Array2<f64> {
    let mut rhs = Array2::<f64>::zeros((unknown.len(), t_count));
    for (i, &s) in unknown.iter().enumerate() {
        for (j, v) in matrix.row(s) {
            if let Role::Terminal(t) = roles[j] {
                rhs[[i, t]] += v;
            }
        }
    }
    rhs
}

fn solve_direct(q: &Array2<f64>, rhs: &Array2<f64>) -> Result<Array2<f64>, AbsorptionError> {
    let m = q.nrows();
    let a = DMatrix::<f64>::identity(m, m) - to_dmatrix(q);
    let lu = a.lu();
    if !lu.is_invertible() {
        return Err(AbsorptionError::Singular {
            reason: "LU decomposition of I - Q is singular".to_string(),
        });
    }
    let x = lu
        .solve(&to_dmatrix(rhs))
        .ok_or_else(|| AbsorptionError::Singular {
            reason: "LU solve of I - Q failed".to_string(),
        })?;
    if x.iter().any(|v| !v.is_finite()) {
        return Err(AbsorptionError::Singular {
            reason: "LU solve of I - Q produced non-finite values".to_string(),
        });
    }
    Ok(to_array2(&x))
}

fn solve_sparse_direct(q: &CsrMatrix, rhs: &Array2<f64>) -> Result<Array2<f64>, AbsorptionError> {
    let m = q.nrows();
    let mut triplets = Vec::with_capacity(q.nnz() + m);
    for i in 0..m {
        let mut diagonal = 1.0;
        for (j, v) in q.row(i) {
            if j == i {
                diagonal -= v;
            } else {
                triplets.push(Triplet::new(i, j, -v));
            }
        }
        triplets.push(Triplet::new(i, i, diagonal));
    }
    let a = SparseColMat::<usize, f64>::try_new_from_triplets(m, m, &triplets).map_err(|e| {
        AbsorptionError::Singular {
            reason: format!("cannot assemble I - Q: {e:?}"),
        }
    })?;
    let lu = a.as_ref().sp_lu().map_err(|e| AbsorptionError::Singular {
        reason: format!("sparse LU decomposition of I - Q failed: {e:?}"),
    })?;
    let b = Mat::<f64>::from_fn(m, rhs.ncols(), |i, j| rhs[[i, j]]);
    let x = lu.solve(b.as_ref());
    let out = Array2::from_shape_fn(rhs.dim(), |(i, j)| x[(i, j)]);
    if out.iter().any(|v| !v.is_finite()) {
        return Err(AbsorptionError::Singular {
            reason: "sparse LU solve of I - Q produced non-finite values".to_string(),
        });
    }
    debug!(n_unknown = m, nnz = triplets.len(), "sparse LU solve done");
    Ok(out)
}

fn solve_iterative(
    q: &Storage,
    rhs: &Array2<f64>,
    config: &AbsorptionConfig,
) -> Result<Array2<f64>, AbsorptionError> {
    let op = IdentityMinus(q);
    let options = config.gmres_options();
    let mut out = Array2::<f64>::zeros(rhs.dim());
    for (t, column) in rhs.columns().into_iter().enumerate() {
        let b: Vec<f64> = column.to_vec();
        let solution = gmres(&op, &b, None, &options)?;
        debug!(
            terminal = t,
            iterations = solution.iterations,
            relative_residual = solution.relative_residual,
            "GMRES converged"
        );
        for (dst, v) in out.column_mut(t).iter_mut().zip(&solution.x) {
            *dst = *v;
        }
    }
    Ok(out)
}
