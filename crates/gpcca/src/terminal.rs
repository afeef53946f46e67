//! Terminal-state selection from macrostates or explicit categories.

use metastate_chain::ChainError;
use ndarray::{Array2, Axis};
use tracing::{info, warn};

use crate::coarse::CoarseTransitionMatrix;
use crate::config::{AssignmentRule, TerminalSelection};
use crate::error::GpccaError;
use crate::membership::MacrostateMembership;
use crate::naming::top_states;

/// Terminal states with per-state memberships and a hard assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalStates {
    names: Vec<String>,
    memberships: Array2<f64>,
    assignment: Vec<Option<usize>>,
    macrostates: Vec<Vec<usize>>,
}

impl TerminalStates {
    /// Builds terminal states from explicit groups of states, one group per
    /// name. Memberships are one-hot.
    ///
    /// # Errors
    ///
    /// Returns [`GpccaError::InvalidParameter`] if names and groups differ in
    /// count, a name repeats, a group is empty or a state appears in two
    /// groups; [`GpccaError::Chain`] for a state outside `0..n_states`.
    pub fn from_groups(
        n_states: usize,
        names: Vec<String>,
        groups: Vec<Vec<usize>>,
    ) -> Result<Self, GpccaError> {
        if names.len() != groups.len() {
            return Err(GpccaError::InvalidParameter {
                name: "names",
                reason: format!("{} names for {} groups", names.len(), groups.len()),
            });
        }
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(GpccaError::InvalidParameter {
                    name: "names",
                    reason: format!("terminal state `{name}` is given twice"),
                });
            }
        }
        let mut assignment = vec![None; n_states];
        for (t, group) in groups.iter().enumerate() {
            if group.is_empty() {
                return Err(GpccaError::InvalidParameter {
                    name: "groups",
                    reason: format!("terminal state `{}` has no states", names[t]),
                });
            }
            for &s in group {
                let slot = assignment
                    .get_mut(s)
                    .ok_or(ChainError::StateOutOfRange { state: s, n_states })?;
                if let Some(other) = *slot {
                    if other != t {
                        return Err(GpccaError::InvalidParameter {
                            name: "groups",
                            reason: format!(
                                "state {s} belongs to both `{}` and `{}`",
                                names[other], names[t]
                            ),
                        });
                    }
                }
                *slot = Some(t);
            }
        }
        let memberships = one_hot(&assignment, names.len());
        Ok(Self {
            macrostates: vec![Vec::new(); names.len()],
            names,
            memberships,
            assignment,
        })
    }

    /// Builds terminal states from per-state categories; `None` marks states
    /// outside every terminal state. Names are ordered by first appearance.
    pub fn from_categories(categories: &[Option<String>]) -> Self {
        let mut names: Vec<String> = Vec::new();
        let assignment: Vec<Option<usize>> = categories
            .iter()
            .map(|c| {
                c.as_ref().map(|c| match names.iter().position(|n| n == c) {
                    Some(t) => t,
                    None => {
                        names.push(c.clone());
                        names.len() - 1
                    }
                })
            })
            .collect();
        let memberships = one_hot(&assignment, names.len());
        Self {
            macrostates: vec![Vec::new(); names.len()],
            names,
            memberships,
            assignment,
        }
    }

    /// Terminal-state names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Membership of every state in every terminal state (`N x T`).
    pub fn memberships(&self) -> &Array2<f64> {
        &self.memberships
    }

    /// Terminal state of every state, if any.
    pub fn assignment(&self) -> &[Option<usize>] {
        &self.assignment
    }

    /// Source macrostates of every terminal state; empty when defined
    /// directly on states.
    pub fn macrostates(&self) -> &[Vec<usize>] {
        &self.macrostates
    }

    /// States assigned to terminal state `t`, in increasing order.
    pub fn states_of(&self, t: usize) -> Vec<usize> {
        self.assignment
            .iter()
            .enumerate()
            .filter_map(|(s, a)| (*a == Some(t)).then_some(s))
            .collect()
    }

    /// Number of terminal states.
    pub fn n_terminal(&self) -> usize {
        self.names.len()
    }

    /// Number of states.
    pub fn n_states(&self) -> usize {
        self.assignment.len()
    }

    /// Position of the terminal state called `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

fn one_hot(assignment: &[Option<usize>], n_terminal: usize) -> Array2<f64> {
    let mut out = Array2::zeros((assignment.len(), n_terminal));
    for (s, a) in assignment.iter().enumerate() {
        if let Some(t) = a {
            out[[s, *t]] = 1.0;
        }
    }
    out
}

/// Assigns every state to the column of its largest membership, ties to the
/// lower index; `None` when that membership is below `threshold`.
pub fn hard_assign(memberships: &Array2<f64>, threshold: f64) -> Vec<Option<usize>> {
    memberships
        .rows()
        .into_iter()
        .map(|row| {
            let mut best: Option<(usize, f64)> = None;
            for (j, &v) in row.iter().enumerate() {
                if best.is_none_or(|(_, b)| v > b) {
                    best = Some((j, v));
                }
            }
            best.filter(|&(_, v)| v >= threshold).map(|(j, _)| j)
        })
        .collect()
}

/// Lets every column claim its `n_cells` highest-membership states. A state
/// claimed by several columns goes to the one with the larger membership,
/// ties to the lower index.
pub fn top_n_assign(memberships: &Array2<f64>, n_cells: usize) -> Vec<Option<usize>> {
    let mut assignment: Vec<Option<usize>> = vec![None; memberships.nrows()];
    for (j, column) in memberships.axis_iter(Axis(1)).enumerate() {
        for s in top_states(column, n_cells) {
            match assignment[s] {
                Some(k) if memberships[[s, k]] >= memberships[[s, j]] => {}
                _ => assignment[s] = Some(j),
            }
        }
    }
    assignment
}

/// Chooses terminal states among the macrostates, or directly from
/// per-state categories.
///
/// States are first assigned to macrostates by `rule` over all macrostates;
/// a state then belongs to a terminal state if its macrostate was selected.
///
/// # Errors
///
/// Returns [`GpccaError::InvalidParameter`] for an invalid rule, a count
/// outside `1..=m`, an empty or repeating macrostate list, or mismatched
/// inputs; [`GpccaError::UnknownMacrostate`] for a name that does not
/// exist; [`GpccaError::Chain`] if categories do not cover every state.
#[tracing::instrument(skip_all, fields(n_macrostates = membership.n_macrostates()))]
pub fn select_terminal(
    coarse: &CoarseTransitionMatrix,
    membership: &MacrostateMembership,
    eigengap: usize,
    selection: &TerminalSelection,
    rule: AssignmentRule,
) -> Result<TerminalStates, GpccaError> {
    rule.validate()?;
    let m = membership.n_macrostates();
    if coarse.n_macrostates() != m {
        return Err(GpccaError::InvalidParameter {
            name: "coarse",
            reason: format!(
                "coarse matrix has {} macrostates, memberships have {m}",
                coarse.n_macrostates()
            ),
        });
    }

    let groups = match selection {
        TerminalSelection::Categories(categories) => {
            let n = membership.n_states();
            if categories.len() != n {
                return Err(ChainError::LabelLengthMismatch {
                    n_states: n,
                    n_labels: categories.len(),
                }
                .into());
            }
            let terminal = TerminalStates::from_categories(categories);
            info!(n_terminal = terminal.n_terminal(), "terminal states set from categories");
            return Ok(terminal);
        }
        TerminalSelection::Eigengap => {
            let mut n = eigengap + 1;
            if n > m {
                warn!(
                    eigengap,
                    n_macrostates = m,
                    "eigengap suggests more terminal states than macrostates, using all macrostates"
                );
                n = m;
            }
            most_stable(coarse, n)
        }
        TerminalSelection::TopN(n) => {
            if *n == 0 || *n > m {
                return Err(GpccaError::InvalidParameter {
                    name: "n_terminal",
                    reason: format!("must be in 1..={m}, got {n}"),
                });
            }
            most_stable(coarse, *n)
        }
        TerminalSelection::Macrostates(entries) => resolve_entries(membership, entries)?,
    };

    let chi = membership.memberships();
    let base = match rule {
        AssignmentRule::Argmax { threshold } => hard_assign(chi, threshold),
        AssignmentRule::TopN { n_cells } => top_n_assign(chi, n_cells),
    };
    let mut terminal_of = vec![None; m];
    for (t, group) in groups.iter().enumerate() {
        for &k in group {
            terminal_of[k] = Some(t);
        }
    }
    let assignment: Vec<Option<usize>> = base
        .into_iter()
        .map(|k| k.and_then(|k| terminal_of[k]))
        .collect();

    let mut memberships = Array2::zeros((chi.nrows(), groups.len()));
    for (t, group) in groups.iter().enumerate() {
        let mut col = memberships.column_mut(t);
        for &k in group {
            col += &chi.column(k);
        }
    }

    let names: Vec<String> = groups
        .iter()
        .map(|group| {
            group
                .iter()
                .map(|&k| membership.names()[k].as_str())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .collect();
    info!(names = ?names, "selected terminal states");

    Ok(TerminalStates {
        names,
        memberships,
        assignment,
        macrostates: groups,
    })
}

// The `n` macrostates with the largest self-transition probability, in
// macrostate order.
fn most_stable(coarse: &CoarseTransitionMatrix, n: usize) -> Vec<Vec<usize>> {
    let diag = coarse.diagonal();
    let mut chosen = top_states(diag.view(), n);
    chosen.sort_unstable();
    chosen.into_iter().map(|k| vec![k]).collect()
}

fn resolve_entries(
    membership: &MacrostateMembership,
    entries: &[String],
) -> Result<Vec<Vec<usize>>, GpccaError> {
    if entries.is_empty() {
        return Err(GpccaError::InvalidParameter {
            name: "macrostates",
            reason: "no macrostates given".to_string(),
        });
    }
    let m = membership.n_macrostates();
    let mut used = vec![false; m];
    let mut groups = Vec::with_capacity(entries.len());
    for entry in entries {
        let mut group = Vec::new();
        for part in entry.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let k = membership
                .position(part)
                .or_else(|| part.parse::<usize>().ok().filter(|&k| k < m))
                .ok_or_else(|| GpccaError::UnknownMacrostate {
                    name: part.to_string(),
                })?;
            if used[k] {
                return Err(GpccaError::InvalidParameter {
                    name: "macrostates",
                    reason: format!("macrostate `{part}` is used twice"),
                });
            }
            used[k] = true;
            group.push(k);
        }
        if group.is_empty() {
            return Err(GpccaError::InvalidParameter {
                name: "macrostates",
                reason: format!("entry `{entry}` names no macrostate"),
            });
        }
        groups.push(group);
    }
    Ok(groups)
}
