//! Configuration for macrostate extraction and terminal-state selection.

use crate::error::GpccaError;

/// Configuration for [`compute_memberships`](crate::compute_memberships).
///
/// # Example
///
/// ```
/// use metastate_gpcca::MembershipConfig;
///
/// let config = MembershipConfig::new(3).with_max_iterations(500);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipConfig {
    n_macrostates: usize,
    max_iterations: u64,
    n_cells: usize,
    optimize: bool,
}

impl MembershipConfig {
    /// Creates a configuration for `n_macrostates` macrostates.
    ///
    /// Defaults: `max_iterations = 2000`, `n_cells = 30`, `optimize = true`.
    pub fn new(n_macrostates: usize) -> Self {
        Self {
            n_macrostates,
            max_iterations: 2000,
            n_cells: 30,
            optimize: true,
        }
    }

    /// Sets the Nelder-Mead iteration budget.
    pub fn with_max_iterations(mut self, n: u64) -> Self {
        self.max_iterations = n;
        self
    }

    /// Sets how many states per macrostate are used for naming.
    pub fn with_n_cells(mut self, n: usize) -> Self {
        self.n_cells = n;
        self
    }

    /// Enables or disables the rotation optimisation.
    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    // --- Accessors ---

    /// Returns the number of macrostates.
    pub fn n_macrostates(&self) -> usize {
        self.n_macrostates
    }

    /// Returns the Nelder-Mead iteration budget.
    pub fn max_iterations(&self) -> u64 {
        self.max_iterations
    }

    /// Returns the number of states per macrostate used for naming.
    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    /// Returns `true` when the rotation is optimised.
    pub fn optimize(&self) -> bool {
        self.optimize
    }

    /// Validates this configuration without reference to a decomposition.
    pub fn validate(&self) -> Result<(), GpccaError> {
        if self.n_macrostates < 2 {
            return Err(GpccaError::InvalidParameter {
                name: "n_macrostates",
                reason: format!("must be at least 2, got {}", self.n_macrostates),
            });
        }
        if self.n_cells == 0 {
            return Err(GpccaError::InvalidParameter {
                name: "n_cells",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self::new(2)
    }
}

/// How terminal states are chosen.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalSelection {
    /// The `eigengap + 1` macrostates with the largest coarse
    /// self-transition probability.
    Eigengap,
    /// The `n` macrostates with the largest coarse self-transition
    /// probability.
    TopN(usize),
    /// Explicit macrostates by name or index. An entry such as
    /// `"Alpha, Beta"` merges several macrostates into one terminal state.
    Macrostates(Vec<String>),
    /// Per-state category labels; `None` marks states outside every
    /// terminal state.
    Categories(Vec<Option<String>>),
}

/// How states are assigned to macrostates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssignmentRule {
    /// Each state goes to its largest membership, or nowhere when that
    /// membership is below `threshold`.
    Argmax {
        /// Minimum membership for an assignment.
        threshold: f64,
    },
    /// Each macrostate claims its `n_cells` highest-membership states.
    TopN {
        /// States claimed per macrostate.
        n_cells: usize,
    },
}

impl AssignmentRule {
    /// Validates this rule.
    pub fn validate(&self) -> Result<(), GpccaError> {
        match *self {
            Self::Argmax { threshold } if !(0.0..=1.0).contains(&threshold) => {
                Err(GpccaError::InvalidParameter {
                    name: "threshold",
                    reason: format!("must be in [0, 1], got {threshold}"),
                })
            }
            Self::TopN { n_cells: 0 } => Err(GpccaError::InvalidParameter {
                name: "n_cells",
                reason: "must be at least 1".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

impl Default for AssignmentRule {
    fn default() -> Self {
        Self::TopN { n_cells: 30 }
    }
}
