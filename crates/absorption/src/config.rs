//! Configuration for absorption probabilities.

use std::fmt;
use std::str::FromStr;

use metastate_linalg::GmresOptions;

use crate::error::AbsorptionError;

/// Solver for the absorption system of a sparse transition matrix.
///
/// Dense matrices always use a dense LU decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AbsorptionSolver {
    /// Sparse LU decomposition of `I - Q`.
    #[default]
    Direct,
    /// Restarted GMRES, one terminal state at a time.
    Gmres,
}

impl AbsorptionSolver {
    /// Lowercase name as used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Gmres => "gmres",
        }
    }
}

impl fmt::Display for AbsorptionSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AbsorptionSolver {
    type Err = AbsorptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" | "lu" => Ok(Self::Direct),
            "gmres" => Ok(Self::Gmres),
            _ => Err(AbsorptionError::InvalidParameter {
                name: "solver",
                reason: format!("expected \"direct\" or \"gmres\", got {s:?}"),
            }),
        }
    }
}

/// Configuration for [`compute_absorption`](crate::compute_absorption).
///
/// Sparse transition matrices are solved with [`AbsorptionSolver::Direct`]
/// unless GMRES is requested; the iterative settings only apply then. Dense
/// ones are always solved directly.
///
/// # Example
///
/// ```
/// use metastate_absorption::AbsorptionConfig;
///
/// let config = AbsorptionConfig::new().with_tolerance(1e-10);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbsorptionConfig {
    solver: AbsorptionSolver,
    tolerance: f64,
    restart: usize,
    max_iterations: usize,
}

impl AbsorptionConfig {
    /// Creates a configuration with defaults.
    ///
    /// Defaults: `solver = Direct`, `tolerance = 1e-12`, `restart = 30`,
    /// `max_iterations = 10_000`.
    pub fn new() -> Self {
        let defaults = GmresOptions::default();
        Self {
            solver: AbsorptionSolver::default(),
            tolerance: defaults.tolerance,
            restart: defaults.restart,
            max_iterations: defaults.max_iterations,
        }
    }

    /// Sets the solver used for sparse transition matrices.
    pub fn with_solver(mut self, solver: AbsorptionSolver) -> Self {
        self.solver = solver;
        self
    }

    /// Sets the relative residual tolerance of GMRES.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the GMRES restart length.
    pub fn with_restart(mut self, restart: usize) -> Self {
        self.restart = restart;
        self
    }

    /// Sets the GMRES iteration budget per terminal state.
    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    // --- Accessors ---

    /// Returns the sparse solver.
    pub fn solver(&self) -> AbsorptionSolver {
        self.solver
    }

    /// Returns the relative residual tolerance.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Returns the restart length.
    pub fn restart(&self) -> usize {
        self.restart
    }

    /// Returns the iteration budget.
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Validates this configuration.
    pub fn validate(&self) -> Result<(), AbsorptionError> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(AbsorptionError::InvalidParameter {
                name: "tolerance",
                reason: format!("must be positive and finite, got {}", self.tolerance),
            });
        }
        if self.restart == 0 {
            return Err(AbsorptionError::InvalidParameter {
                name: "restart",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_iterations == 0 {
            return Err(AbsorptionError::InvalidParameter {
                name: "max_iterations",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn gmres_options(&self) -> GmresOptions {
        GmresOptions {
            tolerance: self.tolerance,
            restart: self.restart,
            max_iterations: self.max_iterations,
        }
    }
}

impl Default for AbsorptionConfig {
    fn default() -> Self {
        Self::new()
    }
}
