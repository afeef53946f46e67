//! Configuration for eigen- and Schur decompositions.

use std::fmt;
use std::str::FromStr;

use metastate_chain::validate_distribution;
use metastate_linalg::{KrylovOptions, Which};
use ndarray::Array1;

use crate::eigengap::validate_alpha;
use crate::error::SpectralError;

/// Configuration for [`eigendecompose`](crate::eigendecompose).
///
/// # Example
///
/// ```
/// use metastate_linalg::Which;
/// use metastate_spectral::EigenConfig;
///
/// let config = EigenConfig::new()
///     .with_k(10)
///     .with_which(Which::LargestMagnitude);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EigenConfig {
    k: usize,
    which: Which,
    alpha: f64,
    only_eigenvalues: bool,
    krylov: KrylovOptions,
}

impl EigenConfig {
    /// Creates a configuration with defaults.
    ///
    /// Defaults: `k = 20`, `which = LargestReal`, `alpha = 1.0`,
    /// `only_eigenvalues = false`, default [`KrylovOptions`].
    pub fn new() -> Self {
        Self {
            k: 20,
            which: Which::LargestReal,
            alpha: 1.0,
            only_eigenvalues: false,
            krylov: KrylovOptions::new(),
        }
    }

    /// Sets the number of eigenvalues to compute.
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Sets the ordering criterion.
    pub fn with_which(mut self, which: Which) -> Self {
        self.which = which;
        self
    }

    /// Sets the eigengap weight.
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Skips eigenvectors and the stationary distribution.
    pub fn with_only_eigenvalues(mut self, only: bool) -> Self {
        self.only_eigenvalues = only;
        self
    }

    /// Sets the Krylov subspace size used for sparse matrices.
    pub fn with_krylov_dim(mut self, dim: usize) -> Self {
        self.krylov = self.krylov.with_krylov_dim(dim);
        self
    }

    /// Replaces the Krylov iteration options.
    pub fn with_krylov(mut self, krylov: KrylovOptions) -> Self {
        self.krylov = krylov;
        self
    }

    // --- Accessors ---

    /// Returns the number of eigenvalues requested.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Returns the ordering criterion.
    pub fn which(&self) -> Which {
        self.which
    }

    /// Returns the eigengap weight.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Returns `true` when only eigenvalues are computed.
    pub fn only_eigenvalues(&self) -> bool {
        self.only_eigenvalues
    }

    /// Returns the Krylov iteration options.
    pub fn krylov(&self) -> &KrylovOptions {
        &self.krylov
    }

    /// Validates this configuration.
    ///
    /// Checks that `k >= 1`, that `alpha` is finite and non-negative and
    /// that the Krylov options are valid.
    pub fn validate(&self) -> Result<(), SpectralError> {
        if self.k == 0 {
            return Err(SpectralError::InvalidParameter {
                name: "k",
                reason: "must be at least 1".to_string(),
            });
        }
        validate_alpha(self.alpha)?;
        self.krylov.validate()?;
        Ok(())
    }
}

impl Default for EigenConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// How the Schur vectors are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SchurMethod {
    /// Krylov-Schur iteration for a partial form; suited to large sparse
    /// matrices.
    #[default]
    Krylov,
    /// Full dense ordered Schur decomposition, truncated.
    Direct,
}

impl SchurMethod {
    /// Short name used in configuration files and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Krylov => "krylov",
            Self::Direct => "direct",
        }
    }
}

impl fmt::Display for SchurMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchurMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "krylov" => Ok(Self::Krylov),
            "direct" | "brandts" => Ok(Self::Direct),
            other => Err(format!(
                "unknown Schur method '{other}' (expected 'krylov' or 'direct')"
            )),
        }
    }
}

/// Configuration for [`schur_decompose`](crate::schur_decompose).
///
/// # Example
///
/// ```
/// use metastate_spectral::{SchurConfig, SchurMethod};
///
/// let config = SchurConfig::new()
///     .with_n_components(5)
///     .with_method(SchurMethod::Direct);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SchurConfig {
    n_components: usize,
    initial_distribution: Option<Array1<f64>>,
    method: SchurMethod,
    which: Which,
    alpha: f64,
    krylov: KrylovOptions,
}

impl SchurConfig {
    /// Creates a configuration with defaults.
    ///
    /// Defaults: `n_components = 10`, uniform initial distribution,
    /// `method = Krylov`, `which = LargestMagnitude`, `alpha = 1.0`,
    /// default [`KrylovOptions`].
    pub fn new() -> Self {
        Self {
            n_components: 10,
            initial_distribution: None,
            method: SchurMethod::Krylov,
            which: Which::LargestMagnitude,
            alpha: 1.0,
            krylov: KrylovOptions::new(),
        }
    }

    /// Sets the number of Schur vectors.
    pub fn with_n_components(mut self, n: usize) -> Self {
        self.n_components = n;
        self
    }

    /// Sets the initial distribution `eta` used to weight the matrix.
    pub fn with_initial_distribution(mut self, eta: Array1<f64>) -> Self {
        self.initial_distribution = Some(eta);
        self
    }

    /// Sets the decomposition method.
    pub fn with_method(mut self, method: SchurMethod) -> Self {
        self.method = method;
        self
    }

    /// Sets the ordering criterion.
    pub fn with_which(mut self, which: Which) -> Self {
        self.which = which;
        self
    }

    /// Sets the eigengap weight.
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Replaces the Krylov iteration options.
    pub fn with_krylov(mut self, krylov: KrylovOptions) -> Self {
        self.krylov = krylov;
        self
    }

    // --- Accessors ---

    /// Returns the requested number of Schur vectors.
    pub fn n_components(&self) -> usize {
        self.n_components
    }

    /// Returns the initial distribution, if one was set.
    pub fn initial_distribution(&self) -> Option<&Array1<f64>> {
        self.initial_distribution.as_ref()
    }

    /// Returns the decomposition method.
    pub fn method(&self) -> SchurMethod {
        self.method
    }

    /// Returns the ordering criterion.
    pub fn which(&self) -> Which {
        self.which
    }

    /// Returns the eigengap weight.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Returns the Krylov iteration options.
    pub fn krylov(&self) -> &KrylovOptions {
        &self.krylov
    }

    /// Validates this configuration without reference to a matrix.
    ///
    /// Checks that `n_components >= 2`, `alpha` and the Krylov options.
    /// The initial distribution is checked against the matrix size by
    /// [`SchurConfig::validate_for`].
    pub fn validate(&self) -> Result<(), SpectralError> {
        if self.n_components < 2 {
            return Err(SpectralError::InvalidParameter {
                name: "n_components",
                reason: format!("must be at least 2, got {}", self.n_components),
            });
        }
        validate_alpha(self.alpha)?;
        self.krylov.validate()?;
        Ok(())
    }

    /// Validates this configuration for a chain with `n_states` states.
    pub fn validate_for(&self, n_states: usize) -> Result<(), SpectralError> {
        self.validate()?;
        if let Some(eta) = &self.initial_distribution {
            validate_distribution(eta, n_states)?;
        }
        if self.method == SchurMethod::Krylov && self.n_components >= n_states {
            return Err(SpectralError::InvalidParameter {
                name: "n_components",
                reason: format!(
                    "the Krylov method needs fewer than {n_states} components, got {}; use the direct method",
                    self.n_components
                ),
            });
        }
        Ok(())
    }
}

impl Default for SchurConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn eigen_defaults() {
        let c = EigenConfig::new();
        assert_eq!(c.k(), 20);
        assert_eq!(c.which(), Which::LargestReal);
        assert_eq!(c.alpha(), 1.0);
        assert!(!c.only_eigenvalues());
        assert_eq!(c.krylov().krylov_dim(), None);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn eigen_zero_k_rejected() {
        let err = EigenConfig::new().with_k(0).validate().unwrap_err();
        assert!(matches!(err, SpectralError::InvalidParameter { name: "k", .. }));
    }

    #[test]
    fn eigen_negative_alpha_rejected() {
        assert!(EigenConfig::new().with_alpha(-1.0).validate().is_err());
    }

    #[test]
    fn schur_defaults() {
        let c = SchurConfig::default();
        assert_eq!(c.n_components(), 10);
        assert_eq!(c.method(), SchurMethod::Krylov);
        assert_eq!(c.which(), Which::LargestMagnitude);
        assert!(c.initial_distribution().is_none());
    }

    #[test]
    fn schur_one_component_rejected() {
        let err = SchurConfig::new().with_n_components(1).validate().unwrap_err();
        assert!(matches!(
            err,
            SpectralError::InvalidParameter {
                name: "n_components",
                ..
            }
        ));
    }

    #[test]
    fn schur_krylov_needs_fewer_components_than_states() {
        let c = SchurConfig::new().with_n_components(5);
        assert!(c.validate_for(6).is_ok());
        assert!(c.validate_for(5).is_err());
        assert!(c.with_method(SchurMethod::Direct).validate_for(5).is_ok());
    }

    #[test]
    fn schur_distribution_checked() {
        let c = SchurConfig::new()
            .with_n_components(2)
            .with_method(SchurMethod::Direct)
            .with_initial_distribution(array![0.5, 0.5, 0.0]);
        assert!(matches!(c.validate_for(3), Err(SpectralError::Chain(_))));
    }

    #[test]
    fn method_parsing() {
        assert_eq!("krylov".parse::<SchurMethod>(), Ok(SchurMethod::Krylov));
        assert_eq!("Brandts".parse::<SchurMethod>(), Ok(SchurMethod::Direct));
        assert!("qr".parse::<SchurMethod>().is_err());
        assert_eq!(SchurMethod::Direct.to_string(), "direct");
    }
}
