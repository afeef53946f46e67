use std::path::PathBuf;

use serde::Deserialize;

/// Top-level metastate configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetastateConfig {
    /// Estimator driving the run (`"gpcca"` or `"exact"`).
    #[serde(default = "default_estimator")]
    pub estimator: String,

    /// I/O settings.
    #[serde(default)]
    pub io: IoConfig,

    /// Eigendecomposition settings.
    #[serde(default)]
    pub eigen: EigenToml,

    /// Schur decomposition settings.
    #[serde(default)]
    pub schur: SchurToml,

    /// Macrostate settings.
    #[serde(default)]
    pub macrostates: MacrostatesToml,

    /// Terminal-state settings.
    #[serde(default)]
    pub terminal: TerminalToml,

    /// Absorption solver settings.
    #[serde(default)]
    pub absorption: AbsorptionToml,
}

fn default_estimator() -> String {
    "gpcca".to_string()
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct IoConfig {
    /// Transition matrix, dense text or `# sparse N` coordinate text.
    pub matrix: Option<PathBuf>,
    /// One label per state, one per line.
    pub labels: Option<PathBuf>,
    /// JSON report; stdout when unset.
    pub output: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EigenToml {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_which")]
    pub which: String,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

impl Default for EigenToml {
    fn default() -> Self {
        Self {
            k: default_k(),
            which: default_which(),
            alpha: default_alpha(),
        }
    }
}

fn default_k() -> usize {
    20
}
fn default_which() -> String {
    "LR".to_string()
}
fn default_alpha() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchurToml {
    /// Schur vectors to compute; one more than the macrostate count when
    /// unset.
    #[serde(default)]
    pub n_components: Option<usize>,
    /// `"auto"` (direct for dense, Krylov for sparse), `"krylov"` or
    /// `"direct"`.
    #[serde(default = "default_method")]
    pub method: String,
    /// Initial distribution over the states; uniform when unset.
    #[serde(default)]
    pub initial_distribution: Option<Vec<f64>>,
}

impl Default for SchurToml {
    fn default() -> Self {
        Self {
            n_components: None,
            method: default_method(),
            initial_distribution: None,
        }
    }
}

fn default_method() -> String {
    "auto".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MacrostatesToml {
    /// Number of macrostates; `eigengap + 1` when unset.
    #[serde(default)]
    pub n_macrostates: Option<usize>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u64,
    #[serde(default = "default_n_cells")]
    pub n_cells: usize,
    #[serde(default = "default_true")]
    pub optimize: bool,
}

impl Default for MacrostatesToml {
    fn default() -> Self {
        Self {
            n_macrostates: None,
            max_iterations: default_max_iterations(),
            n_cells: default_n_cells(),
            optimize: true,
        }
    }
}

fn default_max_iterations() -> u64 {
    2000
}
fn default_n_cells() -> usize {
    30
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TerminalToml {
    /// `"eigengap"`, `"top_n"`, `"macrostates"` or `"categories"`.
    #[serde(default = "default_selection")]
    pub method: String,
    /// Count for `"top_n"`.
    #[serde(default)]
    pub n: Option<usize>,
    /// Names for `"macrostates"`; `"A, B"` merges two macrostates.
    #[serde(default)]
    pub names: Vec<String>,
    /// Per-state category file for `"categories"`.
    #[serde(default)]
    pub categories: Option<PathBuf>,
    /// `"top_n"` or `"argmax"`.
    #[serde(default = "default_assignment")]
    pub assignment: String,
    /// States claimed per macrostate under `"top_n"` assignment.
    #[serde(default = "default_n_cells")]
    pub n_cells: usize,
    /// Minimum membership under `"argmax"` assignment.
    #[serde(default)]
    pub threshold: f64,
}

impl Default for TerminalToml {
    fn default() -> Self {
        Self {
            method: default_selection(),
            n: None,
            names: Vec::new(),
            categories: None,
            assignment: default_assignment(),
            n_cells: default_n_cells(),
            threshold: 0.0,
        }
    }
}

fn default_selection() -> String {
    "eigengap".to_string()
}
fn default_assignment() -> String {
    "top_n".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AbsorptionToml {
    #[serde(default = "default_absorption_solver")]
    pub solver: String,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_restart")]
    pub restart: usize,
    #[serde(default = "default_gmres_iterations")]
    pub max_iterations: usize,
}

impl Default for AbsorptionToml {
    fn default() -> Self {
        Self {
            solver: default_absorption_solver(),
            tolerance: default_tolerance(),
            restart: default_restart(),
            max_iterations: default_gmres_iterations(),
        }
    }
}

fn default_absorption_solver() -> String {
    "direct".to_string()
}
fn default_tolerance() -> f64 {
    1e-12
}
fn default_restart() -> usize {
    30
}
fn default_gmres_iterations() -> usize {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: MetastateConfig = toml::from_str("").unwrap();
        assert_eq!(config.estimator, "gpcca");
        assert_eq!(config.eigen.k, 20);
        assert_eq!(config.schur.method, "auto");
        assert_eq!(config.macrostates.n_macrostates, None);
        assert_eq!(config.terminal.method, "eigengap");
        assert_eq!(config.terminal.assignment, "top_n");
        assert_eq!(config.absorption.restart, 30);
        assert_eq!(config.absorption.solver, "direct");
    }

    #[test]
    fn sections_parse() {
        let config: MetastateConfig = toml::from_str(
            r#"
            estimator = "exact"

            [io]
            matrix = "p.txt"

            [macrostates]
            n_macrostates = 3

            [terminal]
            method = "macrostates"
            names = ["A, B", "C"]
            "#,
        )
        .unwrap();
        assert_eq!(config.estimator, "exact");
        assert_eq!(config.io.matrix, Some(PathBuf::from("p.txt")));
        assert_eq!(config.macrostates.n_macrostates, Some(3));
        assert_eq!(config.terminal.names, ["A, B", "C"]);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<MetastateConfig, _> = toml::from_str("[eigen]\nkk = 3\n");
        assert!(result.is_err());
    }
}
