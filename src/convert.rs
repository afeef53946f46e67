//! Pure conversion functions: TOML config structs -> crate API config types.

use anyhow::{Result, bail};
use ndarray::Array1;
use tracing::warn;

use crate::config::*;

use metastate_absorption::{AbsorptionConfig, AbsorptionSolver};
use metastate_estimator::EstimatorKind;
use metastate_gpcca::{AssignmentRule, MembershipConfig, TerminalSelection};
use metastate_linalg::Which;
use metastate_spectral::{EigenConfig, SchurConfig, SchurMethod};

/// Parses an estimator name.
pub fn parse_estimator(s: &str) -> Result<EstimatorKind> {
    s.parse().map_err(anyhow::Error::msg)
}

/// Parses an eigenvalue ordering (`"LR"` or `"LM"`).
pub fn parse_which(s: &str) -> Result<Which> {
    s.parse().map_err(anyhow::Error::msg)
}

/// Resolves a Schur method name; `"auto"` picks the direct method for dense
/// storage and Krylov-Schur for sparse storage.
pub fn parse_schur_method(s: &str, sparse: bool) -> Result<SchurMethod> {
    if s.eq_ignore_ascii_case("auto") {
        return Ok(if sparse {
            SchurMethod::Krylov
        } else {
            SchurMethod::Direct
        });
    }
    s.parse().map_err(anyhow::Error::msg)
}

/// Builds an [`EigenConfig`] from the TOML eigen section.
///
/// Sparse storage cannot return the full spectrum, so `k` is capped at
/// `n_states - 1` there.
pub fn build_eigen_config(eigen: &EigenToml, n_states: usize, sparse: bool) -> Result<EigenConfig> {
    let mut k = eigen.k;
    if sparse && k >= n_states {
        k = n_states.saturating_sub(1);
        warn!(requested = eigen.k, k, "k too large for sparse storage, capping");
    }
    let cfg = EigenConfig::new()
        .with_k(k)
        .with_which(parse_which(&eigen.which)?)
        .with_alpha(eigen.alpha);
    cfg.validate()?;
    Ok(cfg)
}

/// Builds a [`SchurConfig`] for `n_components` Schur vectors.
pub fn build_schur_config(
    schur: &SchurToml,
    eigen: &EigenToml,
    n_components: usize,
    sparse: bool,
) -> Result<SchurConfig> {
    let mut cfg = SchurConfig::new()
        .with_n_components(n_components)
        .with_method(parse_schur_method(&schur.method, sparse)?)
        .with_which(parse_which(&eigen.which)?)
        .with_alpha(eigen.alpha);
    if let Some(eta) = &schur.initial_distribution {
        cfg = cfg.with_initial_distribution(Array1::from_vec(eta.clone()));
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Builds a [`MembershipConfig`] for `n_macrostates` macrostates.
pub fn build_membership_config(
    macrostates: &MacrostatesToml,
    n_macrostates: usize,
) -> Result<MembershipConfig> {
    let cfg = MembershipConfig::new(n_macrostates)
        .with_max_iterations(macrostates.max_iterations)
        .with_n_cells(macrostates.n_cells)
        .with_optimize(macrostates.optimize);
    cfg.validate()?;
    Ok(cfg)
}

/// Builds the state-to-macrostate [`AssignmentRule`].
pub fn build_assignment_rule(terminal: &TerminalToml) -> Result<AssignmentRule> {
    let rule = match terminal.assignment.to_lowercase().as_str() {
        "top_n" => AssignmentRule::TopN {
            n_cells: terminal.n_cells,
        },
        "argmax" => AssignmentRule::Argmax {
            threshold: terminal.threshold,
        },
        other => bail!("unknown assignment rule: {other:?}"),
    };
    rule.validate()?;
    Ok(rule)
}

/// Builds the [`TerminalSelection`]. `categories` must hold the per-state
/// categories when the method is `"categories"`.
pub fn build_selection(
    terminal: &TerminalToml,
    categories: Option<Vec<Option<String>>>,
) -> Result<TerminalSelection> {
    match terminal.method.to_lowercase().as_str() {
        "eigengap" => Ok(TerminalSelection::Eigengap),
        "top_n" => match terminal.n {
            Some(n) => Ok(TerminalSelection::TopN(n)),
            None => bail!("terminal method \"top_n\" needs [terminal].n"),
        },
        "macrostates" => {
            if terminal.names.is_empty() {
                bail!("terminal method \"macrostates\" needs [terminal].names");
            }
            Ok(TerminalSelection::Macrostates(terminal.names.clone()))
        }
        "categories" => match categories {
            Some(c) => Ok(TerminalSelection::Categories(c)),
            None => bail!("terminal method \"categories\" needs [terminal].categories"),
        },
        other => bail!("unknown terminal-state method: {other:?}"),
    }
}

/// Builds an [`AbsorptionConfig`] from the TOML absorption section.
pub fn build_absorption_config(absorption: &AbsorptionToml) -> Result<AbsorptionConfig> {
    let solver: AbsorptionSolver = absorption.solver.parse()?;
    let cfg = AbsorptionConfig::new()
        .with_solver(solver)
        .with_tolerance(absorption.tolerance)
        .with_restart(absorption.restart)
        .with_max_iterations(absorption.max_iterations);
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_method_follows_storage() {
        assert_eq!(parse_schur_method("auto", true).unwrap(), SchurMethod::Krylov);
        assert_eq!(parse_schur_method("AUTO", false).unwrap(), SchurMethod::Direct);
        assert_eq!(parse_schur_method("krylov", false).unwrap(), SchurMethod::Krylov);
        assert!(parse_schur_method("qr", false).is_err());
    }

    #[test]
    fn sparse_k_is_capped() {
        let cfg = build_eigen_config(&EigenToml::default(), 10, true).unwrap();
        assert_eq!(cfg.k(), 9);
        let cfg = build_eigen_config(&EigenToml::default(), 10, false).unwrap();
        assert_eq!(cfg.k(), 20);
    }

    #[test]
    fn selection_methods() {
        let mut t = TerminalToml::default();
        assert_eq!(build_selection(&t, None).unwrap(), TerminalSelection::Eigengap);
        t.method = "top_n".to_string();
        assert!(build_selection(&t, None).is_err());
        t.n = Some(2);
        assert_eq!(build_selection(&t, None).unwrap(), TerminalSelection::TopN(2));
        t.method = "categories".to_string();
        assert!(build_selection(&t, None).is_err());
        t.method = "bogus".to_string();
        assert!(build_selection(&t, None).is_err());
    }

    #[test]
    fn assignment_rules() {
        let mut t = TerminalToml::default();
        assert_eq!(
            build_assignment_rule(&t).unwrap(),
            AssignmentRule::TopN { n_cells: 30 }
        );
        t.assignment = "argmax".to_string();
        t.threshold = 0.5;
        assert_eq!(
            build_assignment_rule(&t).unwrap(),
            AssignmentRule::Argmax { threshold: 0.5 }
        );
    }

    #[test]
    fn estimator_names() {
        assert_eq!(parse_estimator("exact").unwrap(), EstimatorKind::Exact);
        assert!(parse_estimator("other").is_err());
    }

    #[test]
    fn absorption_solver_is_parsed() {
        let mut a = AbsorptionToml::default();
        assert_eq!(build_absorption_config(&a).unwrap().solver(), AbsorptionSolver::Direct);
        a.solver = "gmres".to_string();
        assert_eq!(build_absorption_config(&a).unwrap().solver(), AbsorptionSolver::Gmres);
        a.solver = "jacobi".to_string();
        assert!(build_absorption_config(&a).is_err());
    }
}
