//! Run command: load a chain, run the configured estimator, write a report.

use anyhow::{Context, Result, anyhow};
use tracing::{info, info_span, warn};

use metastate_chain::{StateLabels, TransitionMatrix};
use metastate_estimator::{
    AbsorptionEstimator, ChainHolder, EstimatorKind, ExactEstimator, GpccaEstimator,
};

use crate::cli::RunArgs;
use crate::config::MetastateConfig;
use crate::convert;
use crate::input;
use crate::report::Report;

/// Run the full analysis pipeline.
pub fn run(args: RunArgs) -> Result<()> {
    let _cmd = info_span!("run").entered();
    // 1. Load project TOML
    let toml_str = std::fs::read_to_string(&args.config)
        .with_context(|| format!("failed to read config file: {}", args.config.display()))?;
    let config: MetastateConfig =
        toml::from_str(&toml_str).context("failed to parse TOML config")?;

    // 2. Resolve paths, CLI flags take precedence
    let matrix_path = args
        .matrix
        .as_ref()
        .or(config.io.matrix.as_ref())
        .ok_or_else(|| anyhow!("no matrix path: set [io].matrix in config or use --matrix"))?;
    let labels_path = args.labels.as_ref().or(config.io.labels.as_ref());
    let output = args.output.as_ref().or(config.io.output.as_ref());

    // 3. Read inputs
    let matrix = input::read_matrix(matrix_path)?;
    let labels = labels_path.map(|p| input::read_labels(p)).transpose()?;

    // 4. Run the estimator
    let report = match convert::parse_estimator(&config.estimator)? {
        EstimatorKind::Gpcca => Report::from_gpcca(&run_gpcca(matrix, labels, &config)?),
        EstimatorKind::Exact => Report::from_exact(&run_exact(matrix, labels, &config)?),
    };

    // 5. Write the report
    let json = report.to_json()?;
    match output {
        Some(path) => {
            std::fs::write(path, &json)
                .with_context(|| format!("failed to write report: {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Eigendecomposition, Schur vectors, macrostates, terminal states and
/// absorption probabilities.
pub fn run_gpcca(
    matrix: TransitionMatrix,
    labels: Option<StateLabels>,
    config: &MetastateConfig,
) -> Result<GpccaEstimator> {
    let n = matrix.n_states();
    let sparse = matrix.is_sparse();
    let mut est = GpccaEstimator::new(matrix);
    if let Some(labels) = labels {
        est = est.with_labels(labels)?;
    }
    est.compute_partition();

    let eigen_cfg = convert::build_eigen_config(&config.eigen, n, sparse)?;
    let eigengap = est
        .compute_eigendecomposition(&eigen_cfg)
        .context("eigendecomposition failed")?
        .eigengap();

    let n_macrostates = match config.macrostates.n_macrostates {
        Some(m) => m,
        None => {
            let m = (eigengap + 1).max(2);
            info!(eigengap, n_macrostates = m, "macrostate count from the eigengap");
            m
        }
    };
    let n_components = config.schur.n_components.unwrap_or(n_macrostates + 1);
    let schur_cfg = convert::build_schur_config(&config.schur, &config.eigen, n_components, sparse)?;
    est.compute_schur(&schur_cfg)
        .context("Schur decomposition failed")?;

    let membership_cfg = convert::build_membership_config(&config.macrostates, n_macrostates)?;
    est.compute_macrostates(&membership_cfg)
        .context("macrostate computation failed")?;

    compute_terminal_and_absorption(&mut est, config)?;
    Ok(est)
}

/// Recurrent classes as terminal states, then absorption probabilities.
pub fn run_exact(
    matrix: TransitionMatrix,
    labels: Option<StateLabels>,
    config: &MetastateConfig,
) -> Result<ExactEstimator> {
    let mut est = ExactEstimator::new(matrix);
    if let Some(labels) = labels {
        est = est.with_labels(labels)?;
    }
    est.compute_partition();
    compute_terminal_and_absorption(&mut est, config)?;
    Ok(est)
}

fn compute_terminal_and_absorption<E: AbsorptionEstimator>(
    est: &mut E,
    config: &MetastateConfig,
) -> Result<()> {
    let categories = config
        .terminal
        .categories
        .as_deref()
        .map(input::read_categories)
        .transpose()?;
    let selection = convert::build_selection(&config.terminal, categories)?;
    let rule = convert::build_assignment_rule(&config.terminal)?;
    let n_terminal = est
        .compute_terminal_states(&selection, rule)
        .context("terminal-state selection failed")?
        .n_terminal();
    if n_terminal == 0 {
        warn!("no terminal states, skipping absorption probabilities");
        return Ok(());
    }

    let absorption_cfg = convert::build_absorption_config(&config.absorption)?;
    est.compute_absorption_probabilities(&absorption_cfg)
        .context("absorption probabilities failed")?;
    Ok(())
}
