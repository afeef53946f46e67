use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Metastate: macrostates, terminal states and absorption probabilities of
/// Markov chains.
#[derive(Parser)]
#[command(
    name = "metastate",
    version,
    about = "Macrostate, terminal-state and absorption analysis of Markov chains"
)]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Run the configured estimator end to end and write a JSON report.
    Run(RunArgs),
}

/// Arguments for the `run` subcommand.
#[derive(clap::Args)]
pub struct RunArgs {
    /// Path to TOML configuration file.
    #[arg(short, long, default_value = "metastate.toml")]
    pub config: PathBuf,

    /// Override the transition matrix path from config.
    #[arg(short, long)]
    pub matrix: Option<PathBuf>,

    /// Override the state labels path from config.
    #[arg(short, long)]
    pub labels: Option<PathBuf>,

    /// Override the JSON report path from config.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
