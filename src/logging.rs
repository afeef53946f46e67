//! Tracing setup for the command-line tool. Logs go to stderr so that a
//! report printed on stdout stays parseable.

use anyhow::{Result, anyhow};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Workspace crates whose events are shown.
const CRATE_TARGETS: &[&str] = &[
    "metastate",
    "metastate_linalg",
    "metastate_chain",
    "metastate_spectral",
    "metastate_gpcca",
    "metastate_absorption",
    "metastate_estimator",
];

/// Level for a count of `-v` flags: warn, info, debug, then trace.
fn level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Filter directives enabling `level` for every workspace crate only, so
/// dependencies stay quiet.
fn directives(level: &str) -> String {
    CRATE_TARGETS
        .iter()
        .map(|t| format!("{t}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Installs the global subscriber.
///
/// A valid `RUST_LOG` takes precedence over `verbosity`; an invalid one is
/// ignored with a warning.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init(verbosity: u8) -> Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let from_env = rust_log.as_deref().and_then(|s| EnvFilter::try_new(s).ok());
    let ignored = rust_log.is_some() && from_env.is_none();
    let filter = from_env.unwrap_or_else(|| EnvFilter::new(directives(level(verbosity))));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install the log subscriber: {e}"))?;
    if ignored {
        warn!(rust_log = rust_log.as_deref(), "RUST_LOG is not a valid filter, using -v");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(level(0), "warn");
        assert_eq!(level(2), "debug");
        assert_eq!(level(9), "trace");
    }

    #[test]
    fn directives_cover_every_crate() {
        let d = directives("info");
        assert_eq!(d.split(',').count(), CRATE_TARGETS.len());
        assert!(d.starts_with("metastate=info,"));
        assert!(d.contains("metastate_absorption=info"));
        assert!(EnvFilter::try_new(&d).is_ok());
    }
}
