use std::fmt;
use std::str::FromStr;

/// Which estimator drives a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EstimatorKind {
    /// Macrostates via GPCCA, terminal states among them.
    #[default]
    Gpcca,
    /// Terminal states are the recurrent classes.
    Exact,
}

impl EstimatorKind {
    /// Short name used in configuration files and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gpcca => "gpcca",
            Self::Exact => "exact",
        }
    }
}

impl fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EstimatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gpcca" => Ok(Self::Gpcca),
            "exact" => Ok(Self::Exact),
            other => Err(format!(
                "unknown estimator '{other}' (expected 'gpcca' or 'exact')"
            )),
        }
    }
}
