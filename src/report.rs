//! JSON report of a run.

use anyhow::{Context, Result};
use ndarray::{Array1, Array2};
use num_complex::Complex64;
use serde::Serialize;

use metastate_estimator::{AbsorptionEstimator, EstimatorKind, ExactEstimator, GpccaEstimator};

/// Top-level report.
#[derive(Debug, Serialize)]
pub struct Report {
    pub estimator: String,
    pub n_states: usize,
    pub sparse: bool,
    pub partition: Option<PartitionReport>,
    pub eigen: Option<EigenReport>,
    pub schur: Option<SchurReport>,
    pub macrostates: Option<MacrostateReport>,
    pub terminal_states: Option<TerminalReport>,
    pub absorption: Option<AbsorptionReport>,
}

/// Recurrent and transient classes.
#[derive(Debug, Serialize)]
pub struct PartitionReport {
    pub recurrent_classes: Vec<Vec<usize>>,
    pub transient_classes: Vec<Vec<usize>>,
    pub irreducible: bool,
}

/// Leading eigenvalues as `[re, im]` pairs.
#[derive(Debug, Serialize)]
pub struct EigenReport {
    pub which: String,
    pub eigenvalues: Vec<[f64; 2]>,
    pub eigengap: usize,
    pub stationary_distribution: Option<Vec<f64>>,
}

#[derive(Debug, Serialize)]
pub struct SchurReport {
    pub method: String,
    pub n_components: usize,
    pub eigenvalues: Vec<[f64; 2]>,
    pub eigengap: usize,
}

/// Macrostates and their coarse-grained dynamics.
#[derive(Debug, Serialize)]
pub struct MacrostateReport {
    pub names: Vec<String>,
    pub crispness: f64,
    pub representatives: Vec<usize>,
    /// Row per state.
    pub memberships: Vec<Vec<f64>>,
    pub coarse_transition_matrix: Option<Vec<Vec<f64>>>,
    pub coarse_stationary_distribution: Option<Vec<f64>>,
}

#[derive(Debug, Serialize)]
pub struct TerminalReport {
    pub names: Vec<String>,
    /// Terminal state of each state, if any.
    pub assignment: Vec<Option<String>>,
}

#[derive(Debug, Serialize)]
pub struct AbsorptionReport {
    pub names: Vec<String>,
    /// Row per state.
    pub probabilities: Vec<Vec<f64>>,
    pub differentiation_potential: Vec<f64>,
}

impl Report {
    /// Collects everything a GPCCA run computed.
    pub fn from_gpcca(est: &GpccaEstimator) -> Self {
        let mut report = Self::common(est, EstimatorKind::Gpcca);
        report.eigen = est.eigendecomposition().map(|e| EigenReport {
            which: e.params().which.to_string(),
            eigenvalues: complex_pairs(e.eigenvalues()),
            eigengap: e.eigengap(),
            stationary_distribution: e.stationary_distribution().map(Array1::to_vec),
        });
        report.schur = est.schur().map(|s| SchurReport {
            method: s.method().to_string(),
            n_components: s.n_components(),
            eigenvalues: complex_pairs(s.eigenvalues()),
            eigengap: s.eigengap(),
        });
        let coarse = est.coarse_transition_matrix();
        report.macrostates = est.macrostates().map(|m| MacrostateReport {
            names: m.names().to_vec(),
            crispness: m.crispness(),
            representatives: m.representatives().to_vec(),
            memberships: rows(m.memberships()),
            coarse_transition_matrix: coarse.map(|c| rows(c.matrix())),
            coarse_stationary_distribution: coarse
                .and_then(|c| c.stationary_distribution())
                .map(Array1::to_vec),
        });
        report
    }

    /// Collects everything an exact run computed.
    pub fn from_exact(est: &ExactEstimator) -> Self {
        Self::common(est, EstimatorKind::Exact)
    }

    fn common<E: AbsorptionEstimator>(est: &E, kind: EstimatorKind) -> Self {
        Self {
            estimator: kind.to_string(),
            n_states: est.n_states(),
            sparse: est.transition_matrix().is_sparse(),
            partition: est.partition().map(|p| PartitionReport {
                recurrent_classes: p.recurrent_classes().to_vec(),
                transient_classes: p.transient_classes().to_vec(),
                irreducible: p.is_irreducible(),
            }),
            eigen: None,
            schur: None,
            macrostates: None,
            terminal_states: est.terminal_states().map(|t| TerminalReport {
                names: t.names().to_vec(),
                assignment: t
                    .assignment()
                    .iter()
                    .map(|a| a.map(|i| t.names()[i].clone()))
                    .collect(),
            }),
            absorption: est.absorption_probabilities().map(|a| AbsorptionReport {
                names: a.names().to_vec(),
                probabilities: rows(a.probabilities()),
                differentiation_potential: a.differentiation_potential().to_vec(),
            }),
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize report")
    }
}

fn complex_pairs(values: &Array1<Complex64>) -> Vec<[f64; 2]> {
    values.iter().map(|z| [z.re, z.im]).collect()
}

fn rows(a: &Array2<f64>) -> Vec<Vec<f64>> {
    a.rows().into_iter().map(|r| r.to_vec()).collect()
}
