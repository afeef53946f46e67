//! Differentiation potential: normalised entropy of absorption rows.

use ndarray::{Array1, Array2};

/// Mass below which the "absorbed nowhere" residual of a row is ignored.
pub(crate) const RESIDUAL_TOLERANCE: f64 = 1e-10;

/// Normalised Shannon entropy of every row of `probabilities` (`N x T`).
///
/// A row is read as the distribution `[x_1, ..., x_T, 1 - sum]`, where the
/// last entry is only present when the row sums to less than one. The
/// entropy is divided by `ln` of the number of outcomes, so the potential
/// lies in `[0, 1]`. A single outcome has potential 0.
pub fn differentiation_potential(probabilities: &Array2<f64>) -> Array1<f64> {
    let t = probabilities.ncols();
    probabilities
        .rows()
        .into_iter()
        .map(|row| {
            let residual = 1.0 - row.sum();
            let has_residual = residual > RESIDUAL_TOLERANCE;
            let outcomes = t + usize::from(has_residual);
            if outcomes < 2 {
                return 0.0;
            }
            let mut entropy: f64 = row.iter().map(|&p| plogp(p)).sum();
            if has_residual {
                entropy += plogp(residual);
            }
            (-entropy / (outcomes as f64).ln()).clamp(0.0, 1.0)
        })
        .collect()
}

fn plogp(p: f64) -> f64 {
    if p > 0.0 { p * p.ln() } else { 0.0 }
}
