//! Eigengap heuristic for the number of slow processes.

use metastate_linalg::Which;
use num_complex::Complex64;

use crate::error::SpectralError;

/// Index after which the largest spectral gap occurs.
///
/// With `r_i` the ranking key of eigenvalue `i` under `which` (real part or
/// magnitude), eigenvalues already sorted in descending order, the score of
/// position `i` is
///
/// ```text
/// score_i = (r_i - r_{i+1}) * (1 + alpha * i / (K - 2))
/// ```
///
/// for `K` eigenvalues, and the first maximiser is returned. The weight
/// grows from 1 at the first gap to `1 + alpha` at the last, so `alpha`
/// favours gaps further down the spectrum; for `alpha >= 0` the result is
/// never below the `alpha = 0` result. Fewer than two eigenvalues give 0.
///
/// # Errors
///
/// Returns [`SpectralError::InvalidParameter`] if `alpha` is negative or not
/// finite.
pub fn eigengap(eigenvalues: &[Complex64], which: Which, alpha: f64) -> Result<usize, SpectralError> {
    validate_alpha(alpha)?;
    if eigenvalues.len() < 2 {
        return Ok(0);
    }
    let r: Vec<f64> = eigenvalues.iter().map(|&z| which.key(z)).collect();
    let last = (r.len() - 2).max(1) as f64;
    let mut best = 0;
    let mut best_score = f64::NEG_INFINITY;
    for i in 0..r.len() - 1 {
        let score = (r[i] - r[i + 1]) * (1.0 + alpha * i as f64 / last);
        if score > best_score {
            best = i;
            best_score = score;
        }
    }
    Ok(best)
}

pub(crate) fn validate_alpha(alpha: f64) -> Result<(), SpectralError> {
    if !alpha.is_finite() || alpha < 0.0 {
        return Err(SpectralError::InvalidParameter {
            name: "alpha",
            reason: format!("must be finite and non-negative, got {alpha}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn real(values: &[f64]) -> Vec<Complex64> {
        values.iter().map(|&v| Complex64::new(v, 0.0)).collect()
    }

    #[test]
    fn obvious_gap() {
        let ev = real(&[1.0, 0.99, 0.98, 0.5, 0.4]);
        assert_eq!(eigengap(&ev, Which::LargestReal, 0.0).unwrap(), 2);
        assert_eq!(eigengap(&ev, Which::LargestReal, 0.1).unwrap(), 2);
    }

    #[test]
    fn alpha_shifts_towards_later_gaps() {
        // Gaps: 0.30, 0.05, 0.28, 0.01
        let ev = real(&[1.0, 0.7, 0.65, 0.37, 0.36]);
        assert_eq!(eigengap(&ev, Which::LargestReal, 0.0).unwrap(), 0);
        // score_2 = 0.28 * (1 + 2 alpha / 3) beats 0.30 once alpha > 3/28.
        assert_eq!(eigengap(&ev, Which::LargestReal, 0.05).unwrap(), 0);
        assert_eq!(eigengap(&ev, Which::LargestReal, 0.2).unwrap(), 2);
        // A tiny last gap stays unattractive.
        assert_eq!(eigengap(&ev, Which::LargestReal, 5.0).unwrap(), 2);
    }

    #[test]
    fn default_alpha_keeps_dominant_gap() {
        // Gaps: 0.02, 0.5, 0.03, 0.02, 0.01
        let ev = real(&[1.0, 0.98, 0.48, 0.45, 0.43, 0.42]);
        assert_eq!(eigengap(&ev, Which::LargestReal, 1.0).unwrap(), 1);
    }

    #[test]
    fn monotone_in_alpha() {
        let ev = real(&[1.0, 0.95, 0.7, 0.68, 0.3, 0.29, 0.1]);
        let mut last = 0;
        for step in 0..50 {
            let alpha = step as f64 * 0.1;
            let idx = eigengap(&ev, Which::LargestReal, alpha).unwrap();
            assert!(idx >= last, "alpha {alpha}: {idx} < {last}");
            last = idx;
        }
    }

    #[test]
    fn magnitude_key() {
        let ev = vec![
            Complex64::new(1.0, 0.0),
            Complex64::new(-0.95, 0.0),
            Complex64::new(0.2, 0.0),
        ];
        assert_eq!(eigengap(&ev, Which::LargestMagnitude, 0.0).unwrap(), 1);
        assert_eq!(eigengap(&ev, Which::LargestReal, 0.0).unwrap(), 0);
    }

    #[test]
    fn short_inputs() {
        assert_eq!(eigengap(&[], Which::LargestReal, 1.0).unwrap(), 0);
        assert_eq!(eigengap(&real(&[1.0]), Which::LargestReal, 1.0).unwrap(), 0);
    }

    #[test]
    fn invalid_alpha() {
        assert!(eigengap(&real(&[1.0, 0.5]), Which::LargestReal, -0.1).is_err());
        assert!(eigengap(&real(&[1.0, 0.5]), Which::LargestReal, f64::NAN).is_err());
    }
}
