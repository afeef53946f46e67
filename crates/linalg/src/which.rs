//! Eigenvalue ordering criteria.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use num_complex::Complex64;

/// Criterion used to rank eigenvalues, largest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Which {
    /// Largest real part (`"LR"`).
    #[default]
    LargestReal,
    /// Largest magnitude (`"LM"`).
    LargestMagnitude,
}

impl Which {
    /// Returns the ranking key of an eigenvalue under this criterion.
    pub fn key(self, z: Complex64) -> f64 {
        match self {
            Self::LargestReal => z.re,
            Self::LargestMagnitude => z.norm(),
        }
    }

    /// Short code used in reports (`"LR"` or `"LM"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LargestReal => "LR",
            Self::LargestMagnitude => "LM",
        }
    }

    /// Compares two eigenvalues so that sorting yields descending keys.
    ///
    /// Equal keys fall back to the imaginary part, so the member of a
    /// conjugate pair with positive imaginary part comes first.
    pub fn compare(self, a: Complex64, b: Complex64) -> Ordering {
        self.key(b)
            .partial_cmp(&self.key(a))
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.im.partial_cmp(&a.im).unwrap_or(Ordering::Equal))
    }

    /// Returns the permutation that sorts `values` in descending order.
    pub fn argsort(self, values: &[Complex64]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&i, &j| self.compare(values[i], values[j]));
        order
    }
}

impl fmt::Display for Which {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Which {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lr" | "largest_real" => Ok(Self::LargestReal),
            "lm" | "largest_magnitude" => Ok(Self::LargestMagnitude),
            other => Err(format!(
                "unknown eigenvalue ordering '{other}' (expected 'LR' or 'LM')"
            )),
        }
    }
}
