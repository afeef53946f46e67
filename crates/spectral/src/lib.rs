//! # metastate-spectral
//!
//! Spectral analysis of transition matrices.
//!
//! ```text
//!  TransitionMatrix ──▶ eigendecompose ──▶ EigenDecomposition
//!                  │                        eigenvalues, V_l, V_r, pi, eigengap
//!                  └──▶ schur_decompose ──▶ SchurDecomposition
//!                                           basis X, matrix R, eigenvalues, eigengap
//! ```
//!
//! Both decompositions order eigenvalues by a [`Which`] criterion and never
//! cut through a complex conjugate pair: when the requested count would,
//! one more eigenvalue is returned.
//!
//! | Symbol | Accessor | Meaning |
//! |--------|----------|---------|
//! | D | [`EigenDecomposition::eigenvalues()`] | sorted eigenvalues |
//! | pi | [`EigenDecomposition::stationary_distribution()`] | normalised left eigenvector at eigenvalue 1 |
//! | X | [`SchurDecomposition::basis()`] | orthonormal Schur vectors of `D^{1/2} P D^{-1/2}` |
//! | R | [`SchurDecomposition::matrix()`] | quasi-upper-triangular Schur matrix |
//!
//! [`Which`]: metastate_linalg::Which

mod config;
mod eigen;
mod eigengap;
mod error;
mod schur;

pub use config::{EigenConfig, SchurConfig, SchurMethod};
pub use eigen::{EigenDecomposition, EigenParams, eigendecompose};
pub use eigengap::eigengap;
pub use error::SpectralError;
pub use schur::{SchurDecomposition, schur_decompose};
