//! # metastate-linalg
//!
//! Numerical kernels shared by the metastate pipeline: a compressed sparse
//! row matrix, ordered real Schur forms, Krylov-Schur iteration for the
//! leading part of the spectrum, eigenvectors from Schur forms and a
//! restarted GMRES solver.
//!
//! ## Kernels
//!
//! ```text
//!  dense  A ──▶ sorted_schur ──────────────┐
//!                                          ├──▶ (Q, T) ──▶ schur_eigenvectors
//!  sparse A ──▶ krylov_schur (Arnoldi) ────┘
//!
//!  (I - Q) x = r ──▶ gmres
//! ```
//!
//! All kernels are deterministic: start vectors and breakdown replacements
//! are fixed sequences, never random draws.

mod csr;
mod dense;
mod eigvec;
mod error;
mod gmres;
mod krylov;
mod operator;
mod schur;
mod which;

pub use csr::CsrMatrix;
pub use dense::{to_array1, to_array2, to_array2_complex, to_dmatrix, to_dvector};
pub use eigvec::schur_eigenvectors;
pub use error::LinalgError;
pub use gmres::{GmresOptions, GmresSolution, gmres};
pub use krylov::{KrylovOptions, PartialSchur, default_start_vector, krylov_schur};
pub use operator::{IdentityMinus, LinearOperator};
pub use schur::{OrderedSchur, quasi_triangular_eigenvalues, sorted_schur, splits_conjugate_pair};
pub use which::Which;
