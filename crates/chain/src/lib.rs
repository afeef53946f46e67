//! # metastate-chain
//!
//! Validated row-stochastic transition matrices over a finite state space
//! and their decomposition into communication classes.
//!
//! ```text
//!  Array2 / CsrMatrix ──▶ TransitionMatrix ──▶ compute_partition ──▶ CommunicationClasses
//!                          (validated)                                  recurrent / transient
//! ```
//!
//! A [`TransitionMatrix`] keeps the storage kind it was built from; sparse
//! input stays sparse through transposition, diagonal scaling and block
//! extraction.

mod error;
mod labels;
mod matrix;
mod partition;

pub use error::ChainError;
pub use labels::{StateLabels, deduplicate_names};
pub use matrix::{
    ROW_SUM_TOLERANCE, Storage, TransitionMatrix, uniform_distribution, validate_distribution,
};
pub use partition::{ClassKind, CommunicationClasses, compute_partition};
