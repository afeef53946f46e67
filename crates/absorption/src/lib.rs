//! # metastate-absorption
//!
//! Absorption probabilities towards terminal states and the
//! differentiation potential derived from them.
//!
//! ```text
//!  TransitionMatrix ─────┐
//!  CommunicationClasses ─┼──▶ compute_absorption ──▶ AbsorptionProbabilities
//!  TerminalStates ───────┘    (I - Q) X = R           X, differentiation potential
//! ```
//!
//! Recurrent classes without a terminal state act as traps: states that
//! may end up there have rows summing to less than one.

mod config;
mod error;
mod potential;
mod solve;

pub use config::{AbsorptionConfig, AbsorptionSolver};
pub use error::AbsorptionError;
pub use potential::differentiation_potential;
pub use solve::{AbsorptionProbabilities, compute_absorption};
