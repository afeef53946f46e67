//! # metastate-gpcca
//!
//! Macrostates by Generalized Perron Cluster Cluster Analysis (GPCCA) and
//! terminal-state selection.
//!
//! ## Pipeline
//!
//! ```text
//!  SchurDecomposition ──▶ compute_memberships ──▶ MacrostateMembership (chi)
//!                                                      │
//!  TransitionMatrix ───────────▶ coarse_grain ◀────────┘
//!                                     │
//!                                     ▼
//!                          CoarseTransitionMatrix ──▶ select_terminal ──▶ TerminalStates
//! ```
//!
//! Memberships are found by rotating the leading Schur vectors onto a
//! simplex: `chi = X A`, where `A` maximises crispness subject to `chi`
//! being non-negative and row-stochastic.

mod coarse;
mod config;
mod error;
mod membership;
mod naming;
mod rotation;
mod terminal;

pub use coarse::{CoarseTransitionMatrix, coarse_grain};
pub use config::{AssignmentRule, MembershipConfig, TerminalSelection};
pub use error::GpccaError;
pub use membership::{MacrostateMembership, compute_memberships};
pub use terminal::{TerminalStates, hard_assign, select_terminal, top_n_assign};
