//! # metastate-estimator
//!
//! Estimators that run the full analysis of a transition matrix and keep
//! every intermediate result.
//!
//! ```text
//!                        ┌─ GpccaEstimator: eigen, Schur, macrostates ─┐
//!  TransitionMatrix ─────┤                                             ├─▶ TerminalStates ─▶ AbsorptionProbabilities
//!                        └─ ExactEstimator: recurrent classes ─────────┘
//! ```
//!
//! Capabilities are split into three traits so that callers can work with
//! either estimator:
//!
//! - [`ChainHolder`]: the matrix, labels and partition.
//! - [`TerminalStateEstimator`]: computing or setting terminal states.
//! - [`AbsorptionEstimator`]: absorption probabilities towards them.
//!
//! Stages report [`EstimatorError::MissingPrerequisite`] when called out of
//! order.

mod error;
mod exact;
mod gpcca;
mod kind;
mod traits;

pub use error::EstimatorError;
pub use exact::ExactEstimator;
pub use gpcca::GpccaEstimator;
pub use kind::EstimatorKind;
pub use traits::{AbsorptionEstimator, ChainHolder, TerminalStateEstimator};
