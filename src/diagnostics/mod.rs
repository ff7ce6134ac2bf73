//! Sampler convergence diagnostics.
//!
//! - rank-normalized split R-hat, bulk/tail ESS (`convergence`)
//! - per-model convergence verdict (`check`)

pub mod check;
pub mod convergence;

pub use check::*;
pub use convergence::*;
