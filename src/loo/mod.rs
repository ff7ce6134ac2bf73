//! Approximate leave-one-out cross-validation.
//!
//! - Pareto-smoothed importance sampling (`psis`)
//! - pointwise/summed elpd for a fitted model (`estimate`)
//! - paired model comparison and the informativeness decision (`compare`)

pub mod compare;
pub mod estimate;
pub mod psis;

pub use compare::*;
pub use estimate::*;
pub use psis::*;
