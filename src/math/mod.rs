//! Mathematical utilities: least squares and small statistics helpers.

pub mod ols;
pub mod stats;

pub use ols::*;
pub use stats::*;
