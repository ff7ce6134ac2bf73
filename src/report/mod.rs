//! Text reports.
//!
//! Formatting lives in one place so the statistics code stays free of
//! presentation concerns and output changes stay localized.

pub mod format;

pub use format::*;
