//! `candy-select` library crate.
//!
//! The binary (`candy`) is a thin wrapper around this library so that:
//!
//! - the statistics are testable without spawning processes
//! - every pipeline stage can be reused on its own (fit, LOO, selection)
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod diagnostics;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod loo;
pub mod math;
pub mod models;
pub mod plot;
pub mod projpred;
pub mod report;
pub mod sampler;
