//! Model fitting.
//!
//! Responsibilities:
//!
//! - build the log density for a formula + prior (`fitter`)
//! - run the sampler and map draws back to the data scale (`fitter`)
//! - hold and summarize posterior draws (`posterior`)

pub mod fitter;
pub mod posterior;

pub use fitter::*;
pub use posterior::*;
