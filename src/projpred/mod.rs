//! Projection-predictive variable selection (Piironen, Paasiniemi & Vehtari 2020).
//!
//! Responsibilities:
//!
//! - reference model predictions and LOO weights (`reference`)
//! - KL projection of reference draws onto a covariate subset (`projection`)
//! - forward search over covariates (`search`)
//! - per-size predictive performance, size suggestion, stability (`varsel`)
//! - projected posterior for a chosen size (`project`)

pub mod project;
pub mod projection;
pub mod reference;
pub mod search;
pub mod varsel;

pub use project::*;
pub use projection::*;
pub use reference::*;
pub use search::*;
pub use varsel::*;
