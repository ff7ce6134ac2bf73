//! Posterior log densities for Gaussian linear models.
//!
//! Models are small structs implementing [`LogDensity`] so the sampler can stay
//! generic. Each model works on a standardized problem (`Standardization`) and
//! maps draws back to the original scale afterwards.

pub mod density;
pub mod standardize;

pub use density::*;
pub use standardize::*;
