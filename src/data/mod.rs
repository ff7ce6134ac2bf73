//! Dataset sources.
//!
//! - the embedded candy-power-ranking table (`candy`)
//! - derived dataset variants (`variant`)

pub mod candy;
pub mod variant;

pub use candy::*;
pub use variant::*;
