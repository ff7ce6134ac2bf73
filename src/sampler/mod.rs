//! No-U-Turn Hamiltonian Monte Carlo.
//!
//! Responsibilities:
//!
//! - one NUTS transition with a diagonal metric (`nuts`)
//! - warmup: step-size dual averaging + windowed metric estimation (`adapt`)
//! - running independent chains in parallel (`chains`)

pub mod adapt;
pub mod chains;
pub mod nuts;

pub use adapt::*;
pub use chains::*;
pub use nuts::*;
