//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the dataset entity (`Dataset`, `DatasetVariant`) and model formulas (`Formula`)
//! - prior configuration (`PriorSpec`, `HorseshoeConfig`)
//! - run configuration (`AnalysisConfig`, `SamplerConfig`, `SelectionConfig`)

pub mod config;
pub mod types;

pub use config::*;
pub use types::*;
