//! Run configuration.
//!
//! These structs are built once from CLI arguments (`cli::*Args::to_config`)
//! and passed down by reference. Library code never looks at CLI types.

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::domain::{DatasetVariant, HorseshoeConfig};
use crate::error::AppError;

/// NUTS sampler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    pub chains: usize,
    pub warmup: usize,
    /// Post-warmup draws per chain.
    pub draws: usize,
    pub max_depth: u32,
    /// Target acceptance statistic for step-size adaptation.
    pub adapt_delta: f64,
    pub seed: u64,
    /// Initial values are drawn uniformly from `(-init_radius, init_radius)`.
    pub init_radius: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            chains: 4,
            warmup: 1000,
            draws: 1000,
            max_depth: 10,
            adapt_delta: 0.8,
            seed: 2017,
            init_radius: 2.0,
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.chains == 0 {
            return Err(AppError::input("Number of chains must be > 0."));
        }
        if self.draws < 4 {
            return Err(AppError::input("Draws per chain must be >= 4."));
        }
        if self.max_depth == 0 || self.max_depth > 15 {
            return Err(AppError::input("Max tree depth must be within 1..=15."));
        }
        if !(self.adapt_delta > 0.0 && self.adapt_delta < 1.0) {
            return Err(AppError::input(format!(
                "adapt_delta must be in (0, 1), got {}.",
                self.adapt_delta
            )));
        }
        if !(self.init_radius.is_finite() && self.init_radius > 0.0) {
            return Err(AppError::input("Init radius must be finite and > 0."));
        }
        Ok(())
    }
}

/// How the size of a submodel is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Validation {
    /// Search and evaluate on the training data (optimistic).
    None,
    /// PSIS-LOO validated search: the search is repeated for every held-out row.
    Loo,
}

/// Whether selection runs when the covariates look non-informative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionPolicy {
    Always,
    WhenInformative,
}

/// Projection-predictive selection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    pub validation: Validation,
    /// Largest submodel size searched; `None` means `min(D, 19)`.
    pub max_size: Option<usize>,
    /// Posterior draws used during the forward search.
    pub search_draws: usize,
    /// Posterior draws used to evaluate predictive performance.
    pub pred_draws: usize,
    /// Width (in standard errors) of the bound used by `suggest_size`.
    pub suggest_z: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            validation: Validation::Loo,
            max_size: None,
            search_draws: 20,
            pred_draws: 400,
            suggest_z: 1.0,
        }
    }
}

impl SelectionConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.search_draws == 0 || self.pred_draws == 0 {
            return Err(AppError::input("Selection draw counts must be > 0."));
        }
        if !(self.suggest_z.is_finite() && self.suggest_z >= 0.0) {
            return Err(AppError::input("suggest_z must be finite and >= 0."));
        }
        Ok(())
    }

    pub fn resolved_max_size(&self, n_covariates: usize) -> usize {
        self.max_size.unwrap_or(19).min(n_covariates)
    }
}

/// Everything one `candy analyze` run needs.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// `None` uses the embedded candy table.
    pub data_path: Option<PathBuf>,
    pub target: String,
    pub id_column: Option<String>,
    pub variants: Vec<DatasetVariant>,
    pub sampler: SamplerConfig,
    /// `adapt_delta` used for horseshoe fits (they need smaller steps).
    pub hs_adapt_delta: f64,
    pub horseshoe: HorseshoeConfig,
    pub selection: SelectionConfig,
    pub selection_policy: SelectionPolicy,
    /// Submodel size to project onto; `None` uses the suggested size.
    pub project_size: Option<usize>,
    pub project_draws: usize,
    /// Covariates are informative when `elpd_diff > decision_z * se_diff`.
    pub decision_z: f64,
    /// Central posterior interval mass used in summaries.
    pub interval_prob: f64,
    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,
    pub export_report: Option<PathBuf>,
    pub export_draws: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            data_path: None,
            target: "winpercent".to_string(),
            id_column: Some("competitorname".to_string()),
            variants: vec![DatasetVariant::Null, DatasetVariant::Original],
            sampler: SamplerConfig::default(),
            hs_adapt_delta: 0.99,
            horseshoe: HorseshoeConfig::default(),
            selection: SelectionConfig::default(),
            selection_policy: SelectionPolicy::Always,
            project_size: None,
            project_draws: 400,
            decision_z: 1.0,
            interval_prob: 0.9,
            plot: true,
            plot_width: 72,
            plot_height: 16,
            export_report: None,
            export_draws: None,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        self.sampler.validate()?;
        self.selection.validate()?;
        self.horseshoe.validate()?;
        if !(self.hs_adapt_delta > 0.0 && self.hs_adapt_delta < 1.0) {
            return Err(AppError::input("hs_adapt_delta must be in (0, 1)."));
        }
        if !(self.interval_prob > 0.0 && self.interval_prob < 1.0) {
            return Err(AppError::input("Interval probability must be in (0, 1)."));
        }
        if self.project_draws == 0 {
            return Err(AppError::input("Projection draws must be > 0."));
        }
        if self.variants.is_empty() {
            return Err(AppError::input("At least one dataset variant is required."));
        }
        Ok(())
    }

    /// Sampler settings for horseshoe fits.
    pub fn horseshoe_sampler(&self) -> SamplerConfig {
        SamplerConfig {
            adapt_delta: self.hs_adapt_delta,
            ..self.sampler.clone()
        }
    }
}
