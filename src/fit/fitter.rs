//! Fit a Bayesian Gaussian linear model with NUTS.
//!
//! Given:
//! - a dataset
//! - a formula (which covariates enter the linear predictor)
//! - a prior family
//!
//! we build the standardized log density, run the chains and return the
//! posterior on the data scale. Sampler problems (divergences, poor mixing)
//! are not errors here; `diagnostics` reports them.

use nalgebra::DMatrix;
use tracing::{info, warn};

use crate::domain::{Dataset, Formula, PriorSpec, SamplerConfig};
use crate::error::AppError;
use crate::fit::posterior::{INTERCEPT_NAME, ParamSummary, Posterior, SIGMA_NAME};
use crate::models::{HorseshoeLinearModel, LogDensity, NormalLinearModel, Standardization};
use crate::sampler::sample_chains;

/// A fitted model: formula, prior and posterior draws.
#[derive(Debug, Clone)]
pub struct FittedModel {
    pub label: String,
    pub formula: Formula,
    pub prior: PriorSpec,
    /// Dataset column index of every covariate in the formula.
    pub covariates: Vec<usize>,
    /// Resolved horseshoe global scale, if any.
    pub tau0: Option<f64>,
    pub posterior: Posterior,
}

impl FittedModel {
    /// Covariate columns used by this model, `n × D`.
    pub fn design(&self, data: &Dataset) -> DMatrix<f64> {
        data.select_columns(&self.covariates)
    }

    /// Posterior linear predictor at the rows of `data`, `S × n`.
    pub fn linear_predictor(&self, data: &Dataset) -> DMatrix<f64> {
        self.posterior.linear_predictor(&self.design(data))
    }

    /// Pointwise log likelihood, `S × n`.
    pub fn log_lik(&self, data: &Dataset) -> DMatrix<f64> {
        self.posterior.log_lik(&self.design(data), &data.y)
    }

    pub fn summary(&self, prob: f64) -> Vec<ParamSummary> {
        self.posterior.summarize(prob)
    }
}

/// Resolve formula covariate names to dataset columns.
pub fn resolve_covariates(data: &Dataset, formula: &Formula) -> Result<Vec<usize>, AppError> {
    if formula.target != data.target_name {
        return Err(AppError::input(format!(
            "Formula target '{}' does not match dataset target '{}'.",
            formula.target, data.target_name
        )));
    }
    formula
        .covariates
        .iter()
        .map(|name| {
            data.covariate_index(name)
                .ok_or_else(|| AppError::input(format!("Unknown covariate '{name}' in formula.")))
        })
        .collect()
}

/// Fit `formula` to `data` under `prior`.
pub fn fit_glm(
    data: &Dataset,
    formula: &Formula,
    prior: &PriorSpec,
    sampler: &SamplerConfig,
    label: &str,
) -> Result<FittedModel, AppError> {
    let covariates = resolve_covariates(data, formula)?;
    let design = Standardization::new(data, &covariates)?;

    let mut param_names = Vec::with_capacity(covariates.len() + 2);
    param_names.push(INTERCEPT_NAME.to_string());
    param_names.extend(formula.covariates.iter().cloned());
    param_names.push(SIGMA_NAME.to_string());

    info!(
        model = label,
        formula = %formula,
        prior = prior.display_name(),
        chains = sampler.chains,
        "fitting model"
    );

    // An intercept-only model has no coefficients to shrink.
    let (posterior, tau0) = match prior {
        PriorSpec::Horseshoe(hs) if !covariates.is_empty() => {
            let model = HorseshoeLinearModel::new(design.clone(), hs);
            let tau0 = model.tau0();
            (run(&model, &design, param_names, sampler, label)?, Some(tau0))
        }
        PriorSpec::Horseshoe(_) => {
            let model = NormalLinearModel::new(design.clone(), 2.5);
            (run(&model, &design, param_names, sampler, label)?, None)
        }
        PriorSpec::Normal { scale } => {
            if !(scale.is_finite() && *scale > 0.0) {
                return Err(AppError::input("Normal prior scale must be finite and > 0."));
            }
            let model = NormalLinearModel::new(design.clone(), *scale);
            (run(&model, &design, param_names, sampler, label)?, None)
        }
    };

    let divergences = posterior.total_divergences();
    if divergences > 0 {
        warn!(model = label, divergences, "divergent transitions after warmup");
    }

    Ok(FittedModel {
        label: label.to_string(),
        formula: formula.clone(),
        prior: *prior,
        covariates,
        tau0,
        posterior,
    })
}

fn run<M: LogDensity>(
    model: &M,
    design: &Standardization,
    param_names: Vec<String>,
    sampler: &SamplerConfig,
    label: &str,
) -> Result<Posterior, AppError> {
    let outputs = sample_chains(model, sampler, label)?;
    Posterior::from_chains(param_names, outputs, |draw| design.to_original(draw))
}
