//! Shared analysis pipeline used by every subcommand.
//!
//! One dataset variant flows through:
//! load -> fit (full/normal, intercept/normal, full/horseshoe) -> diagnostics
//! -> LOO + comparison + decision -> selection -> projection
//!
//! The front-end only formats and exports what comes back.

use tracing::{info, info_span, warn};

use crate::data::{dataset_variant, load_candy};
use crate::diagnostics::{ConvergenceReport, diagnose};
use crate::domain::{
    AnalysisConfig, Dataset, DatasetVariant, Formula, FormulaKind, PriorKind, PriorSpec, SamplerConfig,
    SelectionPolicy,
};
use crate::error::AppError;
use crate::fit::{FittedModel, fit_glm};
use crate::io::read_dataset;
use crate::loo::{CompareRow, Decision, LooResult, decide, loo, loo_compare};
use crate::projpred::{ProjectedPosterior, ReferenceModel, SelectionResult, project, varsel};

/// A fitted model with its convergence and LOO results.
#[derive(Debug, Clone)]
pub struct ModelAnalysis {
    pub fit: FittedModel,
    pub diagnostics: ConvergenceReport,
    pub loo: LooResult,
}

/// Selection on a horseshoe reference model, plus the projected posterior.
#[derive(Debug, Clone)]
pub struct SelectionOutput {
    pub selection: SelectionResult,
    pub projection: ProjectedPosterior,
}

/// Everything computed for one dataset variant.
#[derive(Debug, Clone)]
pub struct VariantAnalysis {
    pub dataset: Dataset,
    pub full: ModelAnalysis,
    pub intercept: ModelAnalysis,
    pub horseshoe: ModelAnalysis,
    pub comparison: Vec<CompareRow>,
    pub decision: Decision,
    /// Both normal-prior fits behind `decision` passed the convergence checks.
    pub decision_converged: bool,
    /// The horseshoe reference behind `selection` passed the convergence checks.
    pub selection_converged: bool,
    pub selection: Option<SelectionOutput>,
}

impl VariantAnalysis {
    pub fn models(&self) -> [&ModelAnalysis; 3] {
        [&self.full, &self.intercept, &self.horseshoe]
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisOutput {
    pub variants: Vec<VariantAnalysis>,
}

/// Output of `candy fit`.
#[derive(Debug, Clone)]
pub struct FitOutput {
    pub dataset: Dataset,
    pub model: ModelAnalysis,
}

/// Output of `candy select`.
#[derive(Debug, Clone)]
pub struct SelectOutput {
    pub dataset: Dataset,
    pub model: ModelAnalysis,
    pub selection: SelectionOutput,
}

/// Load the configured CSV, or the embedded candy table.
pub fn load_dataset(config: &AnalysisConfig) -> Result<Dataset, AppError> {
    match &config.data_path {
        Some(path) => read_dataset(path, &config.target, config.id_column.as_deref()),
        None => load_candy(),
    }
}

/// Run the full analysis on every configured dataset variant.
pub fn run_analysis(config: &AnalysisConfig) -> Result<AnalysisOutput, AppError> {
    config.validate()?;
    let original = load_dataset(config)?;
    let variants = config
        .variants
        .iter()
        .map(|&v| run_variant(&original, v, config))
        .collect::<Result<Vec<_>, AppError>>()?;
    Ok(AnalysisOutput { variants })
}

/// Fit, diagnose, compare, and (per policy) select + project on one variant.
pub fn run_variant(
    original: &Dataset,
    variant: DatasetVariant,
    config: &AnalysisConfig,
) -> Result<VariantAnalysis, AppError> {
    let span = info_span!("variant", variant = variant.display_name());
    let _guard = span.enter();

    let dataset = dataset_variant(original, variant, config.sampler.seed)?;
    info!(n = dataset.n_rows(), d = dataset.n_covariates(), "dataset ready");

    let normal = PriorSpec::default_normal();
    let horseshoe = PriorSpec::Horseshoe(config.horseshoe);
    let full = analyze_model(&dataset, FormulaKind::Full, &normal, &config.sampler)?;
    let intercept = analyze_model(&dataset, FormulaKind::Intercept, &normal, &config.sampler)?;
    let hs = analyze_model(&dataset, FormulaKind::Full, &horseshoe, &config.horseshoe_sampler())?;

    let comparison = loo_compare(&[&full.loo, &intercept.loo, &hs.loo])?;
    let decision = decide(&full.loo, &intercept.loo, config.decision_z)?;
    let decision_converged = full.diagnostics.converged && intercept.diagnostics.converged;
    if !decision_converged {
        warn!("normal-prior fits failed diagnostics; the full vs intercept decision is withheld");
    }
    let selection_converged = hs.diagnostics.converged;
    if !selection_converged {
        warn!("horseshoe fit failed diagnostics; selection conclusions are withheld");
    }

    let run_selection = match config.selection_policy {
        SelectionPolicy::Always => true,
        SelectionPolicy::WhenInformative => decision.informative,
    };
    let selection = if run_selection {
        Some(select_and_project(&dataset, &hs, config)?)
    } else {
        info!("covariates not informative; skipping variable selection");
        None
    };

    Ok(VariantAnalysis {
        dataset,
        full,
        intercept,
        horseshoe: hs,
        comparison,
        decision,
        decision_converged,
        selection_converged,
        selection,
    })
}

/// Label used in logs, reports and chain seeding.
pub fn model_label(variant: DatasetVariant, formula: FormulaKind, prior: &PriorSpec) -> String {
    let formula = match formula {
        FormulaKind::Full => "full",
        FormulaKind::Intercept => "intercept",
    };
    format!("{}/{formula}/{}", variant.display_name(), prior.display_name())
}

fn analyze_model(
    dataset: &Dataset,
    formula: FormulaKind,
    prior: &PriorSpec,
    sampler: &SamplerConfig,
) -> Result<ModelAnalysis, AppError> {
    let label = model_label(dataset.variant, formula, prior);
    let fit = fit_glm(dataset, &Formula::from_kind(formula, dataset), prior, sampler, &label)?;
    let diagnostics = diagnose(&fit.posterior, &label);
    let loo = loo(&fit, dataset);
    Ok(ModelAnalysis { fit, diagnostics, loo })
}

fn select_and_project(
    dataset: &Dataset,
    reference_model: &ModelAnalysis,
    config: &AnalysisConfig,
) -> Result<SelectionOutput, AppError> {
    let reference = ReferenceModel::new(&reference_model.fit, dataset, &reference_model.loo)?;
    let selection = varsel(&reference, &config.selection)?;
    let projection = project(&reference, &selection, config.project_size, config.project_draws)?;
    Ok(SelectionOutput { selection, projection })
}

/// Fit a single model (`candy fit`).
pub fn run_fit(
    config: &AnalysisConfig,
    variant: DatasetVariant,
    prior: PriorKind,
    formula: FormulaKind,
) -> Result<FitOutput, AppError> {
    config.validate()?;
    let original = load_dataset(config)?;
    let dataset = dataset_variant(&original, variant, config.sampler.seed)?;
    let prior = PriorSpec::from_kind(prior, config.horseshoe);
    let sampler = match prior {
        PriorSpec::Horseshoe(_) => config.horseshoe_sampler(),
        PriorSpec::Normal { .. } => config.sampler.clone(),
    };
    let model = analyze_model(&dataset, formula, &prior, &sampler)?;
    Ok(FitOutput { dataset, model })
}

/// Horseshoe fit + selection + projection on one variant (`candy select`).
pub fn run_select(config: &AnalysisConfig, variant: DatasetVariant) -> Result<SelectOutput, AppError> {
    config.validate()?;
    let original = load_dataset(config)?;
    let dataset = dataset_variant(&original, variant, config.sampler.seed)?;
    let prior = PriorSpec::Horseshoe(config.horseshoe);
    let model = analyze_model(&dataset, FormulaKind::Full, &prior, &config.horseshoe_sampler())?;
    if !model.diagnostics.converged {
        warn!("horseshoe fit failed diagnostics; selection conclusions are withheld");
    }
    let selection = select_and_project(&dataset, &model, config)?;
    Ok(SelectOutput {
        dataset,
        model,
        selection,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_distinct_per_model() {
        let normal = PriorSpec::default_normal();
        let hs = PriorSpec::Horseshoe(Default::default());
        let a = model_label(DatasetVariant::Null, FormulaKind::Full, &normal);
        let b = model_label(DatasetVariant::Null, FormulaKind::Intercept, &normal);
        let c = model_label(DatasetVariant::Null, FormulaKind::Full, &hs);
        let d = model_label(DatasetVariant::Original, FormulaKind::Full, &normal);
        assert!(a != b && a != c && a != d && b != c);
    }

    #[test]
    fn missing_data_file_is_an_input_error() {
        let config = AnalysisConfig {
            data_path: Some("does/not/exist.csv".into()),
            ..AnalysisConfig::default()
        };
        assert_eq!(run_analysis(&config).unwrap_err().exit_code(), 2);
    }
}
