//! Exports: machine-readable run report (JSON) and posterior draws (CSV).

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::pipeline::{AnalysisOutput, ModelAnalysis, VariantAnalysis};
use crate::diagnostics::ConvergenceReport;
use crate::domain::{AnalysisConfig, DatasetStats, DatasetVariant, Formula, PriorSpec, SamplerConfig};
use crate::error::AppError;
use crate::fit::{ParamSummary, Posterior};
use crate::loo::{CompareRow, Decision, LooResult};
use crate::projpred::{ProjectedPosterior, SelectionResult};
use crate::sampler::ChainStats;

#[derive(Debug, Serialize)]
pub struct ReportFile<'a> {
    pub generated_at: DateTime<Utc>,
    pub version: &'static str,
    pub sampler: &'a SamplerConfig,
    pub hs_adapt_delta: f64,
    pub interval_prob: f64,
    pub variants: Vec<VariantReport<'a>>,
}

#[derive(Debug, Serialize)]
pub struct VariantReport<'a> {
    pub variant: DatasetVariant,
    pub dataset: DatasetStats,
    pub models: Vec<ModelReport<'a>>,
    pub comparison: &'a [CompareRow],
    pub decision: &'a Decision,
    pub decision_converged: bool,
    pub selection_converged: bool,
    pub selection: Option<&'a SelectionResult>,
    pub projection: Option<ProjectionReport<'a>>,
}

#[derive(Debug, Serialize)]
pub struct ModelReport<'a> {
    pub label: &'a str,
    pub formula: &'a Formula,
    pub prior: &'a PriorSpec,
    pub tau0: Option<f64>,
    pub summary: Vec<ParamSummary>,
    pub diagnostics: &'a ConvergenceReport,
    pub chains: &'a [ChainStats],
    pub loo: &'a LooResult,
}

#[derive(Debug, Serialize)]
pub struct ProjectionReport<'a> {
    #[serde(flatten)]
    pub projection: &'a ProjectedPosterior,
    pub summary: Vec<ParamSummary>,
}

impl<'a> ModelReport<'a> {
    fn new(m: &'a ModelAnalysis, prob: f64) -> Self {
        Self {
            label: &m.fit.label,
            formula: &m.fit.formula,
            prior: &m.fit.prior,
            tau0: m.fit.tau0,
            summary: m.fit.summary(prob),
            diagnostics: &m.diagnostics,
            chains: &m.fit.posterior.chain_stats,
            loo: &m.loo,
        }
    }
}

impl<'a> VariantReport<'a> {
    fn new(v: &'a VariantAnalysis, prob: f64) -> Self {
        Self {
            variant: v.dataset.variant,
            dataset: v.dataset.stats(),
            models: v.models().into_iter().map(|m| ModelReport::new(m, prob)).collect(),
            comparison: &v.comparison,
            decision: &v.decision,
            decision_converged: v.decision_converged,
            selection_converged: v.selection_converged,
            selection: v.selection.as_ref().map(|s| &s.selection),
            projection: v.selection.as_ref().map(|s| ProjectionReport {
                projection: &s.projection,
                summary: s.projection.summarize(prob),
            }),
        }
    }
}

/// Build the serializable report for an analysis run.
pub fn build_report<'a>(output: &'a AnalysisOutput, config: &'a AnalysisConfig) -> ReportFile<'a> {
    ReportFile {
        generated_at: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
        sampler: &config.sampler,
        hs_adapt_delta: config.hs_adapt_delta,
        interval_prob: config.interval_prob,
        variants: output
            .variants
            .iter()
            .map(|v| VariantReport::new(v, config.interval_prob))
            .collect(),
    }
}

/// Write the analysis report as pretty-printed JSON.
pub fn write_report_json(path: &Path, output: &AnalysisOutput, config: &AnalysisConfig) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create report JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, &build_report(output, config))
        .map_err(|e| AppError::input(format!("Failed to write report JSON: {e}")))
}

/// Write posterior draws as CSV: `chain,draw,<param>...`.
pub fn write_draws_csv(path: &Path, posterior: &Posterior) -> Result<(), AppError> {
    let mut wtr = csv::Writer::from_path(path)
        .map_err(|e| AppError::input(format!("Failed to create draws CSV '{}': {e}", path.display())))?;

    let mut header = vec!["chain".to_string(), "draw".to_string()];
    header.extend(posterior.param_names.iter().cloned());
    wtr.write_record(&header)
        .map_err(|e| AppError::input(format!("Failed to write draws CSV header: {e}")))?;

    for s in 0..posterior.n_draws() {
        let mut record = Vec::with_capacity(header.len());
        record.push((s / posterior.draws_per_chain + 1).to_string());
        record.push((s % posterior.draws_per_chain + 1).to_string());
        record.extend(posterior.draws.row(s).iter().map(|v| format!("{v:.10}")));
        wtr.write_record(&record)
            .map_err(|e| AppError::input(format!("Failed to write draws CSV row: {e}")))?;
    }
    wtr.flush()
        .map_err(|e| AppError::input(format!("Failed to flush draws CSV: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::posterior::tests::tiny_posterior;

    #[test]
    fn draws_csv_has_header_and_one_row_per_draw() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("draws.csv");
        write_draws_csv(&path, &tiny_posterior()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "chain,draw,(Intercept),x,sigma");
        assert_eq!(lines.len(), 5);
        assert!(lines[1].starts_with("1,1,1.0000000000,"));
        assert!(lines[4].starts_with("2,2,4.0000000000,"));
    }

    #[test]
    fn report_json_for_empty_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let output = AnalysisOutput { variants: Vec::new() };
        write_report_json(&path, &output, &AnalysisConfig::default()).unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["sampler"]["chains"], 4);
        assert!(value["variants"].as_array().unwrap().is_empty());
        assert!(value["generated_at"].is_string());
    }

    #[test]
    fn unwritable_path_is_an_input_error() {
        let err = write_draws_csv(Path::new("/nonexistent-dir/draws.csv"), &tiny_posterior()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
