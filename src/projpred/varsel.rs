//! Variable selection: solution path, per-size predictive performance and
//! the suggested submodel size.
//!
//! With `Validation::None` sizes are scored in-sample on the same draws used
//! for the search, which rewards larger models (selection-induced overfitting).
//! With `Validation::Loo` the search is repeated for every observation using
//! that observation's PSIS-LOO weights, and the held-out observation is scored
//! with the fold's own path.

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{SelectionConfig, Validation};
use crate::error::AppError;
use crate::fit::thin_indices;
use crate::loo::sum_se;
use crate::math::{mean, sd};
use crate::projpred::projection::project_onto;
use crate::projpred::reference::ReferenceModel;
use crate::projpred::search::forward_search;

/// Predictive performance of the submodel with `size` terms.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizeStats {
    pub size: usize,
    pub elpd: f64,
    pub elpd_se: f64,
    /// `elpd(submodel) - elpd(reference)`, paired.
    pub diff: f64,
    pub diff_se: f64,
    /// Mean log predictive density.
    pub mlpd: f64,
    pub mse: f64,
    pub mse_se: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceStats {
    pub elpd: f64,
    pub elpd_se: f64,
    pub mlpd: f64,
    pub mse: f64,
    pub mse_se: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectionResult {
    pub validation: Validation,
    pub reference_label: String,
    /// Full-data search: column indices in entry order.
    pub solution_path: Vec<usize>,
    pub solution_terms: Vec<String>,
    /// Sizes `0..=max_size`.
    pub sizes: Vec<SizeStats>,
    pub reference: ReferenceStats,
    pub suggested_size: usize,
    /// `true` when no size reached the reference and the maximum was used instead.
    pub suggestion_capped: bool,
    /// LOO only: fraction of folds whose first `k` terms contain the full-data
    /// `k`-th term (`k = 1..=max_size`).
    pub stability: Option<Vec<f64>>,
    pub suggest_z: f64,
}

impl SelectionResult {
    pub fn max_size(&self) -> usize {
        self.solution_path.len()
    }

    pub fn terms(&self, size: usize) -> &[String] {
        &self.solution_terms[..size.min(self.solution_terms.len())]
    }
}

/// Pointwise scores at every size.
struct SizeScores {
    /// `lpd[k][i]`
    lpd: Vec<Vec<f64>>,
    /// `err2[k][i]`
    err2: Vec<Vec<f64>>,
}

/// Run the search and evaluate every size according to `config.validation`.
pub fn varsel(reference: &ReferenceModel, config: &SelectionConfig) -> Result<SelectionResult, AppError> {
    config.validate()?;
    let max_size = config.resolved_max_size(reference.n_covariates());
    let search_idx = thin_indices(reference.n_draws(), config.search_draws);
    let pred_idx = thin_indices(reference.n_draws(), config.pred_draws);

    info!(
        reference = %reference.label,
        validation = ?config.validation,
        max_size,
        "variable selection"
    );

    let solution_path = forward_search(&reference.x, &reference.draws(&search_idx), max_size)?;
    debug!(path = ?solution_path, "full-data search");

    let (scores, stability) = match config.validation {
        Validation::None => (in_sample_scores(reference, &solution_path, &pred_idx)?, None),
        Validation::Loo => {
            let (scores, fold_paths) = loo_scores(reference, max_size, &search_idx, &pred_idx)?;
            (scores, Some(stability(&solution_path, &fold_paths)))
        }
    };

    let loo = config.validation == Validation::Loo;
    let ref_lpd = if loo { &reference.elpd_loo_i } else { &reference.lpd_i };
    let ref_err2: Vec<f64> = (0..reference.n())
        .map(|i| (reference.y[i] - reference.predictive_mean(i, loo)).powi(2))
        .collect();

    let sizes: Vec<SizeStats> = (0..=max_size)
        .map(|k| size_stats(k, &scores.lpd[k], &scores.err2[k], ref_lpd))
        .collect();
    let (suggested_size, suggestion_capped) = suggest_size(&sizes, config.suggest_z);
    if suggestion_capped {
        warn!(
            max_size,
            "no submodel size reached the reference model's performance; using the largest size"
        );
    }
    info!(suggested_size, "suggested submodel size");

    Ok(SelectionResult {
        validation: config.validation,
        reference_label: reference.label.clone(),
        solution_terms: solution_path.iter().map(|&j| reference.covariate_names[j].clone()).collect(),
        solution_path,
        sizes,
        reference: ReferenceStats {
            elpd: ref_lpd.iter().sum(),
            elpd_se: sum_se(ref_lpd),
            mlpd: mean(ref_lpd),
            mse: mean(&ref_err2),
            mse_se: mean_se(&ref_err2),
        },
        suggested_size,
        suggestion_capped,
        stability,
        suggest_z: config.suggest_z,
    })
}

/// Cross-validated selection (`Validation::Loo`) regardless of `config.validation`.
pub fn cv_varsel(reference: &ReferenceModel, config: &SelectionConfig) -> Result<SelectionResult, AppError> {
    let config = SelectionConfig {
        validation: Validation::Loo,
        ..config.clone()
    };
    varsel(reference, &config)
}

fn in_sample_scores(reference: &ReferenceModel, path: &[usize], pred_idx: &[usize]) -> Result<SizeScores, AppError> {
    let draws = reference.draws(pred_idx);
    let mut lpd = Vec::with_capacity(path.len() + 1);
    let mut err2 = Vec::with_capacity(path.len() + 1);
    for k in 0..=path.len() {
        let proj = project_onto(&reference.x, &draws, &path[..k])?;
        lpd.push(
            (0..reference.n())
                .map(|i| proj.lpd_at(i, reference.y[i], &draws.weights))
                .collect(),
        );
        err2.push(
            (0..reference.n())
                .map(|i| (reference.y[i] - proj.mean_at(i, &draws.weights)).powi(2))
                .collect(),
        );
    }
    Ok(SizeScores { lpd, err2 })
}

/// One fold per observation: search with that observation's LOO weights and
/// score it at every size along the fold's own path.
fn loo_scores(
    reference: &ReferenceModel,
    max_size: usize,
    search_idx: &[usize],
    pred_idx: &[usize],
) -> Result<(SizeScores, Vec<Vec<usize>>), AppError> {
    let n = reference.n();
    let folds: Vec<(Vec<f64>, Vec<f64>, Vec<usize>)> = (0..n)
        .into_par_iter()
        .map(|i| -> Result<(Vec<f64>, Vec<f64>, Vec<usize>), AppError> {
            let path = forward_search(&reference.x, &reference.loo_draws(search_idx, i), max_size)?;
            let draws = reference.loo_draws(pred_idx, i);
            let mut lpd = Vec::with_capacity(max_size + 1);
            let mut err2 = Vec::with_capacity(max_size + 1);
            for k in 0..=max_size {
                let proj = project_onto(&reference.x, &draws, &path[..k])?;
                lpd.push(proj.lpd_at(i, reference.y[i], &draws.weights));
                err2.push((reference.y[i] - proj.mean_at(i, &draws.weights)).powi(2));
            }
            debug!(fold = i, path = ?path, "loo fold");
            Ok((lpd, err2, path))
        })
        .collect::<Result<_, _>>()?;

    let mut lpd = vec![Vec::with_capacity(n); max_size + 1];
    let mut err2 = vec![Vec::with_capacity(n); max_size + 1];
    let mut paths = Vec::with_capacity(n);
    for (fold_lpd, fold_err2, path) in folds {
        for k in 0..=max_size {
            lpd[k].push(fold_lpd[k]);
            err2[k].push(fold_err2[k]);
        }
        paths.push(path);
    }
    Ok((SizeScores { lpd, err2 }, paths))
}

fn mean_se(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    sd(values) / (values.len() as f64).sqrt()
}

fn size_stats(size: usize, lpd: &[f64], err2: &[f64], ref_lpd: &[f64]) -> SizeStats {
    let diffs: Vec<f64> = lpd.iter().zip(ref_lpd).map(|(a, b)| a - b).collect();
    SizeStats {
        size,
        elpd: lpd.iter().sum(),
        elpd_se: sum_se(lpd),
        diff: diffs.iter().sum(),
        diff_se: sum_se(&diffs),
        mlpd: mean(lpd),
        mse: mean(err2),
        mse_se: mean_se(err2),
    }
}

/// Smallest size whose `diff + z · diff_se` reaches zero. Returns the largest
/// size and `true` when none does.
pub fn suggest_size(sizes: &[SizeStats], z: f64) -> (usize, bool) {
    match sizes.iter().find(|s| s.diff + z * s.diff_se >= 0.0) {
        Some(s) => (s.size, false),
        None => (sizes.last().map_or(0, |s| s.size), true),
    }
}

/// For `k = 1..=len(path)`: fraction of fold paths whose first `k` entries
/// contain `path[k - 1]`.
pub fn stability(path: &[usize], fold_paths: &[Vec<usize>]) -> Vec<f64> {
    if fold_paths.is_empty() {
        return vec![0.0; path.len()];
    }
    path.iter()
        .enumerate()
        .map(|(k, term)| {
            let hits = fold_paths
                .iter()
                .filter(|fp| fp.iter().take(k + 1).any(|t| t == term))
                .count();
            hits as f64 / fold_paths.len() as f64
        })
        .collect()
}
