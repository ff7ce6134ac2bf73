//! Projected posterior for a chosen submodel size.

use nalgebra::DMatrix;
use serde::Serialize;
use tracing::info;

use crate::error::AppError;
use crate::fit::{INTERCEPT_NAME, ParamSummary, SIGMA_NAME, thin_indices};
use crate::projpred::projection::project_onto;
use crate::projpred::reference::ReferenceModel;
use crate::projpred::varsel::SelectionResult;

#[derive(Debug, Clone, Serialize)]
pub struct ProjectedPosterior {
    pub terms: Vec<String>,
    pub param_names: Vec<String>,
    /// `m × (k + 2)`: intercept, coefficients in entry order, sigma.
    #[serde(skip)]
    pub draws: DMatrix<f64>,
    pub kl: f64,
}

impl ProjectedPosterior {
    pub fn size(&self) -> usize {
        self.terms.len()
    }

    pub fn n_draws(&self) -> usize {
        self.draws.nrows()
    }

    pub fn column(&self, j: usize) -> Vec<f64> {
        self.draws.column(j).iter().copied().collect()
    }

    pub fn summarize(&self, prob: f64) -> Vec<ParamSummary> {
        self.param_names
            .iter()
            .enumerate()
            .map(|(j, name)| ParamSummary::from_draws(name, &self.column(j), prob))
            .collect()
    }
}

/// Project the reference posterior onto the first `nterms` terms of the
/// selection's solution path (default: the suggested size), using `ndraws`
/// evenly thinned reference draws.
pub fn project(
    reference: &ReferenceModel,
    selection: &SelectionResult,
    nterms: Option<usize>,
    ndraws: usize,
) -> Result<ProjectedPosterior, AppError> {
    let k = nterms.unwrap_or(selection.suggested_size);
    if k > selection.solution_path.len() {
        return Err(AppError::input(format!(
            "Cannot project onto {k} terms: the solution path has only {}.",
            selection.solution_path.len()
        )));
    }
    if ndraws == 0 {
        return Err(AppError::input("Projection needs at least one draw."));
    }

    let subset = &selection.solution_path[..k];
    let draws = reference.draws(&thin_indices(reference.n_draws(), ndraws));
    let proj = project_onto(&reference.x, &draws, subset)?;

    let m = draws.len();
    let mut out = DMatrix::zeros(m, k + 2);
    out.columns_mut(0, k + 1).copy_from(&proj.coefs);
    for (s, sigma) in proj.sigma.iter().enumerate() {
        out[(s, k + 1)] = *sigma;
    }

    let terms: Vec<String> = selection.terms(k).to_vec();
    let mut param_names = Vec::with_capacity(k + 2);
    param_names.push(INTERCEPT_NAME.to_string());
    param_names.extend(terms.iter().cloned());
    param_names.push(SIGMA_NAME.to_string());

    info!(size = k, draws = m, terms = ?terms, "projected posterior");

    Ok(ProjectedPosterior {
        terms,
        param_names,
        draws: out,
        kl: proj.kl,
    })
}
