//! The reference model whose predictions submodels are projected onto.

use nalgebra::DMatrix;

use crate::domain::Dataset;
use crate::error::AppError;
use crate::fit::FittedModel;
use crate::loo::LooResult;
use crate::math::log_sum_exp;
use crate::projpred::projection::DrawSet;

#[derive(Debug, Clone)]
pub struct ReferenceModel {
    pub label: String,
    /// Candidate covariates (`n × D`), in the reference formula's order.
    pub x: DMatrix<f64>,
    pub y: Vec<f64>,
    pub covariate_names: Vec<String>,
    /// Predictive means `S × n`.
    pub mu: DMatrix<f64>,
    pub sigma: Vec<f64>,
    /// PSIS-LOO log weights `S × n`.
    pub log_weights: DMatrix<f64>,
    pub elpd_loo_i: Vec<f64>,
    /// In-sample log predictive density per observation.
    pub lpd_i: Vec<f64>,
}

impl ReferenceModel {
    pub fn new(fit: &FittedModel, data: &Dataset, loo: &LooResult) -> Result<Self, AppError> {
        let mu = fit.linear_predictor(data);
        if loo.n() != data.n_rows() || loo.log_weights.shape() != mu.shape() {
            return Err(AppError::data(format!(
                "LOO result '{}' does not belong to model '{}' on this dataset.",
                loo.label, fit.label
            )));
        }
        Ok(Self {
            label: fit.label.clone(),
            x: fit.design(data),
            y: data.y.clone(),
            covariate_names: fit.formula.covariates.clone(),
            mu,
            sigma: fit.posterior.sigma(),
            log_weights: loo.log_weights.clone(),
            elpd_loo_i: loo.pointwise.iter().map(|p| p.elpd_loo).collect(),
            lpd_i: loo.pointwise.iter().map(|p| p.lpd).collect(),
        })
    }

    pub fn n(&self) -> usize {
        self.y.len()
    }

    pub fn n_draws(&self) -> usize {
        self.sigma.len()
    }

    pub fn n_covariates(&self) -> usize {
        self.x.ncols()
    }

    /// Draws `indices` with equal weights.
    pub fn draws(&self, indices: &[usize]) -> DrawSet {
        let w = 1.0 / indices.len() as f64;
        self.draw_set(indices, vec![w; indices.len()])
    }

    /// Draws `indices` weighted by the PSIS-LOO weights of observation `obs`.
    pub fn loo_draws(&self, indices: &[usize], obs: usize) -> DrawSet {
        let lw: Vec<f64> = indices.iter().map(|&s| self.log_weights[(s, obs)]).collect();
        let total = log_sum_exp(&lw);
        self.draw_set(indices, lw.iter().map(|v| (v - total).exp()).collect())
    }

    fn draw_set(&self, indices: &[usize], weights: Vec<f64>) -> DrawSet {
        let n = self.n();
        let mut mu = DMatrix::zeros(indices.len(), n);
        for (r, &s) in indices.iter().enumerate() {
            mu.set_row(r, &self.mu.row(s));
        }
        DrawSet {
            mu,
            sigma: indices.iter().map(|&s| self.sigma[s]).collect(),
            weights,
        }
    }

    /// Reference predictive mean at observation `i`, LOO-weighted when `loo`.
    pub fn predictive_mean(&self, i: usize, loo: bool) -> f64 {
        let col = self.mu.column(i);
        if loo {
            let lw = self.log_weights.column(i);
            col.iter().zip(lw.iter()).map(|(m, w)| m * w.exp()).sum()
        } else {
            col.mean()
        }
    }
}
