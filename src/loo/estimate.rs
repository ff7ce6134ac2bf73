//! PSIS-LOO for a fitted model.

use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::diagnostics::ess_basic;
use crate::domain::Dataset;
use crate::fit::FittedModel;
use crate::loo::psis::{pareto_k_threshold, psis};
use crate::math::{log_mean_exp, log_sum_exp, variance};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointwiseLoo {
    pub elpd_loo: f64,
    pub p_loo: f64,
    /// In-sample log pointwise predictive density.
    pub lpd: f64,
    pub pareto_k: f64,
    pub r_eff: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LooResult {
    pub label: String,
    pub elpd_loo: f64,
    pub se: f64,
    pub p_loo: f64,
    pub p_loo_se: f64,
    pub looic: f64,
    pub pointwise: Vec<PointwiseLoo>,
    pub k_threshold: f64,
    pub n_bad_k: usize,
    /// Normalized PSIS log weights, `S × n`.
    #[serde(skip)]
    pub log_weights: DMatrix<f64>,
}

impl LooResult {
    pub fn n(&self) -> usize {
        self.pointwise.len()
    }

    /// Observations whose `k̂` exceeds the reliability threshold.
    pub fn bad_observations(&self) -> Vec<usize> {
        self.pointwise
            .iter()
            .enumerate()
            .filter(|(_, p)| p.pareto_k > self.k_threshold)
            .map(|(i, _)| i)
            .collect()
    }
}

/// `sqrt(n · var(values))`: standard error of a sum of pointwise terms.
pub fn sum_se(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    (values.len() as f64 * variance(values)).sqrt()
}

/// Relative efficiency of `exp(log_lik)` draws, respecting chain structure.
pub fn relative_eff(log_lik: &[f64], chains: usize) -> f64 {
    let s = log_lik.len();
    if chains == 0 || s % chains != 0 {
        return 1.0;
    }
    let max = log_lik.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let per_chain = s / chains;
    let split: Vec<Vec<f64>> = log_lik
        .chunks(per_chain)
        .map(|c| c.iter().map(|v| (v - max).exp()).collect())
        .collect();
    let ess = ess_basic(&split);
    if ess.is_finite() && ess > 0.0 { ess / s as f64 } else { 1.0 }
}

/// PSIS-LOO from a pointwise log-likelihood matrix (`S × n`, chain-major).
pub fn loo_from_log_lik(log_lik: &DMatrix<f64>, chains: usize, label: &str) -> LooResult {
    let (s, n) = log_lik.shape();
    let k_threshold = pareto_k_threshold(s);

    let columns: Vec<(PointwiseLoo, Vec<f64>)> = (0..n)
        .into_par_iter()
        .map(|i| {
            let ll: Vec<f64> = log_lik.column(i).iter().copied().collect();
            let r_eff = relative_eff(&ll, chains);
            let ratios: Vec<f64> = ll.iter().map(|v| -v).collect();
            let smoothed = psis(&ratios, r_eff);
            let weighted: Vec<f64> = smoothed.log_weights.iter().zip(&ll).map(|(w, l)| w + l).collect();
            let elpd_loo = log_sum_exp(&weighted);
            let lpd = log_mean_exp(&ll);
            (
                PointwiseLoo {
                    elpd_loo,
                    p_loo: lpd - elpd_loo,
                    lpd,
                    pareto_k: smoothed.pareto_k,
                    r_eff,
                },
                smoothed.log_weights,
            )
        })
        .collect();

    let mut log_weights = DMatrix::zeros(s, n);
    let mut pointwise = Vec::with_capacity(n);
    for (i, (p, lw)) in columns.into_iter().enumerate() {
        log_weights.set_column(i, &nalgebra::DVector::from_vec(lw));
        pointwise.push(p);
    }

    let elpd_i: Vec<f64> = pointwise.iter().map(|p| p.elpd_loo).collect();
    let p_i: Vec<f64> = pointwise.iter().map(|p| p.p_loo).collect();
    let elpd_loo: f64 = elpd_i.iter().sum();
    let n_bad_k = pointwise.iter().filter(|p| p.pareto_k > k_threshold).count();

    let result = LooResult {
        label: label.to_string(),
        elpd_loo,
        se: sum_se(&elpd_i),
        p_loo: p_i.iter().sum(),
        p_loo_se: sum_se(&p_i),
        looic: -2.0 * elpd_loo,
        pointwise,
        k_threshold,
        n_bad_k,
        log_weights,
    };

    info!(model = label, elpd_loo = result.elpd_loo, se = result.se, p_loo = result.p_loo, "loo");
    if n_bad_k > 0 {
        warn!(
            model = label,
            n_bad_k,
            threshold = k_threshold,
            "some Pareto k estimates are too high; LOO may be unreliable for those observations"
        );
    }
    result
}

/// PSIS-LOO of `fit` on `data`.
pub fn loo(fit: &FittedModel, data: &Dataset) -> LooResult {
    loo_from_log_lik(&fit.log_lik(data), fit.posterior.chains, &fit.label)
}
