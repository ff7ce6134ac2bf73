//! Posterior draws on the data scale.
//!
//! Draws are stored as an `S × P` matrix, chain-major (chain 0's draws first),
//! with columns `[(Intercept), β_1..β_D, sigma]`.

use nalgebra::DMatrix;
use serde::Serialize;

use crate::error::AppError;
use crate::math::{mean, normal_lpdf, quantile, sd};
use crate::sampler::{ChainOutput, ChainStats};

pub const INTERCEPT_NAME: &str = "(Intercept)";
pub const SIGMA_NAME: &str = "sigma";

#[derive(Debug, Clone)]
pub struct Posterior {
    pub param_names: Vec<String>,
    pub draws: DMatrix<f64>,
    pub chains: usize,
    pub draws_per_chain: usize,
    pub chain_stats: Vec<ChainStats>,
}

/// Marginal summary of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSummary {
    pub name: String,
    pub mean: f64,
    pub sd: f64,
    pub lower: f64,
    pub median: f64,
    pub upper: f64,
}

impl ParamSummary {
    pub fn from_draws(name: &str, draws: &[f64], prob: f64) -> Self {
        let tail = 0.5 * (1.0 - prob);
        Self {
            name: name.to_string(),
            mean: mean(draws),
            sd: sd(draws),
            lower: quantile(draws, tail),
            median: quantile(draws, 0.5),
            upper: quantile(draws, 1.0 - tail),
        }
    }
}

impl Posterior {
    /// Collect chain outputs, mapping every draw through `to_data_scale`.
    pub fn from_chains<F>(param_names: Vec<String>, outputs: Vec<ChainOutput>, to_data_scale: F) -> Result<Self, AppError>
    where
        F: Fn(&[f64]) -> Vec<f64>,
    {
        let chains = outputs.len();
        let draws_per_chain = outputs.first().map(|c| c.draws.len()).unwrap_or(0);
        if chains == 0 || draws_per_chain == 0 {
            return Err(AppError::numeric("Sampler returned no draws."));
        }
        let p = param_names.len();

        let mut values = Vec::with_capacity(chains * draws_per_chain * p);
        let mut chain_stats = Vec::with_capacity(chains);
        for out in outputs {
            if out.draws.len() != draws_per_chain {
                return Err(AppError::numeric("Chains returned different numbers of draws."));
            }
            for draw in &out.draws {
                let mapped = to_data_scale(draw);
                if mapped.len() != p {
                    return Err(AppError::numeric("Draw length does not match parameter names."));
                }
                if mapped.iter().any(|v| !v.is_finite()) {
                    return Err(AppError::numeric("Non-finite posterior draw."));
                }
                values.extend(mapped);
            }
            chain_stats.push(out.stats);
        }

        Ok(Self {
            param_names,
            draws: DMatrix::from_row_slice(chains * draws_per_chain, p, &values),
            chains,
            draws_per_chain,
            chain_stats,
        })
    }

    pub fn n_draws(&self) -> usize {
        self.draws.nrows()
    }

    pub fn n_params(&self) -> usize {
        self.draws.ncols()
    }

    /// Number of regression coefficients (excluding intercept and sigma).
    pub fn n_coefficients(&self) -> usize {
        self.n_params() - 2
    }

    pub fn column(&self, j: usize) -> Vec<f64> {
        self.draws.column(j).iter().copied().collect()
    }

    /// Draws of parameter `j`, split by chain.
    pub fn chain_columns(&self, j: usize) -> Vec<Vec<f64>> {
        let col = self.draws.column(j);
        (0..self.chains)
            .map(|c| {
                let start = c * self.draws_per_chain;
                col.rows(start, self.draws_per_chain).iter().copied().collect()
            })
            .collect()
    }

    pub fn sigma(&self) -> Vec<f64> {
        self.column(self.n_params() - 1)
    }

    /// Linear predictor `S × n` for covariates `x` (`n × D`, same column order as the fit).
    pub fn linear_predictor(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        let d = self.n_coefficients();
        let s = self.n_draws();
        let mut eta = if d == 0 {
            DMatrix::zeros(s, x.nrows())
        } else {
            self.draws.columns(1, d) * x.transpose()
        };
        for (mut row, alpha) in eta.row_iter_mut().zip(self.draws.column(0).iter()) {
            row.add_scalar_mut(*alpha);
        }
        eta
    }

    /// Pointwise Gaussian log likelihood, `S × n`.
    pub fn log_lik(&self, x: &DMatrix<f64>, y: &[f64]) -> DMatrix<f64> {
        let mut ll = self.linear_predictor(x);
        let sigma = self.sigma();
        for (s, sigma_s) in sigma.iter().enumerate() {
            for (i, &y_i) in y.iter().enumerate() {
                ll[(s, i)] = normal_lpdf(y_i, ll[(s, i)], *sigma_s);
            }
        }
        ll
    }

    /// Mean, sd and the central `prob` interval of every parameter.
    pub fn summarize(&self, prob: f64) -> Vec<ParamSummary> {
        (0..self.n_params())
            .map(|j| ParamSummary::from_draws(&self.param_names[j], &self.column(j), prob))
            .collect()
    }

    pub fn total_divergences(&self) -> usize {
        self.chain_stats.iter().map(|c| c.divergences).sum()
    }

    pub fn total_treedepth_hits(&self) -> usize {
        self.chain_stats.iter().map(|c| c.treedepth_hits).sum()
    }
}

/// Evenly spaced draw indices: `m` out of `total` (all of them when `m >= total`).
pub fn thin_indices(total: usize, m: usize) -> Vec<usize> {
    if m >= total {
        return (0..total).collect();
    }
    let step = total as f64 / m as f64;
    (0..m).map(|k| ((k as f64 + 0.5) * step) as usize).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn fake_stats(chain: usize) -> ChainStats {
        ChainStats {
            chain,
            step_size: 0.5,
            divergences: 0,
            treedepth_hits: 0,
            mean_accept_stat: 0.8,
            mean_tree_depth: 3.0,
            n_leapfrog: 10,
            ebfmi: 1.0,
        }
    }

    /// Two chains, two draws each, one coefficient.
    pub(crate) fn tiny_posterior() -> Posterior {
        let outputs = vec![
            ChainOutput { draws: vec![vec![1.0, 2.0, 1.0], vec![2.0, 2.0, 1.0]], stats: fake_stats(0) },
            ChainOutput { draws: vec![vec![3.0, 0.0, 2.0], vec![4.0, 0.0, 2.0]], stats: fake_stats(1) },
        ];
        let names = vec![INTERCEPT_NAME.to_string(), "x".to_string(), SIGMA_NAME.to_string()];
        Posterior::from_chains(names, outputs, |d| d.to_vec()).unwrap()
    }

    #[test]
    fn draws_are_chain_major() {
        let post = tiny_posterior();
        assert_eq!(post.n_draws(), 4);
        assert_eq!(post.column(0), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(post.chain_columns(0), vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        assert_eq!(post.n_coefficients(), 1);
    }

    #[test]
    fn linear_predictor_and_log_lik() {
        let post = tiny_posterior();
        let x = DMatrix::from_row_slice(2, 1, &[0.0, 1.0]);
        let eta = post.linear_predictor(&x);
        assert_eq!(eta.shape(), (4, 2));
        assert_eq!(eta[(0, 0)], 1.0);
        assert_eq!(eta[(0, 1)], 3.0);
        assert_eq!(eta[(3, 1)], 4.0);

        let ll = post.log_lik(&x, &[1.0, 3.0]);
        assert!((ll[(0, 0)] - normal_lpdf(1.0, 1.0, 1.0)).abs() < 1e-12);
        assert!((ll[(2, 1)] - normal_lpdf(3.0, 3.0, 2.0)).abs() < 1e-12);
    }

    #[test]
    fn summaries_cover_all_params() {
        let post = tiny_posterior();
        let s = post.summarize(0.9);
        assert_eq!(s.len(), 3);
        assert_eq!(s[0].name, INTERCEPT_NAME);
        assert!((s[0].mean - 2.5).abs() < 1e-12);
        assert!(s[0].lower < s[0].median && s[0].median < s[0].upper);
    }

    #[test]
    fn mismatched_chain_lengths_are_rejected() {
        let outputs = vec![
            ChainOutput { draws: vec![vec![1.0, 1.0]], stats: fake_stats(0) },
            ChainOutput { draws: vec![vec![1.0, 1.0], vec![1.0, 1.0]], stats: fake_stats(1) },
        ];
        let names = vec![INTERCEPT_NAME.to_string(), SIGMA_NAME.to_string()];
        assert!(Posterior::from_chains(names, outputs, |d| d.to_vec()).is_err());
    }

    #[test]
    fn thinning_is_even() {
        assert_eq!(thin_indices(10, 5), vec![1, 3, 5, 7, 9]);
        assert_eq!(thin_indices(3, 5), vec![0, 1, 2]);
    }
}
