//! KL projection of reference draws onto a covariate subset.
//!
//! For a Gaussian model the projection has a closed form: each reference draw
//! `(μ_s, σ_s)` maps to the least-squares fit `θ⊥_s` of `μ_s` on `[1, X_A]`
//! and the noise `σ⊥_s² = σ_s² + mean_i (μ_is - x_iᵀθ⊥_s)²`.

use nalgebra::DMatrix;

use crate::error::AppError;
use crate::math::{LN_SQRT_2PI, log_sum_exp, solve_least_squares_multi, with_intercept};

/// A weighted set of reference draws.
#[derive(Debug, Clone)]
pub struct DrawSet {
    /// Predictive means `m × n`.
    pub mu: DMatrix<f64>,
    pub sigma: Vec<f64>,
    /// Sums to one.
    pub weights: Vec<f64>,
}

impl DrawSet {
    pub fn len(&self) -> usize {
        self.sigma.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sigma.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Projection {
    /// Selected covariate columns, in entry order.
    pub subset: Vec<usize>,
    /// `m × (|A| + 1)`: intercept then coefficients in `subset` order.
    pub coefs: DMatrix<f64>,
    pub sigma: Vec<f64>,
    /// Fitted means `m × n`.
    pub fitted: DMatrix<f64>,
    /// Weighted KL divergence from the reference draws.
    pub kl: f64,
}

impl Projection {
    /// Log predictive density of `y` at observation `i`, mixing draws with `weights`.
    pub fn lpd_at(&self, i: usize, y: f64, weights: &[f64]) -> f64 {
        let terms: Vec<f64> = (0..self.sigma.len())
            .map(|s| {
                let z = (y - self.fitted[(s, i)]) / self.sigma[s];
                weights[s].ln() - 0.5 * z * z - self.sigma[s].ln() - LN_SQRT_2PI
            })
            .collect();
        log_sum_exp(&terms)
    }

    /// Weighted predictive mean at observation `i`.
    pub fn mean_at(&self, i: usize, weights: &[f64]) -> f64 {
        (0..self.sigma.len()).map(|s| weights[s] * self.fitted[(s, i)]).sum()
    }
}

/// Project `draws` onto the columns `subset` of `x` (plus an intercept).
pub fn project_onto(x: &DMatrix<f64>, draws: &DrawSet, subset: &[usize]) -> Result<Projection, AppError> {
    let n = x.nrows();
    if draws.mu.ncols() != n {
        return Err(AppError::data("Reference predictions do not match the design."));
    }
    let mut cols = DMatrix::zeros(n, subset.len());
    for (j, &c) in subset.iter().enumerate() {
        cols.set_column(j, &x.column(c));
    }
    let design = with_intercept(&cols);

    let rhs = draws.mu.transpose();
    let theta = solve_least_squares_multi(&design, &rhs)
        .ok_or_else(|| AppError::numeric(format!("Projection onto {subset:?} is ill-conditioned.")))?;
    let fitted = (&design * &theta).transpose();

    let mut sigma = Vec::with_capacity(draws.len());
    let mut kl = 0.0;
    for s in 0..draws.len() {
        let mse = (0..n)
            .map(|i| (draws.mu[(s, i)] - fitted[(s, i)]).powi(2))
            .sum::<f64>()
            / n as f64;
        let ref_var = draws.sigma[s] * draws.sigma[s];
        let var = ref_var + mse;
        kl += draws.weights[s] * 0.5 * n as f64 * (var / ref_var).ln();
        sigma.push(var.sqrt());
    }

    Ok(Projection {
        subset: subset.to_vec(),
        coefs: theta.transpose(),
        sigma,
        fitted,
        kl,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::normal_lpdf;
    use crate::projpred::reference::tests::toy_reference;

    #[test]
    fn full_projection_of_linear_means_is_exact() {
        // μ exactly linear in x: projecting onto x loses nothing.
        let x = DMatrix::from_row_slice(4, 2, &[0.0, 1.0, 1.0, 0.0, 2.0, 1.0, 3.0, 0.0]);
        let mu = DMatrix::from_row_slice(2, 4, &[1.0, 3.0, 5.0, 7.0, 0.0, 1.0, 2.0, 3.0]);
        let draws = DrawSet {
            mu,
            sigma: vec![1.0, 2.0],
            weights: vec![0.5, 0.5],
        };
        let p = project_onto(&x, &draws, &[0]).unwrap();
        assert!(p.kl.abs() < 1e-10);
        assert!((p.coefs[(0, 0)] - 1.0).abs() < 1e-10);
        assert!((p.coefs[(0, 1)] - 2.0).abs() < 1e-10);
        assert!((p.sigma[1] - 2.0).abs() < 1e-10);
    }

    #[test]
    fn empty_subset_projects_onto_the_mean() {
        let reference = toy_reference();
        let draws = reference.draws(&[0, 1, 2, 3]);
        let p = project_onto(&reference.x, &draws, &[]).unwrap();
        assert_eq!(p.coefs.ncols(), 1);
        assert!((p.coefs[(0, 0)] - 2.0).abs() < 1e-10);
        // Lost signal moves into the noise.
        let expected = (0.25f64 + 2.0 / 3.0).sqrt();
        assert!((p.sigma[0] - expected).abs() < 1e-10);
        assert!(p.kl > 0.0);
    }

    #[test]
    fn adding_a_covariate_never_increases_kl() {
        let reference = toy_reference();
        let draws = reference.draws(&[0, 1, 2, 3]);
        let empty = project_onto(&reference.x, &draws, &[]).unwrap();
        let full = project_onto(&reference.x, &draws, &[0]).unwrap();
        assert!(full.kl <= empty.kl);
    }

    #[test]
    fn lpd_mixes_draws() {
        let reference = toy_reference();
        let draws = reference.draws(&[0]);
        let p = project_onto(&reference.x, &draws, &[0]).unwrap();
        let lpd = p.lpd_at(1, 2.0, &[1.0]);
        assert!((lpd - normal_lpdf(2.0, 2.0, 0.5)).abs() < 1e-10);
        assert!((p.mean_at(1, &[1.0]) - 2.0).abs() < 1e-10);
    }
}
