//! Log posterior densities (up to a constant) with analytic gradients.
//!
//! Both models share the Gaussian likelihood on the standardized problem:
//!
//! ```text
//! ỹ_i ~ N(α̃ + x̃_iᵀ β̃, σ̃)
//! ```
//!
//! All positive parameters are sampled on the log scale; the log-Jacobian of
//! each transform is included in the density.

use nalgebra::DVector;

use crate::domain::HorseshoeConfig;
use crate::models::Standardization;

/// A differentiable log density on an unconstrained space.
pub trait LogDensity: Sync {
    /// Dimension of the unconstrained parameter vector.
    fn dim(&self) -> usize;

    /// Return `log p(θ)` and write `∇ log p(θ)` into `grad`.
    fn log_density_and_grad(&self, theta: &[f64], grad: &mut [f64]) -> f64;

    /// Map an unconstrained point to `[α̃, β̃_1..β̃_D, σ̃]`.
    fn constrain(&self, theta: &[f64]) -> Vec<f64>;
}

/// Gaussian log likelihood pieces for given `α̃`, `β̃`, `σ̃`.
struct Likelihood {
    value: f64,
    /// `∂/∂α̃`
    d_alpha: f64,
    /// `∂/∂β̃_j`
    d_beta: DVector<f64>,
    /// `∂/∂ log σ̃` holding `β̃` fixed.
    d_log_sigma: f64,
}

fn gaussian_likelihood(design: &Standardization, alpha: f64, beta: &DVector<f64>, sigma: f64) -> Likelihood {
    let n = design.n() as f64;
    let mut resid = design.y.add_scalar(-alpha);
    if !beta.is_empty() {
        resid -= &design.xc * beta;
    }
    let inv_var = 1.0 / (sigma * sigma);
    let ss = resid.norm_squared();

    Likelihood {
        value: -n * sigma.ln() - 0.5 * ss * inv_var,
        d_alpha: resid.sum() * inv_var,
        d_beta: design.xc.tr_mul(&resid) * inv_var,
        d_log_sigma: -n + ss * inv_var,
    }
}

/// Weakly-informative Gaussian priors.
///
/// ```text
/// α̃ ~ N(0, s)      β̃_j ~ N(0, s / sd(x_j))      σ̃ ~ Exponential(1)
/// ```
///
/// Unconstrained layout: `[α̃, β̃_1..β̃_D, log σ̃]`.
#[derive(Debug, Clone)]
pub struct NormalLinearModel {
    design: Standardization,
    alpha_sd: f64,
    beta_sd: Vec<f64>,
    sigma_rate: f64,
}

impl NormalLinearModel {
    pub fn new(design: Standardization, scale: f64) -> Self {
        let beta_sd = design.x_sds.iter().map(|s| scale / s).collect();
        Self {
            design,
            alpha_sd: scale,
            beta_sd,
            sigma_rate: 1.0,
        }
    }

    pub fn design(&self) -> &Standardization {
        &self.design
    }
}

impl LogDensity for NormalLinearModel {
    fn dim(&self) -> usize {
        self.design.d() + 2
    }

    fn log_density_and_grad(&self, theta: &[f64], grad: &mut [f64]) -> f64 {
        let d = self.design.d();
        let alpha = theta[0];
        let beta = DVector::from_row_slice(&theta[1..=d]);
        let log_sigma = theta[d + 1];
        let sigma = log_sigma.exp();

        let lik = gaussian_likelihood(&self.design, alpha, &beta, sigma);
        let mut lp = lik.value;

        lp -= 0.5 * (alpha / self.alpha_sd).powi(2);
        grad[0] = lik.d_alpha - alpha / (self.alpha_sd * self.alpha_sd);

        for j in 0..d {
            let s = self.beta_sd[j];
            lp -= 0.5 * (beta[j] / s).powi(2);
            grad[1 + j] = lik.d_beta[j] - beta[j] / (s * s);
        }

        // Exponential prior plus log-Jacobian of σ̃ = exp(ω).
        lp += -self.sigma_rate * sigma + log_sigma;
        grad[d + 1] = lik.d_log_sigma - self.sigma_rate * sigma + 1.0;

        lp
    }

    fn constrain(&self, theta: &[f64]) -> Vec<f64> {
        let d = self.design.d();
        let mut out = theta[..=d].to_vec();
        out.push(theta[d + 1].exp());
        out
    }
}

/// Regularized horseshoe prior (non-centered).
///
/// ```text
/// z_j ~ N(0, 1)              λ_j ~ half-t(ν_local)
/// τ = τ0 σ̃ τ_u               τ_u ~ half-t(ν_global)
/// c² = s_slab² caux          caux ~ InvGamma(ν_slab / 2, ν_slab / 2)
/// λ̃_j² = c² λ_j² / (c² + τ² λ_j²)
/// β̃_j = z_j τ λ̃_j
/// ```
///
/// Unconstrained layout: `[α̃, z_1..z_D, log λ_1..log λ_D, log τ_u, log caux, log σ̃]`.
#[derive(Debug, Clone)]
pub struct HorseshoeLinearModel {
    design: Standardization,
    alpha_sd: f64,
    tau0: f64,
    local_df: f64,
    global_df: f64,
    slab_df: f64,
    slab_scale: f64,
    sigma_rate: f64,
}

/// Coefficients implied by a horseshoe parameter vector plus the pieces the
/// gradient needs.
struct HorseshoeCoefficients {
    beta: DVector<f64>,
    /// `q_j = τ² λ_j² / (c² + τ² λ_j²)`
    q: Vec<f64>,
    /// `τ λ̃_j`
    scale: Vec<f64>,
}

impl HorseshoeLinearModel {
    pub fn new(design: Standardization, hs: &HorseshoeConfig) -> Self {
        let tau0 = hs.tau0(design.d(), design.n());
        Self {
            design,
            alpha_sd: 2.5,
            tau0,
            local_df: hs.local_df,
            global_df: hs.global_df,
            slab_df: hs.slab_df,
            slab_scale: hs.slab_scale,
            sigma_rate: 1.0,
        }
    }

    pub fn tau0(&self) -> f64 {
        self.tau0
    }

    pub fn design(&self) -> &Standardization {
        &self.design
    }

    fn coefficients(&self, theta: &[f64]) -> HorseshoeCoefficients {
        let d = self.design.d();
        let log_tau_u = theta[2 * d + 1];
        let log_caux = theta[2 * d + 2];
        let log_sigma = theta[2 * d + 3];

        let tau = self.tau0 * (log_sigma + log_tau_u).exp();
        let c2 = self.slab_scale * self.slab_scale * log_caux.exp();

        let mut beta = DVector::zeros(d);
        let mut q = Vec::with_capacity(d);
        let mut scale = Vec::with_capacity(d);
        for j in 0..d {
            let lambda = theta[1 + d + j].exp();
            let tl2 = (tau * lambda).powi(2);
            let lambda_tilde = (c2 / (c2 + tl2)).sqrt() * lambda;
            let s = tau * lambda_tilde;
            beta[j] = theta[1 + j] * s;
            q.push(tl2 / (c2 + tl2));
            scale.push(s);
        }
        HorseshoeCoefficients { beta, q, scale }
    }
}

/// `log p(e^u) + u` for a half-t(ν, 1) variable sampled on the log scale,
/// together with its derivative in `u`.
fn log_half_t_on_log_scale(u: f64, df: f64) -> (f64, f64) {
    let x2 = (2.0 * u).exp();
    let value = -0.5 * (df + 1.0) * (x2 / df).ln_1p() + u;
    let deriv = 1.0 - (df + 1.0) * x2 / (df + x2);
    (value, deriv)
}

impl LogDensity for HorseshoeLinearModel {
    fn dim(&self) -> usize {
        2 * self.design.d() + 4
    }

    fn log_density_and_grad(&self, theta: &[f64], grad: &mut [f64]) -> f64 {
        let d = self.design.d();
        let alpha = theta[0];
        let log_tau_u = theta[2 * d + 1];
        let log_caux = theta[2 * d + 2];
        let log_sigma = theta[2 * d + 3];
        let sigma = log_sigma.exp();

        let coef = self.coefficients(theta);
        let lik = gaussian_likelihood(&self.design, alpha, &coef.beta, sigma);
        let mut lp = lik.value;

        // Chain rule through β̃_j = z_j τ λ̃_j.
        let mut d_log_tau = 0.0;
        let mut d_log_c = 0.0;
        for j in 0..d {
            let g_beta = lik.d_beta[j] * coef.beta[j];
            d_log_tau += g_beta * (1.0 - coef.q[j]);
            d_log_c += g_beta * coef.q[j];

            let z = theta[1 + j];
            lp -= 0.5 * z * z;
            grad[1 + j] = lik.d_beta[j] * coef.scale[j] - z;

            let (lp_lambda, d_lambda) = log_half_t_on_log_scale(theta[1 + d + j], self.local_df);
            lp += lp_lambda;
            grad[1 + d + j] = g_beta * (1.0 - coef.q[j]) + d_lambda;
        }

        lp -= 0.5 * (alpha / self.alpha_sd).powi(2);
        grad[0] = lik.d_alpha - alpha / (self.alpha_sd * self.alpha_sd);

        let (lp_tau, d_tau) = log_half_t_on_log_scale(log_tau_u, self.global_df);
        lp += lp_tau;
        grad[2 * d + 1] = d_log_tau + d_tau;

        // Inverse-gamma(a, b) on caux plus log-Jacobian: -a v - b e^{-v}.
        let a = 0.5 * self.slab_df;
        let b = 0.5 * self.slab_df;
        lp += -a * log_caux - b * (-log_caux).exp();
        grad[2 * d + 2] = 0.5 * d_log_c - a + b * (-log_caux).exp();

        lp += -self.sigma_rate * sigma + log_sigma;
        grad[2 * d + 3] = lik.d_log_sigma + d_log_tau - self.sigma_rate * sigma + 1.0;

        lp
    }

    fn constrain(&self, theta: &[f64]) -> Vec<f64> {
        let d = self.design.d();
        let coef = self.coefficients(theta);
        let mut out = Vec::with_capacity(d + 2);
        out.push(theta[0]);
        out.extend(coef.beta.iter().copied());
        out.push(theta[2 * d + 3].exp());
        out
    }
}
