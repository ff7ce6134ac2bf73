//! Pareto-smoothed importance sampling (Vehtari, Gelman & Gabry 2017/2024).

use crate::math::log_sum_exp;

/// Fewer tail draws than this and no Pareto fit is attempted.
const MIN_TAIL_LEN: usize = 5;
/// Grid size offset of the Zhang & Stephens estimator.
const MIN_GRID_POINTS: usize = 30;
/// Prior strength of the Zhang & Stephens estimator.
const GPD_PRIOR: f64 = 3.0;

#[derive(Debug, Clone, PartialEq)]
pub struct PsisResult {
    /// Normalized log weights (`log_sum_exp == 0`).
    pub log_weights: Vec<f64>,
    pub pareto_k: f64,
}

/// Number of draws in the smoothed tail.
pub fn tail_length(s: usize, r_eff: f64) -> usize {
    let s = s as f64;
    (0.2 * s).min(3.0 * (s / r_eff).sqrt()).ceil() as usize
}

/// `k̂` above this marks the importance sampling estimate as unreliable.
pub fn pareto_k_threshold(s: usize) -> f64 {
    (1.0 - 1.0 / (s as f64).log10()).min(0.7)
}

/// Smooth `log_ratios` (one value per draw) and return normalized log weights.
pub fn psis(log_ratios: &[f64], r_eff: f64) -> PsisResult {
    let s = log_ratios.len();
    if s == 0 {
        return PsisResult {
            log_weights: Vec::new(),
            pareto_k: f64::INFINITY,
        };
    }
    let r_eff = if r_eff.is_finite() && r_eff > 0.0 { r_eff } else { 1.0 };
    let max = log_ratios.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut lw: Vec<f64> = log_ratios.iter().map(|v| v - max).collect();

    let tail_len = tail_length(s, r_eff);
    let mut pareto_k = f64::INFINITY;
    if tail_len >= MIN_TAIL_LEN && tail_len < s {
        let mut order: Vec<usize> = (0..s).collect();
        order.sort_by(|&a, &b| lw[a].total_cmp(&lw[b]));
        let tail_ids = &order[s - tail_len..];
        let tail: Vec<f64> = tail_ids.iter().map(|&i| lw[i]).collect();
        let cutoff = lw[order[s - tail_len - 1]];

        if tail[tail_len - 1] - tail[0] <= f64::EPSILON / 100.0 {
            // Flat tail: weights are already as even as they get.
            pareto_k = 0.0;
        } else {
            let (smoothed, k) = smooth_tail(&tail, cutoff);
            pareto_k = k;
            for (&i, v) in tail_ids.iter().zip(smoothed) {
                lw[i] = v;
            }
        }
    }

    for v in lw.iter_mut() {
        if *v > 0.0 {
            *v = 0.0;
        }
    }
    let total = log_sum_exp(&lw);
    for v in lw.iter_mut() {
        *v -= total;
    }

    PsisResult {
        log_weights: lw,
        pareto_k,
    }
}

/// Replace the sorted tail by expected order statistics of the fitted GPD.
fn smooth_tail(tail: &[f64], cutoff: f64) -> (Vec<f64>, f64) {
    let exp_cutoff = cutoff.exp();
    let excess: Vec<f64> = tail.iter().map(|v| v.exp() - exp_cutoff).collect();
    let (k, sigma) = gpdfit(&excess);
    if !k.is_finite() {
        return (tail.to_vec(), k);
    }
    let m = tail.len() as f64;
    let smoothed = (0..tail.len())
        .map(|z| {
            let p = (z as f64 + 0.5) / m;
            (qgpd(p, k, sigma) + exp_cutoff).ln()
        })
        .collect();
    (smoothed, k)
}

/// Generalized Pareto quantile function.
pub fn qgpd(p: f64, k: f64, sigma: f64) -> f64 {
    if k.abs() < 1e-12 {
        return -sigma * (-p).ln_1p();
    }
    sigma * (-k * (-p).ln_1p()).exp_m1() / k
}

/// Zhang & Stephens (2009) posterior-mean estimate of `(k, σ)` for sorted
/// exceedances, with the weakly informative shrinkage of `k` towards 0.5.
pub fn gpdfit(x: &[f64]) -> (f64, f64) {
    let n = x.len();
    if n == 0 {
        return (f64::INFINITY, f64::NAN);
    }
    let nf = n as f64;
    let m = MIN_GRID_POINTS + nf.sqrt().floor() as usize;
    let quartile = x[((nf / 4.0 + 0.5).floor() as usize).saturating_sub(1).min(n - 1)];
    let x_max = x[n - 1];

    let theta: Vec<f64> = (1..=m)
        .map(|j| 1.0 / x_max + (1.0 - (m as f64 / (j as f64 - 0.5)).sqrt()) / GPD_PRIOR / quartile)
        .collect();
    let log_lik: Vec<f64> = theta.iter().map(|&t| nf * profile_log_lik(t, x)).collect();
    let norm = log_sum_exp(&log_lik);
    let theta_hat: f64 = theta
        .iter()
        .zip(&log_lik)
        .map(|(t, l)| t * (l - norm).exp())
        .sum();

    let k = x.iter().map(|v| (-theta_hat * v).ln_1p()).sum::<f64>() / nf;
    let sigma = -k / theta_hat;
    let k = k * nf / (nf + 10.0) + 10.0 * 0.5 / (nf + 10.0);
    if k.is_nan() {
        (f64::INFINITY, sigma)
    } else {
        (k, sigma)
    }
}

fn profile_log_lik(theta: f64, x: &[f64]) -> f64 {
    let a = -theta;
    let k = x.iter().map(|v| (a * v).ln_1p()).sum::<f64>() / x.len() as f64;
    (a / k).ln() - k - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::StandardNormal;

    fn normal_draws(s: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..s).map(|_| rng.sample(StandardNormal)).collect()
    }

    #[test]
    fn tail_length_follows_r_eff() {
        assert_eq!(tail_length(4000, 1.0), 190);
        assert_eq!(tail_length(100, 1.0), 20);
        assert!(tail_length(4000, 0.25) > tail_length(4000, 1.0));
    }

    #[test]
    fn threshold_is_capped_at_point_seven() {
        assert!((pareto_k_threshold(4000) - 0.7).abs() < 1e-12);
        assert!(pareto_k_threshold(100) < 0.7);
    }

    #[test]
    fn gpdfit_recovers_shape() {
        let mut rng = StdRng::seed_from_u64(5);
        let (k, sigma) = (0.5, 2.0);
        let mut x: Vec<f64> = (0..2000)
            .map(|_| {
                let u: f64 = rng.gen_range(0.0..1.0);
                sigma * ((1.0 - u).powf(-k) - 1.0) / k
            })
            .collect();
        x.sort_by(f64::total_cmp);
        let (k_hat, sigma_hat) = gpdfit(&x);
        assert!((k_hat - k).abs() < 0.1, "k {k_hat}");
        assert!((sigma_hat - sigma).abs() < 0.4, "sigma {sigma_hat}");
    }

    #[test]
    fn qgpd_is_monotone_and_starts_at_zero() {
        assert!(qgpd(0.0, 0.3, 1.0).abs() < 1e-12);
        assert!(qgpd(0.5, 0.3, 1.0) < qgpd(0.9, 0.3, 1.0));
        assert!((qgpd(0.5, 0.0, 1.0) - 2f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn weights_are_normalized_and_truncated() {
        let draws = normal_draws(4000, 1);
        let ratios: Vec<f64> = draws.iter().map(|x| 0.3 * x).collect();
        let res = psis(&ratios, 1.0);
        assert!(log_sum_exp(&res.log_weights).abs() < 1e-10);
        let raw_max = ratios.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let raw_total = log_sum_exp(&ratios);
        let cap = raw_max - raw_total;
        let max_lw = res.log_weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        // Smoothing never pushes a weight above the raw maximum (up to renormalization).
        assert!(max_lw <= cap + 0.1);
    }

    #[test]
    fn light_tails_give_small_k() {
        let draws = normal_draws(4000, 2);
        let ratios: Vec<f64> = draws.iter().map(|x| 0.3 * x).collect();
        let res = psis(&ratios, 1.0);
        assert!(res.pareto_k < 0.5, "k {}", res.pareto_k);
    }

    #[test]
    fn heavy_tails_give_large_k() {
        // Proposal N(0, 1), target N(0, 3): weights have infinite variance.
        let draws = normal_draws(4000, 3);
        let ratios: Vec<f64> = draws.iter().map(|x| x * x * (0.5 - 1.0 / 18.0)).collect();
        let res = psis(&ratios, 1.0);
        assert!(res.pareto_k > 0.5, "k {}", res.pareto_k);
    }

    #[test]
    fn constant_ratios_give_uniform_weights() {
        let res = psis(&[1.5; 200], 1.0);
        let expected = -(200f64).ln();
        assert!(res.log_weights.iter().all(|w| (w - expected).abs() < 1e-12));
        assert_eq!(res.pareto_k, 0.0);
    }
}
