//! R-hat and effective sample size (Vehtari et al. 2021).
//!
//! All functions take one `Vec<f64>` per chain; chains must have equal length.

use crate::math::{average_ranks, inverse_normal_cdf, mean, median, quantile};

/// Split every chain in half (the middle draw of an odd-length chain is dropped).
pub fn split_chains(chains: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let mut out = Vec::with_capacity(chains.len() * 2);
    for chain in chains {
        let half = chain.len() / 2;
        out.push(chain[..half].to_vec());
        out.push(chain[chain.len() - half..].to_vec());
    }
    out
}

/// Rank-normalize the pooled draws: `Φ⁻¹((r - 3/8) / (S + 1/4))`.
pub fn z_scale(chains: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let pooled: Vec<f64> = chains.iter().flatten().copied().collect();
    let s = pooled.len() as f64;
    let ranks = average_ranks(&pooled);
    let mut z = ranks.into_iter().map(|r| inverse_normal_cdf((r - 0.375) / (s + 0.25)));
    chains
        .iter()
        .map(|chain| z.by_ref().take(chain.len()).collect())
        .collect()
}

/// Fold draws around the pooled median: `|x - median|`.
pub fn fold(chains: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let pooled: Vec<f64> = chains.iter().flatten().copied().collect();
    let med = median(&pooled);
    chains
        .iter()
        .map(|chain| chain.iter().map(|x| (x - med).abs()).collect())
        .collect()
}

/// Classic potential scale reduction on the given chains (no splitting).
pub fn rhat_basic(chains: &[Vec<f64>]) -> f64 {
    let m = chains.len();
    let n = chains.first().map_or(0, Vec::len);
    if m < 2 || n < 2 {
        return f64::NAN;
    }
    let means: Vec<f64> = chains.iter().map(|c| mean(c)).collect();
    let vars: Vec<f64> = chains
        .iter()
        .zip(&means)
        .map(|(c, m)| c.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (n as f64 - 1.0))
        .collect();
    let w = mean(&vars);
    if !(w > 0.0) {
        return f64::NAN;
    }
    let grand = mean(&means);
    let b_over_n = means.iter().map(|m| (m - grand).powi(2)).sum::<f64>() / (m as f64 - 1.0);
    let var_plus = (n as f64 - 1.0) / n as f64 * w + b_over_n;
    (var_plus / w).sqrt()
}

/// Rank-normalized split R-hat: the larger of the bulk and folded versions.
pub fn rhat(chains: &[Vec<f64>]) -> f64 {
    let split = split_chains(chains);
    let bulk = rhat_basic(&z_scale(&split));
    let tail = rhat_basic(&z_scale(&fold(&split)));
    match (bulk.is_nan(), tail.is_nan()) {
        (true, true) => f64::NAN,
        (true, false) => tail,
        (false, true) => bulk,
        (false, false) => bulk.max(tail),
    }
}

/// Per-chain autocovariances, computed one lag at a time.
struct Autocovariance {
    centered: Vec<Vec<f64>>,
    n: usize,
}

impl Autocovariance {
    fn new(chains: &[Vec<f64>]) -> Self {
        let centered = chains
            .iter()
            .map(|c| {
                let m = mean(c);
                c.iter().map(|x| x - m).collect()
            })
            .collect();
        Self {
            centered,
            n: chains.first().map_or(0, Vec::len),
        }
    }

    /// Mean over chains of the biased lag-`t` autocovariance.
    fn mean_at(&self, t: usize) -> f64 {
        let per_chain: Vec<f64> = self
            .centered
            .iter()
            .map(|c| c[..self.n - t].iter().zip(&c[t..]).map(|(a, b)| a * b).sum::<f64>() / self.n as f64)
            .collect();
        mean(&per_chain)
    }
}

/// Effective sample size using Geyer's initial monotone sequence across chains.
pub fn ess_basic(chains: &[Vec<f64>]) -> f64 {
    let m = chains.len();
    let n = chains.first().map_or(0, Vec::len);
    if m == 0 || n < 4 {
        return f64::NAN;
    }

    let acov = Autocovariance::new(chains);
    let nf = n as f64;
    let mean_var = acov.mean_at(0) * nf / (nf - 1.0);
    let mut var_plus = mean_var * (nf - 1.0) / nf;
    if m > 1 {
        let means: Vec<f64> = chains.iter().map(|c| mean(c)).collect();
        let grand = mean(&means);
        var_plus += means.iter().map(|x| (x - grand).powi(2)).sum::<f64>() / (m as f64 - 1.0);
    }
    if !(var_plus > 0.0) {
        return f64::NAN;
    }

    let rho_at = |t: usize| 1.0 - (mean_var - acov.mean_at(t)) / var_plus;

    let mut rho = vec![0.0; n];
    let mut t = 0;
    let mut rho_even = 1.0;
    let mut rho_odd = rho_at(1);
    rho[0] = rho_even;
    rho[1] = rho_odd;
    while t + 5 < n && (rho_even + rho_odd) > 0.0 {
        t += 2;
        rho_even = rho_at(t);
        rho_odd = rho_at(t + 1);
        if rho_even + rho_odd >= 0.0 {
            rho[t] = rho_even;
            rho[t + 1] = rho_odd;
        }
    }
    let max_t = t;
    if rho_even > 0.0 {
        rho[max_t] = rho_even;
    }

    // Initial monotone sequence.
    let mut t = 0;
    while t + 4 <= max_t {
        t += 2;
        let prev = rho[t - 2] + rho[t - 1];
        if rho[t] + rho[t + 1] > prev {
            rho[t] = prev / 2.0;
            rho[t + 1] = rho[t];
        }
    }

    let total = (m * n) as f64;
    let tau = -1.0 + 2.0 * rho[..max_t].iter().sum::<f64>() + rho[max_t];
    let tau = tau.max(1.0 / total.log10());
    total / tau
}

/// Bulk ESS: rank-normalized split chains.
pub fn ess_bulk(chains: &[Vec<f64>]) -> f64 {
    ess_basic(&z_scale(&split_chains(chains)))
}

/// Tail ESS: the smaller ESS of the 5% and 95% quantile indicators.
pub fn ess_tail(chains: &[Vec<f64>]) -> f64 {
    let pooled: Vec<f64> = chains.iter().flatten().copied().collect();
    let split = split_chains(chains);
    let ess_at = |prob: f64| {
        let q = quantile(&pooled, prob);
        let indicator: Vec<Vec<f64>> = split
            .iter()
            .map(|c| c.iter().map(|&x| if x <= q { 1.0 } else { 0.0 }).collect())
            .collect();
        ess_basic(&indicator)
    };
    let lo = ess_at(0.05);
    let hi = ess_at(0.95);
    match (lo.is_nan(), hi.is_nan()) {
        (true, _) => hi,
        (_, true) => lo,
        _ => lo.min(hi),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, StandardNormal};

    fn iid_chains(m: usize, n: usize, seed: u64) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..m)
            .map(|_| (0..n).map(|_| StandardNormal.sample(&mut rng)).collect())
            .collect()
    }

    fn ar1_chain(n: usize, phi: f64, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut x = 0.0;
        (0..n)
            .map(|_| {
                let e: f64 = StandardNormal.sample(&mut rng);
                x = phi * x + e;
                x
            })
            .collect()
    }

    #[test]
    fn rhat_close_to_one_for_iid_chains() {
        let chains = iid_chains(4, 1000, 1);
        let r = rhat(&chains);
        assert!(r < 1.01, "rhat {r}");
    }

    #[test]
    fn rhat_flags_shifted_chain() {
        let mut chains = iid_chains(4, 500, 2);
        for x in chains[3].iter_mut() {
            *x += 3.0;
        }
        assert!(rhat(&chains) > 1.1);
    }

    #[test]
    fn rhat_detects_scale_difference_through_folding() {
        let mut chains = iid_chains(4, 1000, 3);
        for x in chains[0].iter_mut() {
            *x *= 4.0;
        }
        let split = split_chains(&chains);
        let folded = rhat_basic(&z_scale(&fold(&split)));
        assert!(folded > 1.01, "folded {folded}");
        assert!(rhat(&chains) >= folded);
    }

    #[test]
    fn ess_of_iid_draws_is_near_total() {
        let chains = iid_chains(4, 1000, 4);
        let ess = ess_bulk(&chains);
        assert!(ess > 3000.0 && ess < 5000.0, "ess {ess}");
        let tail = ess_tail(&chains);
        assert!(tail > 2000.0, "tail {tail}");
    }

    #[test]
    fn ess_of_autocorrelated_chain_matches_ar1_theory() {
        // AR(1) with phi = 0.9: n (1 - phi) / (1 + phi) ≈ n / 19.
        let chains: Vec<Vec<f64>> = (0..4).map(|c| ar1_chain(4000, 0.9, 10 + c)).collect();
        let ess = ess_basic(&chains);
        let expected = 16000.0 / 19.0;
        assert!(ess > 0.6 * expected && ess < 1.5 * expected, "ess {ess} vs {expected}");
    }

    #[test]
    fn constant_chains_give_nan() {
        let chains = vec![vec![1.0; 50], vec![1.0; 50]];
        assert!(ess_basic(&chains).is_nan());
        assert!(rhat_basic(&chains).is_nan());
    }

    #[test]
    fn split_drops_middle_of_odd_chain() {
        let split = split_chains(&[vec![1.0, 2.0, 3.0, 4.0, 5.0]]);
        assert_eq!(split, vec![vec![1.0, 2.0], vec![4.0, 5.0]]);
    }
}
