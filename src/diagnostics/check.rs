//! Convergence verdict for one fitted model.

use serde::Serialize;
use tracing::warn;

use crate::diagnostics::convergence::{ess_bulk, ess_tail, rhat};
use crate::fit::Posterior;

pub const RHAT_THRESHOLD: f64 = 1.01;
/// Minimum bulk/tail ESS per chain.
pub const ESS_PER_CHAIN: f64 = 100.0;
/// Chains below this E-BFMI are reported but do not fail the check.
pub const EBFMI_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamDiagnostics {
    pub name: String,
    pub rhat: f64,
    pub ess_bulk: f64,
    pub ess_tail: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvergenceReport {
    pub params: Vec<ParamDiagnostics>,
    pub divergences: usize,
    pub treedepth_hits: usize,
    pub min_ebfmi: f64,
    pub warnings: Vec<String>,
    pub converged: bool,
}

impl ConvergenceReport {
    pub fn max_rhat(&self) -> f64 {
        self.params.iter().map(|p| p.rhat).fold(f64::NAN, f64::max)
    }

    pub fn min_ess_bulk(&self) -> f64 {
        self.params.iter().map(|p| p.ess_bulk).fold(f64::NAN, f64::min)
    }

    pub fn min_ess_tail(&self) -> f64 {
        self.params.iter().map(|p| p.ess_tail).fold(f64::NAN, f64::min)
    }
}

/// Compute R-hat/ESS for every data-scale parameter and collect warnings.
pub fn diagnose(posterior: &Posterior, label: &str) -> ConvergenceReport {
    let min_ess = ESS_PER_CHAIN * posterior.chains as f64;
    let mut warnings = Vec::new();

    let params: Vec<ParamDiagnostics> = posterior
        .param_names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let chains = posterior.chain_columns(j);
            ParamDiagnostics {
                name: name.clone(),
                rhat: rhat(&chains),
                ess_bulk: ess_bulk(&chains),
                ess_tail: ess_tail(&chains),
            }
        })
        .collect();

    for p in &params {
        // NaN R-hat only happens for constant draws; treat it as a failure.
        if !(p.rhat < RHAT_THRESHOLD) {
            warnings.push(format!("{}: R-hat {:.3} >= {RHAT_THRESHOLD}", p.name, p.rhat));
        }
        if !(p.ess_bulk >= min_ess) {
            warnings.push(format!("{}: bulk ESS {:.0} < {min_ess:.0}", p.name, p.ess_bulk));
        }
        if !(p.ess_tail >= min_ess) {
            warnings.push(format!("{}: tail ESS {:.0} < {min_ess:.0}", p.name, p.ess_tail));
        }
    }

    let divergences = posterior.total_divergences();
    if divergences > 0 {
        warnings.push(format!("{divergences} divergent transitions after warmup"));
    }
    let treedepth_hits = posterior.total_treedepth_hits();

    for w in &warnings {
        warn!(model = label, "{w}");
    }
    let min_ebfmi = posterior.chain_stats.iter().map(|c| c.ebfmi).fold(f64::NAN, f64::min);
    for c in posterior.chain_stats.iter().filter(|c| c.ebfmi < EBFMI_THRESHOLD) {
        warn!(model = label, chain = c.chain, ebfmi = c.ebfmi, "low E-BFMI");
    }

    ConvergenceReport {
        converged: warnings.is_empty(),
        params,
        divergences,
        treedepth_hits,
        min_ebfmi,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::posterior::tests::fake_stats;
    use crate::fit::{INTERCEPT_NAME, SIGMA_NAME};
    use crate::sampler::{ChainOutput, ChainStats};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::StandardNormal;

    fn iid_posterior(chains: usize, draws: usize, divergences_per_chain: usize) -> Posterior {
        iid_posterior_with(chains, draws, |stats| stats.divergences = divergences_per_chain)
    }

    fn iid_posterior_with(chains: usize, draws: usize, tweak: impl Fn(&mut ChainStats)) -> Posterior {
        let mut rng = StdRng::seed_from_u64(11);
        let outputs = (0..chains)
            .map(|c| {
                let draws = (0..draws)
                    .map(|_| {
                        let a: f64 = rng.sample(StandardNormal);
                        let s: f64 = rng.sample(StandardNormal);
                        vec![a, 1.0 + 0.1 * s.abs()]
                    })
                    .collect();
                let mut stats = fake_stats(c);
                tweak(&mut stats);
                ChainOutput { draws, stats }
            })
            .collect();
        let names = vec![INTERCEPT_NAME.to_string(), SIGMA_NAME.to_string()];
        Posterior::from_chains(names, outputs, |d| d.to_vec()).unwrap()
    }

    #[test]
    fn well_mixed_posterior_converges() {
        let post = iid_posterior(4, 500, 0);
        let report = diagnose(&post, "iid");
        assert!(report.converged, "{:?}", report.warnings);
        assert!(report.max_rhat() < RHAT_THRESHOLD);
        assert_eq!(report.params.len(), 2);
    }

    #[test]
    fn divergences_block_convergence() {
        let post = iid_posterior(4, 500, 3);
        let report = diagnose(&post, "iid");
        assert_eq!(report.divergences, 12);
        assert!(!report.converged);
        assert!(report.warnings.iter().any(|w| w.contains("divergent")));
    }

    #[test]
    fn low_ebfmi_is_reported_without_failing() {
        let post = iid_posterior_with(4, 500, |stats| stats.ebfmi = 0.1 + 0.1 * stats.chain as f64);
        let report = diagnose(&post, "iid");
        assert!((report.min_ebfmi - 0.1).abs() < 1e-12);
        assert!(report.converged, "{:?}", report.warnings);
    }

    #[test]
    fn short_chains_fail_the_ess_threshold() {
        let post = iid_posterior(2, 40, 0);
        let report = diagnose(&post, "short");
        assert!(!report.converged);
        assert!(report.warnings.iter().any(|w| w.contains("ESS")));
    }
}
