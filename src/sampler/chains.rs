//! Chain runner.
//!
//! Chains are independent: each owns its RNG (seeded from the run seed, the
//! chain index and a label) so running them in parallel with rayon does not
//! affect the draws.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

use crate::domain::SamplerConfig;
use crate::error::AppError;
use crate::models::LogDensity;
use crate::sampler::adapt::{DualAveraging, MetricWindows, VarianceEstimator};
use crate::sampler::nuts::{Nuts, Position, find_reasonable_step_size};

const MAX_INIT_ATTEMPTS: usize = 100;

/// Summary statistics of one chain's sampling phase.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ChainStats {
    pub chain: usize,
    pub step_size: f64,
    pub divergences: usize,
    pub treedepth_hits: usize,
    pub mean_accept_stat: f64,
    pub mean_tree_depth: f64,
    pub n_leapfrog: usize,
    /// Energy Bayesian fraction of missing information.
    pub ebfmi: f64,
}

/// Output of one chain: constrained draws (one `Vec` per iteration) and stats.
#[derive(Debug, Clone)]
pub struct ChainOutput {
    pub draws: Vec<Vec<f64>>,
    pub stats: ChainStats,
}

/// Run `config.chains` chains in parallel.
///
/// `label` distinguishes models fitted with the same seed so they do not
/// share random streams.
pub fn sample_chains<M: LogDensity>(model: &M, config: &SamplerConfig, label: &str) -> Result<Vec<ChainOutput>, AppError> {
    config.validate()?;
    (0..config.chains)
        .into_par_iter()
        .map(|chain| run_chain(model, config, chain, chain_seed(config.seed, chain, label)))
        .collect()
}

/// Deterministic per-chain seed.
pub fn chain_seed(seed: u64, chain: usize, label: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    chain.hash(&mut hasher);
    label.hash(&mut hasher);
    hasher.finish()
}

fn run_chain<M: LogDensity>(model: &M, config: &SamplerConfig, chain: usize, seed: u64) -> Result<ChainOutput, AppError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let dim = model.dim();

    let mut position = initialize(model, config.init_radius, &mut rng).ok_or_else(|| {
        AppError::numeric(format!(
            "Chain {chain}: no finite initial point after {MAX_INIT_ATTEMPTS} attempts."
        ))
    })?;

    let mut inv_metric = vec![1.0; dim];
    let mut step_size = find_reasonable_step_size(model, &position, &inv_metric, 1.0, &mut rng);
    let mut dual = DualAveraging::new(config.adapt_delta, step_size);
    let mut windows = MetricWindows::new(config.warmup);
    let mut variance = VarianceEstimator::new(dim);

    for iter in 0..config.warmup {
        let kernel = Nuts::new(model, &inv_metric, step_size, config.max_depth);
        let (next, stats) = kernel.transition(&position, &mut rng);
        position = next;
        step_size = dual.update(stats.accept_stat);

        if windows.in_window(iter) {
            variance.add(&position.q);
        }
        if windows.end_of_window(iter) {
            inv_metric = variance.regularized_variance();
            variance.reset();
            step_size = find_reasonable_step_size(model, &position, &inv_metric, step_size, &mut rng);
            dual.restart(step_size);
        }
    }
    if config.warmup > 0 {
        step_size = dual.final_step_size();
    }
    debug!(chain, step_size, "warmup finished");

    let kernel = Nuts::new(model, &inv_metric, step_size, config.max_depth);
    let mut draws = Vec::with_capacity(config.draws);
    let mut divergences = 0;
    let mut treedepth_hits = 0;
    let mut accept_sum = 0.0;
    let mut depth_sum = 0.0;
    let mut n_leapfrog = 0;
    let mut energies = Vec::with_capacity(config.draws);

    for _ in 0..config.draws {
        let (next, stats) = kernel.transition(&position, &mut rng);
        position = next;
        divergences += usize::from(stats.divergent);
        treedepth_hits += usize::from(stats.hit_max_depth);
        accept_sum += stats.accept_stat;
        depth_sum += f64::from(stats.depth);
        n_leapfrog += stats.n_leapfrog;
        energies.push(stats.energy);
        draws.push(model.constrain(&position.q));
    }

    let n = config.draws as f64;
    Ok(ChainOutput {
        draws,
        stats: ChainStats {
            chain,
            step_size,
            divergences,
            treedepth_hits,
            mean_accept_stat: accept_sum / n,
            mean_tree_depth: depth_sum / n,
            n_leapfrog,
            ebfmi: e_bfmi(&energies),
        },
    })
}

/// `Σ (E_t - E_{t-1})² / Σ (E_t - Ē)²` over a chain's transition energies.
///
/// NaN for fewer than two draws or constant energies.
pub fn e_bfmi(energies: &[f64]) -> f64 {
    if energies.len() < 2 {
        return f64::NAN;
    }
    let mean = crate::math::mean(energies);
    let num: f64 = energies.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
    let den: f64 = energies.iter().map(|e| (e - mean).powi(2)).sum();
    if den > 0.0 { num / den } else { f64::NAN }
}

fn initialize<M: LogDensity, R: Rng>(model: &M, radius: f64, rng: &mut R) -> Option<Position> {
    (0..MAX_INIT_ATTEMPTS).find_map(|_| {
        let q = (0..model.dim()).map(|_| rng.gen_range(-radius..radius)).collect();
        Position::evaluate(model, q)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StdNormal2;

    impl LogDensity for StdNormal2 {
        fn dim(&self) -> usize {
            2
        }

        fn log_density_and_grad(&self, theta: &[f64], grad: &mut [f64]) -> f64 {
            grad[0] = -theta[0];
            grad[1] = -theta[1];
            -0.5 * (theta[0] * theta[0] + theta[1] * theta[1])
        }

        fn constrain(&self, theta: &[f64]) -> Vec<f64> {
            theta.to_vec()
        }
    }

    /// Density that is never finite.
    struct Broken;

    impl LogDensity for Broken {
        fn dim(&self) -> usize {
            1
        }

        fn log_density_and_grad(&self, _theta: &[f64], grad: &mut [f64]) -> f64 {
            grad[0] = 0.0;
            f64::NAN
        }

        fn constrain(&self, theta: &[f64]) -> Vec<f64> {
            theta.to_vec()
        }
    }

    fn small_config() -> SamplerConfig {
        SamplerConfig {
            chains: 2,
            warmup: 200,
            draws: 300,
            ..SamplerConfig::default()
        }
    }

    #[test]
    fn chains_are_reproducible() {
        let a = sample_chains(&StdNormal2, &small_config(), "m").unwrap();
        let b = sample_chains(&StdNormal2, &small_config(), "m").unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].draws, b[0].draws);
        assert_eq!(a[1].draws, b[1].draws);
        assert_ne!(a[0].draws, a[1].draws);
    }

    #[test]
    fn labels_separate_random_streams() {
        assert_ne!(chain_seed(1, 0, "a"), chain_seed(1, 0, "b"));
        assert_ne!(chain_seed(1, 0, "a"), chain_seed(1, 1, "a"));
        assert_eq!(chain_seed(1, 0, "a"), chain_seed(1, 0, "a"));
    }

    #[test]
    fn adapted_chain_has_sane_stats() {
        let out = sample_chains(&StdNormal2, &small_config(), "m").unwrap();
        for chain in &out {
            assert_eq!(chain.draws.len(), 300);
            assert_eq!(chain.stats.divergences, 0);
            assert!(chain.stats.step_size > 0.1 && chain.stats.step_size < 3.0);
            assert!(chain.stats.mean_accept_stat > 0.5);
            assert!(chain.stats.ebfmi > 0.3, "E-BFMI {}", chain.stats.ebfmi);
        }
    }

    #[test]
    fn e_bfmi_separates_mixing_from_drift() {
        let alternating: Vec<f64> = (0..100).map(|t| (t % 2) as f64).collect();
        assert!((e_bfmi(&alternating) - 99.0 / 25.0).abs() < 1e-12);

        let drifting: Vec<f64> = (0..100).map(|t| t as f64).collect();
        assert!(e_bfmi(&drifting) < 0.01);

        assert!(e_bfmi(&[1.0, 1.0, 1.0]).is_nan());
        assert!(e_bfmi(&[1.0]).is_nan());
    }

    #[test]
    fn broken_density_fails_initialization() {
        let err = sample_chains(&Broken, &small_config(), "x").unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }
}
