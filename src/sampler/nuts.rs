//! Multinomial NUTS transition.
//!
//! Trajectories are built by repeated doubling in a random direction. Points are
//! sampled in proportion to `exp(-H)` within each subtree and with a bias
//! towards the newest subtree at the top level. Doubling stops when the
//! trajectory turns back on itself (generalized criterion on the summed
//! momentum), when the energy error exceeds `MAX_ENERGY_ERROR` (divergence) or
//! at the maximum tree depth.

use rand::Rng;
use rand_distr::StandardNormal;

use crate::math::log_add_exp;
use crate::models::LogDensity;

/// Energy error beyond which a trajectory is flagged as divergent.
pub const MAX_ENERGY_ERROR: f64 = 1000.0;

/// A position with its cached log density and gradient.
#[derive(Debug, Clone)]
pub struct Position {
    pub q: Vec<f64>,
    pub grad: Vec<f64>,
    pub logp: f64,
}

impl Position {
    /// Evaluate `model` at `q`; `None` if the density or gradient is not finite.
    pub fn evaluate<M: LogDensity + ?Sized>(model: &M, q: Vec<f64>) -> Option<Self> {
        let mut grad = vec![0.0; q.len()];
        let logp = model.log_density_and_grad(&q, &mut grad);
        if logp.is_finite() && grad.iter().all(|g| g.is_finite()) {
            Some(Self { q, grad, logp })
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
struct PhasePoint {
    q: Vec<f64>,
    p: Vec<f64>,
    grad: Vec<f64>,
    logp: f64,
}

impl PhasePoint {
    fn into_position(self) -> Position {
        Position {
            q: self.q,
            grad: self.grad,
            logp: self.logp,
        }
    }
}

struct Subtree {
    left: PhasePoint,
    right: PhasePoint,
    proposal: PhasePoint,
    log_weight: f64,
    rho: Vec<f64>,
    n_leapfrog: usize,
    sum_accept: f64,
    divergent: bool,
    turning: bool,
}

/// Per-transition statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionStats {
    pub accept_stat: f64,
    pub depth: u32,
    pub n_leapfrog: usize,
    pub divergent: bool,
    pub hit_max_depth: bool,
    /// Hamiltonian at the start of the transition (after momentum refresh).
    pub energy: f64,
}

/// NUTS kernel for a fixed step size and metric.
pub struct Nuts<'a, M: LogDensity + ?Sized> {
    model: &'a M,
    inv_metric: &'a [f64],
    step_size: f64,
    max_depth: u32,
}

impl<'a, M: LogDensity + ?Sized> Nuts<'a, M> {
    pub fn new(model: &'a M, inv_metric: &'a [f64], step_size: f64, max_depth: u32) -> Self {
        Self {
            model,
            inv_metric,
            step_size,
            max_depth,
        }
    }

    /// Advance the chain by one NUTS transition.
    pub fn transition<R: Rng>(&self, current: &Position, rng: &mut R) -> (Position, TransitionStats) {
        let start = PhasePoint {
            q: current.q.clone(),
            p: sample_momentum(self.inv_metric, rng),
            grad: current.grad.clone(),
            logp: current.logp,
        };
        let h0 = self.hamiltonian(&start);

        let mut left = start.clone();
        let mut right = start.clone();
        let mut proposal = start.clone();
        let mut rho = start.p.clone();
        let mut log_weight = 0.0;

        let mut depth = 0;
        let mut n_leapfrog = 0;
        let mut sum_accept = 0.0;
        let mut divergent = false;
        let mut turned = false;

        while depth < self.max_depth {
            let forward = rng.gen_bool(0.5);
            let sub = {
                let edge = if forward { &right } else { &left };
                self.build_tree(edge, depth, forward, h0, rng)
            };
            depth += 1;
            n_leapfrog += sub.n_leapfrog;
            sum_accept += sub.sum_accept;

            if sub.divergent {
                divergent = true;
                break;
            }
            if sub.turning {
                turned = true;
                break;
            }

            // Biased progressive sampling towards the new subtree.
            if uniform_log(rng) < sub.log_weight - log_weight {
                proposal = sub.proposal;
            }
            log_weight = log_add_exp(log_weight, sub.log_weight);
            for (r, s) in rho.iter_mut().zip(&sub.rho) {
                *r += s;
            }
            if forward {
                right = sub.right;
            } else {
                left = sub.left;
            }

            if self.is_turning(&left, &right, &rho) {
                turned = true;
                break;
            }
        }

        let stats = TransitionStats {
            accept_stat: if n_leapfrog > 0 { sum_accept / n_leapfrog as f64 } else { 0.0 },
            depth,
            n_leapfrog,
            divergent,
            hit_max_depth: !divergent && !turned && depth >= self.max_depth,
            energy: h0,
        };
        (proposal.into_position(), stats)
    }

    fn build_tree<R: Rng>(
        &self,
        start: &PhasePoint,
        depth: u32,
        forward: bool,
        h0: f64,
        rng: &mut R,
    ) -> Subtree {
        if depth == 0 {
            let eps = if forward { self.step_size } else { -self.step_size };
            let next = self.leapfrog(start, eps);
            let h = self.hamiltonian(&next);
            let (log_weight, divergent) = if h.is_finite() {
                (h0 - h, h - h0 > MAX_ENERGY_ERROR)
            } else {
                (f64::NEG_INFINITY, true)
            };
            let accept = if log_weight > 0.0 { 1.0 } else { log_weight.exp() };
            return Subtree {
                left: next.clone(),
                right: next.clone(),
                rho: next.p.clone(),
                proposal: next,
                log_weight,
                n_leapfrog: 1,
                sum_accept: accept,
                divergent,
                turning: false,
            };
        }

        let mut inner = self.build_tree(start, depth - 1, forward, h0, rng);
        if inner.divergent || inner.turning {
            return inner;
        }

        let outer = {
            let edge = if forward { &inner.right } else { &inner.left };
            self.build_tree(edge, depth - 1, forward, h0, rng)
        };
        inner.n_leapfrog += outer.n_leapfrog;
        inner.sum_accept += outer.sum_accept;
        if outer.divergent || outer.turning {
            inner.divergent |= outer.divergent;
            inner.turning |= outer.turning;
            return inner;
        }

        let total = log_add_exp(inner.log_weight, outer.log_weight);
        if uniform_log(rng) < outer.log_weight - total {
            inner.proposal = outer.proposal;
        }
        inner.log_weight = total;
        for (r, s) in inner.rho.iter_mut().zip(&outer.rho) {
            *r += s;
        }
        if forward {
            inner.right = outer.right;
        } else {
            inner.left = outer.left;
        }
        inner.turning = self.is_turning(&inner.left, &inner.right, &inner.rho);
        inner
    }

    fn leapfrog(&self, point: &PhasePoint, eps: f64) -> PhasePoint {
        let mut p: Vec<f64> = point
            .p
            .iter()
            .zip(&point.grad)
            .map(|(p, g)| p + 0.5 * eps * g)
            .collect();
        let q: Vec<f64> = point
            .q
            .iter()
            .zip(&p)
            .zip(self.inv_metric)
            .map(|((q, p), m)| q + eps * m * p)
            .collect();

        let mut grad = vec![0.0; q.len()];
        let logp = self.model.log_density_and_grad(&q, &mut grad);
        for (p, g) in p.iter_mut().zip(&grad) {
            *p += 0.5 * eps * g;
        }
        PhasePoint { q, p, grad, logp }
    }

    fn hamiltonian(&self, point: &PhasePoint) -> f64 {
        let kinetic: f64 = point
            .p
            .iter()
            .zip(self.inv_metric)
            .map(|(p, m)| m * p * p)
            .sum();
        -point.logp + 0.5 * kinetic
    }

    fn is_turning(&self, left: &PhasePoint, right: &PhasePoint, rho: &[f64]) -> bool {
        let dot = |p: &[f64]| -> f64 {
            p.iter()
                .zip(self.inv_metric)
                .zip(rho)
                .map(|((p, m), r)| m * p * r)
                .sum()
        };
        dot(&left.p) <= 0.0 || dot(&right.p) <= 0.0
    }
}

/// Draw `p ~ N(0, M)` for the diagonal metric `M = diag(1 / inv_metric)`.
pub fn sample_momentum<R: Rng>(inv_metric: &[f64], rng: &mut R) -> Vec<f64> {
    inv_metric
        .iter()
        .map(|m| {
            let z: f64 = rng.sample(StandardNormal);
            z / m.sqrt()
        })
        .collect()
}

fn uniform_log<R: Rng>(rng: &mut R) -> f64 {
    rng.gen_range(0.0..1.0f64).ln()
}

/// Heuristic initial step size: double or halve until the one-step acceptance
/// probability crosses 0.8.
pub fn find_reasonable_step_size<M: LogDensity + ?Sized, R: Rng>(
    model: &M,
    position: &Position,
    inv_metric: &[f64],
    initial: f64,
    rng: &mut R,
) -> f64 {
    let kernel = Nuts::new(model, inv_metric, initial, 1);
    let target = 0.8f64.ln();
    let mut eps = initial;
    let mut direction = 0.0;

    for _ in 0..100 {
        let start = PhasePoint {
            q: position.q.clone(),
            p: sample_momentum(inv_metric, rng),
            grad: position.grad.clone(),
            logp: position.logp,
        };
        let h0 = kernel.hamiltonian(&start);
        let next = kernel.leapfrog(&start, eps);
        let h = kernel.hamiltonian(&next);
        let delta = if h.is_finite() { h0 - h } else { f64::NEG_INFINITY };

        if direction == 0.0 {
            direction = if delta > target { 1.0 } else { -1.0 };
        }
        if direction > 0.0 && delta <= target {
            break;
        }
        if direction < 0.0 && delta > target {
            break;
        }
        eps = if direction > 0.0 { eps * 2.0 } else { eps * 0.5 };
        if !(1e-10..=1e7).contains(&eps) {
            break;
        }
    }
    eps.clamp(1e-10, 1e7)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// Independent normals with standard deviations `sd`.
    struct Gaussian {
        sd: Vec<f64>,
    }

    impl LogDensity for Gaussian {
        fn dim(&self) -> usize {
            self.sd.len()
        }

        fn log_density_and_grad(&self, theta: &[f64], grad: &mut [f64]) -> f64 {
            let mut lp = 0.0;
            for (i, (&x, &s)) in theta.iter().zip(&self.sd).enumerate() {
                lp -= 0.5 * (x / s).powi(2);
                grad[i] = -x / (s * s);
            }
            lp
        }

        fn constrain(&self, theta: &[f64]) -> Vec<f64> {
            theta.to_vec()
        }
    }

    #[test]
    fn leapfrog_conserves_energy_for_small_steps() {
        let model = Gaussian { sd: vec![1.0, 2.0] };
        let inv_metric = vec![1.0, 1.0];
        let kernel = Nuts::new(&model, &inv_metric, 0.01, 5);
        let pos = Position::evaluate(&model, vec![0.5, -1.0]).unwrap();
        let start = PhasePoint {
            q: pos.q.clone(),
            p: vec![0.3, 0.7],
            grad: pos.grad.clone(),
            logp: pos.logp,
        };
        let h0 = kernel.hamiltonian(&start);
        let mut point = start;
        for _ in 0..100 {
            point = kernel.leapfrog(&point, 0.01);
        }
        assert!((kernel.hamiltonian(&point) - h0).abs() < 1e-4);
    }

    #[test]
    fn recovers_gaussian_moments() {
        let model = Gaussian { sd: vec![1.0, 3.0] };
        let inv_metric = vec![1.0, 9.0];
        let kernel = Nuts::new(&model, &inv_metric, 0.9, 8);
        let mut rng = StdRng::seed_from_u64(3);
        let mut pos = Position::evaluate(&model, vec![0.0, 0.0]).unwrap();

        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for _ in 0..4000 {
            let (next, stats) = kernel.transition(&pos, &mut rng);
            assert!(!stats.divergent);
            pos = next;
            xs.push(pos.q[0]);
            ys.push(pos.q[1]);
        }
        assert!(crate::math::mean(&xs).abs() < 0.15);
        assert!((crate::math::sd(&xs) - 1.0).abs() < 0.1);
        assert!((crate::math::sd(&ys) - 3.0).abs() < 0.3);
    }

    #[test]
    fn step_size_search_returns_finite_value() {
        let model = Gaussian { sd: vec![0.01, 0.01] };
        let inv_metric = vec![1.0, 1.0];
        let mut rng = StdRng::seed_from_u64(1);
        let pos = Position::evaluate(&model, vec![0.0, 0.0]).unwrap();
        let eps = find_reasonable_step_size(&model, &pos, &inv_metric, 1.0, &mut rng);
        assert!(eps.is_finite());
        assert!(eps < 0.1, "step size should shrink for a narrow target, got {eps}");
    }
}
