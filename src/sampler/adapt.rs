//! Warmup adaptation.
//!
//! - `DualAveraging`: Nesterov dual averaging of `log ε` towards a target
//!   acceptance statistic (Hoffman & Gelman 2014).
//! - `MetricWindows`: the slow/fast window schedule used to estimate a diagonal
//!   inverse metric from warmup draws (initial fast buffer, doubling slow
//!   windows, terminal fast buffer).

const DA_GAMMA: f64 = 0.05;
const DA_T0: f64 = 10.0;
const DA_KAPPA: f64 = 0.75;

const INIT_BUFFER: usize = 75;
const TERM_BUFFER: usize = 50;
const BASE_WINDOW: usize = 25;

#[derive(Debug, Clone)]
pub struct DualAveraging {
    delta: f64,
    mu: f64,
    log_eps_bar: f64,
    h_bar: f64,
    counter: f64,
}

impl DualAveraging {
    pub fn new(delta: f64, step_size: f64) -> Self {
        let mut da = Self {
            delta,
            mu: 0.0,
            log_eps_bar: 0.0,
            h_bar: 0.0,
            counter: 0.0,
        };
        da.restart(step_size);
        da
    }

    /// Reset the averaging state around a new initial step size.
    pub fn restart(&mut self, step_size: f64) {
        self.mu = (10.0 * step_size).ln();
        self.log_eps_bar = 0.0;
        self.h_bar = 0.0;
        self.counter = 0.0;
    }

    /// Feed one acceptance statistic; returns the step size for the next iteration.
    pub fn update(&mut self, accept_stat: f64) -> f64 {
        let accept_stat = if accept_stat.is_finite() { accept_stat.clamp(0.0, 1.0) } else { 0.0 };
        self.counter += 1.0;
        let eta = 1.0 / (self.counter + DA_T0);
        self.h_bar = (1.0 - eta) * self.h_bar + eta * (self.delta - accept_stat);
        let log_eps = self.mu - self.counter.sqrt() / DA_GAMMA * self.h_bar;
        let x_eta = self.counter.powf(-DA_KAPPA);
        self.log_eps_bar = x_eta * log_eps + (1.0 - x_eta) * self.log_eps_bar;
        log_eps.exp()
    }

    /// The averaged step size used after warmup.
    pub fn final_step_size(&self) -> f64 {
        self.log_eps_bar.exp()
    }
}

/// Window schedule for metric adaptation.
#[derive(Debug, Clone)]
pub struct MetricWindows {
    warmup: usize,
    init_buffer: usize,
    term_buffer: usize,
    window_size: usize,
    next_window_end: usize,
    enabled: bool,
}

impl MetricWindows {
    pub fn new(warmup: usize) -> Self {
        let (init_buffer, term_buffer, base_window, enabled) = if warmup < 20 {
            (0, 0, 0, false)
        } else if INIT_BUFFER + TERM_BUFFER + BASE_WINDOW > warmup {
            let init = (0.15 * warmup as f64) as usize;
            let term = (0.1 * warmup as f64) as usize;
            (init, term, warmup - (init + term), true)
        } else {
            (INIT_BUFFER, TERM_BUFFER, BASE_WINDOW, true)
        };

        Self {
            warmup,
            init_buffer,
            term_buffer,
            window_size: base_window,
            next_window_end: (init_buffer + base_window).saturating_sub(1),
            enabled,
        }
    }

    /// Whether draws from iteration `iter` feed the variance estimate.
    pub fn in_window(&self, iter: usize) -> bool {
        self.enabled && iter >= self.init_buffer && iter + self.term_buffer < self.warmup
    }

    /// Whether `iter` closes a slow window. Advances the schedule when it does.
    pub fn end_of_window(&mut self, iter: usize) -> bool {
        if !self.enabled || iter != self.next_window_end || iter >= self.warmup {
            return false;
        }
        self.advance(iter);
        true
    }

    fn advance(&mut self, iter: usize) {
        let last = self.warmup - self.term_buffer - 1;
        if self.next_window_end == last {
            return;
        }
        self.window_size *= 2;
        self.next_window_end = iter + self.window_size;
        // Stretch the window rather than leave a stub that is too short to use.
        if self.next_window_end != last && self.next_window_end + 2 * self.window_size >= self.warmup - self.term_buffer {
            self.next_window_end = last;
        }
    }
}

/// Streaming variance estimator (Welford) for metric adaptation.
#[derive(Debug, Clone)]
pub struct VarianceEstimator {
    n: usize,
    mean: Vec<f64>,
    m2: Vec<f64>,
}

impl VarianceEstimator {
    pub fn new(dim: usize) -> Self {
        Self {
            n: 0,
            mean: vec![0.0; dim],
            m2: vec![0.0; dim],
        }
    }

    pub fn add(&mut self, x: &[f64]) {
        self.n += 1;
        let n = self.n as f64;
        for ((m, s), &v) in self.mean.iter_mut().zip(self.m2.iter_mut()).zip(x) {
            let delta = v - *m;
            *m += delta / n;
            *s += delta * (v - *m);
        }
    }

    /// Variance shrunk towards `1e-3`, as an inverse metric.
    pub fn regularized_variance(&self) -> Vec<f64> {
        let n = self.n as f64;
        if self.n < 3 {
            return vec![1.0; self.mean.len()];
        }
        self.m2
            .iter()
            .map(|s| {
                let var = s / (n - 1.0);
                (n / (n + 5.0)) * var + 1e-3 * (5.0 / (n + 5.0))
            })
            .collect()
    }

    pub fn reset(&mut self) {
        self.n = 0;
        self.mean.iter_mut().for_each(|v| *v = 0.0);
        self.m2.iter_mut().for_each(|v| *v = 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dual_averaging_moves_towards_target() {
        let mut da = DualAveraging::new(0.8, 1.0);
        // Always accepting means the step is too small: it should grow.
        let mut eps = 1.0;
        for _ in 0..50 {
            eps = da.update(1.0);
        }
        assert!(eps > 1.0);

        let mut da = DualAveraging::new(0.8, 1.0);
        for _ in 0..50 {
            da.update(0.0);
        }
        assert!(da.final_step_size() < 1.0);
    }

    #[test]
    fn standard_window_schedule() {
        let warmup = 1000;
        let mut w = MetricWindows::new(warmup);
        let ends: Vec<usize> = (0..warmup).filter(|&i| w.end_of_window(i)).collect();
        assert_eq!(ends, vec![99, 149, 249, 449, 949]);
        assert!(!w.in_window(74));
        assert!(w.in_window(75));
        assert!(w.in_window(949));
        assert!(!w.in_window(950));
    }

    #[test]
    fn short_warmup_rescales_buffers() {
        let mut w = MetricWindows::new(100);
        let ends: Vec<usize> = (0..100).filter(|&i| w.end_of_window(i)).collect();
        assert_eq!(ends, vec![89]);
        assert!(w.in_window(15));
        assert!(!w.in_window(14));

        let mut tiny = MetricWindows::new(10);
        assert!((0..10).all(|i| !tiny.end_of_window(i)));
    }

    #[test]
    fn variance_estimator_regularizes() {
        let mut est = VarianceEstimator::new(1);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            est.add(&[v]);
        }
        let var = est.regularized_variance()[0];
        let expected = (5.0 / 10.0) * 2.5 + 1e-3 * 0.5;
        assert!((var - expected).abs() < 1e-12);
        est.reset();
        assert_eq!(est.regularized_variance(), vec![1.0]);
    }
}
