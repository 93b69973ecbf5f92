//! Background Bayesian hyperparameter optimiser. Not on the event path: the
//! stats/effect tracker triggers one evaluation per week boundary, and this
//! module maintains a small Gaussian-process surrogate (Matern-5/2) over
//! `(params, value)` pairs to suggest the next point to try.

use amas_algo::matrix::{cholesky, matern_5_2, solve_via_cholesky};
use rand::rngs::ThreadRng;
use rand::Rng;

use crate::amas::config::OptimizerConfig;

/// An axis-aligned hyperparameter box, one `(min, max)` pair per dimension.
#[derive(Debug, Clone)]
pub struct ParamBox {
    pub dims: Vec<(f64, f64)>,
}

impl ParamBox {
    pub fn dimension(&self) -> usize {
        self.dims.len()
    }

    fn clamp(&self, params: &mut [f64]) {
        for (p, (lo, hi)) in params.iter_mut().zip(self.dims.iter()) {
            *p = p.clamp(*lo, *hi);
        }
    }

    fn sample<R: Rng>(&self, rng: &mut R) -> Vec<f64> {
        self.dims.iter().map(|(lo, hi)| rng.gen_range(*lo..=*hi)).collect()
    }
}

#[derive(Debug, Clone)]
struct Observation {
    params: Vec<f64>,
    value: f64,
}

/// GP-UCB optimiser over a reward-weight-shaped parameter box. The
/// acquisition function `mean + beta*std` is maximised by a coarse grid
/// pass followed by random restarts and single-dimension coordinate
/// descent, since the box is low-dimensional (reward weights, typically
/// 3-5 dims) and an exact optimiser is unnecessary.
pub struct BayesianOptimizer {
    param_box: ParamBox,
    length_scale: f64,
    signal_variance: f64,
    /// Observation-noise variance added to the kernel diagonal.
    noise_variance: f64,
    beta: f64,
    observations: Vec<Observation>,
}

impl BayesianOptimizer {
    pub fn new(config: &OptimizerConfig, param_box: ParamBox) -> Self {
        Self {
            param_box,
            length_scale: config.length_scale.max(1e-6),
            signal_variance: config.signal_variance.max(1e-6),
            noise_variance: 1e-4,
            beta: 2.0,
            observations: Vec::new(),
        }
    }

    pub fn record_evaluation(&mut self, params: Vec<f64>, value: f64) {
        if !value.is_finite() || params.iter().any(|p| !p.is_finite()) {
            return;
        }
        let mut params = params;
        self.param_box.clamp(&mut params);
        self.observations.push(Observation { params, value });
    }

    /// All recorded `(params, value)` pairs, for reconstructing an equivalent
    /// optimiser off-thread (e.g. on the worker pool) without sharing `self`
    /// across the dispatch boundary.
    pub fn observations(&self) -> Vec<(Vec<f64>, f64)> {
        self.observations.iter().map(|o| (o.params.clone(), o.value)).collect()
    }

    pub fn get_best(&self) -> Option<(Vec<f64>, f64)> {
        self.observations
            .iter()
            .max_by(|a, b| a.value.partial_cmp(&b.value).unwrap())
            .map(|o| (o.params.clone(), o.value))
    }

    /// Posterior mean/std at `x`, via a full GP regression solved through
    /// the shared Cholesky kernel (same primitive LinUCB uses, applied here
    /// to an N-observation Gram matrix instead of a 22-dim feature matrix).
    fn posterior(&self, x: &[f64]) -> (f64, f64) {
        let n = self.observations.len();
        if n == 0 {
            return (0.0, self.signal_variance.sqrt());
        }

        let mut k = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                let mut kij = matern_5_2(
                    &self.observations[i].params,
                    &self.observations[j].params,
                    self.length_scale,
                    self.signal_variance,
                );
                if i == j {
                    kij += self.noise_variance;
                }
                k[i * n + j] = kij;
            }
        }
        let k_star: Vec<f64> = self
            .observations
            .iter()
            .map(|o| matern_5_2(&o.params, x, self.length_scale, self.signal_variance))
            .collect();
        let y: Vec<f64> = self.observations.iter().map(|o| o.value).collect();

        let l = match cholesky(&k, n, self.noise_variance) {
            Ok(l) => l,
            Err(_) => return (0.0, self.signal_variance.sqrt()),
        };
        let alpha = match solve_via_cholesky(&l, n, &y) {
            Ok(a) => a,
            Err(_) => return (0.0, self.signal_variance.sqrt()),
        };
        let mean: f64 = k_star.iter().zip(alpha.iter()).map(|(ks, a)| ks * a).sum();

        let v = match solve_via_cholesky(&l, n, &k_star) {
            Ok(v) => v,
            Err(_) => return (mean, self.signal_variance.sqrt()),
        };
        let explained: f64 = k_star.iter().zip(v.iter()).map(|(ks, vi)| ks * vi).sum();
        let prior_var = matern_5_2(x, x, self.length_scale, self.signal_variance);
        let var = (prior_var - explained).max(1e-9);

        (mean, var.sqrt())
    }

    fn acquisition(&self, x: &[f64]) -> f64 {
        let (mean, std) = self.posterior(x);
        mean + self.beta * std
    }

    /// Suggests the next point to evaluate: a coarse grid seed, `rng`-driven
    /// random restarts, then per-dimension coordinate descent from the best
    /// seed found.
    pub fn suggest_next(&self) -> Vec<f64> {
        let mut rng = rand::thread_rng();
        self.suggest_next_with(&mut rng)
    }

    fn suggest_next_with<R: Rng>(&self, rng: &mut R) -> Vec<f64> {
        let dim = self.param_box.dimension();
        if dim == 0 {
            return Vec::new();
        }

        let grid_steps = 5;
        let mut best = self.grid_midpoint();
        let mut best_score = self.acquisition(&best);

        for _ in 0..grid_steps * dim {
            let candidate = self.param_box.sample(rng);
            let score = self.acquisition(&candidate);
            if score > best_score {
                best_score = score;
                best = candidate;
            }
        }

        for d in 0..dim {
            let (lo, hi) = self.param_box.dims[d];
            for step in 0..=8 {
                let t = step as f64 / 8.0;
                let mut candidate = best.clone();
                candidate[d] = lo + t * (hi - lo);
                let score = self.acquisition(&candidate);
                if score > best_score {
                    best_score = score;
                    best = candidate;
                }
            }
        }

        best
    }

    fn grid_midpoint(&self) -> Vec<f64> {
        self.param_box.dims.iter().map(|(lo, hi)| (lo + hi) / 2.0).collect()
    }

    /// Suggests `k` points by greedily re-optimising with each prior
    /// suggestion temporarily folded in as a zero-information observation,
    /// so later suggestions in the batch spread out rather than collapsing
    /// onto the same maximiser.
    pub fn suggest_batch(&self, k: usize) -> Vec<Vec<f64>> {
        let mut scratch = BayesianOptimizer {
            param_box: self.param_box.clone(),
            length_scale: self.length_scale,
            signal_variance: self.signal_variance,
            noise_variance: self.noise_variance,
            beta: self.beta,
            observations: self.observations.clone(),
        };
        let mut rng: ThreadRng = rand::thread_rng();
        let mut batch = Vec::with_capacity(k);
        for _ in 0..k {
            let next = scratch.suggest_next_with(&mut rng);
            let (mean, _) = scratch.posterior(&next);
            scratch.observations.push(Observation { params: next.clone(), value: mean });
            batch.push(next);
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn default_box() -> ParamBox {
        ParamBox { dims: vec![(0.0, 1.0), (0.0, 1.0)] }
    }

    #[test]
    fn empty_optimizer_suggests_inside_the_box() {
        let optimizer = BayesianOptimizer::new(&OptimizerConfig::default(), default_box());
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let suggestion = optimizer.suggest_next_with(&mut rng);
        assert_eq!(suggestion.len(), 2);
        for (v, (lo, hi)) in suggestion.iter().zip(optimizer.param_box.dims.iter()) {
            assert!(*v >= *lo && *v <= *hi);
        }
    }

    #[test]
    fn get_best_tracks_the_highest_recorded_value() {
        let mut optimizer = BayesianOptimizer::new(&OptimizerConfig::default(), default_box());
        optimizer.record_evaluation(vec![0.1, 0.1], 0.2);
        optimizer.record_evaluation(vec![0.9, 0.9], 0.8);
        optimizer.record_evaluation(vec![0.5, 0.5], 0.5);
        let (params, value) = optimizer.get_best().unwrap();
        assert_eq!(params, vec![0.9, 0.9]);
        assert_eq!(value, 0.8);
    }

    #[test]
    fn non_finite_evaluations_are_dropped() {
        let mut optimizer = BayesianOptimizer::new(&OptimizerConfig::default(), default_box());
        optimizer.record_evaluation(vec![0.1, 0.1], f64::NAN);
        assert!(optimizer.get_best().is_none());
    }

    #[test]
    fn suggestion_gravitates_toward_the_best_observed_region() {
        let mut optimizer = BayesianOptimizer::new(&OptimizerConfig::default(), default_box());
        for i in 0..10 {
            let x = i as f64 / 10.0;
            // value peaks near (0.8, 0.8)
            let value = 1.0 - ((x - 0.8).powi(2) * 2.0);
            optimizer.record_evaluation(vec![x, x], value);
        }
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let suggestion = optimizer.suggest_next_with(&mut rng);
        // Not a strict optimality claim, just that it lands in the upper half
        // of the box rather than near the observed worst region.
        assert!(suggestion[0] > 0.3);
    }

    #[test]
    fn suggest_batch_returns_k_points_in_bounds() {
        let mut optimizer = BayesianOptimizer::new(&OptimizerConfig::default(), default_box());
        optimizer.record_evaluation(vec![0.2, 0.3], 0.4);
        let batch = optimizer.suggest_batch(3);
        assert_eq!(batch.len(), 3);
        for point in batch {
            assert_eq!(point.len(), 2);
        }
    }
}
