//! Thompson Sampling over Beta-Bernoulli posteriors, blending a global
//! per-action posterior with a per-context-bucket posterior.

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::{BetaParams, ThompsonSamplingOptions, TSActionSelection};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThompsonSamplingState {
    pub global: HashMap<String, BetaParams>,
    /// Keyed by `"{context_bucket}:{action_key}"`.
    pub contextual: HashMap<String, BetaParams>,
    pub options: ThompsonSamplingOptions,
    pub update_count: u64,
}

impl Default for ThompsonSamplingState {
    fn default() -> Self {
        Self {
            global: HashMap::new(),
            contextual: HashMap::new(),
            options: ThompsonSamplingOptions::default(),
            update_count: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchUpdateItem {
    pub action_key: String,
    pub context_bucket: String,
    pub reward: f64,
}

fn context_key(bucket: &str, action_key: &str) -> String {
    format!("{bucket}:{action_key}")
}

/// Samples Gamma(shape, 1) via Marsaglia-Tsang, valid for shape >= 1; for
/// shape < 1 uses the standard boost-by-one-and-rescale trick.
fn sample_gamma<R: Rng>(rng: &mut R, shape: f64) -> f64 {
    if shape < 1.0 {
        let u: f64 = rng.gen_range(0.0..1.0);
        return sample_gamma(rng, shape + 1.0) * u.powf(1.0 / shape);
    }
    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();
    loop {
        let mut x: f64;
        let mut v: f64;
        loop {
            x = sample_standard_normal(rng);
            v = 1.0 + c * x;
            if v > 0.0 {
                break;
            }
        }
        let v3 = v * v * v;
        let u: f64 = rng.gen_range(0.0..1.0);
        if u < 1.0 - 0.0331 * x * x * x * x {
            return d * v3;
        }
        if u.ln() < 0.5 * x * x + d * (1.0 - v3 + v3.ln()) {
            return d * v3;
        }
    }
}

fn sample_standard_normal<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(1e-12..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Draws a Beta(alpha, beta) sample as the ratio of two Gamma draws.
fn sample_beta<R: Rng>(rng: &mut R, params: &BetaParams) -> f64 {
    let x = sample_gamma(rng, params.alpha);
    let y = sample_gamma(rng, params.beta);
    if x + y <= 0.0 {
        0.5
    } else {
        x / (x + y)
    }
}

pub struct ThompsonSampling {
    state: ThompsonSamplingState,
}

impl Default for ThompsonSampling {
    fn default() -> Self {
        Self::new()
    }
}

impl ThompsonSampling {
    pub fn new() -> Self {
        Self {
            state: ThompsonSamplingState::default(),
        }
    }

    pub fn with_options(options: ThompsonSamplingOptions) -> Self {
        Self {
            state: ThompsonSamplingState {
                options,
                ..Default::default()
            },
        }
    }

    pub fn from_state(state: ThompsonSamplingState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &ThompsonSamplingState {
        &self.state
    }

    pub fn snapshot(&self) -> ThompsonSamplingState {
        self.state.clone()
    }

    fn global_params(&self, action_key: &str) -> BetaParams {
        self.state
            .global
            .get(action_key)
            .copied()
            .unwrap_or(BetaParams::new(
                self.state.options.prior_alpha,
                self.state.options.prior_beta,
            ))
    }

    fn contextual_params(&self, bucket: &str, action_key: &str) -> BetaParams {
        self.state
            .contextual
            .get(&context_key(bucket, action_key))
            .copied()
            .unwrap_or(BetaParams::new(
                self.state.options.prior_alpha,
                self.state.options.prior_beta,
            ))
    }

    /// Mixing weight for the contextual posterior: `clamp(n/(n+n0), lo, hi)`,
    /// so a context bucket with little data defers to the global posterior.
    fn context_weight(&self, bucket: &str, action_key: &str) -> f64 {
        let n = self.contextual_params(bucket, action_key).total()
            - self.state.options.prior_alpha
            - self.state.options.prior_beta;
        let n = n.max(0.0);
        let raw = n / (n + self.state.options.context_n0);
        raw.clamp(
            self.state.options.min_context_weight,
            self.state.options.max_context_weight,
        )
    }

    /// Selects the best-scoring action for the given context bucket among
    /// `candidates`, drawing one Thompson sample per action.
    pub fn select<R: Rng>(
        &self,
        rng: &mut R,
        context_bucket: &str,
        candidates: &[String],
    ) -> Option<TSActionSelection> {
        let mut best: Option<TSActionSelection> = None;
        for action_key in candidates {
            let global_sample = sample_beta(rng, &self.global_params(action_key));
            let contextual_sample = sample_beta(rng, &self.contextual_params(context_bucket, action_key));
            let w = self.context_weight(context_bucket, action_key);
            let score = w * contextual_sample + (1.0 - w) * global_sample;

            let global = self.global_params(action_key);
            let confidence = global.mean() * (1.0 - global.variance().sqrt()).max(0.0);

            let selection = TSActionSelection {
                action_key: action_key.clone(),
                score,
                confidence,
                global_sample,
                contextual_sample,
            };
            match &best {
                Some(current) if current.score >= selection.score => {}
                _ => best = Some(selection),
            }
        }
        best
    }

    /// Bayesian Bernoulli update: success increments alpha, failure increments
    /// beta, applied to both the global and the context-bucket posterior.
    pub fn update(&mut self, action_key: &str, context_bucket: &str, reward: f64) {
        let success = reward > 0.0;
        let global = self
            .state
            .global
            .entry(action_key.to_string())
            .or_insert(BetaParams::new(
                self.state.options.prior_alpha,
                self.state.options.prior_beta,
            ));
        if success {
            global.alpha += 1.0;
        } else {
            global.beta += 1.0;
        }

        let key = context_key(context_bucket, action_key);
        let contextual = self.state.contextual.entry(key).or_insert(BetaParams::new(
            self.state.options.prior_alpha,
            self.state.options.prior_beta,
        ));
        if success {
            contextual.alpha += 1.0;
        } else {
            contextual.beta += 1.0;
        }

        self.state.update_count += 1;
    }

    pub fn batch_update(&mut self, items: &[BatchUpdateItem]) {
        for item in items {
            self.update(&item.action_key, &item.context_bucket, item.reward);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    #[test]
    fn select_with_uniform_priors_picks_some_candidate() {
        let ts = ThompsonSampling::new();
        let mut r = rng();
        let choice = ts.select(&mut r, "ctx", &["a".into(), "b".into()]).unwrap();
        assert!(choice.action_key == "a" || choice.action_key == "b");
    }

    #[test]
    fn update_shifts_posterior_toward_rewarded_action() {
        let mut ts = ThompsonSampling::new();
        for _ in 0..50 {
            ts.update("good", "ctx", 1.0);
            ts.update("bad", "ctx", -1.0);
        }
        let good = ts.global_params("good");
        let bad = ts.global_params("bad");
        assert!(good.mean() > bad.mean());
    }

    #[test]
    fn context_weight_is_bounded() {
        let ts = ThompsonSampling::new();
        let w = ts.context_weight("ctx", "a");
        assert!(w >= ts.state.options.min_context_weight);
        assert!(w <= ts.state.options.max_context_weight);
    }

    #[test]
    fn context_weight_grows_with_context_evidence() {
        let mut ts = ThompsonSampling::new();
        let before = ts.context_weight("ctx", "a");
        for _ in 0..200 {
            ts.update("a", "ctx", 1.0);
        }
        let after = ts.context_weight("ctx", "a");
        assert!(after >= before);
    }

    #[test]
    fn batch_update_applies_every_item() {
        let mut ts = ThompsonSampling::new();
        let items = vec![
            BatchUpdateItem {
                action_key: "a".into(),
                context_bucket: "ctx".into(),
                reward: 1.0,
            },
            BatchUpdateItem {
                action_key: "a".into(),
                context_bucket: "ctx".into(),
                reward: 0.0,
            },
        ];
        ts.batch_update(&items);
        assert_eq!(ts.state().update_count, 2);
    }

    #[test]
    fn snapshot_round_trips_through_from_state() {
        let mut ts = ThompsonSampling::new();
        ts.update("a", "ctx", 1.0);
        let snap = ts.snapshot();
        let restored = ThompsonSampling::from_state(snap);
        assert_eq!(restored.global_params("a").alpha, ts.global_params("a").alpha);
    }
}
