//! The narrow `Learner` trait every ensemble member implements, plus thin
//! wrappers around `amas-algo`'s pure-math LinUCB/Thompson/ACT-R and the
//! engine's own heuristic baseline.
//!
//! Keeping this surface narrow (`select` via `score_actions`, `update`,
//! `snapshot`, `restore`, `name`) is what lets the ensemble voter hold a
//! `Vec<Box<dyn Learner>>` instead of matching on a closed enum of concrete
//! learner types.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::Value;

use crate::amas::action_space::{self, ACTION_SPACE};
use crate::amas::config::AMASConfig;
use crate::amas::metrics::{registry, AlgorithmId};
use crate::amas::perception::DecisionContext;
use crate::amas::types::UserState;
use crate::error::{AmasError, AmasResult};

/// Outcome fed back to every learner once a reward is known.
#[derive(Debug, Clone, Copy)]
pub struct LearnerOutcome {
    pub reward: f64,
    pub is_correct: bool,
    /// Seconds since the user's previous event, used by the ACT-R learner.
    pub elapsed_seconds: f64,
}

/// One learner's opinion on one catalogue action.
#[derive(Debug, Clone)]
pub struct ActionScore {
    pub action_key: String,
    pub score: f64,
    pub confidence: f64,
}

pub trait Learner: Send {
    fn name(&self) -> &'static str;
    fn score_actions(&self, state: &UserState, ctx: &DecisionContext) -> Vec<ActionScore>;
    fn update(&mut self, state: &UserState, ctx: &DecisionContext, action_key: &str, outcome: LearnerOutcome);
    fn snapshot(&self) -> Value;
    fn restore(&mut self, value: Value) -> AmasResult<()>;
}

/// Builds the fixed 22-feature LinUCB vector for one candidate action,
/// following the frozen layout: `{A,F,C.mem,C.speed,M}`, recent error rate,
/// the action's own five numeric fields, an interaction term, a time-of-day
/// encoding, six cross-terms, and a bias.
pub fn build_linucb_features(
    state: &UserState,
    ctx: &DecisionContext,
    action: &action_space::CatalogueAction,
) -> Vec<f64> {
    let a = state.attention.clamp(0.0, 1.0);
    let f = state.fatigue.clamp(0.0, 1.0);
    let c_mem = state.cognitive.memory.clamp(0.0, 1.0);
    let c_speed = state.cognitive.speed.clamp(0.0, 1.0);
    let m = state.motivation.clamp(-1.0, 1.0);
    let error_rate = ctx.recent_error_rate.clamp(0.0, 1.0);

    let interval_scale = action.interval_scale;
    let new_ratio = action.new_ratio;
    let numeric_difficulty = action.difficulty.to_index() as f64;
    let batch_norm = action.batch_size as f64 / 20.0;
    let hint_norm = action.hint_level as f64 / 3.0;

    let h = (ctx.hour_of_day.min(23) as f64) / 24.0;
    let angle = std::f64::consts::TAU * h;
    let is_afternoon = if h > 0.33 && h < 0.75 { 1.0 } else { 0.0 };

    let rt_norm = (ctx.recent_response_time_ms / 5000.0).clamp(0.0, 2.0);
    let hard_bonus = if matches!(action.difficulty, action_space::Difficulty::Hard) { 0.8 } else { 0.2 };

    vec![
        a,
        f,
        c_mem,
        c_speed,
        m,
        error_rate,
        interval_scale,
        new_ratio,
        numeric_difficulty,
        batch_norm,
        hint_norm,
        f * interval_scale,
        angle.sin(),
        angle.cos(),
        is_afternoon,
        error_rate * f,
        error_rate * interval_scale,
        rt_norm * a,
        c_mem * hard_bonus,
        m * new_ratio,
        (1.0 - a) * hint_norm,
        1.0,
    ]
}

pub struct LinUCBLearner {
    inner: amas_algo::LinUCB,
    interaction_count: u64,
    recent_accuracy: f64,
    context_dim: usize,
    lambda: f64,
    base_alpha: f64,
}

impl LinUCBLearner {
    pub fn new(config: &AMASConfig) -> Self {
        Self {
            inner: amas_algo::LinUCB::new(config.bandit.context_dim, config.bandit.lambda, config.bandit.alpha),
            interaction_count: 0,
            recent_accuracy: 0.5,
            context_dim: config.bandit.context_dim,
            lambda: config.bandit.lambda,
            base_alpha: config.bandit.alpha,
        }
    }

    /// Cold-start-aware exploration schedule: wide exploration for brand-new
    /// users, tightened once enough accurate history accumulates, and a
    /// steady-state value afterward.
    fn scheduled_alpha(&self, fatigue: f64) -> f64 {
        if self.interaction_count < 15 {
            0.5
        } else if self.interaction_count < 50 {
            if self.recent_accuracy > 0.75 && fatigue < 0.5 {
                2.0
            } else {
                1.0
            }
        } else {
            0.7
        }
    }
}

impl Learner for LinUCBLearner {
    fn name(&self) -> &'static str {
        "linucb"
    }

    fn score_actions(&self, state: &UserState, ctx: &DecisionContext) -> Vec<ActionScore> {
        let model = self.inner.model();
        let theta = match amas_algo::matrix::solve_via_cholesky(&model.l_matrix, model.d, &model.b) {
            Ok(t) => t,
            Err(_) => return Vec::new(),
        };

        ACTION_SPACE
            .iter()
            .map(|action| {
                let mut x = build_linucb_features(state, ctx, action);
                amas_algo::sanitize::sanitize_feature_vector(&mut x);
                let mean: f64 = theta.iter().zip(x.iter()).map(|(t, xi)| t * xi).sum();
                let width = amas_algo::matrix::confidence_width(&model.l_matrix, model.d, &x).unwrap_or(0.0);
                ActionScore {
                    action_key: action.key.to_string(),
                    score: mean + model.alpha * width,
                    confidence: width.clamp(0.0, 1.0),
                }
            })
            .collect()
    }

    fn update(&mut self, state: &UserState, ctx: &DecisionContext, action_key: &str, outcome: LearnerOutcome) {
        let Some(action) = action_space::by_key(action_key) else {
            return;
        };
        self.interaction_count += 1;
        let sample = if outcome.is_correct { 1.0 } else { 0.0 };
        self.recent_accuracy = 0.9 * self.recent_accuracy + 0.1 * sample;

        self.inner.set_alpha(self.scheduled_alpha(state.fatigue));
        let x = build_linucb_features(state, ctx, action);
        if self.inner.update(&x, outcome.reward).is_err() {
            // Rank-1 update and the full re-decomposition it fell back to
            // both failed: the covariance is unrecoverable, so reset to a
            // fresh λI prior and mark the failure for the stats/effect tracker.
            registry().record_error(AlgorithmId::LinUcb);
            self.inner = amas_algo::LinUCB::new(self.context_dim, self.lambda, self.base_alpha);
        }
    }

    fn snapshot(&self) -> Value {
        serde_json::to_value(self.inner.snapshot()).unwrap_or(Value::Null)
    }

    fn restore(&mut self, value: Value) -> AmasResult<()> {
        let model: amas_algo::BanditModel = serde_json::from_value(value)
            .map_err(|e| AmasError::StateCorruption(format!("linucb snapshot: {e}")))?;
        if model.d > amas_algo::FEATURE_DIMENSION {
            return Err(AmasError::StateCorruption(format!(
                "linucb snapshot dimension {} exceeds frozen feature dimension {}",
                model.d,
                amas_algo::FEATURE_DIMENSION
            )));
        }
        self.inner = amas_algo::LinUCB::restore(model);
        Ok(())
    }
}

/// Maps a continuous user state to a coarse `{error-rate, pace, time-of-day}`
/// bucket key for Thompson Sampling's per-context posteriors.
fn context_bucket(ctx: &DecisionContext) -> String {
    let error_bucket = if ctx.recent_error_rate < 0.2 {
        0
    } else if ctx.recent_error_rate < 0.5 {
        1
    } else {
        2
    };
    let pace_bucket = if ctx.recent_response_time_ms < 2500.0 {
        0
    } else if ctx.recent_response_time_ms < 6000.0 {
        1
    } else {
        2
    };
    let time_bucket = ctx.hour_of_day / 8;
    format!("{error_bucket}:{pace_bucket}:{time_bucket}")
}

pub struct ThompsonLearner {
    inner: amas_algo::ThompsonSampling,
    rng: ChaCha8Rng,
}

impl ThompsonLearner {
    pub fn new() -> Self {
        Self {
            inner: amas_algo::ThompsonSampling::new(),
            rng: ChaCha8Rng::seed_from_u64(0x5EED),
        }
    }
}

impl Default for ThompsonLearner {
    fn default() -> Self {
        Self::new()
    }
}

impl Learner for ThompsonLearner {
    fn name(&self) -> &'static str {
        "thompson"
    }

    fn score_actions(&self, _state: &UserState, ctx: &DecisionContext) -> Vec<ActionScore> {
        let bucket = context_bucket(ctx);
        let keys = action_space::action_keys();
        let mut rng = self.rng.clone();
        keys.iter()
            .map(|key| {
                let selection = self
                    .inner
                    .select(&mut rng, &bucket, std::slice::from_ref(key))
                    .expect("non-empty candidate slice always yields a selection");
                ActionScore {
                    action_key: selection.action_key,
                    score: selection.score,
                    confidence: selection.confidence,
                }
            })
            .collect()
    }

    fn update(&mut self, _state: &UserState, ctx: &DecisionContext, action_key: &str, outcome: LearnerOutcome) {
        let bucket = context_bucket(ctx);
        self.inner.update(action_key, &bucket, outcome.reward);
    }

    fn snapshot(&self) -> Value {
        serde_json::to_value(self.inner.snapshot()).unwrap_or(Value::Null)
    }

    fn restore(&mut self, value: Value) -> AmasResult<()> {
        let state: amas_algo::ThompsonSamplingState =
            serde_json::from_value(value).map_err(|e| AmasError::StateCorruption(format!("thompson snapshot: {e}")))?;
        self.inner = amas_algo::ThompsonSampling::from_state(state);
        Ok(())
    }
}

/// Per-user ACT-R memory trace: the engine appends one entry per processed
/// event, bounded to a short rolling history.
pub struct ActrLearner {
    state: amas_algo::ACTRState,
    traces: std::collections::VecDeque<amas_algo::MemoryTrace>,
}

const ACTR_MAX_TRACES: usize = 50;

impl ActrLearner {
    pub fn new() -> Self {
        Self {
            state: amas_algo::ACTRState::default(),
            traces: std::collections::VecDeque::with_capacity(ACTR_MAX_TRACES),
        }
    }
}

impl Default for ActrLearner {
    fn default() -> Self {
        Self::new()
    }
}

impl Learner for ActrLearner {
    fn name(&self) -> &'static str {
        "actr"
    }

    fn score_actions(&self, _state: &UserState, _ctx: &DecisionContext) -> Vec<ActionScore> {
        let memory = amas_algo::ACTRMemory::new();
        let result = memory.compute(self.traces.make_contiguous(), &self.state);
        let recall = result.recall_probability;

        ACTION_SPACE
            .iter()
            .map(|action| {
                let difficulty_term = (action.difficulty.to_index() as f64 / 2.0 - recall).abs();
                let hint_term = (action.hint_level as f64 / 2.0 - (1.0 - recall)).abs();
                let score = 1.0 - (difficulty_term + hint_term) / 2.0;
                ActionScore {
                    action_key: action.key.to_string(),
                    score,
                    confidence: result.confidence,
                }
            })
            .collect()
    }

    fn update(&mut self, _state: &UserState, _ctx: &DecisionContext, _action_key: &str, outcome: LearnerOutcome) {
        self.traces.push_back(amas_algo::MemoryTrace {
            delta_t: outcome.elapsed_seconds.max(0.0),
            is_correct: outcome.is_correct,
        });
        if self.traces.len() > ACTR_MAX_TRACES {
            self.traces.pop_front();
        }
        self.state.update_count += 1;
    }

    fn snapshot(&self) -> Value {
        serde_json::json!({
            "state": self.state,
            "traces": self.traces.iter().cloned().collect::<Vec<_>>(),
        })
    }

    fn restore(&mut self, value: Value) -> AmasResult<()> {
        let state = value
            .get("state")
            .cloned()
            .ok_or_else(|| AmasError::StateCorruption("actr snapshot missing state".to_string()))?;
        let traces = value
            .get("traces")
            .cloned()
            .ok_or_else(|| AmasError::StateCorruption("actr snapshot missing traces".to_string()))?;
        self.state =
            serde_json::from_value(state).map_err(|e| AmasError::StateCorruption(format!("actr state: {e}")))?;
        let traces: Vec<amas_algo::MemoryTrace> =
            serde_json::from_value(traces).map_err(|e| AmasError::StateCorruption(format!("actr traces: {e}")))?;
        self.traces = traces.into_iter().collect();
        Ok(())
    }
}

/// Adapts the table-lookup heuristic baseline to the `Learner` interface by
/// scoring every catalogue action against its nearest-neighbour distance to
/// the heuristic's suggested strategy.
pub struct HeuristicAdapter {
    inner: crate::amas::decision::heuristic::HeuristicLearner,
}

impl HeuristicAdapter {
    pub fn new(inner: crate::amas::decision::heuristic::HeuristicLearner) -> Self {
        Self { inner }
    }
}

impl Learner for HeuristicAdapter {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn score_actions(&self, state: &UserState, _ctx: &DecisionContext) -> Vec<ActionScore> {
        let current = crate::amas::types::StrategyParams::for_user_type(crate::amas::types::UserType::Stable);
        let suggestion = self.inner.suggest(state, current);
        let confidence = self.inner.confidence(state);

        ACTION_SPACE
            .iter()
            .map(|action| {
                let distance = action_space::distance(
                    action,
                    suggestion.new_ratio,
                    suggestion.interval_scale,
                    suggestion.difficulty,
                    suggestion.batch_size,
                    suggestion.hint_level,
                );
                ActionScore {
                    action_key: action.key.to_string(),
                    score: 1.0 / (1.0 + distance),
                    confidence,
                }
            })
            .collect()
    }

    fn update(&mut self, _state: &UserState, _ctx: &DecisionContext, _action_key: &str, _outcome: LearnerOutcome) {
        // Stateless table-lookup: nothing to learn.
    }

    fn snapshot(&self) -> Value {
        Value::Null
    }

    fn restore(&mut self, _value: Value) -> AmasResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> DecisionContext {
        DecisionContext {
            recent_error_rate: 0.2,
            recent_response_time_ms: 3000.0,
            hour_of_day: 10,
        }
    }

    #[test]
    fn linucb_scores_every_action() {
        let config = AMASConfig::default();
        let learner = LinUCBLearner::new(&config);
        let scores = learner.score_actions(&UserState::default(), &ctx());
        assert_eq!(scores.len(), ACTION_SPACE.len());
    }

    #[test]
    fn linucb_update_then_snapshot_restore_round_trips() {
        let config = AMASConfig::default();
        let mut learner = LinUCBLearner::new(&config);
        learner.update(
            &UserState::default(),
            &ctx(),
            "mid-normal-baseline",
            LearnerOutcome {
                reward: 0.5,
                is_correct: true,
                elapsed_seconds: 120.0,
            },
        );
        let snap = learner.snapshot();
        let mut restored = LinUCBLearner::new(&config);
        restored.restore(snap).unwrap();
        assert_eq!(restored.interaction_count, 0); // interaction_count isn't part of the model snapshot
    }

    #[test]
    fn thompson_scores_every_action() {
        let learner = ThompsonLearner::new();
        let scores = learner.score_actions(&UserState::default(), &ctx());
        assert_eq!(scores.len(), ACTION_SPACE.len());
    }

    #[test]
    fn actr_confidence_grows_with_history() {
        let mut learner = ActrLearner::new();
        let before = learner.score_actions(&UserState::default(), &ctx())[0].confidence;
        for _ in 0..10 {
            learner.update(
                &UserState::default(),
                &ctx(),
                "mid-normal-baseline",
                LearnerOutcome {
                    reward: 0.5,
                    is_correct: true,
                    elapsed_seconds: 60.0,
                },
            );
        }
        let after = learner.score_actions(&UserState::default(), &ctx())[0].confidence;
        assert!(after > before);
    }

    #[test]
    fn heuristic_prefers_baseline_when_state_is_nominal() {
        let inner = crate::amas::decision::heuristic::HeuristicLearner::default();
        let adapter = HeuristicAdapter::new(inner);
        let scores = adapter.score_actions(&UserState::default(), &ctx());
        let best = scores.iter().max_by(|a, b| a.score.partial_cmp(&b.score).unwrap()).unwrap();
        assert!(best.score > 0.0);
    }
}
