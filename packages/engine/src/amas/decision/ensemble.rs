//! Ensemble voter: aggregates every enabled learner's opinion on the fixed
//! action catalogue into one pick, and adapts per-learner weights by how
//! well each one's winning pick paid off.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::amas::action_space::{self, CatalogueAction};
use crate::amas::config::{AMASConfig, EnsembleConfig, FeatureFlags};
use crate::amas::learner::{ActrLearner, HeuristicAdapter, Learner, LearnerOutcome, LinUCBLearner, ThompsonLearner};
use crate::amas::metrics::AlgorithmId;
use crate::amas::perception::DecisionContext;
use crate::amas::types::{ColdStartPhase, EnsembleWeights, StrategyParams, UserState};
use crate::error::AmasResult;
use crate::track_algorithm;

fn action_to_strategy(action: &CatalogueAction) -> StrategyParams {
    StrategyParams {
        new_ratio: action.new_ratio,
        interval_scale: action.interval_scale,
        difficulty: action.difficulty,
        batch_size: action.batch_size,
        hint_level: action.hint_level,
    }
}

/// One learner's contribution to a single decision, kept for the pipeline
/// trace.
#[derive(Debug, Clone)]
pub struct EnsembleMember {
    pub learner: String,
    pub action_key: String,
    pub score: f64,
    pub confidence: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone)]
pub struct EnsembleSelection {
    pub action_key: String,
    pub strategy: StrategyParams,
    pub winning_learner: String,
    pub weights: EnsembleWeights,
    pub members: Vec<EnsembleMember>,
}

/// The full persisted state of one user's ensemble: adaptive weights plus
/// every stateful learner's own snapshot. The heuristic learner is
/// stateless and carries nothing.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EnsembleSnapshot {
    pub weights: EnsembleWeights,
    pub linucb: serde_json::Value,
    pub thompson: serde_json::Value,
    pub actr: serde_json::Value,
    pub reward_ema: HashMap<String, f64>,
}

pub struct EnsembleDecision {
    feature_flags: FeatureFlags,
    ensemble_config: EnsembleConfig,
    thompson: ThompsonLearner,
    linucb: LinUCBLearner,
    actr: ActrLearner,
    heuristic: HeuristicAdapter,
    weights: EnsembleWeights,
    reward_ema: HashMap<String, f64>,
    last_winner: Option<String>,
}

const LEARNER_NAMES: [&str; 4] = ["thompson", "linucb", "actr", "heuristic"];

impl EnsembleDecision {
    pub fn new(config: &AMASConfig) -> Self {
        Self {
            feature_flags: config.feature_flags.clone(),
            ensemble_config: config.ensemble.clone(),
            thompson: ThompsonLearner::new(),
            linucb: LinUCBLearner::new(config),
            actr: ActrLearner::new(),
            heuristic: HeuristicAdapter::new(crate::amas::decision::heuristic::HeuristicLearner::default()),
            weights: EnsembleWeights::default(),
            reward_ema: HashMap::new(),
            last_winner: None,
        }
    }

    pub fn weights(&self) -> EnsembleWeights {
        self.weights
    }

    /// Tolerates missing/invalid weights: falls back to defaults if the sum
    /// is non-positive or non-finite, otherwise clips and renormalises.
    pub fn restore_weights(&mut self, weights: EnsembleWeights) {
        let sum = weights.thompson + weights.linucb + weights.actr + weights.heuristic;
        self.weights = if sum.is_finite() && sum > 0.0 {
            weights.renormalise()
        } else {
            EnsembleWeights::default()
        };
    }

    /// Picks an action. If cold-start has not reached `Normal`, delegates to
    /// its current strategy mapped onto the nearest catalogue entry.
    pub fn select(
        &mut self,
        state: &UserState,
        ctx: &DecisionContext,
        coldstart_phase: ColdStartPhase,
        coldstart_strategy: Option<StrategyParams>,
    ) -> EnsembleSelection {
        if coldstart_phase != ColdStartPhase::Normal {
            let strategy = coldstart_strategy.unwrap_or_else(|| {
                StrategyParams::for_user_type(crate::amas::types::UserType::Stable)
            });
            let action = action_space::nearest(
                strategy.new_ratio,
                strategy.interval_scale,
                strategy.difficulty,
                strategy.batch_size,
                strategy.hint_level,
            );
            self.last_winner = None;
            return EnsembleSelection {
                action_key: action.key.to_string(),
                strategy,
                winning_learner: "coldstart".to_string(),
                weights: self.weights,
                members: Vec::new(),
            };
        }

        let mut by_learner: Vec<(&'static str, Vec<crate::amas::learner::ActionScore>, f64)> = Vec::new();
        if self.feature_flags.thompson_enabled {
            let scores = track_algorithm!(AlgorithmId::Thompson, self.thompson.score_actions(state, ctx));
            by_learner.push(("thompson", scores, self.weights.thompson));
        }
        if self.feature_flags.linucb_enabled {
            let scores = track_algorithm!(AlgorithmId::LinUcb, self.linucb.score_actions(state, ctx));
            by_learner.push(("linucb", scores, self.weights.linucb));
        }
        if self.feature_flags.actr_enabled {
            let scores = track_algorithm!(AlgorithmId::Actr, self.actr.score_actions(state, ctx));
            by_learner.push(("actr", scores, self.weights.actr));
        }
        if self.feature_flags.heuristic_enabled {
            let scores = track_algorithm!(AlgorithmId::Heuristic, self.heuristic.score_actions(state, ctx));
            by_learner.push(("heuristic", scores, self.weights.heuristic));
        }

        if by_learner.is_empty() {
            let fallback = action_space::by_key("mid-normal-baseline").expect("baseline action always exists");
            self.last_winner = None;
            return EnsembleSelection {
                action_key: fallback.key.to_string(),
                strategy: action_to_strategy(fallback),
                winning_learner: "none".to_string(),
                weights: self.weights,
                members: Vec::new(),
            };
        }

        let mut aggregate: HashMap<String, f64> = HashMap::new();
        for (_, scores, weight) in &by_learner {
            for s in scores {
                *aggregate.entry(s.action_key.clone()).or_insert(0.0) += weight * s.confidence * s.score;
            }
        }

        let best_key = aggregate
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(k, _)| k.clone())
            .unwrap_or_else(|| "mid-normal-baseline".to_string());

        let mut members = Vec::with_capacity(by_learner.len());
        let mut winning_learner = "ensemble".to_string();
        let mut winning_contribution = f64::MIN;
        for (name, scores, weight) in &by_learner {
            if let Some(top) = scores.iter().max_by(|a, b| a.score.partial_cmp(&b.score).unwrap()) {
                let contribution = weight * top.confidence * top.score;
                members.push(EnsembleMember {
                    learner: name.to_string(),
                    action_key: top.action_key.clone(),
                    score: top.score,
                    confidence: top.confidence,
                    contribution,
                });
            }
            if let Some(at_best) = scores.iter().find(|s| s.action_key == best_key) {
                let contribution = weight * at_best.confidence * at_best.score;
                if contribution > winning_contribution {
                    winning_contribution = contribution;
                    winning_learner = name.to_string();
                }
            }
        }

        let action = action_space::by_key(&best_key).unwrap_or_else(|| {
            action_space::by_key("mid-normal-baseline").expect("baseline action always exists")
        });

        self.last_winner = Some(winning_learner.clone());

        EnsembleSelection {
            action_key: action.key.to_string(),
            strategy: action_to_strategy(action),
            winning_learner,
            weights: self.weights,
            members,
        }
    }

    /// Propagates the outcome to every enabled learner, then adapts weights
    /// toward a softmax of each learner's recent-reward EMA.
    pub fn update(&mut self, state: &UserState, ctx: &DecisionContext, action_key: &str, outcome: LearnerOutcome) {
        if self.feature_flags.thompson_enabled {
            track_algorithm!(AlgorithmId::Thompson, self.thompson.update(state, ctx, action_key, outcome));
        }
        if self.feature_flags.linucb_enabled {
            track_algorithm!(AlgorithmId::LinUcb, self.linucb.update(state, ctx, action_key, outcome));
        }
        if self.feature_flags.actr_enabled {
            track_algorithm!(AlgorithmId::Actr, self.actr.update(state, ctx, action_key, outcome));
        }
        if self.feature_flags.heuristic_enabled {
            track_algorithm!(AlgorithmId::Heuristic, self.heuristic.update(state, ctx, action_key, outcome));
        }

        if self.feature_flags.ensemble_weight_adaptation_enabled {
            track_algorithm!(AlgorithmId::Ensemble, self.adapt_weights(outcome.reward));
        }
    }

    /// Captures every stateful learner's snapshot alongside the adaptive
    /// weights, for persistence.
    pub fn snapshot(&self) -> EnsembleSnapshot {
        EnsembleSnapshot {
            weights: self.weights,
            linucb: self.linucb.snapshot(),
            thompson: self.thompson.snapshot(),
            actr: self.actr.snapshot(),
            reward_ema: self.reward_ema.clone(),
        }
    }

    /// Restores every stateful learner from a prior [`EnsembleDecision::snapshot`].
    pub fn restore(&mut self, snapshot: EnsembleSnapshot) -> AmasResult<()> {
        self.restore_weights(snapshot.weights);
        self.linucb.restore(snapshot.linucb)?;
        self.thompson.restore(snapshot.thompson)?;
        self.actr.restore(snapshot.actr)?;
        self.reward_ema = snapshot.reward_ema;
        Ok(())
    }

    fn adapt_weights(&mut self, reward: f64) {
        let Some(winner) = self.last_winner.clone() else {
            return;
        };
        if !reward.is_finite() {
            return;
        }

        let entry = self.reward_ema.entry(winner).or_insert(0.5);
        *entry = 0.9 * *entry + 0.1 * reward.clamp(-1.0, 1.0);

        let temperature = self.ensemble_config.softmax_temperature.max(1e-6);
        let emas: Vec<f64> = LEARNER_NAMES.iter().map(|n| *self.reward_ema.get(*n).unwrap_or(&0.5)).collect();
        let max_ema = emas.iter().cloned().fold(f64::MIN, f64::max);
        let exps: Vec<f64> = emas.iter().map(|e| ((e - max_ema) / temperature).exp()).collect();
        let sum_exp: f64 = exps.iter().sum();
        let targets: Vec<f64> = exps.iter().map(|e| e / sum_exp).collect();

        let current = [self.weights.thompson, self.weights.linucb, self.weights.actr, self.weights.heuristic];
        let rate = self.ensemble_config.adaptation_rate;
        let max_step = self.ensemble_config.max_step;

        let mut next = [0.0; 4];
        for i in 0..4 {
            let step = (rate * (targets[i] - current[i])).clamp(-max_step, max_step);
            next[i] = current[i] + step;
        }

        self.weights = EnsembleWeights {
            thompson: next[0],
            linucb: next[1],
            actr: next[2],
            heuristic: next[3],
        }
        .renormalise();
    }
}
