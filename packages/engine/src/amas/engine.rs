//! The orchestrator: owns one [`ModelBundle`] per user, runs the perception
//! -> modeling -> decision -> guardrail pipeline on every event, and drives
//! the background persistence and optimiser cycles.
//!
//! The per-user critical section is a `tokio::sync::Mutex<ModelBundle>`
//! behind an outer `RwLock<HashMap<..>>` keyed by user id: the outer lock is
//! only ever held long enough to fetch or insert that user's `Arc`, never
//! across the `.await` points that touch bundle internals, so two users'
//! pipelines never block each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex, RwLock};
use uuid::Uuid;

use crate::amas::action_space::{self, CatalogueAction};
use crate::amas::config::AMASConfig;
use crate::amas::decision::ensemble::EnsembleSnapshot;
use crate::amas::decision::{ColdStartManager, EnsembleDecision};
use crate::amas::guardrails::GuardrailEngine;
use crate::amas::learner::LearnerOutcome;
use crate::amas::metrics::AlgorithmId;
use crate::amas::modeling::attention::AttentionMonitor;
use crate::amas::modeling::cognitive::{CognitiveInput, CognitiveProfiler};
use crate::amas::modeling::fatigue::{FatigueEstimator, FatigueFeatures};
use crate::amas::modeling::motivation::{MotivationEvent, MotivationTracker};
use crate::amas::modeling::trend::TrendAnalyzer;
use crate::amas::optimizer::{BayesianOptimizer, ParamBox};
use crate::amas::perception::{DecisionContext, PerceptionState};
use crate::amas::persistence::{BundleSnapshot, PersistenceHandles};
use crate::amas::stats::{StatsTracker, WeeklyAggregate};
use crate::amas::types::{
    ColdStartState, CognitiveProfile, DecisionRecord, DecisionSource, ExplanationSummary, MemberVote,
    PipelineStageTrace, RawEvent, Reward, StrategyParams, UserState, UserType,
};
use crate::amas::worker_pool::WorkerPool;
use crate::error::{AmasError, AmasResult};
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

/// Everything the engine owns for one user, for as long as that user has
/// in-flight work: the rolling perception window, every continuous
/// sub-model, the cold-start classifier, the ensemble, the guardrail
/// smoothing state, and the last committed decision.
pub struct ModelBundle {
    perception: PerceptionState,
    attention: AttentionMonitor,
    fatigue: FatigueEstimator,
    motivation: MotivationTracker,
    cognitive: CognitiveProfiler,
    trend: TrendAnalyzer,
    cold_start: ColdStartManager,
    ensemble: EnsembleDecision,
    guardrails: GuardrailEngine,
    state: UserState,
    last_event_ts: Option<i64>,
    last_action: Option<(String, StrategyParams)>,
    updates_since_snapshot: u64,
    snapshot_version: u64,
}

/// The full serialised form of a [`ModelBundle`], written to and read from
/// [`crate::amas::persistence::SnapshotStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundleSnapshot {
    pub user_state: UserState,
    pub cold_start: ColdStartState,
    pub ensemble: EnsembleSnapshot,
    pub attention_value: f64,
    pub fatigue_value: f64,
    pub motivation_value: f64,
    pub cognitive_profile: CognitiveProfile,
    pub cognitive_update_count: u64,
    pub last_event_ts: Option<i64>,
    pub last_action: Option<(String, StrategyParams)>,
}

impl ModelBundle {
    fn new(config: &AMASConfig) -> Self {
        Self {
            perception: PerceptionState::new(&config.perception),
            attention: AttentionMonitor::new(config.attention_weights.clone(), 0.8),
            fatigue: FatigueEstimator::new(config.fatigue.clone()),
            motivation: MotivationTracker::new(config.motivation.clone()),
            cognitive: CognitiveProfiler::new(config.cognitive.clone()),
            trend: TrendAnalyzer::new(config.trend.clone()),
            cold_start: ColdStartManager::new(config.cold_start.clone()),
            ensemble: EnsembleDecision::new(config),
            guardrails: GuardrailEngine::new(config.guardrail.clone()),
            state: UserState::default(),
            last_event_ts: None,
            last_action: None,
            updates_since_snapshot: 0,
            snapshot_version: 0,
        }
    }

    fn restore(config: &AMASConfig, snapshot: ModelBundleSnapshot) -> AmasResult<Self> {
        let mut bundle = Self::new(config);
        bundle.state = snapshot.user_state;
        bundle.cold_start = ColdStartManager::from_state(config.cold_start.clone(), snapshot.cold_start);
        bundle.ensemble.restore(snapshot.ensemble)?;
        bundle.attention.set_value(snapshot.attention_value);
        bundle.fatigue.set_value(snapshot.fatigue_value);
        bundle.motivation.set_value(snapshot.motivation_value);
        bundle
            .cognitive
            .restore(snapshot.cognitive_profile, snapshot.cognitive_update_count);
        bundle.last_event_ts = snapshot.last_event_ts;
        bundle.last_action = snapshot.last_action;
        Ok(bundle)
    }

    fn snapshot(&mut self) -> ModelBundleSnapshot {
        self.snapshot_version += 1;
        ModelBundleSnapshot {
            user_state: self.state.clone(),
            cold_start: self.cold_start.state().clone(),
            ensemble: self.ensemble.snapshot(),
            attention_value: self.attention.current(),
            fatigue_value: self.fatigue.current(),
            motivation_value: self.motivation.current(),
            cognitive_profile: *self.cognitive.current(),
            cognitive_update_count: self.cognitive.update_count(),
            last_event_ts: self.last_event_ts,
            last_action: self.last_action.clone(),
        }
    }
}

/// The five-term reward, or `None` if any intermediate term came out
/// non-finite (the caller skips the learner update for this event but still
/// plays an action).
fn compute_reward(config: &AMASConfig, event: &RawEvent, motivation: f64, fatigue: f64) -> Option<Reward> {
    let weights = config.reward.weights_for(config.reward_profile);
    let reference_rt = config.reward.reference_response_time_ms;

    let correctness = if event.is_correct { 1.0 } else { 0.0 };
    let speed_term = ((reference_rt - event.response_time) / reference_rt).clamp(-1.0, 1.0);
    let frustration = 0.5 * (event.retry_count as f64 / 3.0).clamp(0.0, 1.0) + 0.5 * (-motivation).max(0.0);
    let engagement = (event.interaction_density * (1.0 - ((event.dwell_time / 3000.0).ln()).abs())).clamp(0.0, 1.0);

    let correctness_term = weights.w_c * correctness;
    let speed = weights.w_s * speed_term;
    let fatigue_penalty = weights.w_f * fatigue;
    let frustration_penalty = weights.w_fr * frustration;
    let engagement_term = weights.w_e * engagement;

    let value = correctness_term + speed - fatigue_penalty - frustration_penalty + engagement_term;
    if !value.is_finite() {
        return None;
    }

    Some(Reward {
        value: value.clamp(-1.0, 1.0),
        correctness_term,
        speed_term: speed,
        fatigue_penalty,
        frustration_penalty,
        engagement_term,
    })
}

/// Returned by [`AmasEngine::process_event`].
#[derive(Debug, Clone)]
pub struct ProcessEventResult {
    pub action_key: String,
    pub strategy: StrategyParams,
    pub user_state: UserState,
    pub guardrail_override: Option<String>,
    pub winning_learner: String,
    pub explanation: ExplanationSummary,
}

/// Returned by [`AmasEngine::get_strategy`].
#[derive(Debug, Clone)]
pub struct GetStrategyResult {
    pub action_key: String,
    pub strategy: StrategyParams,
    pub user_state: UserState,
}

enum PersistenceJob {
    Snapshot(BundleSnapshot),
    Decision(DecisionRecord),
}

/// Bounds of the reward-weight box the background optimiser explores:
/// `{w_c, w_s, w_f, w_fr, w_e}`, each constrained to `[0, 1]`.
fn reward_weight_box() -> ParamBox {
    ParamBox { dims: vec![(0.0, 1.0); 5] }
}

/// Per-user bundle cache, plus the shared config, persistence handles, CPU
/// worker pool, and background stats/optimiser state.
pub struct AmasEngine {
    config: AMASConfig,
    bundles: RwLock<HashMap<String, Arc<Mutex<ModelBundle>>>>,
    persistence: PersistenceHandles,
    worker_pool: Arc<WorkerPool>,
    persistence_tx: mpsc::Sender<PersistenceJob>,
    stats: Mutex<StatsTracker>,
    optimizer: Mutex<Option<BayesianOptimizer>>,
}

impl AmasEngine {
    pub fn new(config: AMASConfig, persistence: PersistenceHandles, worker_pool: WorkerPool) -> AmasResult<Self> {
        config.validate()?;
        let worker_pool = Arc::new(worker_pool);
        let (tx, rx) = mpsc::channel(1024);
        spawn_persistence_worker(persistence.clone(), rx);

        let optimizer = if config.feature_flags.bayesian_optimizer_enabled {
            Some(BayesianOptimizer::new(&config.optimizer, reward_weight_box()))
        } else {
            None
        };

        Ok(Self {
            config,
            bundles: RwLock::new(HashMap::new()),
            persistence,
            worker_pool,
            persistence_tx: tx,
            stats: Mutex::new(StatsTracker::new()),
            optimizer: Mutex::new(optimizer),
        })
    }

    /// Convenience constructor for tests and the demo binary: in-process
    /// persistence, a worker pool sized from config.
    pub fn in_memory(config: AMASConfig) -> AmasResult<Self> {
        let worker_pool = WorkerPool::new(&config.worker_pool)?;
        Self::new(config, PersistenceHandles::in_memory(), worker_pool)
    }

    async fn get_or_create_bundle(&self, user_id: &str) -> AmasResult<Arc<Mutex<ModelBundle>>> {
        if let Some(existing) = self.bundles.read().await.get(user_id) {
            return Ok(existing.clone());
        }

        let loaded = self.persistence.snapshots.load(user_id).await?;
        let bundle = match loaded {
            Some(snapshot) => {
                let parsed: ModelBundleSnapshot = serde_json::from_value(snapshot.payload)
                    .map_err(|e| AmasError::StateCorruption(format!("bundle snapshot for {user_id}: {e}")))?;
                ModelBundle::restore(&self.config, parsed)?
            }
            None => ModelBundle::new(&self.config),
        };
        let candidate = Arc::new(Mutex::new(bundle));

        let mut guard = self.bundles.write().await;
        let entry = guard.entry(user_id.to_string()).or_insert_with(|| candidate.clone());
        Ok(entry.clone())
    }

    /// Runs the full perception -> modeling -> decision -> guardrail
    /// pipeline for one event and returns the action to play next.
    ///
    /// The deadline is honoured cooperatively, not preemptively: a breach is
    /// only checked *after* every model update (the in-flight Cholesky update
    /// included) and the decision/snapshot writes have completed, so a
    /// cancelled call never leaks half-updated math and never loses the
    /// record it produced. A breach turns the return into `Err(Timeout)`
    /// without undoing any of that work.
    pub async fn process_event(
        &self,
        user_id: &str,
        session_id: &str,
        event: RawEvent,
        deadline_ms: Option<i64>,
    ) -> AmasResult<ProcessEventResult> {
        let pipeline_start = Instant::now();
        let mut trace: Vec<PipelineStageTrace> = Vec::with_capacity(5);

        let bundle = self.get_or_create_bundle(user_id).await?;
        let mut guard = bundle.lock().await;

        let stage_start = Instant::now();
        let feature = guard.perception.observe(event.clone());
        trace.push(PipelineStageTrace {
            stage: "perception".to_string(),
            node_id: "perception".to_string(),
            start_ms: stage_start.duration_since(pipeline_start).as_millis() as u64,
            duration_ms: stage_start.elapsed().as_millis() as u64,
            input_summary: format!("word_id={}, is_correct={}", event.word_id, event.is_correct),
            output_summary: format!("recent_error_rate={:.3}", feature.recent_error_rate),
            metadata: serde_json::Value::Null,
        });

        let break_minutes = guard
            .last_event_ts
            .map(|prev| (event.timestamp - prev).max(0) as f64 / 60_000.0);
        let elapsed_seconds = guard
            .last_event_ts
            .map(|prev| (event.timestamp - prev).max(0) as f64 / 1000.0)
            .unwrap_or(0.0);

        let stage_start = Instant::now();
        let attention = guard.attention.update(feature.attention_features());
        let rt_increase_rate = (feature.response_time_z.max(0.0) / 5.0).min(1.0);
        let fatigue = guard.fatigue.update(FatigueFeatures {
            error_rate_trend: feature.recent_error_rate,
            rt_increase_rate,
            repeat_errors: event.retry_count as i32,
            break_minutes,
        });
        let streak = guard.motivation.streak();
        let motivation = guard.motivation.update(MotivationEvent {
            is_correct: event.is_correct,
            is_quit: false,
            streak_length: streak,
        });
        let cognitive = guard.cognitive.update(CognitiveInput {
            is_correct: event.is_correct,
            response_time_z: feature.response_time_z,
        });

        let performance_signal = ((attention + (1.0 - fatigue) + (motivation + 1.0) / 2.0) / 3.0).clamp(0.0, 1.0);
        let trend = guard.trend.update(performance_signal);

        let confidence = if guard.cold_start.is_complete() {
            1.0
        } else {
            guard.cold_start.state().posterior.iter().cloned().fold(f64::MIN, f64::max)
        };

        let state = UserState {
            attention,
            fatigue,
            cognitive,
            motivation,
            trend,
            confidence,
            timestamp: event.timestamp,
        };
        guard.state = state.clone();
        trace.push(PipelineStageTrace {
            stage: "modeling".to_string(),
            node_id: "modeling".to_string(),
            start_ms: stage_start.duration_since(pipeline_start).as_millis() as u64,
            duration_ms: stage_start.elapsed().as_millis() as u64,
            input_summary: format!("retry_count={}, response_time={:.0}", event.retry_count, event.response_time),
            output_summary: format!("attention={attention:.3}, fatigue={fatigue:.3}, motivation={motivation:.3}"),
            metadata: serde_json::Value::Null,
        });

        let reward = compute_reward(&self.config, &event, motivation, fatigue);

        let stage_start = Instant::now();
        let phase = guard.cold_start.phase();
        let coldstart_strategy = track_algorithm!(
            AlgorithmId::ColdStart,
            guard
                .cold_start
                .update(reward.as_ref().map(|r| r.value).unwrap_or(0.0), feature.recent_error_rate)
        );
        trace.push(PipelineStageTrace {
            stage: "cold_start".to_string(),
            node_id: "cold_start".to_string(),
            start_ms: stage_start.duration_since(pipeline_start).as_millis() as u64,
            duration_ms: stage_start.elapsed().as_millis() as u64,
            input_summary: format!("phase={phase:?}"),
            output_summary: format!("probe_assigned={}", coldstart_strategy.is_some()),
            metadata: serde_json::Value::Null,
        });

        let stage_start = Instant::now();
        let ctx = DecisionContext::from(&feature);
        let selection = guard.ensemble.select(&state, &ctx, phase, coldstart_strategy);
        trace.push(PipelineStageTrace {
            stage: "ensemble".to_string(),
            node_id: "ensemble".to_string(),
            start_ms: stage_start.duration_since(pipeline_start).as_millis() as u64,
            duration_ms: stage_start.elapsed().as_millis() as u64,
            input_summary: format!("members={}", selection.members.len()),
            output_summary: format!("winner={}, action={}", selection.winning_learner, selection.action_key),
            metadata: serde_json::Value::Null,
        });

        let stage_start = Instant::now();
        let (action, guardrail_override) =
            track_algorithm!(AlgorithmId::Guardrail, guard.guardrails.apply(&state, selection.strategy));
        trace.push(PipelineStageTrace {
            stage: "guardrail".to_string(),
            node_id: "guardrail".to_string(),
            start_ms: stage_start.duration_since(pipeline_start).as_millis() as u64,
            duration_ms: stage_start.elapsed().as_millis() as u64,
            input_summary: format!("proposed={}", selection.action_key),
            output_summary: format!("final={}, override={:?}", action.key, guardrail_override),
            metadata: serde_json::Value::Null,
        });

        if let Some(r) = &reward {
            guard.ensemble.update(
                &state,
                &ctx,
                &selection.action_key,
                LearnerOutcome {
                    reward: r.value,
                    is_correct: event.is_correct,
                    elapsed_seconds,
                },
            );
        } else {
            tracing::warn!(user_id, "reward computation produced a non-finite value; skipping learner update");
        }

        let strategy = action_to_strategy(action);
        guard.last_event_ts = Some(event.timestamp);
        guard.last_action = Some((action.key.to_string(), strategy));
        guard.updates_since_snapshot += 1;

        let decision_source = match selection.winning_learner.as_str() {
            "coldstart" => DecisionSource::ColdStart,
            "none" => DecisionSource::Fallback,
            _ => DecisionSource::Ensemble,
        };
        let member_votes: Vec<MemberVote> = selection
            .members
            .iter()
            .map(|m| MemberVote {
                learner: m.learner.clone(),
                action_key: m.action_key.clone(),
                score: m.score,
                confidence: m.confidence,
                contribution: m.contribution,
            })
            .collect();
        let total_duration_ms = pipeline_start.elapsed().as_millis() as u64;

        let winning_learner = selection.winning_learner.clone();
        let guardrail_override_name = guardrail_override.map(|s| s.to_string());

        let record = DecisionRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            timestamp: event.timestamp,
            decision_source,
            phase,
            user_state: state.clone(),
            chosen_action: action.key.to_string(),
            strategy,
            winning_learner: winning_learner.clone(),
            ensemble_weights: selection.weights,
            member_votes: member_votes.clone(),
            guardrail_override: guardrail_override_name.clone(),
            reward,
            pipeline_trace: trace,
            total_duration_ms,
        };

        // Decision records are never dropped: a full channel applies
        // back-pressure onto this event rather than losing the record.
        if self.persistence_tx.send(PersistenceJob::Decision(record)).await.is_err() {
            tracing::warn!(user_id, "persistence worker is gone; decision record was not appended");
        }

        if guard.updates_since_snapshot >= self.config.persistence.snapshot_every_n {
            guard.updates_since_snapshot = 0;
            let snapshot = guard.snapshot();
            let version = guard.snapshot_version;
            let payload = serde_json::to_value(&snapshot)
                .map_err(|e| AmasError::StateCorruption(format!("serialising bundle snapshot: {e}")))?;
            let bundle_snapshot = BundleSnapshot {
                user_id: user_id.to_string(),
                payload,
                version,
                updated_at: event.timestamp,
            };
            // Opportunistic checkpoints may be dropped under load: the next
            // one will catch up, and restart only loses unconfirmed progress.
            if self.persistence_tx.try_send(PersistenceJob::Snapshot(bundle_snapshot)).is_err() {
                tracing::warn!(user_id, "persistence queue full; dropped opportunistic snapshot");
            }
        }

        // Checked last: every model update and both writes above have
        // already happened, so a breached deadline never leaves a gap in the
        // decision log or a half-updated bandit.
        if let Some(deadline) = deadline_ms {
            if event.timestamp > deadline {
                return Err(AmasError::Timeout);
            }
        }

        Ok(ProcessEventResult {
            action_key: action.key.to_string(),
            strategy,
            user_state: state,
            guardrail_override: guardrail_override_name.clone(),
            winning_learner: winning_learner.clone(),
            explanation: ExplanationSummary {
                decision_source,
                winning_learner,
                member_votes,
                guardrail_override: guardrail_override_name,
            },
        })
    }

    /// Returns the last action committed for `user_id` without processing a
    /// new event. A user with no processed events yet gets the cold-start
    /// baseline strategy; nothing is mutated.
    pub async fn get_strategy(&self, user_id: &str) -> AmasResult<GetStrategyResult> {
        let bundle = self.get_or_create_bundle(user_id).await?;
        let guard = bundle.lock().await;

        let (action_key, strategy) = match &guard.last_action {
            Some((key, strategy)) => (key.clone(), *strategy),
            None => {
                let probe = guard
                    .cold_start
                    .current_strategy()
                    .unwrap_or_else(|| StrategyParams::for_user_type(UserType::Stable));
                let action = action_space::nearest(
                    probe.new_ratio,
                    probe.interval_scale,
                    probe.difficulty,
                    probe.batch_size,
                    probe.hint_level,
                );
                (action.key.to_string(), probe)
            }
        };

        Ok(GetStrategyResult {
            action_key,
            strategy,
            user_state: guard.state.clone(),
        })
    }

    /// Serialises `user_id`'s full bundle and persists it, returning the same
    /// payload. Unlike the opportunistic per-event checkpoint, this explicit
    /// call always completes the write before returning.
    pub async fn snapshot(&self, user_id: &str) -> AmasResult<serde_json::Value> {
        let bundle = self.get_or_create_bundle(user_id).await?;
        let mut guard = bundle.lock().await;
        let snapshot = guard.snapshot();
        let version = guard.snapshot_version;
        drop(guard);

        let payload = serde_json::to_value(&snapshot)
            .map_err(|e| AmasError::StateCorruption(format!("serialising bundle snapshot: {e}")))?;
        self.persistence
            .snapshots
            .save(BundleSnapshot {
                user_id: user_id.to_string(),
                payload: payload.clone(),
                version,
                updated_at: snapshot.last_event_ts.unwrap_or(0),
            })
            .await?;
        Ok(payload)
    }

    /// Replaces `user_id`'s in-memory bundle (and its persisted snapshot)
    /// with the one encoded in `payload`.
    pub async fn restore(&self, user_id: &str, payload: serde_json::Value) -> AmasResult<()> {
        let parsed: ModelBundleSnapshot = serde_json::from_value(payload.clone())
            .map_err(|e| AmasError::StateCorruption(format!("restore payload for {user_id}: {e}")))?;
        let bundle = ModelBundle::restore(&self.config, parsed)?;
        let arc = Arc::new(Mutex::new(bundle));

        self.persistence
            .snapshots
            .save(BundleSnapshot {
                user_id: user_id.to_string(),
                payload,
                version: 1,
                updated_at: chrono::Utc::now().timestamp_millis(),
            })
            .await?;

        let mut guard = self.bundles.write().await;
        guard.insert(user_id.to_string(), arc);
        Ok(())
    }

    /// Runs the weekly stats/effect aggregation and, if due and enabled,
    /// feeds its mean reward into the background Bayesian optimiser and logs
    /// the next weight suggestion. Intended to be called from a cron-style
    /// background task, never from the event path.
    pub async fn run_background_cycle(&self, now_ms: i64) -> AmasResult<Option<WeeklyAggregate>> {
        let aggregate = {
            let mut stats = self.stats.lock().await;
            stats.maybe_aggregate(self.persistence.decisions.as_ref(), now_ms).await
        };
        let Some(aggregate) = aggregate else {
            return Ok(None);
        };

        if self.config.feature_flags.bayesian_optimizer_enabled {
            let mut optimizer_guard = self.optimizer.lock().await;
            if let Some(optimizer) = optimizer_guard.as_mut() {
                let weights = self.config.reward.weights_for(self.config.reward_profile);
                let params = vec![weights.w_c, weights.w_s, weights.w_f, weights.w_fr, weights.w_e];
                optimizer.record_evaluation(params, aggregate.mean_reward);

                let observations = optimizer.observations();
                let opt_config = self.config.optimizer.clone();
                let suggestion = track_algorithm!(
                    AlgorithmId::Optimizer,
                    self.worker_pool
                        .dispatch(move || {
                            let mut scratch = BayesianOptimizer::new(&opt_config, reward_weight_box());
                            for (p, v) in observations {
                                scratch.record_evaluation(p, v);
                            }
                            scratch.suggest_next()
                        })
                        .await?
                );
                tracing::info!(?suggestion, mean_reward = aggregate.mean_reward, "bayesian optimiser suggestion");
            }
        }

        Ok(Some(aggregate))
    }
}

fn spawn_persistence_worker(persistence: PersistenceHandles, mut rx: mpsc::Receiver<PersistenceJob>) {
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let result = match job {
                PersistenceJob::Snapshot(snapshot) => persistence.snapshots.save(snapshot).await,
                PersistenceJob::Decision(record) => persistence.decisions.append(record).await,
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, "persistence write failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(ts: i64, is_correct: bool, response_time: f64) -> RawEvent {
        RawEvent {
            word_id: "w1".to_string(),
            is_correct,
            response_time,
            dwell_time: 3000.0,
            timestamp: ts,
            pause_count: 0,
            switch_count: 0,
            retry_count: 0,
            focus_loss_duration: 0.0,
            interaction_density: 1.0,
        }
    }

    #[tokio::test]
    async fn process_event_returns_an_action_from_the_catalogue() {
        let engine = AmasEngine::in_memory(AMASConfig::default()).unwrap();
        let result = engine
            .process_event("u1", "s1", event(1_700_000_000_000, true, 2000.0), None)
            .await
            .unwrap();
        assert!(action_space::by_key(&result.action_key).is_some());
    }

    #[tokio::test]
    async fn repeated_events_progress_cold_start_and_eventually_settle() {
        let engine = AmasEngine::in_memory(AMASConfig::default()).unwrap();
        let mut ts = 1_700_000_000_000i64;
        let mut last_state = None;
        for _ in 0..20 {
            let result = engine.process_event("u1", "s1", event(ts, true, 1500.0), None).await.unwrap();
            ts += 60_000;
            last_state = Some(result.user_state);
        }
        assert!(last_state.unwrap().confidence > 0.0);
    }

    #[tokio::test]
    async fn get_strategy_before_any_event_returns_a_baseline_without_mutating_state() {
        let engine = AmasEngine::in_memory(AMASConfig::default()).unwrap();
        let first = engine.get_strategy("new-user").await.unwrap();
        let second = engine.get_strategy("new-user").await.unwrap();
        assert_eq!(first.action_key, second.action_key);
    }

    #[tokio::test]
    async fn get_strategy_after_an_event_reflects_the_last_decision() {
        let engine = AmasEngine::in_memory(AMASConfig::default()).unwrap();
        let processed = engine
            .process_event("u1", "s1", event(1_700_000_000_000, true, 2000.0), None)
            .await
            .unwrap();
        let fetched = engine.get_strategy("u1").await.unwrap();
        assert_eq!(fetched.action_key, processed.action_key);
    }

    #[tokio::test]
    async fn snapshot_then_restore_round_trips_user_state() {
        let engine = AmasEngine::in_memory(AMASConfig::default()).unwrap();
        let mut ts = 1_700_000_000_000i64;
        for _ in 0..5 {
            engine.process_event("u1", "s1", event(ts, true, 1800.0), None).await.unwrap();
            ts += 60_000;
        }
        let payload = engine.snapshot("u1").await.unwrap();

        engine.restore("u2", payload).await.unwrap();
        let original = engine.get_strategy("u1").await.unwrap();
        let restored = engine.get_strategy("u2").await.unwrap();
        assert_eq!(original.action_key, restored.action_key);
        assert_eq!(original.user_state.attention, restored.user_state.attention);
    }

    #[tokio::test]
    async fn deadline_already_passed_is_rejected_but_still_persists_partial_state() {
        let engine = AmasEngine::in_memory(AMASConfig::default()).unwrap();
        let result = engine
            .process_event("u1", "s1", event(2_000_000_000_000, true, 2000.0), Some(1_000_000_000_000))
            .await;
        assert!(matches!(result, Err(AmasError::Timeout)));

        // The breach is reported only after the pipeline ran to completion:
        // the rejected event's timestamp is visible in the committed state.
        let state = engine.get_strategy("u1").await.unwrap();
        assert_eq!(state.user_state.timestamp, 2_000_000_000_000);
    }

    #[tokio::test]
    async fn background_cycle_is_a_noop_before_a_week_elapses() {
        let engine = AmasEngine::in_memory(AMASConfig::default()).unwrap();
        engine.process_event("u1", "s1", event(0, true, 1500.0), None).await.unwrap();
        let first = engine.run_background_cycle(0).await.unwrap();
        assert!(first.is_some());
        let second = engine.run_background_cycle(1000).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn different_users_get_independent_bundles() {
        let engine = AmasEngine::in_memory(AMASConfig::default()).unwrap();
        engine.process_event("alice", "s1", event(0, true, 1500.0), None).await.unwrap();
        engine.process_event("bob", "s1", event(0, false, 6000.0), None).await.unwrap();
        let alice = engine.get_strategy("alice").await.unwrap();
        let bob = engine.get_strategy("bob").await.unwrap();
        assert_ne!(alice.user_state.fatigue, bob.user_state.fatigue);
    }
}
