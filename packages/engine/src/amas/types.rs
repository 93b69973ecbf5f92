//! Core data model: per-user state, raw perception input, and the records
//! written to the decision log.
//!
//! Everything here is plain data — no behaviour beyond `Default` and small
//! constructors. The algorithms that produce and consume these types live in
//! `modeling/`, `decision/`, and `guardrails.rs`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::amas::action_space::Difficulty;

/// Coarse trend classification derived from a rolling window of performance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendState {
    Improving,
    Stable,
    Declining,
    Stuck,
}

impl Default for TrendState {
    fn default() -> Self {
        TrendState::Stable
    }
}

/// Cold-start classification outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Fast,
    Stable,
    Cautious,
}

/// Cold-start phase machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColdStartPhase {
    Classify,
    Explore,
    Normal,
}

impl Default for ColdStartPhase {
    fn default() -> Self {
        ColdStartPhase::Classify
    }
}

/// The continuous user-state vector the modeling layer maintains and every
/// learner reads from. `attention`/`fatigue` are in `[0, 1]`, `motivation`
/// ranges `[-1, 1]`, `cognitive` holds the two cognitive-profile scalars.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserState {
    /// Attention, in [0, 1]; higher is more attentive.
    pub attention: f64,
    /// Fatigue, in [0, 1]; higher is more fatigued.
    pub fatigue: f64,
    /// Cognitive profile: (memory retention, processing speed).
    pub cognitive: CognitiveProfile,
    /// Motivation, in [-1, 1].
    pub motivation: f64,
    pub trend: TrendState,
    /// Cold-start confidence in the current user-type classification,
    /// in [0, 1]; 1.0 once a user has exited cold-start.
    pub confidence: f64,
    pub timestamp: i64,
}

impl Default for UserState {
    fn default() -> Self {
        Self {
            attention: 0.7,
            fatigue: 0.0,
            cognitive: CognitiveProfile::default(),
            motivation: 0.0,
            trend: TrendState::default(),
            confidence: 0.0,
            timestamp: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CognitiveProfile {
    /// Memory retention strength, in [0, 1].
    pub memory: f64,
    /// Processing speed, in [0, 1]; higher is faster.
    pub speed: f64,
}

impl Default for CognitiveProfile {
    fn default() -> Self {
        Self {
            memory: 0.5,
            speed: 0.5,
        }
    }
}

/// A single perception-layer input event. Field set is intentionally
/// narrow: interaction telemetry only, no device/content metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawEvent {
    pub word_id: String,
    pub is_correct: bool,
    /// Response time in milliseconds.
    pub response_time: f64,
    /// Dwell time on the item before answering, in milliseconds.
    pub dwell_time: f64,
    pub timestamp: i64,
    pub pause_count: u32,
    pub switch_count: u32,
    pub retry_count: u32,
    /// Cumulative time the window lost focus during this item, in ms.
    pub focus_loss_duration: f64,
    /// Keystrokes/pointer-moves per second while the item was active.
    pub interaction_density: f64,
}

/// One fixed cold-start probe result.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProbeResult {
    pub probe_index: u8,
    pub reward: f64,
    pub recent_error_rate: f64,
    /// `0.6*reward + 0.4*(1-recentErrorRate)`, thresholded at 0.5.
    pub correctness_signal: f64,
}

/// Cold-start manager state, one per user.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColdStartState {
    pub phase: ColdStartPhase,
    pub probe_index: u8,
    /// Bounded to the most recent 20 results.
    pub results: Vec<ProbeResult>,
    pub user_type: Option<UserType>,
    /// Posterior P(type | results) over {fast, stable, cautious}, cached so
    /// the engine needn't recompute it every request once classification is
    /// settled.
    pub posterior: [f64; 3],
    /// Events folded in since cold-start began, across all three phases.
    pub update_count: u64,
}

impl Default for ColdStartState {
    fn default() -> Self {
        Self {
            phase: ColdStartPhase::default(),
            probe_index: 0,
            results: Vec::new(),
            user_type: None,
            posterior: [1.0 / 3.0; 3],
            update_count: 0,
        }
    }
}

pub const COLD_START_MAX_RESULTS: usize = 20;

impl ColdStartState {
    pub fn push_result(&mut self, result: ProbeResult) {
        self.results.push(result);
        if self.results.len() > COLD_START_MAX_RESULTS {
            let overflow = self.results.len() - COLD_START_MAX_RESULTS;
            self.results.drain(0..overflow);
        }
    }
}

/// A continuous strategy, the output of the ensemble voter before the
/// guardrail mapper snaps it onto [`crate::amas::action_space::ACTION_SPACE`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct StrategyParams {
    pub new_ratio: f64,
    pub interval_scale: f64,
    pub difficulty: Difficulty,
    pub batch_size: u32,
    pub hint_level: u8,
}

impl StrategyParams {
    /// Fixed seed strategy handed to a user during the named cold-start
    /// probe, per the three-probe design: baseline, ceiling, support.
    pub fn probe(index: u8) -> Self {
        match index {
            0 => StrategyParams {
                new_ratio: 0.05,
                interval_scale: 1.0,
                difficulty: Difficulty::Mid,
                batch_size: 8,
                hint_level: 0,
            },
            1 => StrategyParams {
                new_ratio: 0.35,
                interval_scale: 1.0,
                difficulty: Difficulty::Hard,
                batch_size: 10,
                hint_level: 0,
            },
            _ => StrategyParams {
                new_ratio: 0.15,
                interval_scale: 1.0,
                difficulty: Difficulty::Easy,
                batch_size: 6,
                hint_level: 2,
            },
        }
    }

    /// Settled strategy handed to a classified user type once cold-start
    /// exits into the Normal phase, before any bandit has accumulated data.
    pub fn for_user_type(user_type: UserType) -> Self {
        match user_type {
            UserType::Fast => StrategyParams {
                new_ratio: 0.35,
                interval_scale: 1.2,
                difficulty: Difficulty::Hard,
                batch_size: 12,
                hint_level: 0,
            },
            UserType::Stable => StrategyParams {
                new_ratio: 0.25,
                interval_scale: 1.0,
                difficulty: Difficulty::Mid,
                batch_size: 10,
                hint_level: 0,
            },
            UserType::Cautious => StrategyParams {
                new_ratio: 0.15,
                interval_scale: 0.8,
                difficulty: Difficulty::Easy,
                batch_size: 6,
                hint_level: 1,
            },
        }
    }
}

/// Per-learner adaptive mixing weights, kept normalised and floored.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct EnsembleWeights {
    pub thompson: f64,
    pub linucb: f64,
    pub actr: f64,
    pub heuristic: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            thompson: 0.25,
            linucb: 0.40,
            actr: 0.15,
            heuristic: 0.20,
        }
    }
}

impl EnsembleWeights {
    pub const FLOOR: f64 = 0.05;

    /// Renormalises after an EMA nudge, re-applying the floor so no learner
    /// is ever starved to zero influence.
    pub fn renormalise(mut self) -> Self {
        self.thompson = self.thompson.max(Self::FLOOR);
        self.linucb = self.linucb.max(Self::FLOOR);
        self.actr = self.actr.max(Self::FLOOR);
        self.heuristic = self.heuristic.max(Self::FLOOR);
        let sum = self.thompson + self.linucb + self.actr + self.heuristic;
        if sum > 0.0 {
            self.thompson /= sum;
            self.linucb /= sum;
            self.actr /= sum;
            self.heuristic /= sum;
        }
        self
    }
}

/// The reward signal computed after an action plays out, fed back to every
/// learner and to the ensemble's weight adaptation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Reward {
    pub value: f64,
    pub correctness_term: f64,
    pub speed_term: f64,
    pub fatigue_penalty: f64,
    pub frustration_penalty: f64,
    pub engagement_term: f64,
}

/// Which layer of the decision pipeline produced the selected action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    ColdStart,
    Ensemble,
    Fallback,
}

/// One enabled learner's vote on a single decision, kept for the pipeline
/// trace and replay/audit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemberVote {
    pub learner: String,
    pub action_key: String,
    pub score: f64,
    pub confidence: f64,
    pub contribution: f64,
}

/// One stage of a single event's trip through the pipeline, timed
/// independently so a slow stage is identifiable after the fact.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineStageTrace {
    pub stage: String,
    pub node_id: String,
    pub start_ms: u64,
    pub duration_ms: u64,
    pub input_summary: String,
    pub output_summary: String,
    pub metadata: serde_json::Value,
}

/// One full decision, persisted to the decision log for audit/replay.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: Uuid,
    pub user_id: String,
    pub session_id: String,
    pub timestamp: i64,
    pub decision_source: DecisionSource,
    pub phase: ColdStartPhase,
    pub user_state: UserState,
    pub chosen_action: String,
    pub strategy: StrategyParams,
    pub winning_learner: String,
    pub ensemble_weights: EnsembleWeights,
    pub member_votes: Vec<MemberVote>,
    pub guardrail_override: Option<String>,
    pub reward: Option<Reward>,
    pub pipeline_trace: Vec<PipelineStageTrace>,
    pub total_duration_ms: u64,
}

/// The explanation handed back alongside a decision: why this action was
/// picked, condensed from the same trace that is persisted to the decision
/// log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExplanationSummary {
    pub decision_source: DecisionSource,
    pub winning_learner: String,
    pub member_votes: Vec<MemberVote>,
    pub guardrail_override: Option<String>,
}
