//! Engine configuration: all tunable constants in one place, with an
//! `AMAS_*` environment-variable overlay read once at startup.

use serde::{Deserialize, Serialize};

/// Rolling-window normalisation statistics for one perception feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationStat {
    pub mean: f64,
    pub variance: f64,
    pub count: u64,
}

impl Default for NormalizationStat {
    fn default() -> Self {
        Self {
            mean: 0.0,
            variance: 1.0,
            count: 0,
        }
    }
}

impl NormalizationStat {
    /// Welford's online update.
    pub fn update(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = x - self.mean;
        self.variance += (delta * delta2 - self.variance) / self.count as f64;
    }

    pub fn z_score(&self, x: f64) -> f64 {
        let std = self.variance.max(1e-6).sqrt();
        (x - self.mean) / std
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerceptionConfig {
    /// Number of recent events kept per user for rolling normalisation.
    pub window_size: usize,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self { window_size: 10 }
    }
}

/// Weights applied to the perception feature vector before the attention
/// logistic, `A <- sigmoid(-w.f)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttentionWeights {
    pub response_time_z: f64,
    pub pause_count: f64,
    pub switch_count: f64,
    pub retry_count: f64,
    pub focus_loss: f64,
    pub interaction_density: f64,
}

impl Default for AttentionWeights {
    fn default() -> Self {
        Self {
            response_time_z: 0.30,
            pause_count: 0.20,
            switch_count: 0.20,
            retry_count: 0.15,
            focus_loss: 0.25,
            interaction_density: -0.10,
        }
    }
}

/// Fatigue accumulation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FatigueParams {
    pub beta: f64,
    pub gamma: f64,
    pub delta: f64,
    pub k: f64,
    pub long_break_threshold_minutes: f64,
}

impl Default for FatigueParams {
    fn default() -> Self {
        Self {
            beta: 0.3,
            gamma: 0.3,
            delta: 0.2,
            k: 0.05,
            long_break_threshold_minutes: 30.0,
        }
    }
}

/// Motivation tracking parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotivationParams {
    pub rho: f64,
    pub kappa: f64,
    pub lambda: f64,
    pub mu: f64,
}

impl Default for MotivationParams {
    fn default() -> Self {
        Self {
            rho: 0.9,
            kappa: 0.1,
            lambda: 0.15,
            mu: 0.2,
        }
    }
}

/// Cognitive profiler parameters: a fast EMA and a slow EMA blended by
/// `k0 / (k0 + n)`, so early updates lean on the fast timescale and settled
/// users lean on the slow one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CognitiveParams {
    pub beta_slow: f64,
    pub beta_fast: f64,
    pub k0: f64,
}

impl Default for CognitiveParams {
    fn default() -> Self {
        Self {
            beta_slow: 0.98,
            beta_fast: 0.7,
            k0: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendParams {
    pub window_size: usize,
    pub up_threshold: f64,
    pub down_threshold: f64,
    pub stuck_variance_threshold: f64,
}

impl Default for TrendParams {
    fn default() -> Self {
        Self {
            window_size: 30,
            up_threshold: 0.05,
            down_threshold: -0.05,
            stuck_variance_threshold: 0.01,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColdStartConfig {
    pub early_stop_threshold: f64,
    pub min_probes_per_type: u8,
    pub max_events: u8,
}

impl Default for ColdStartConfig {
    fn default() -> Self {
        Self {
            early_stop_threshold: 0.85,
            min_probes_per_type: 2,
            max_events: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanditConfig {
    pub context_dim: usize,
    pub action_count: usize,
    pub lambda: f64,
    pub alpha: f64,
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            context_dim: amas_algo::FEATURE_DIMENSION,
            action_count: crate::amas::action_space::ACTION_SPACE.len(),
            lambda: 1.0,
            alpha: 1.0,
        }
    }
}

/// One of three named weight profiles for the reward formula, switched per
/// user study-mode preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardProfile {
    Standard,
    Cram,
    Relaxed,
}

impl Default for RewardProfile {
    fn default() -> Self {
        RewardProfile::Standard
    }
}

/// Weights for the five-term reward: correctness, speed, fatigue penalty,
/// frustration penalty, engagement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardWeights {
    pub w_c: f64,
    pub w_s: f64,
    pub w_f: f64,
    pub w_fr: f64,
    pub w_e: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardConfig {
    pub reference_response_time_ms: f64,
    pub standard: RewardWeights,
    pub cram: RewardWeights,
    pub relaxed: RewardWeights,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            reference_response_time_ms: 5000.0,
            standard: RewardWeights {
                w_c: 0.45,
                w_s: 0.15,
                w_f: 0.15,
                w_fr: 0.15,
                w_e: 0.10,
            },
            cram: RewardWeights {
                w_c: 0.55,
                w_s: 0.20,
                w_f: 0.05,
                w_fr: 0.10,
                w_e: 0.10,
            },
            relaxed: RewardWeights {
                w_c: 0.35,
                w_s: 0.05,
                w_f: 0.25,
                w_fr: 0.20,
                w_e: 0.15,
            },
        }
    }
}

impl RewardConfig {
    pub fn weights_for(&self, profile: RewardProfile) -> &RewardWeights {
        match profile {
            RewardProfile::Standard => &self.standard,
            RewardProfile::Cram => &self.cram,
            RewardProfile::Relaxed => &self.relaxed,
        }
    }
}

/// Per-learner enable switches, independent of the ensemble's adaptive
/// weighting so any learner can be disabled (e.g. during an incident)
/// without touching the weight-adaptation logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub thompson_enabled: bool,
    pub linucb_enabled: bool,
    pub actr_enabled: bool,
    pub heuristic_enabled: bool,
    pub ensemble_weight_adaptation_enabled: bool,
    pub bayesian_optimizer_enabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            thompson_enabled: true,
            linucb_enabled: true,
            actr_enabled: true,
            heuristic_enabled: true,
            ensemble_weight_adaptation_enabled: true,
            bayesian_optimizer_enabled: false,
        }
    }
}

/// Guardrail thresholds applied after ensemble selection, all strict
/// `>`/`<` comparisons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailConfig {
    pub high_fatigue_threshold: f64,
    pub critical_fatigue_threshold: f64,
    pub low_motivation_threshold: f64,
    pub critical_motivation_threshold: f64,
    pub min_attention_threshold: f64,
    /// EMA smoothing constant applied to continuous strategy params before
    /// the nearest-neighbour action-space snap.
    pub smoothing_tau: f64,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            high_fatigue_threshold: 0.6,
            critical_fatigue_threshold: 0.8,
            low_motivation_threshold: -0.3,
            critical_motivation_threshold: -0.5,
            min_attention_threshold: 0.3,
            smoothing_tau: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// EMA rate for adaptive weight updates.
    pub adaptation_rate: f64,
    /// Per-step clamp on how far a single update may move a weight.
    pub max_step: f64,
    pub softmax_temperature: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            adaptation_rate: 0.1,
            max_step: 0.05,
            softmax_temperature: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    pub max_threads: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
                .min(8),
        }
    }
}

/// Opportunistic-snapshot cadence: the orchestrator persists a user's full
/// bundle every `snapshot_every_n` processed events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub snapshot_every_n: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self { snapshot_every_n: 25 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub enabled: bool,
    /// Cron schedule the background optimiser loop runs on.
    pub schedule: String,
    pub length_scale: f64,
    pub signal_variance: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            schedule: "0 0 3 * * *".to_string(),
            length_scale: 1.0,
            signal_variance: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AMASConfig {
    pub perception: PerceptionConfig,
    pub attention_weights: AttentionWeights,
    pub fatigue: FatigueParams,
    pub motivation: MotivationParams,
    pub cognitive: CognitiveParams,
    pub trend: TrendParams,
    pub cold_start: ColdStartConfig,
    pub bandit: BanditConfig,
    pub reward: RewardConfig,
    pub reward_profile: RewardProfile,
    pub feature_flags: FeatureFlags,
    pub guardrail: GuardrailConfig,
    pub ensemble: EnsembleConfig,
    pub worker_pool: WorkerPoolConfig,
    pub optimizer: OptimizerConfig,
    pub persistence: PersistenceConfig,
}

impl AMASConfig {
    /// Overlays `AMAS_*` environment variables onto the defaults. Unset
    /// variables leave the default untouched; malformed ones are ignored
    /// with a warning rather than rejected, since config is not on any
    /// user's hot path.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_bool("AMAS_THOMPSON_ENABLED") {
            config.feature_flags.thompson_enabled = v;
        }
        if let Some(v) = env_bool("AMAS_LINUCB_ENABLED") {
            config.feature_flags.linucb_enabled = v;
        }
        if let Some(v) = env_bool("AMAS_ACTR_ENABLED") {
            config.feature_flags.actr_enabled = v;
        }
        if let Some(v) = env_bool("AMAS_HEURISTIC_ENABLED") {
            config.feature_flags.heuristic_enabled = v;
        }
        if let Some(v) = env_bool("AMAS_ENSEMBLE_WEIGHT_ADAPTATION_ENABLED") {
            config.feature_flags.ensemble_weight_adaptation_enabled = v;
        }
        if let Some(v) = env_bool("AMAS_ENABLE_BAYESIAN_OPTIMIZER") {
            config.feature_flags.bayesian_optimizer_enabled = v;
            config.optimizer.enabled = v;
        }
        if let Some(v) = env_f64("AMAS_LINUCB_ALPHA") {
            config.bandit.alpha = v;
        }
        if let Some(v) = env_f64("AMAS_LINUCB_LAMBDA") {
            config.bandit.lambda = v;
        }
        if let Some(v) = env_usize("AMAS_WORKER_POOL_MAX_THREADS") {
            config.worker_pool.max_threads = v;
        }
        if let Ok(v) = std::env::var("AMAS_OPTIMIZER_SCHEDULE") {
            config.optimizer.schedule = v;
        }
        if let Ok(v) = std::env::var("AMAS_REWARD_PROFILE") {
            config.reward_profile = match v.as_str() {
                "cram" => RewardProfile::Cram,
                "relaxed" => RewardProfile::Relaxed,
                _ => RewardProfile::Standard,
            };
        }

        config
    }

    /// Boot-time invariant check. Returning an error here is the one place
    /// `AmasError::ConfigViolation` is allowed to propagate to `main()`.
    pub fn validate(&self) -> Result<(), crate::error::AmasError> {
        if self.bandit.context_dim != amas_algo::FEATURE_DIMENSION {
            return Err(crate::error::AmasError::ConfigViolation(format!(
                "bandit.context_dim must equal {}, got {}",
                amas_algo::FEATURE_DIMENSION,
                self.bandit.context_dim
            )));
        }
        if self.worker_pool.max_threads == 0 {
            return Err(crate::error::AmasError::ConfigViolation(
                "worker_pool.max_threads must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().and_then(|v| match v.trim() {
        "1" | "true" | "TRUE" | "yes" => Some(true),
        "0" | "false" | "FALSE" | "no" => Some(false),
        _ => None,
    })
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(AMASConfig::default().validate().is_ok());
    }

    #[test]
    fn mismatched_context_dim_fails_validation() {
        let mut config = AMASConfig::default();
        config.bandit.context_dim = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn normalization_stat_tracks_mean() {
        let mut stat = NormalizationStat::default();
        for x in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stat.update(x);
        }
        assert!((stat.mean - 3.0).abs() < 1e-9);
    }

    #[test]
    fn reward_config_selects_profile_weights() {
        let config = RewardConfig::default();
        let cram = config.weights_for(RewardProfile::Cram);
        assert!(cram.w_c > config.standard.w_c);
    }
}
