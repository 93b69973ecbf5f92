//! Cognitive profiler: dual-timescale EMA over `{mem, speed}`, fused by a
//! `k0 / (k0 + n)` weight so early events lean on the fast EMA and a settled
//! user leans on the slow one.

use crate::amas::config::CognitiveParams;
use crate::amas::types::CognitiveProfile;

/// Per-event correctness and response-time signal the profiler folds in.
#[derive(Debug, Clone, Default)]
pub struct CognitiveInput {
    pub is_correct: bool,
    /// Response-time z-score against the user's rolling baseline; negative
    /// means faster than usual.
    pub response_time_z: f64,
}

pub struct CognitiveProfiler {
    params: CognitiveParams,
    profile: CognitiveProfile,
    long_term: CognitiveProfile,
    short_term: CognitiveProfile,
    update_count: u64,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl CognitiveProfiler {
    pub fn new(params: CognitiveParams) -> Self {
        Self {
            params,
            profile: CognitiveProfile::default(),
            long_term: CognitiveProfile::default(),
            short_term: CognitiveProfile::default(),
            update_count: 0,
        }
    }

    pub fn update(&mut self, input: CognitiveInput) -> CognitiveProfile {
        let mem_sample = if input.is_correct { 1.0 } else { 0.0 };
        // Faster-than-baseline (negative z) raises the speed sample.
        let speed_sample = sigmoid(-input.response_time_z);

        self.long_term.memory =
            self.params.beta_slow * self.long_term.memory + (1.0 - self.params.beta_slow) * mem_sample;
        self.long_term.speed =
            self.params.beta_slow * self.long_term.speed + (1.0 - self.params.beta_slow) * speed_sample;

        self.short_term.memory =
            self.params.beta_fast * self.short_term.memory + (1.0 - self.params.beta_fast) * mem_sample;
        self.short_term.speed =
            self.params.beta_fast * self.short_term.speed + (1.0 - self.params.beta_fast) * speed_sample;

        self.update_count += 1;
        let fast_weight = self.params.k0 / (self.params.k0 + self.update_count as f64);

        self.profile.memory =
            (fast_weight * self.short_term.memory + (1.0 - fast_weight) * self.long_term.memory).clamp(0.0, 1.0);
        self.profile.speed =
            (fast_weight * self.short_term.speed + (1.0 - fast_weight) * self.long_term.speed).clamp(0.0, 1.0);

        self.profile
    }

    pub fn current(&self) -> &CognitiveProfile {
        &self.profile
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    pub fn reset(&mut self) {
        self.profile = CognitiveProfile::default();
        self.long_term = CognitiveProfile::default();
        self.short_term = CognitiveProfile::default();
        self.update_count = 0;
    }

    /// Restores a persisted profile. Both EMA timescales are seeded at the
    /// restored value so the next update blends forward from there rather
    /// than reverting toward the `0.5` prior.
    pub fn restore(&mut self, profile: CognitiveProfile, update_count: u64) {
        self.profile = profile;
        self.long_term = profile;
        self.short_term = profile;
        self.update_count = update_count;
    }
}

impl Default for CognitiveProfiler {
    fn default() -> Self {
        Self::new(CognitiveParams::default())
    }
}
