//! Perception layer: a stateless `(RawEvent, rollingSummary) -> FeatureVector`
//! transform, realised as a bounded per-user rolling window the engine owns
//! as part of the user's `ModelBundle`.

use std::collections::VecDeque;

use chrono::{TimeZone, Utc};

use crate::amas::config::PerceptionConfig;
use crate::amas::modeling::attention::AttentionFeatures;
use crate::amas::types::RawEvent;

/// Windowed, roughly-standardised view of the latest event plus the rolling
/// summary statistics every downstream sub-model and learner reads from.
#[derive(Debug, Clone)]
pub struct FeatureVector {
    pub response_time_z: f64,
    pub pause_count_z: f64,
    pub switch_count_z: f64,
    pub retry_count_z: f64,
    pub focus_loss_z: f64,
    pub interaction_density_z: f64,
    pub dwell_time_z: f64,
    pub recent_error_rate: f64,
    pub recent_response_time_ms: f64,
    /// Windowed coefficient of variation of response time (`std / mean`),
    /// a scale-free read on how erratic pacing has been over the window.
    pub response_time_cv: f64,
    pub hour_of_day: u32,
    pub is_correct: bool,
    pub retry_count: u32,
    pub interaction_density: f64,
    pub dwell_time_ms: f64,
    pub motivation_frustration_signal: f64,
}

impl FeatureVector {
    pub fn attention_features(&self) -> AttentionFeatures {
        AttentionFeatures {
            response_time_z: self.response_time_z,
            pause_count: self.pause_count_z,
            switch_count: self.switch_count_z,
            retry_count: self.retry_count_z,
            focus_loss: self.focus_loss_z,
            interaction_density: self.interaction_density_z,
        }
    }
}

/// Context every learner conditions on besides the continuous user state:
/// recent error rate, recent pace, and a coarse time-of-day bucket.
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext {
    pub recent_error_rate: f64,
    pub recent_response_time_ms: f64,
    pub hour_of_day: u32,
}

impl From<&FeatureVector> for DecisionContext {
    fn from(f: &FeatureVector) -> Self {
        DecisionContext {
            recent_error_rate: f.recent_error_rate,
            recent_response_time_ms: f.recent_response_time_ms,
            hour_of_day: f.hour_of_day,
        }
    }
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 1.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt().max(1e-6))
}

fn zscore(x: f64, mean: f64, std: f64) -> f64 {
    ((x - mean) / std).clamp(-5.0, 5.0)
}

/// `std / mean`, with the mean floored so a window centred near zero
/// doesn't blow this up to an uninformative spike.
fn coefficient_of_variation(mean: f64, std: f64) -> f64 {
    std / mean.abs().max(1e-6)
}

/// One user's rolling perception window. Bounded to
/// [`PerceptionConfig::window_size`] events; the oldest event is dropped as
/// new ones arrive.
pub struct PerceptionState {
    window_size: usize,
    history: VecDeque<RawEvent>,
}

impl PerceptionState {
    pub fn new(config: &PerceptionConfig) -> Self {
        Self {
            window_size: config.window_size.max(1),
            history: VecDeque::with_capacity(config.window_size.max(1)),
        }
    }

    /// Folds `event` into the rolling window and returns the standardised
    /// feature vector the modeling layer consumes for this event.
    pub fn observe(&mut self, event: RawEvent) -> FeatureVector {
        self.history.push_back(event.clone());
        if self.history.len() > self.window_size {
            self.history.pop_front();
        }

        let rt: Vec<f64> = self.history.iter().map(|e| e.response_time).collect();
        let pause: Vec<f64> = self.history.iter().map(|e| e.pause_count as f64).collect();
        let switch: Vec<f64> = self.history.iter().map(|e| e.switch_count as f64).collect();
        let retry: Vec<f64> = self.history.iter().map(|e| e.retry_count as f64).collect();
        let focus: Vec<f64> = self.history.iter().map(|e| e.focus_loss_duration).collect();
        let density: Vec<f64> = self.history.iter().map(|e| e.interaction_density).collect();
        let dwell: Vec<f64> = self.history.iter().map(|e| e.dwell_time).collect();

        let (rt_mean, rt_std) = mean_std(&rt);
        let (pause_mean, pause_std) = mean_std(&pause);
        let (switch_mean, switch_std) = mean_std(&switch);
        let (retry_mean, retry_std) = mean_std(&retry);
        let (focus_mean, focus_std) = mean_std(&focus);
        let (density_mean, density_std) = mean_std(&density);
        let (dwell_mean, dwell_std) = mean_std(&dwell);

        let error_count = self.history.iter().filter(|e| !e.is_correct).count();
        let recent_error_rate = error_count as f64 / self.history.len() as f64;
        let recent_response_time_ms = rt_mean;

        let hour_of_day = Utc
            .timestamp_millis_opt(event.timestamp)
            .single()
            .map(|dt| dt.format("%H").to_string().parse::<u32>().unwrap_or(0))
            .unwrap_or(0);

        FeatureVector {
            response_time_z: zscore(event.response_time, rt_mean, rt_std),
            pause_count_z: zscore(event.pause_count as f64, pause_mean, pause_std),
            switch_count_z: zscore(event.switch_count as f64, switch_mean, switch_std),
            retry_count_z: zscore(event.retry_count as f64, retry_mean, retry_std),
            focus_loss_z: zscore(event.focus_loss_duration, focus_mean, focus_std),
            interaction_density_z: zscore(event.interaction_density, density_mean, density_std),
            dwell_time_z: zscore(event.dwell_time, dwell_mean, dwell_std),
            recent_error_rate,
            recent_response_time_ms,
            response_time_cv: coefficient_of_variation(rt_mean, rt_std),
            hour_of_day,
            is_correct: event.is_correct,
            retry_count: event.retry_count,
            interaction_density: event.interaction_density,
            dwell_time_ms: event.dwell_time,
            motivation_frustration_signal: recent_error_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(response_time: f64, is_correct: bool) -> RawEvent {
        RawEvent {
            word_id: "w1".to_string(),
            is_correct,
            response_time,
            dwell_time: 3000.0,
            timestamp: 1_700_000_000_000,
            pause_count: 0,
            switch_count: 0,
            retry_count: 0,
            focus_loss_duration: 0.0,
            interaction_density: 1.0,
        }
    }

    #[test]
    fn window_is_bounded() {
        let mut state = PerceptionState::new(&PerceptionConfig { window_size: 5 });
        for _ in 0..20 {
            state.observe(event(1000.0, true));
        }
        assert_eq!(state.len(), 5);
    }

    #[test]
    fn error_rate_reflects_window_contents() {
        let mut state = PerceptionState::new(&PerceptionConfig { window_size: 10 });
        for _ in 0..4 {
            state.observe(event(1000.0, true));
        }
        let f = state.observe(event(1000.0, false));
        assert!((f.recent_error_rate - 0.2).abs() < 1e-9);
    }

    #[test]
    fn first_event_has_zero_zscore() {
        let mut state = PerceptionState::new(&PerceptionConfig { window_size: 10 });
        let f = state.observe(event(1234.0, true));
        assert_eq!(f.response_time_z, 0.0);
    }

    #[test]
    fn response_time_cv_is_zero_for_a_constant_window() {
        let mut state = PerceptionState::new(&PerceptionConfig { window_size: 10 });
        let mut f = state.observe(event(1000.0, true));
        for _ in 0..5 {
            f = state.observe(event(1000.0, true));
        }
        assert!(f.response_time_cv.abs() < 1e-6);
    }

    #[test]
    fn response_time_cv_rises_with_erratic_pacing() {
        let mut steady = PerceptionState::new(&PerceptionConfig { window_size: 10 });
        let mut steady_f = steady.observe(event(1000.0, true));
        for _ in 0..5 {
            steady_f = steady.observe(event(1000.0, true));
        }

        let mut erratic = PerceptionState::new(&PerceptionConfig { window_size: 10 });
        let mut erratic_f = erratic.observe(event(200.0, true));
        for rt in [2000.0, 300.0, 1800.0, 250.0, 1900.0] {
            erratic_f = erratic.observe(event(rt, true));
        }

        assert!(erratic_f.response_time_cv > steady_f.response_time_cv);
    }
}
