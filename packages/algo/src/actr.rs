//! ACT-R inspired memory-activation model.
//!
//! Activation accumulates a declarative memory trace's strength from its
//! review history; recall probability is the logistic transform of
//! activation relative to a threshold.

use crate::types::{ACTRState, ActivationResult, MemoryTrace};

/// Stateless ACT-R computations, parameterised by a per-user [`ACTRState`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ACTRMemory;

impl ACTRMemory {
    pub fn new() -> Self {
        Self
    }

    /// Base-level activation: `B = ln(sum_j (t_j)^-d)` over past reviews,
    /// each weighted down (to zero, never negative) when it was an error.
    pub fn activation(&self, traces: &[MemoryTrace], state: &ACTRState) -> f64 {
        if traces.is_empty() {
            return f64::NEG_INFINITY;
        }
        let sum: f64 = traces
            .iter()
            .filter(|t| t.delta_t > 0.0)
            .map(|t| {
                let weight = if t.is_correct { 1.0 } else { 0.3 };
                weight * t.delta_t.powf(-state.decay)
            })
            .sum();
        if sum <= 0.0 {
            f64::NEG_INFINITY
        } else {
            sum.ln()
        }
    }

    /// Recall probability: logistic transform of activation around threshold tau,
    /// scaled by noise s. Returns 0.0 for unbounded-negative activation.
    pub fn recall_probability(&self, activation: f64, state: &ACTRState) -> f64 {
        if !activation.is_finite() {
            return 0.0;
        }
        let z = (activation - state.threshold) / state.noise_scale.max(1e-6);
        1.0 / (1.0 + (-z).exp())
    }

    /// Full activation + recall-probability computation for one memory trace set.
    pub fn compute(&self, traces: &[MemoryTrace], state: &ACTRState) -> ActivationResult {
        let activation = self.activation(traces, state);
        let recall_probability = self.recall_probability(activation, state);
        let confidence = (traces.len() as f64 / (traces.len() as f64 + 5.0)).clamp(0.0, 1.0);
        ActivationResult {
            activation,
            recall_probability,
            confidence,
        }
    }

    /// Interval (seconds) at which recall probability decays to `target`,
    /// inverting the logistic/power-law relation. Used by the modeling layer
    /// to space reviews without driving fatigue up.
    pub fn interval_for_target_recall(
        &self,
        traces: &[MemoryTrace],
        state: &ACTRState,
        target: f64,
    ) -> f64 {
        let target = target.clamp(1e-3, 1.0 - 1e-3);
        let target_activation = state.threshold - state.noise_scale * (1.0 / target - 1.0).ln();

        let sum_correct: f64 = traces
            .iter()
            .filter(|t| t.is_correct && t.delta_t > 0.0)
            .map(|t| t.delta_t.powf(-state.decay))
            .sum();
        if sum_correct <= 0.0 || !target_activation.is_finite() {
            return 86_400.0;
        }
        let numerator = sum_correct / target_activation.exp();
        numerator.max(1e-6).powf(-1.0 / state.decay).clamp(60.0, 30.0 * 86_400.0)
    }
}
