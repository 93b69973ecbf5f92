//! Safety-override guardrails, applied after the ensemble's pick and before
//! the strategy is snapped back onto the fixed action catalogue.
//!
//! Every override is a strict inequality against the user state — the
//! threshold itself never triggers — and the most restrictive override
//! wins when several apply at once.

use crate::amas::action_space::{self, CatalogueAction, Difficulty};
use crate::amas::config::GuardrailConfig;
use crate::amas::types::{StrategyParams, TrendState, UserState};

pub struct GuardrailEngine {
    config: GuardrailConfig,
    smoothed_interval_scale: Option<f64>,
    smoothed_new_ratio: Option<f64>,
}

impl GuardrailEngine {
    pub fn new(config: GuardrailConfig) -> Self {
        Self { config, smoothed_interval_scale: None, smoothed_new_ratio: None }
    }

    /// Applies every matching safety override to `proposed`, smooths the
    /// continuous fields, then snaps the result onto the nearest catalogue
    /// action (preferring `proposed`'s own nearest action on ties).
    pub fn apply(&mut self, state: &UserState, proposed: StrategyParams) -> (&'static CatalogueAction, Option<&'static str>) {
        let mut target = proposed;
        let mut override_name: Option<&'static str> = None;
        let mut note = |name: &'static str, current: &mut Option<&'static str>| {
            // Most restrictive override wins: once critical-tier fires, a
            // later lower-tier match must not relax it back.
            if current.is_none() {
                *current = Some(name);
            }
        };

        if state.fatigue > self.config.high_fatigue_threshold {
            target.interval_scale = target.interval_scale.max(1.0);
            target.new_ratio = target.new_ratio.min(0.2);
            target.batch_size = target.batch_size.min(8);
            note("high_fatigue", &mut override_name);
        }
        if state.fatigue > self.config.critical_fatigue_threshold {
            target.difficulty = Difficulty::Easy;
            target.hint_level = target.hint_level.max(1);
            target.new_ratio = target.new_ratio.min(0.1);
            target.batch_size = target.batch_size.min(5);
            override_name = Some("critical_fatigue");
        }

        if state.motivation < self.config.low_motivation_threshold {
            target.difficulty = Difficulty::Easy;
            target.hint_level = target.hint_level.max(1);
            target.new_ratio = target.new_ratio.min(0.2);
            note("low_motivation", &mut override_name);
        }
        if state.motivation < self.config.critical_motivation_threshold {
            target.hint_level = 2;
            target.new_ratio = target.new_ratio.min(0.1);
            target.batch_size = target.batch_size.min(5);
            override_name = Some("critical_motivation");
        }

        if state.attention < self.config.min_attention_threshold {
            target.new_ratio = target.new_ratio.min(0.15);
            target.batch_size = target.batch_size.min(6);
            target.hint_level = target.hint_level.max(1);
            note("low_attention", &mut override_name);
        }

        match state.trend {
            TrendState::Declining => {
                target.new_ratio = target.new_ratio.min(0.1);
                target.difficulty = Difficulty::Easy;
                target.interval_scale = target.interval_scale.min(0.7);
                note("trend_declining", &mut override_name);
            }
            TrendState::Stuck => {
                target.new_ratio = target.new_ratio.min(0.15);
                note("trend_stuck", &mut override_name);
            }
            _ => {}
        }

        let smoothed_interval = self.smooth_interval_scale(target.interval_scale);
        let smoothed_ratio = self.smooth_new_ratio(target.new_ratio);
        target.interval_scale = smoothed_interval.clamp(0.3, 1.8);
        target.new_ratio = smoothed_ratio.clamp(0.0, 0.5);

        let preferred = action_space::nearest(
            proposed.new_ratio,
            proposed.interval_scale,
            proposed.difficulty,
            proposed.batch_size,
            proposed.hint_level,
        );
        let snapped = self.map_strategy_to_action(target, preferred);

        (snapped, override_name)
    }

    fn smooth_interval_scale(&mut self, target: f64) -> f64 {
        let tau = self.config.smoothing_tau;
        let next = match self.smoothed_interval_scale {
            Some(prev) => tau * prev + (1.0 - tau) * target,
            None => target,
        };
        self.smoothed_interval_scale = Some(next);
        next
    }

    fn smooth_new_ratio(&mut self, target: f64) -> f64 {
        let tau = self.config.smoothing_tau;
        let next = match self.smoothed_new_ratio {
            Some(prev) => tau * prev + (1.0 - tau) * target,
            None => target,
        };
        self.smoothed_new_ratio = Some(next);
        next
    }

    /// Finds the catalogue entry nearest `target`; ties resolve in favour
    /// of `preferred`.
    fn map_strategy_to_action(&self, target: StrategyParams, preferred: &'static CatalogueAction) -> &'static CatalogueAction {
        let preferred_distance = action_space::distance(
            preferred,
            target.new_ratio,
            target.interval_scale,
            target.difficulty,
            target.batch_size,
            target.hint_level,
        );

        let mut best = preferred;
        let mut best_distance = preferred_distance;
        for action in action_space::ACTION_SPACE.iter() {
            let d = action_space::distance(
                action,
                target.new_ratio,
                target.interval_scale,
                target.difficulty,
                target.batch_size,
                target.hint_level,
            );
            if d < best_distance {
                best_distance = d;
                best = action;
            }
        }
        best
    }

    pub fn reset_smoothing(&mut self) {
        self.smoothed_interval_scale = None;
        self.smoothed_new_ratio = None;
    }
}

impl Default for GuardrailEngine {
    fn default() -> Self {
        Self::new(GuardrailConfig::default())
    }
}
