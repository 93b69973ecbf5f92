//! Fatigue sub-model: `F <- clamp(F + beta*load - gamma*rest - delta*longBreak, 0, 1)`.

use crate::amas::config::FatigueParams;

#[derive(Debug, Clone, Default)]
pub struct FatigueFeatures {
    pub error_rate_trend: f64,
    pub rt_increase_rate: f64,
    pub repeat_errors: i32,
    /// Minutes since the previous event, when known.
    pub break_minutes: Option<f64>,
}

pub struct FatigueEstimator {
    params: FatigueParams,
    current_value: f64,
    last_update_ts: i64,
}

impl FatigueEstimator {
    pub fn new(params: FatigueParams) -> Self {
        Self {
            params,
            current_value: 0.0,
            last_update_ts: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn update(&mut self, features: FatigueFeatures) -> f64 {
        let break_minutes = features.break_minutes.unwrap_or(0.0);

        if break_minutes >= self.params.long_break_threshold_minutes {
            self.current_value = 0.0;
            self.last_update_ts = chrono::Utc::now().timestamp_millis();
            return self.current_value;
        }

        let repeat_component = (features.repeat_errors as f64 / 5.0).min(1.0);
        let load = (features.error_rate_trend.max(0.0)
            + features.rt_increase_rate.max(0.0)
            + repeat_component
            + self.params.k * break_minutes.max(0.0))
        .min(1.0);

        let rest = (break_minutes / self.params.long_break_threshold_minutes).clamp(0.0, 1.0);
        let long_break = if break_minutes > 0.0 { break_minutes / self.params.long_break_threshold_minutes } else { 0.0 }.min(1.0);

        let next = self.current_value + self.params.beta * load
            - self.params.gamma * rest
            - self.params.delta * long_break;
        self.current_value = next.clamp(0.0, 1.0);
        self.last_update_ts = chrono::Utc::now().timestamp_millis();

        self.current_value
    }

    pub fn current(&self) -> f64 {
        self.current_value
    }

    pub fn reset(&mut self) {
        self.current_value = 0.0;
        self.last_update_ts = chrono::Utc::now().timestamp_millis();
    }

    pub fn set_value(&mut self, value: f64) {
        self.current_value = value.clamp(0.0, 1.0);
    }

    pub fn apply_time_decay(&mut self, elapsed_minutes: f64) {
        let decay_factor = (-self.params.k * elapsed_minutes / 10.0).exp();
        self.current_value *= decay_factor;
    }
}

impl Default for FatigueEstimator {
    fn default() -> Self {
        Self::new(FatigueParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sustained_load_raises_fatigue() {
        let mut estimator = FatigueEstimator::default();
        for _ in 0..10 {
            estimator.update(FatigueFeatures {
                error_rate_trend: 0.5,
                rt_increase_rate: 0.5,
                repeat_errors: 3,
                break_minutes: None,
            });
        }
        assert!(estimator.current() > 0.5);
    }

    #[test]
    fn long_break_resets_to_zero() {
        let mut estimator = FatigueEstimator::default();
        estimator.set_value(0.9);
        estimator.update(FatigueFeatures {
            break_minutes: Some(45.0),
            ..Default::default()
        });
        assert_eq!(estimator.current(), 0.0);
    }

    #[test]
    fn short_break_provides_partial_rest() {
        let mut estimator = FatigueEstimator::default();
        estimator.set_value(0.5);
        let rested = estimator.update(FatigueFeatures {
            break_minutes: Some(10.0),
            ..Default::default()
        });
        assert!(rested < 0.5);
    }

    #[test]
    fn value_never_leaves_unit_interval() {
        let mut estimator = FatigueEstimator::default();
        for _ in 0..100 {
            let v = estimator.update(FatigueFeatures {
                error_rate_trend: 1.0,
                rt_increase_rate: 1.0,
                repeat_errors: 10,
                break_minutes: None,
            });
            assert!((0.0..=1.0).contains(&v));
        }
    }
}
