use crate::amas::config::TrendParams;
use crate::amas::types::TrendState;
use std::collections::VecDeque;

/// Classifies a rolling window of a composite performance signal (a blend of
/// attention, (1 - fatigue) and motivation the caller derives per event)
/// into a coarse trend via least-squares slope and variance.
pub struct TrendAnalyzer {
    params: TrendParams,
    history: VecDeque<f64>,
    current_trend: TrendState,
}

impl TrendAnalyzer {
    pub fn new(params: TrendParams) -> Self {
        Self {
            params,
            history: VecDeque::with_capacity(100),
            current_trend: TrendState::Stable,
        }
    }

    pub fn update(&mut self, performance_signal: f64) -> TrendState {
        self.history.push_back(performance_signal);

        if self.history.len() > self.params.window_size {
            self.history.pop_front();
        }

        if self.history.len() < 5 {
            self.current_trend = TrendState::Stable;
            return self.current_trend;
        }

        let slope = self.compute_slope();
        let variance = self.compute_variance();

        self.current_trend = if slope > self.params.up_threshold {
            TrendState::Improving
        } else if slope < self.params.down_threshold {
            TrendState::Declining
        } else if variance < self.params.stuck_variance_threshold && slope.abs() < 0.01 {
            TrendState::Stuck
        } else {
            TrendState::Stable
        };

        self.current_trend
    }

    pub fn current(&self) -> TrendState {
        self.current_trend
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.current_trend = TrendState::Stable;
    }

    fn compute_slope(&self) -> f64 {
        if self.history.len() < 2 {
            return 0.0;
        }

        let n = self.history.len() as f64;
        let sum_x: f64 = (0..self.history.len()).map(|i| i as f64).sum();
        let sum_y: f64 = self.history.iter().sum();
        let sum_xy: f64 = self
            .history
            .iter()
            .enumerate()
            .map(|(i, y)| i as f64 * y)
            .sum();
        let sum_xx: f64 = (0..self.history.len()).map(|i| (i as f64).powi(2)).sum();

        let denominator = n * sum_xx - sum_x.powi(2);
        if denominator.abs() < 1e-10 {
            return 0.0;
        }

        (n * sum_xy - sum_x * sum_y) / denominator
    }

    fn compute_variance(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }

        let mean = self.history.iter().sum::<f64>() / self.history.len() as f64;
        self.history.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / self.history.len() as f64
    }
}

impl Default for TrendAnalyzer {
    fn default() -> Self {
        Self::new(TrendParams::default())
    }
}
