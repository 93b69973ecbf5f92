//! Cold-start manager: a 3-probe Gaussian-likelihood Bayesian classifier with
//! early stop, followed by a settled strategy while the bandits warm up.

use crate::amas::config::ColdStartConfig;
use crate::amas::types::{ColdStartPhase, ColdStartState, ProbeResult, StrategyParams, UserType};

const STD: f64 = 0.2;

/// Expected correctness signal per `{fast, stable, cautious}` user type at
/// each of the three fixed probes (baseline/ceiling/support).
const MEANS: [[f64; 3]; 3] = [
    [0.85, 0.75, 0.90],
    [0.75, 0.55, 0.85],
    [0.60, 0.35, 0.80],
];

fn gaussian_likelihood(x: f64, mean: f64, std: f64) -> f64 {
    let z = (x - mean) / std;
    (-0.5 * z * z).exp() / (std * (2.0 * std::f64::consts::PI).sqrt())
}

fn type_from_index(idx: usize) -> UserType {
    match idx {
        0 => UserType::Fast,
        2 => UserType::Cautious,
        _ => UserType::Stable,
    }
}

pub struct ColdStartManager {
    config: ColdStartConfig,
    state: ColdStartState,
}

impl ColdStartManager {
    pub fn new(config: ColdStartConfig) -> Self {
        Self { config, state: ColdStartState::default() }
    }

    pub fn from_state(config: ColdStartConfig, state: ColdStartState) -> Self {
        Self { config, state }
    }

    pub fn phase(&self) -> ColdStartPhase {
        self.state.phase
    }

    pub fn state(&self) -> &ColdStartState {
        &self.state
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state.phase, ColdStartPhase::Normal)
    }

    pub fn user_type(&self) -> Option<UserType> {
        self.state.user_type
    }

    pub fn settled_strategy(&self) -> Option<StrategyParams> {
        self.state.user_type.map(StrategyParams::for_user_type)
    }

    /// The strategy the caller should play right now, or `None` once in
    /// `Normal` phase (the ensemble takes over entirely).
    pub fn current_strategy(&self) -> Option<StrategyParams> {
        match self.state.phase {
            ColdStartPhase::Classify => Some(StrategyParams::probe(self.state.probe_index.min(2))),
            ColdStartPhase::Explore => self.settled_strategy(),
            ColdStartPhase::Normal => None,
        }
    }

    /// Folds one event's outcome into the classifier and returns the
    /// strategy to play next (`None` once settled into `Normal`).
    ///
    /// `recent_error_rate` is the perception layer's rolling error rate;
    /// the combined correctness signal is `0.6*reward + 0.4*(1-errorRate)`.
    pub fn update(&mut self, reward: f64, recent_error_rate: f64) -> Option<StrategyParams> {
        let correctness_signal = (0.6 * reward + 0.4 * (1.0 - recent_error_rate)).clamp(0.0, 1.0);

        match self.state.phase {
            ColdStartPhase::Classify => self.handle_classify(reward, recent_error_rate, correctness_signal),
            ColdStartPhase::Explore => self.handle_explore(),
            ColdStartPhase::Normal => {
                self.state.update_count += 1;
                None
            }
        }
    }

    fn handle_classify(&mut self, reward: f64, recent_error_rate: f64, correctness_signal: f64) -> Option<StrategyParams> {
        let probe_idx = self.state.probe_index.min(2) as usize;
        self.state.push_result(ProbeResult {
            probe_index: self.state.probe_index,
            reward,
            recent_error_rate,
            correctness_signal,
        });

        for (type_idx, means) in MEANS.iter().enumerate() {
            self.state.posterior[type_idx] *= gaussian_likelihood(correctness_signal, means[probe_idx], STD);
        }
        let total: f64 = self.state.posterior.iter().sum();
        if total > 1e-12 {
            for p in self.state.posterior.iter_mut() {
                *p /= total;
            }
        } else {
            self.state.posterior = [1.0 / 3.0; 3];
        }

        self.state.probe_index += 1;
        self.state.update_count += 1;

        let (max_idx, max_posterior) = self.argmax_posterior();
        let early_stop =
            self.state.probe_index >= self.config.min_probes_per_type && max_posterior >= self.config.early_stop_threshold;

        if early_stop {
            self.state.probe_index = 3;
            self.state.user_type = Some(type_from_index(max_idx));
            self.state.phase = ColdStartPhase::Explore;
            return self.settled_strategy();
        }

        if self.state.probe_index >= 3 {
            self.state.user_type = Some(type_from_index(max_idx));
            self.state.phase = ColdStartPhase::Explore;
            return self.settled_strategy();
        }

        Some(StrategyParams::probe(self.state.probe_index))
    }

    fn handle_explore(&mut self) -> Option<StrategyParams> {
        self.state.update_count += 1;

        if self.state.update_count >= self.config.max_events && self.state.probe_index >= 3 {
            if self.state.user_type.is_none() {
                let (max_idx, _) = self.argmax_posterior();
                self.state.user_type = Some(type_from_index(max_idx));
            }
            self.state.phase = ColdStartPhase::Normal;
            return None;
        }

        self.settled_strategy()
    }

    fn argmax_posterior(&self) -> (usize, f64) {
        self.state
            .posterior
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .map(|(i, v)| (i, *v))
            .unwrap_or((1, 1.0 / 3.0))
    }
}

impl Default for ColdStartManager {
    fn default() -> Self {
        Self::new(ColdStartConfig::default())
    }
}
