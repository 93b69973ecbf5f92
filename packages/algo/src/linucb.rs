//! Cholesky-stabilised LinUCB contextual bandit.
//!
//! Maintains a ridge-regularised covariance `A = lambda*I + sum x_i x_i^T`
//! and its Cholesky factor `L`, so that both the ridge coefficients
//! `theta = A^-1 b` and the confidence width `sqrt(x^T A^-1 x)` are obtained
//! via two triangular solves instead of an explicit matrix inverse.

use serde::{Deserialize, Serialize};

use crate::matrix::{cholesky, confidence_width, rank1_update, solve_via_cholesky, MatrixError};
use crate::sanitize::{needs_full_recompute, sanitize_covariance, sanitize_feature_vector};
use crate::types::BanditModel;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinUCBCandidate {
    pub action_key: String,
    pub features: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinUCBSelection {
    pub action_key: String,
    pub mean: f64,
    pub confidence_width: f64,
    pub ucb_score: f64,
}

/// LinUCB over a fixed feature dimension, backed by a [`BanditModel`].
#[derive(Debug, Clone)]
pub struct LinUCB {
    model: BanditModel,
}

impl LinUCB {
    pub fn new(d: usize, lambda: f64, alpha: f64) -> Self {
        Self {
            model: BanditModel::with_dimension(d, lambda, alpha),
        }
    }

    pub fn from_model(model: BanditModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &BanditModel {
        &self.model
    }

    pub fn into_model(self) -> BanditModel {
        self.model
    }

    /// Overrides the exploration coefficient alpha in place, used by the
    /// cold-start manager to schedule a higher alpha during the explore phase.
    pub fn set_alpha(&mut self, alpha: f64) {
        self.model.alpha = alpha;
    }

    fn d(&self) -> usize {
        self.model.d
    }

    /// Scores every candidate action under the current model and returns the
    /// one with the highest upper confidence bound. Feature vectors are
    /// sanitised defensively before scoring.
    pub fn select(&self, candidates: &[LinUCBCandidate]) -> Option<LinUCBSelection> {
        let d = self.d();
        let theta = solve_via_cholesky(&self.model.l_matrix, d, &self.model.b).ok()?;

        let mut best: Option<LinUCBSelection> = None;
        for candidate in candidates {
            let mut x = candidate.features.clone();
            if x.len() != d {
                x.resize(d, 0.0);
            }
            sanitize_feature_vector(&mut x);

            let mean: f64 = theta.iter().zip(x.iter()).map(|(t, xi)| t * xi).sum();
            let width = confidence_width(&self.model.l_matrix, d, &x).unwrap_or(0.0);
            let ucb_score = mean + self.model.alpha * width;

            let selection = LinUCBSelection {
                action_key: candidate.action_key.clone(),
                mean,
                confidence_width: width,
                ucb_score,
            };
            match &best {
                Some(current) if current.ucb_score >= selection.ucb_score => {}
                _ => best = Some(selection),
            }
        }
        best
    }

    /// Applies one observation `(x, reward)` to the model: `A += x x^T`,
    /// `b += reward * x`, updating the Cholesky factor incrementally where
    /// possible and falling back to a full re-decomposition otherwise.
    pub fn update(&mut self, features: &[f64], reward: f64) -> Result<(), MatrixError> {
        let d = self.d();
        let mut x = features.to_vec();
        if x.len() != d {
            x.resize(d, 0.0);
        }
        sanitize_feature_vector(&mut x);
        let reward = if reward.is_finite() {
            reward.clamp(-1.0, 1.0)
        } else {
            0.0
        };

        for i in 0..d {
            for j in 0..d {
                self.model.a_matrix[i * d + j] += x[i] * x[j];
            }
            self.model.b[i] += reward * x[i];
        }
        sanitize_covariance(&mut self.model.a_matrix, d, self.model.lambda);

        let force_full = needs_full_recompute(self.model.update_count as u32, &self.model.l_matrix, d);
        let updated = if force_full {
            false
        } else {
            rank1_update(&mut self.model.l_matrix, d, &x).is_ok()
        };
        if !updated {
            self.model.l_matrix = cholesky(&self.model.a_matrix, d, self.model.lambda)?;
        }

        self.model.update_count += 1;
        Ok(())
    }

    pub fn snapshot(&self) -> BanditModel {
        self.model.clone()
    }

    pub fn restore(model: BanditModel) -> Self {
        Self { model }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(key: &str, features: Vec<f64>) -> LinUCBCandidate {
        LinUCBCandidate {
            action_key: key.to_string(),
            features,
        }
    }

    #[test]
    fn select_with_no_data_favours_wider_confidence() {
        let bandit = LinUCB::new(2, 1.0, 1.0);
        let candidates = vec![candidate("a", vec![1.0, 0.0]), candidate("b", vec![2.0, 0.0])];
        let choice = bandit.select(&candidates).unwrap();
        assert_eq!(choice.action_key, "b");
    }

    #[test]
    fn update_then_select_favours_rewarded_direction() {
        let mut bandit = LinUCB::new(2, 1.0, 0.1);
        for _ in 0..20 {
            bandit.update(&[1.0, 0.0], 1.0).unwrap();
            bandit.update(&[0.0, 1.0], -1.0).unwrap();
        }
        let candidates = vec![candidate("pos", vec![1.0, 0.0]), candidate("neg", vec![0.0, 1.0])];
        let choice = bandit.select(&candidates).unwrap();
        assert_eq!(choice.action_key, "pos");
    }

    #[test]
    fn update_sanitises_non_finite_reward() {
        let mut bandit = LinUCB::new(2, 1.0, 1.0);
        assert!(bandit.update(&[1.0, 1.0], f64::NAN).is_ok());
        assert_eq!(bandit.model().update_count, 1);
    }

    #[test]
    fn snapshot_restore_round_trip_preserves_state() {
        let mut bandit = LinUCB::new(3, 1.0, 0.5);
        bandit.update(&[1.0, 0.5, -0.2], 0.8).unwrap();
        let snap = bandit.snapshot();
        let restored = LinUCB::restore(snap.clone());
        assert_eq!(restored.model().a_matrix, snap.a_matrix);
        assert_eq!(restored.model().update_count, snap.update_count);
    }

    #[test]
    fn select_resizes_mismatched_feature_vectors() {
        let bandit = LinUCB::new(3, 1.0, 1.0);
        let candidates = vec![candidate("short", vec![1.0])];
        assert!(bandit.select(&candidates).is_some());
    }

    #[test]
    fn select_on_empty_candidates_returns_none() {
        let bandit = LinUCB::new(2, 1.0, 1.0);
        assert!(bandit.select(&[]).is_none());
    }
}
