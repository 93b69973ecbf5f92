//! Common types and constants shared by the bandit/memory algorithms.

use serde::{Deserialize, Serialize};

// ==================== Constants ====================

/// Feature dimension for LinUCB. Frozen by the engine's feature layout.
pub const FEATURE_DIMENSION: usize = 22;

/// Minimum regularization parameter.
pub const MIN_LAMBDA: f64 = 1e-3;

/// Minimum diagonal value for rank-1 updates.
pub const MIN_RANK1_DIAG: f64 = 1e-6;

/// Maximum covariance value.
pub const MAX_COVARIANCE: f64 = 1e9;

/// Maximum feature absolute value.
pub const MAX_FEATURE_ABS: f64 = 50.0;

/// Numerical stability epsilon.
pub const EPSILON: f64 = 1e-10;

/// Ceiling a single diagonal entry may drift to before a rank-1 update is
/// abandoned in favour of a full re-decomposition.
pub const MAX_RANK1_DIAG: f64 = 1e12;

// ==================== ACT-R types ====================

/// A single review in a word's memory trace.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryTrace {
    /// Time since this review, in seconds, measured from "now".
    pub delta_t: f64,
    pub is_correct: bool,
}

/// ACT-R model state, one per user.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ACTRState {
    /// Decay rate d (default 0.5).
    pub decay: f64,
    /// Recall threshold tau.
    pub threshold: f64,
    /// Logistic noise scale s.
    pub noise_scale: f64,
    pub update_count: u32,
}

impl Default for ACTRState {
    fn default() -> Self {
        Self {
            decay: 0.5,
            threshold: 0.3,
            noise_scale: 0.4,
            update_count: 0,
        }
    }
}

/// Activation computation result.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActivationResult {
    pub activation: f64,
    pub recall_probability: f64,
    pub confidence: f64,
}

// ==================== LinUCB types ====================

/// Bandit model state: LinUCB's ridge-regularised covariance plus its
/// Cholesky factor, kept in lockstep so the factor never needs to be
/// recomputed on the hot select() path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanditModel {
    pub a_matrix: Vec<f64>,
    pub b: Vec<f64>,
    pub l_matrix: Vec<f64>,
    pub lambda: f64,
    pub alpha: f64,
    pub d: usize,
    pub update_count: u64,
}

impl BanditModel {
    pub fn with_dimension(d: usize, lambda: f64, alpha: f64) -> Self {
        let sqrt_lambda = lambda.max(MIN_LAMBDA).sqrt();
        let mut a_matrix = vec![0.0; d * d];
        let mut l_matrix = vec![0.0; d * d];
        for i in 0..d {
            a_matrix[i * d + i] = lambda;
            l_matrix[i * d + i] = sqrt_lambda;
        }
        Self {
            a_matrix,
            b: vec![0.0; d],
            l_matrix,
            lambda,
            alpha,
            d,
            update_count: 0,
        }
    }
}

impl Default for BanditModel {
    fn default() -> Self {
        Self::with_dimension(FEATURE_DIMENSION, 1.0, 1.0)
    }
}

/// Diagnostic result for model health, surfaced to metrics/logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticResult {
    pub is_healthy: bool,
    pub has_nan: bool,
    pub has_inf: bool,
    pub condition_number: f64,
    pub min_diagonal: f64,
    pub max_diagonal: f64,
    pub message: String,
}

// ==================== Thompson Sampling types ====================

/// Beta distribution parameters for one action (or one action × context bucket).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BetaParams {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for BetaParams {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
        }
    }
}

impl BetaParams {
    pub fn new(alpha: f64, beta: f64) -> Self {
        Self {
            alpha: alpha.max(EPSILON),
            beta: beta.max(EPSILON),
        }
    }

    pub fn mean(&self) -> f64 {
        let sum = self.alpha + self.beta;
        if sum > 0.0 {
            self.alpha / sum
        } else {
            0.5
        }
    }

    /// Beta variance, used by the ensemble's confidence = mean·(1-√variance).
    pub fn variance(&self) -> f64 {
        let sum = self.alpha + self.beta;
        if sum <= 0.0 {
            return 0.25;
        }
        (self.alpha * self.beta) / (sum * sum * (sum + 1.0))
    }

    pub fn total(&self) -> f64 {
        self.alpha + self.beta
    }
}

/// Thompson Sampling action-selection result.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TSActionSelection {
    pub action_key: String,
    pub score: f64,
    pub confidence: f64,
    pub global_sample: f64,
    pub contextual_sample: f64,
}

/// Thompson Sampling configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThompsonSamplingOptions {
    pub prior_alpha: f64,
    pub prior_beta: f64,
    pub min_context_weight: f64,
    pub max_context_weight: f64,
    pub context_buckets: usize,
    pub context_n0: f64,
}

impl Default for ThompsonSamplingOptions {
    fn default() -> Self {
        Self {
            prior_alpha: 1.0,
            prior_beta: 1.0,
            min_context_weight: 0.3,
            max_context_weight: 0.7,
            context_buckets: 3,
            context_n0: 20.0,
        }
    }
}
