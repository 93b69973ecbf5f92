//! # amas-algo - core decision-engine algorithms
//!
//! Pure-Rust numerical core for the AMAS bandit ensemble:
//!
//! - **ACT-R memory model** - activation and recall-probability estimation
//! - **LinUCB** - Cholesky-stabilised linear contextual bandit
//! - **Thompson Sampling** - Beta-Bernoulli bandit with context-bucket blending
//! - **matrix** - Cholesky decomposition, rank-1 updates, Matern-5/2 kernel
//! - **sanitize** - numerical stability utilities shared by all learners
//!
//! This crate has no knowledge of users, events, or HTTP; it is pure math
//! operated on by the engine crate.

pub mod actr;
pub mod linucb;
pub mod matrix;
pub mod sanitize;
pub mod thompson;
pub mod types;

pub use actr::ACTRMemory;
pub use linucb::{LinUCB, LinUCBCandidate, LinUCBSelection};
pub use matrix::MatrixError;
pub use thompson::{BatchUpdateItem, ThompsonSampling, ThompsonSamplingState};
pub use types::*;
