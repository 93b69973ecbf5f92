#![allow(dead_code)]

pub mod action_space;
pub mod config;
pub mod decision;
pub mod engine;
pub mod guardrails;
pub mod learner;
pub mod metrics;
pub mod modeling;
pub mod optimizer;
pub mod perception;
pub mod persistence;
pub mod stats;
pub mod types;
pub mod worker_pool;

pub use config::AMASConfig;
pub use engine::AmasEngine;
#[allow(unused_imports)]
pub use types::*;
