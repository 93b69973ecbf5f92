#![allow(dead_code)]

pub mod coldstart;
pub mod ensemble;
pub mod heuristic;

pub use coldstart::ColdStartManager;
pub use ensemble::EnsembleDecision;
#[allow(unused_imports)]
pub use heuristic::HeuristicLearner;
