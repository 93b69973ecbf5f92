#![allow(dead_code)]

pub mod attention;
pub mod cognitive;
pub mod fatigue;
pub mod motivation;
pub mod trend;

pub use attention::AttentionMonitor;
pub use cognitive::CognitiveProfiler;
pub use fatigue::FatigueEstimator;
pub use motivation::MotivationTracker;
pub use trend::TrendAnalyzer;
