use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::amas::AmasEngine;

/// Runs the weekly stats/effect aggregation and, if due, folds the result
/// into the background Bayesian optimiser. A no-op when the week boundary
/// hasn't been crossed since the last run.
pub async fn run_optimization_cycle(engine: Arc<AmasEngine>, now_ms: i64) -> Result<(), super::WorkerError> {
    let start = Instant::now();

    match engine.run_background_cycle(now_ms).await {
        Ok(Some(aggregate)) => {
            info!(
                sample_count = aggregate.sample_count,
                mean_reward = aggregate.mean_reward,
                duration_ms = start.elapsed().as_millis() as u64,
                "optimization cycle completed"
            );
        }
        Ok(None) => {
            debug!("week boundary not yet crossed, skipping optimization cycle");
        }
        Err(e) => return Err(super::WorkerError::Custom(e.to_string())),
    }

    Ok(())
}
