use std::sync::Arc;

use amas_engine::amas::{AMASConfig, AmasEngine, RawEvent};
use amas_engine::workers::WorkerManager;
use amas_engine::{config::Config, logging};

/// Minimal demo binary: drives a handful of synthetic events for one user
/// through the engine and prints the resulting decisions. Exercises the
/// same public surface (`process_event`, `get_strategy`, `snapshot`,
/// `restore`) a real caller would use; there is no HTTP layer here.
#[tokio::main]
async fn main() {
    let config = Config::from_env();
    let _file_log_guard = logging::init_tracing(&config.log_level);

    let amas_config = AMASConfig::from_env();
    let engine = match AmasEngine::in_memory(amas_config) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            tracing::error!(error = %e, "failed to start AMAS engine");
            std::process::exit(1);
        }
    };

    let worker_manager = match WorkerManager::new(Arc::clone(&engine)).await {
        Ok(manager) => {
            if let Err(e) = manager.start().await {
                tracing::error!(error = %e, "failed to start workers");
            }
            Some(manager)
        }
        Err(e) => {
            tracing::warn!(error = %e, "worker manager not initialized");
            None
        }
    };

    run_demo(&engine).await;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
    }

    if let Some(manager) = worker_manager {
        manager.stop().await;
    }

    tracing::info!("amas-engine-demo stopped");
}

async fn run_demo(engine: &AmasEngine) {
    let user_id = "demo-user";
    let session_id = "demo-session-1";
    let mut ts = 1_700_000_000_000i64;

    for round in 0..10 {
        let event = RawEvent {
            word_id: format!("word-{round}"),
            is_correct: round % 3 != 0,
            response_time: 1800.0 + (round as f64 * 50.0),
            dwell_time: 2500.0,
            timestamp: ts,
            pause_count: 0,
            switch_count: 0,
            retry_count: if round % 3 == 0 { 1 } else { 0 },
            focus_loss_duration: 0.0,
            interaction_density: 0.8,
        };

        match engine.process_event(user_id, session_id, event, None).await {
            Ok(result) => {
                tracing::info!(
                    round,
                    action = %result.action_key,
                    winning_learner = %result.winning_learner,
                    confidence = result.user_state.confidence,
                    "processed event"
                );
            }
            Err(e) => tracing::error!(round, error = %e, "process_event failed"),
        }

        ts += 60_000;
    }

    if let Ok(strategy) = engine.get_strategy(user_id).await {
        tracing::info!(action = %strategy.action_key, "current strategy");
    }

    if let Ok(payload) = engine.snapshot(user_id).await {
        tracing::info!(bytes = payload.to_string().len(), "snapshot persisted");
    }
}
