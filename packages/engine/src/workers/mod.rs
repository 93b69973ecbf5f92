#![allow(dead_code)]

mod optimization;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::amas::AmasEngine;

static WORKER_LEADER: AtomicBool = AtomicBool::new(false);

pub fn is_worker_leader() -> bool {
    WORKER_LEADER.load(Ordering::Relaxed)
}

fn set_worker_leader(val: bool) {
    WORKER_LEADER.store(val, Ordering::Relaxed);
}

/// Drives the one background job this crate schedules: the weekly
/// stats/effect aggregation and Bayesian-optimiser suggestion cycle. Runs
/// under a single-leader model so a multi-process deployment doesn't race
/// the same cycle from every instance.
pub struct WorkerManager {
    scheduler: Mutex<JobScheduler>,
    shutdown_tx: broadcast::Sender<()>,
    amas_engine: Arc<AmasEngine>,
}

impl WorkerManager {
    pub async fn new(amas_engine: Arc<AmasEngine>) -> Result<Self, WorkerError> {
        let scheduler = JobScheduler::new().await.map_err(WorkerError::Scheduler)?;
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            shutdown_tx,
            amas_engine,
        })
    }

    pub async fn start(&self) -> Result<(), WorkerError> {
        let leader = std::env::var("WORKER_LEADER")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        if !leader {
            info!("WORKER_LEADER not set, skipping worker startup");
            return Ok(());
        }

        set_worker_leader(true);
        info!("Starting workers (leader mode)");

        let enable_optimization = std::env::var("ENABLE_BAYESIAN_OPTIMIZER")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let scheduler = self.scheduler.lock().await;

        if enable_optimization {
            let schedule =
                std::env::var("OPTIMIZATION_SCHEDULE").unwrap_or_else(|_| "0 0 3 * * *".to_string());
            let amas = Arc::clone(&self.amas_engine);
            let shutdown_rx = self.shutdown_tx.subscribe();
            let job = Job::new_async(&schedule, move |_uuid, _lock| {
                let amas = Arc::clone(&amas);
                let mut rx = shutdown_rx.resubscribe();
                Box::pin(async move {
                    let now_ms = chrono::Utc::now().timestamp_millis();
                    tokio::select! {
                        _ = rx.recv() => {},
                        result = optimization::run_optimization_cycle(amas, now_ms) => {
                            if let Err(e) = result {
                                error!(error = %e, "Optimization worker error");
                            }
                        }
                    }
                })
            })
            .map_err(WorkerError::Scheduler)?;
            scheduler.add(job).await.map_err(WorkerError::Scheduler)?;
            info!(schedule = %schedule, "Optimization worker scheduled");
        } else {
            info!("Bayesian optimizer disabled, skipping optimization worker");
        }

        scheduler.start().await.map_err(WorkerError::Scheduler)?;
        info!("All workers started");

        Ok(())
    }

    pub async fn stop(&self) {
        if !is_worker_leader() {
            return;
        }

        info!("Stopping workers...");
        let _ = self.shutdown_tx.send(());

        let mut scheduler = self.scheduler.lock().await;
        if let Err(e) = scheduler.shutdown().await {
            warn!(error = %e, "Error shutting down scheduler");
        }

        set_worker_leader(false);
        info!("Workers stopped");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),
    #[error("{0}")]
    Custom(String),
}
