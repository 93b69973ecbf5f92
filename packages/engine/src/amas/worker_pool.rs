//! Process-wide CPU pool for the linear-algebra-heavy paths (LinUCB select
//! over the full action catalogue, LinUCB update's Cholesky work, GP
//! suggestion). Workers hold no user state: they receive plain number
//! arrays and return plain number arrays: the orchestrator writes results
//! back into the owning bundle under that user's critical section.
//!
//! Implemented the same way the reference backend bridges its cron-
//! scheduled background jobs into async code — a pure task paired with an
//! owned result channel — just applied to a `rayon::ThreadPool` instead of
//! a wall-clock schedule.

use tokio::sync::oneshot;

use crate::amas::config::WorkerPoolConfig;
use crate::error::{AmasError, AmasResult};

pub struct WorkerPool {
    pool: rayon::ThreadPool,
}

impl WorkerPool {
    pub fn new(config: &WorkerPoolConfig) -> AmasResult<Self> {
        let threads = config
            .max_threads
            .min(std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4))
            .max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("amas-worker-{i}"))
            .build()
            .map_err(|e| AmasError::ConfigViolation(format!("worker pool init failed: {e}")))?;
        Ok(Self { pool })
    }

    /// Runs a pure, `'static` CPU-bound closure on the pool and awaits its
    /// result via a one-shot channel. The closure must not touch any
    /// per-user state directly; it receives and returns plain values that
    /// the caller writes back under its own critical section.
    pub async fn dispatch<F, T>(&self, job: F) -> AmasResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.pool.spawn(move || {
            // The result channel may already be dropped if the caller hit
            // its deadline; a worker task is pure and safe to abandon.
            let _ = tx.send(job());
        });
        rx.await
            .map_err(|_| AmasError::PersistenceFailure("worker pool task was dropped before completion".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dispatch_runs_closure_off_thread_and_returns_result() {
        let pool = WorkerPool::new(&WorkerPoolConfig { max_threads: 2 }).unwrap();
        let result = pool.dispatch(|| (2..=10).product::<u64>()).await.unwrap();
        assert_eq!(result, 3628800);
    }

    #[tokio::test]
    async fn dispatch_handles_a_batch_of_jobs() {
        let pool = WorkerPool::new(&WorkerPoolConfig { max_threads: 4 }).unwrap();
        let mut total = 0u64;
        for i in 0..16u64 {
            total += pool.dispatch(move || i * i).await.unwrap();
        }
        assert_eq!(total, (0..16u64).map(|i| i * i).sum());
    }

    #[test]
    fn zero_configured_threads_still_builds_with_at_least_one() {
        let pool = WorkerPool::new(&WorkerPoolConfig { max_threads: 0 });
        assert!(pool.is_ok());
    }
}
