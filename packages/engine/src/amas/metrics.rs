//! Per-learner call-count/latency/error registry: the stats/effect tracker's
//! raw material. A process-wide singleton, keyed by [`AlgorithmId`], with an
//! `enabled` toggle read through a [`tokio::sync::RwLock`] so a learner can
//! be flipped off without touching the weight-adaptation logic.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;

static REGISTRY: OnceLock<Arc<AlgorithmRegistry>> = OnceLock::new();

pub fn registry() -> &'static Arc<AlgorithmRegistry> {
    REGISTRY.get_or_init(|| Arc::new(AlgorithmRegistry::new()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmId {
    Thompson,
    LinUcb,
    Actr,
    Heuristic,
    Ensemble,
    ColdStart,
    Guardrail,
    Optimizer,
}

impl AlgorithmId {
    pub fn all() -> &'static [AlgorithmId] {
        &[
            AlgorithmId::Thompson,
            AlgorithmId::LinUcb,
            AlgorithmId::Actr,
            AlgorithmId::Heuristic,
            AlgorithmId::Ensemble,
            AlgorithmId::ColdStart,
            AlgorithmId::Guardrail,
            AlgorithmId::Optimizer,
        ]
    }

    pub fn id(&self) -> &'static str {
        match self {
            AlgorithmId::Thompson => "thompson",
            AlgorithmId::LinUcb => "linucb",
            AlgorithmId::Actr => "actr",
            AlgorithmId::Heuristic => "heuristic",
            AlgorithmId::Ensemble => "ensemble",
            AlgorithmId::ColdStart => "coldstart",
            AlgorithmId::Guardrail => "guardrail",
            AlgorithmId::Optimizer => "optimizer",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AlgorithmId::Thompson => "Thompson Sampling",
            AlgorithmId::LinUcb => "LinUCB",
            AlgorithmId::Actr => "ACT-R Memory",
            AlgorithmId::Heuristic => "Heuristic Baseline",
            AlgorithmId::Ensemble => "Ensemble Voter",
            AlgorithmId::ColdStart => "Cold-Start Manager",
            AlgorithmId::Guardrail => "Guardrail Engine",
            AlgorithmId::Optimizer => "Bayesian Optimizer",
        }
    }

    pub fn layer(&self) -> &'static str {
        match self {
            AlgorithmId::Thompson | AlgorithmId::LinUcb | AlgorithmId::Actr | AlgorithmId::Heuristic => {
                "amas_learning"
            }
            AlgorithmId::Ensemble => "amas_decision",
            AlgorithmId::ColdStart => "amas_management",
            AlgorithmId::Guardrail => "amas_decision",
            AlgorithmId::Optimizer => "amas_background",
        }
    }
}

impl FromStr for AlgorithmId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "thompson" => Ok(AlgorithmId::Thompson),
            "linucb" => Ok(AlgorithmId::LinUcb),
            "actr" => Ok(AlgorithmId::Actr),
            "heuristic" => Ok(AlgorithmId::Heuristic),
            "ensemble" => Ok(AlgorithmId::Ensemble),
            "coldstart" => Ok(AlgorithmId::ColdStart),
            "guardrail" => Ok(AlgorithmId::Guardrail),
            "optimizer" => Ok(AlgorithmId::Optimizer),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlgorithmMetricsSnapshot {
    pub call_count: u64,
    pub total_latency_us: u64,
    pub error_count: u64,
    pub last_called_at: Option<u64>,
}

#[derive(Debug, Default)]
pub struct AlgorithmMetrics {
    call_count: AtomicU64,
    total_latency_us: AtomicU64,
    error_count: AtomicU64,
    last_called_at: AtomicU64,
}

impl AlgorithmMetrics {
    pub fn record_call(&self, latency_us: u64) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us
            .fetch_add(latency_us, Ordering::Relaxed);
        self.last_called_at.store(now_ms(), Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn avg_latency_ms(&self) -> f64 {
        let calls = self.call_count.load(Ordering::Relaxed);
        if calls == 0 {
            return 0.0;
        }
        let total_us = self.total_latency_us.load(Ordering::Relaxed);
        let avg = (total_us as f64 / calls as f64) / 1000.0;
        (avg * 10000.0).round() / 10000.0
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn last_called_at(&self) -> Option<u64> {
        let ts = self.last_called_at.load(Ordering::Relaxed);
        if ts == 0 {
            None
        } else {
            Some(ts)
        }
    }

    pub fn snapshot(&self) -> AlgorithmMetricsSnapshot {
        AlgorithmMetricsSnapshot {
            call_count: self.call_count(),
            total_latency_us: self.total_latency_us.load(Ordering::Relaxed),
            error_count: self.error_count(),
            last_called_at: self.last_called_at(),
        }
    }

    pub fn is_active(&self) -> bool {
        let last = self.last_called_at.load(Ordering::Relaxed);
        if last == 0 {
            return false;
        }
        now_ms().saturating_sub(last) < 300_000 // active if called within 5 minutes
    }
}

pub struct AlgorithmRegistry {
    metrics: HashMap<AlgorithmId, AlgorithmMetrics>,
    enabled: RwLock<HashMap<AlgorithmId, bool>>,
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AlgorithmRegistry {
    pub fn new() -> Self {
        let mut metrics = HashMap::new();
        let mut enabled = HashMap::new();
        for id in AlgorithmId::all() {
            metrics.insert(*id, AlgorithmMetrics::default());
            enabled.insert(*id, true);
        }
        Self {
            metrics,
            enabled: RwLock::new(enabled),
        }
    }

    pub fn record(&self, id: AlgorithmId, latency_us: u64) {
        if let Some(m) = self.metrics.get(&id) {
            m.record_call(latency_us);
        }
    }

    pub fn record_error(&self, id: AlgorithmId) {
        if let Some(m) = self.metrics.get(&id) {
            m.record_error();
        }
    }

    pub fn get(&self, id: AlgorithmId) -> Option<&AlgorithmMetrics> {
        self.metrics.get(&id)
    }

    pub async fn set_enabled(&self, id: AlgorithmId, enabled: bool) {
        let mut guard = self.enabled.write().await;
        guard.insert(id, enabled);
    }

    pub async fn is_enabled(&self, id: AlgorithmId) -> bool {
        let guard = self.enabled.read().await;
        guard.get(&id).copied().unwrap_or(true)
    }

    pub fn snapshot(&self) -> Vec<AlgorithmStatus> {
        AlgorithmId::all()
            .iter()
            .map(|id| {
                let m = self.metrics.get(id).unwrap();
                let calls = m.call_count();
                let is_active = m.is_active();
                let status = if calls == 0 {
                    "idle"
                } else if is_active {
                    "healthy"
                } else {
                    "inactive"
                };
                AlgorithmStatus {
                    id: id.id().to_string(),
                    name: id.name().to_string(),
                    layer: id.layer().to_string(),
                    call_count: calls,
                    avg_latency_ms: m.avg_latency_ms(),
                    error_count: m.error_count(),
                    last_called_at: m.last_called_at(),
                    is_active,
                    status: status.to_string(),
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmStatus {
    pub id: String,
    pub name: String,
    pub layer: String,
    pub call_count: u64,
    pub avg_latency_ms: f64,
    pub error_count: u64,
    pub last_called_at: Option<u64>,
    pub is_active: bool,
    pub status: String,
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[macro_export]
macro_rules! track_algorithm {
    ($id:expr, $body:expr) => {{
        let start = std::time::Instant::now();
        let result = $body;
        let latency_us = start.elapsed().as_micros() as u64;
        $crate::amas::metrics::registry().record($id, latency_us);
        result
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_registry_reports_idle_for_every_algorithm() {
        let registry = AlgorithmRegistry::new();
        for status in registry.snapshot() {
            assert_eq!(status.status, "idle");
            assert_eq!(status.call_count, 0);
        }
    }

    #[test]
    fn record_call_updates_latency_and_status() {
        let registry = AlgorithmRegistry::new();
        registry.record(AlgorithmId::LinUcb, 1500);
        let status = registry
            .snapshot()
            .into_iter()
            .find(|s| s.id == "linucb")
            .unwrap();
        assert_eq!(status.call_count, 1);
        assert_eq!(status.status, "healthy");
        assert!(status.avg_latency_ms > 0.0);
    }

    #[test]
    fn record_error_is_tracked_independently_of_calls() {
        let registry = AlgorithmRegistry::new();
        registry.record_error(AlgorithmId::Thompson);
        let status = registry
            .snapshot()
            .into_iter()
            .find(|s| s.id == "thompson")
            .unwrap();
        assert_eq!(status.error_count, 1);
        assert_eq!(status.call_count, 0);
    }

    #[tokio::test]
    async fn set_enabled_round_trips() {
        let registry = AlgorithmRegistry::new();
        assert!(registry.is_enabled(AlgorithmId::Actr).await);
        registry.set_enabled(AlgorithmId::Actr, false).await;
        assert!(!registry.is_enabled(AlgorithmId::Actr).await);
    }

    #[test]
    fn id_round_trips_through_from_str() {
        for id in AlgorithmId::all() {
            assert_eq!(AlgorithmId::from_str(id.id()), Ok(*id));
        }
    }
}
