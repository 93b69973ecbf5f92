//! The two persistence tables the orchestrator writes to, modelled as
//! narrow traits so the relational store this crate excludes can be swapped
//! in behind them without touching engine code. Only an in-process
//! reference implementation of each ships here.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::amas::types::{DecisionRecord, Reward};
use crate::error::{AmasError, AmasResult};

/// An idempotent full snapshot of one user's [`crate::amas::engine::ModelBundle`].
/// Last-writer-wins: a later `version` always overwrites an earlier one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleSnapshot {
    pub user_id: String,
    pub payload: serde_json::Value,
    pub version: u64,
    pub updated_at: i64,
}

/// `model_snapshots(user_id PK, payload BYTES, version INT, updated_at TS)`.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, snapshot: BundleSnapshot) -> AmasResult<()>;
    async fn load(&self, user_id: &str) -> AmasResult<Option<BundleSnapshot>>;
}

/// `decision_records(id PK, user_id, session_id, ts, source, phase, weights,
/// votes, action, confidence, reward NULL, trace, duration_ms)`, append-only
/// except for the single `reward_later` backfill once ground truth arrives.
#[async_trait]
pub trait DecisionLogStore: Send + Sync {
    async fn append(&self, record: DecisionRecord) -> AmasResult<()>;
    async fn attach_reward(&self, id: Uuid, reward: Reward) -> AmasResult<()>;
    async fn recent_for_user(&self, user_id: &str, limit: usize) -> AmasResult<Vec<DecisionRecord>>;
    /// All records with `timestamp >= since_ms`, across every user. The
    /// weekly stats/effect aggregation is the only caller; per-event code
    /// stays on `recent_for_user`.
    async fn all_since(&self, since_ms: i64) -> AmasResult<Vec<DecisionRecord>>;
}

/// `HashMap`-backed, `tokio::sync::Mutex`-guarded reference [`SnapshotStore`].
/// Sufficient for the engine's own tests and for embedding in a single
/// process; a real deployment swaps this for a relational-backed store.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    snapshots: Mutex<HashMap<String, BundleSnapshot>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save(&self, snapshot: BundleSnapshot) -> AmasResult<()> {
        let mut guard = self.snapshots.lock().await;
        match guard.get(&snapshot.user_id) {
            // Reject downgrades explicitly rather than silently losing a
            // later snapshot to a stale, out-of-order write.
            Some(existing) if existing.version > snapshot.version => {
                return Err(AmasError::StateCorruption(format!(
                    "refusing to downgrade snapshot for {} from version {} to {}",
                    snapshot.user_id, existing.version, snapshot.version
                )));
            }
            _ => {}
        }
        guard.insert(snapshot.user_id.clone(), snapshot);
        Ok(())
    }

    async fn load(&self, user_id: &str) -> AmasResult<Option<BundleSnapshot>> {
        Ok(self.snapshots.lock().await.get(user_id).cloned())
    }
}

/// `Vec`-backed, `tokio::sync::Mutex`-guarded reference [`DecisionLogStore`].
#[derive(Default)]
pub struct InMemoryDecisionLogStore {
    records: Mutex<Vec<DecisionRecord>>,
}

impl InMemoryDecisionLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DecisionLogStore for InMemoryDecisionLogStore {
    async fn append(&self, record: DecisionRecord) -> AmasResult<()> {
        self.records.lock().await.push(record);
        Ok(())
    }

    async fn attach_reward(&self, id: Uuid, reward: Reward) -> AmasResult<()> {
        let mut guard = self.records.lock().await;
        match guard.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                record.reward = Some(reward);
                Ok(())
            }
            None => Err(AmasError::PersistenceFailure(format!(
                "no decision record with id {id} to attach reward to"
            ))),
        }
    }

    async fn recent_for_user(&self, user_id: &str, limit: usize) -> AmasResult<Vec<DecisionRecord>> {
        let guard = self.records.lock().await;
        Ok(guard
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn all_since(&self, since_ms: i64) -> AmasResult<Vec<DecisionRecord>> {
        let guard = self.records.lock().await;
        Ok(guard.iter().filter(|r| r.timestamp >= since_ms).cloned().collect())
    }
}

/// Bundles both stores behind `Arc` so the orchestrator can hand out cheap
/// clones to background tasks (persistence writes are never on the
/// synchronous response path).
#[derive(Clone)]
pub struct PersistenceHandles {
    pub snapshots: Arc<dyn SnapshotStore>,
    pub decisions: Arc<dyn DecisionLogStore>,
}

impl PersistenceHandles {
    pub fn in_memory() -> Self {
        Self {
            snapshots: Arc::new(InMemorySnapshotStore::new()),
            decisions: Arc::new(InMemoryDecisionLogStore::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amas::types::{EnsembleWeights, StrategyParams, UserState, UserType};

    fn sample_record(user_id: &str) -> DecisionRecord {
        DecisionRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            timestamp: 1,
            user_state: UserState::default(),
            chosen_action: "mid-normal-baseline".to_string(),
            strategy: StrategyParams::for_user_type(UserType::Stable),
            winning_learner: "ensemble".to_string(),
            ensemble_weights: EnsembleWeights::default(),
            guardrail_override: None,
            reward: None,
        }
    }

    #[tokio::test]
    async fn snapshot_round_trips() {
        let store = InMemorySnapshotStore::new();
        let snapshot = BundleSnapshot {
            user_id: "u1".to_string(),
            payload: serde_json::json!({"hello": "world"}),
            version: 1,
            updated_at: 100,
        };
        store.save(snapshot.clone()).await.unwrap();
        let loaded = store.load("u1").await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.payload, snapshot.payload);
    }

    #[tokio::test]
    async fn snapshot_downgrade_is_rejected() {
        let store = InMemorySnapshotStore::new();
        store
            .save(BundleSnapshot {
                user_id: "u1".to_string(),
                payload: serde_json::json!({}),
                version: 5,
                updated_at: 100,
            })
            .await
            .unwrap();
        let result = store
            .save(BundleSnapshot {
                user_id: "u1".to_string(),
                payload: serde_json::json!({}),
                version: 2,
                updated_at: 200,
            })
            .await;
        assert!(result.is_err());
        let still_five = store.load("u1").await.unwrap().unwrap();
        assert_eq!(still_five.version, 5);
    }

    #[tokio::test]
    async fn missing_snapshot_loads_as_none() {
        let store = InMemorySnapshotStore::new();
        assert!(store.load("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn decision_log_appends_and_filters_by_user() {
        let store = InMemoryDecisionLogStore::new();
        store.append(sample_record("u1")).await.unwrap();
        store.append(sample_record("u2")).await.unwrap();
        store.append(sample_record("u1")).await.unwrap();

        let recent = store.recent_for_user("u1", 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent.iter().all(|r| r.user_id == "u1"));
    }

    #[tokio::test]
    async fn attach_reward_backfills_by_id() {
        let store = InMemoryDecisionLogStore::new();
        let record = sample_record("u1");
        let id = record.id;
        store.append(record).await.unwrap();

        let reward = Reward {
            value: 0.4,
            correctness_term: 0.45,
            speed_term: 0.1,
            fatigue_penalty: 0.0,
            frustration_penalty: 0.0,
            engagement_term: 0.2,
        };
        store.attach_reward(id, reward).await.unwrap();

        let recent = store.recent_for_user("u1", 1).await.unwrap();
        assert!(recent[0].reward.is_some());
    }

    #[tokio::test]
    async fn all_since_filters_by_timestamp_across_users() {
        let store = InMemoryDecisionLogStore::new();
        let mut old = sample_record("u1");
        old.timestamp = 10;
        let mut recent = sample_record("u2");
        recent.timestamp = 1_000;
        store.append(old).await.unwrap();
        store.append(recent).await.unwrap();

        let since = store.all_since(500).await.unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].user_id, "u2");
    }

    #[tokio::test]
    async fn attach_reward_for_unknown_id_errors() {
        let store = InMemoryDecisionLogStore::new();
        let reward = Reward {
            value: 0.0,
            correctness_term: 0.0,
            speed_term: 0.0,
            fatigue_penalty: 0.0,
            frustration_penalty: 0.0,
            engagement_term: 0.0,
        };
        let result = store.attach_reward(Uuid::new_v4(), reward).await;
        assert!(result.is_err());
    }
}
