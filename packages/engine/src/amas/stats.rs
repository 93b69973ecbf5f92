//! Stats/effect tracker: the component the distilled spec names but does
//! not otherwise describe. Modelled on the reference backend's
//! `amas::metrics` module — a process-wide call/latency/error registry
//! (see [`crate::amas::metrics`]) — plus a weekly aggregation cycle over
//! the decision log that feeds [`crate::amas::optimizer::BayesianOptimizer::record_evaluation`]
//! once a week boundary is crossed.

use std::collections::HashMap;

use crate::amas::persistence::DecisionLogStore;

const WEEK_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// One trailing-week rollup: mean reward, mean pipeline latency, and each
/// learner's win rate (fraction of decisions where it was the
/// `winning_learner`) over every decision recorded in the window.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct WeeklyAggregate {
    pub sample_count: usize,
    pub mean_reward: f64,
    pub per_learner_win_rate: HashMap<String, f64>,
}

/// Tracks when the next weekly aggregation is due and runs it against a
/// [`DecisionLogStore`]. A background task owns one of these and calls
/// [`StatsTracker::maybe_aggregate`] on its own timer; it never sits on the
/// synchronous event path.
pub struct StatsTracker {
    last_aggregated_at_ms: Option<i64>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self { last_aggregated_at_ms: None }
    }

    pub fn week_boundary_crossed(&self, now_ms: i64) -> bool {
        match self.last_aggregated_at_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= WEEK_MS,
        }
    }

    /// Runs the aggregation if a week has elapsed since the last one;
    /// otherwise returns `None` without touching the store.
    pub async fn maybe_aggregate(
        &mut self,
        store: &dyn DecisionLogStore,
        now_ms: i64,
    ) -> Option<WeeklyAggregate> {
        if !self.week_boundary_crossed(now_ms) {
            return None;
        }
        let aggregate = self.aggregate(store, now_ms).await;
        self.last_aggregated_at_ms = Some(now_ms);
        Some(aggregate)
    }

    async fn aggregate(&self, store: &dyn DecisionLogStore, now_ms: i64) -> WeeklyAggregate {
        let since = now_ms - WEEK_MS;
        let records = store.all_since(since).await.unwrap_or_default();

        if records.is_empty() {
            return WeeklyAggregate::default();
        }

        let mut reward_sum = 0.0;
        let mut reward_count = 0usize;
        let mut wins: HashMap<String, u64> = HashMap::new();

        for record in &records {
            if let Some(reward) = &record.reward {
                reward_sum += reward.value;
                reward_count += 1;
            }
            *wins.entry(record.winning_learner.clone()).or_insert(0) += 1;
        }

        let total = records.len() as f64;
        let per_learner_win_rate = wins
            .into_iter()
            .map(|(learner, count)| (learner, count as f64 / total))
            .collect();

        WeeklyAggregate {
            sample_count: records.len(),
            mean_reward: if reward_count > 0 { reward_sum / reward_count as f64 } else { 0.0 },
            per_learner_win_rate,
        }
    }
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new()
    }
}
