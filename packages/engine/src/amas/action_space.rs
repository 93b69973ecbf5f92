//! The fixed, finite action catalogue the guardrail mapper snaps onto and
//! every learner ultimately scores.
//!
//! Keeping the action space fixed and small (24 entries) is what lets
//! LinUCB/Thompson/ACT-R share one `action_key` vocabulary and lets the
//! cold-start manager hand out a deterministic `StrategyParams` for each of
//! its three probes.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Mid,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Mid => "mid",
            Difficulty::Hard => "hard",
        }
    }

    /// Numeric encoding used by the mapper's difficulty-mismatch penalty.
    pub fn to_index(self) -> i32 {
        match self {
            Difficulty::Easy => 0,
            Difficulty::Mid => 1,
            Difficulty::Hard => 2,
        }
    }
}

/// A single catalogue entry: a concrete, nameable review strategy.
///
/// `new_ratio` is the fraction of new (never-seen) items in the next batch,
/// `interval_scale` multiplies the base spaced-repetition interval,
/// `batch_size` is the number of items in the next review round, `hint_level`
/// is 0 (none) to 2 (full).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CatalogueAction {
    pub key: &'static str,
    pub new_ratio: f64,
    pub interval_scale: f64,
    pub difficulty: Difficulty,
    pub batch_size: u32,
    pub hint_level: u8,
}

macro_rules! action {
    ($key:literal, $new_ratio:expr, $interval_scale:expr, $difficulty:expr, $batch_size:expr, $hint_level:expr) => {
        CatalogueAction {
            key: $key,
            new_ratio: $new_ratio,
            interval_scale: $interval_scale,
            difficulty: $difficulty,
            batch_size: $batch_size,
            hint_level: $hint_level,
        }
    };
}

/// The 24 fixed actions every learner selects among. Ordering is
/// insignificant but stable, so serialized decision logs stay comparable.
pub static ACTION_SPACE: [CatalogueAction; 24] = [
    action!("easy-slow-small-hinted", 0.10, 1.6, Difficulty::Easy, 6, 2),
    action!("easy-slow-small", 0.10, 1.6, Difficulty::Easy, 6, 1),
    action!("easy-slow-medium", 0.15, 1.4, Difficulty::Easy, 8, 1),
    action!("easy-normal-small", 0.15, 1.0, Difficulty::Easy, 6, 1),
    action!("easy-normal-medium", 0.15, 1.0, Difficulty::Easy, 8, 0),
    action!("easy-normal-support", 0.15, 1.0, Difficulty::Easy, 6, 2),
    action!("easy-fast-medium", 0.20, 0.7, Difficulty::Easy, 10, 0),
    action!("mid-slow-small", 0.20, 1.4, Difficulty::Mid, 8, 1),
    action!("mid-slow-medium", 0.25, 1.3, Difficulty::Mid, 10, 1),
    action!("mid-normal-baseline", 0.05, 1.0, Difficulty::Mid, 8, 0),
    action!("mid-normal-small", 0.20, 1.0, Difficulty::Mid, 8, 0),
    action!("mid-normal-medium", 0.25, 1.0, Difficulty::Mid, 10, 0),
    action!("mid-normal-large", 0.25, 1.0, Difficulty::Mid, 12, 0),
    action!("mid-normal-hinted", 0.20, 1.0, Difficulty::Mid, 8, 1),
    action!("mid-fast-medium", 0.30, 0.7, Difficulty::Mid, 10, 0),
    action!("mid-fast-large", 0.30, 0.6, Difficulty::Mid, 12, 0),
    action!("hard-slow-small", 0.25, 1.2, Difficulty::Hard, 8, 1),
    action!("hard-normal-medium", 0.30, 1.0, Difficulty::Hard, 10, 0),
    action!("hard-normal-large", 0.35, 1.0, Difficulty::Hard, 12, 0),
    action!("hard-normal-xlarge", 0.35, 1.0, Difficulty::Hard, 14, 0),
    action!("hard-fast-large", 0.35, 0.35, Difficulty::Hard, 12, 0),
    action!("hard-fast-xlarge", 0.40, 0.5, Difficulty::Hard, 14, 0),
    action!("hard-fast-small", 0.30, 0.6, Difficulty::Hard, 8, 0),
    action!("hard-aggressive", 0.45, 0.4, Difficulty::Hard, 14, 0),
];

pub fn by_key(key: &str) -> Option<&'static CatalogueAction> {
    ACTION_SPACE.iter().find(|a| a.key == key)
}

pub fn action_keys() -> Vec<String> {
    ACTION_SPACE.iter().map(|a| a.key.to_string()).collect()
}

/// Weighted distance used by the guardrail mapper's nearest-neighbour snap,
/// per the mapping formula: `new_ratio*10 + interval_scale + batch/5 + hint +
/// difficulty_mismatch`.
pub fn distance(a: &CatalogueAction, new_ratio: f64, interval_scale: f64, difficulty: Difficulty, batch_size: u32, hint_level: u8) -> f64 {
    let d_new = (a.new_ratio - new_ratio).abs() * 10.0;
    let d_interval = (a.interval_scale - interval_scale).abs();
    let d_batch = (a.batch_size as f64 - batch_size as f64).abs() / 5.0;
    let d_hint = (a.hint_level as f64 - hint_level as f64).abs();
    let d_difficulty = if a.difficulty.to_index() == difficulty.to_index() { 0.0 } else { 1.0 };
    d_new + d_interval + d_batch + d_hint + d_difficulty
}

/// Finds the catalogue entry nearest the given continuous strategy.
pub fn nearest(new_ratio: f64, interval_scale: f64, difficulty: Difficulty, batch_size: u32, hint_level: u8) -> &'static CatalogueAction {
    ACTION_SPACE
        .iter()
        .min_by(|a, b| {
            distance(a, new_ratio, interval_scale, difficulty, batch_size, hint_level)
                .partial_cmp(&distance(b, new_ratio, interval_scale, difficulty, batch_size, hint_level))
                .unwrap()
        })
        .expect("ACTION_SPACE is non-empty")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_keys_are_unique() {
        let keys = action_keys();
        let mut sorted = keys.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), keys.len());
    }

    #[test]
    fn nearest_of_exact_match_is_itself() {
        let target = &ACTION_SPACE[10];
        let found = nearest(target.new_ratio, target.interval_scale, target.difficulty, target.batch_size, target.hint_level);
        assert_eq!(found.key, target.key);
    }

    #[test]
    fn by_key_finds_known_action() {
        assert!(by_key("mid-normal-baseline").is_some());
        assert!(by_key("does-not-exist").is_none());
    }
}
