//! Integration tests for the decision layer in isolation from the full
//! engine: individual `Learner` implementations, the `EnsembleDecision`
//! voter, and the `ColdStartManager` lifecycle, driven directly through
//! their public constructors rather than through `AmasEngine::process_event`.

use amas_engine::amas::action_space::{self, Difficulty};
use amas_engine::amas::config::{AMASConfig, ColdStartConfig};
use amas_engine::amas::decision::{ColdStartManager, EnsembleDecision};
use amas_engine::amas::learner::{ActrLearner, Learner, LearnerOutcome, LinUCBLearner, ThompsonLearner};
use amas_engine::amas::perception::DecisionContext;
use amas_engine::amas::types::{ColdStartPhase, StrategyParams, UserState, UserType};

fn ctx() -> DecisionContext {
    DecisionContext {
        recent_error_rate: 0.2,
        recent_response_time_ms: 3000.0,
        hour_of_day: 14,
    }
}

fn outcome(reward: f64, is_correct: bool) -> LearnerOutcome {
    LearnerOutcome { reward, is_correct, elapsed_seconds: 45.0 }
}

#[test]
fn linucb_learner_converges_toward_a_rewarded_action_over_many_updates() {
    let config = AMASConfig::default();
    let mut learner = LinUCBLearner::new(&config);
    let state = UserState::default();

    for _ in 0..200 {
        learner.update(&state, &ctx(), "easy-normal-medium", outcome(1.0, true));
        learner.update(&state, &ctx(), "hard-aggressive", outcome(-1.0, false));
    }

    let scores = learner.score_actions(&state, &ctx());
    let easy = scores.iter().find(|s| s.action_key == "easy-normal-medium").unwrap();
    let hard = scores.iter().find(|s| s.action_key == "hard-aggressive").unwrap();
    assert!(easy.score > hard.score);
}

#[test]
fn thompson_learner_updates_do_not_panic_across_every_catalogue_action() {
    let mut learner = ThompsonLearner::new();
    let state = UserState::default();
    for key in action_space::action_keys() {
        learner.update(&state, &ctx(), &key, outcome(0.5, true));
    }
    let scores = learner.score_actions(&state, &ctx());
    assert_eq!(scores.len(), action_space::ACTION_SPACE.len());
}

#[test]
fn actr_learner_recall_confidence_grows_with_consistent_correct_history() {
    let mut learner = ActrLearner::new();
    let state = UserState::default();
    let initial = learner.score_actions(&state, &ctx())[0].confidence;
    for _ in 0..30 {
        learner.update(&state, &ctx(), "mid-normal-baseline", outcome(0.7, true));
    }
    let grown = learner.score_actions(&state, &ctx())[0].confidence;
    assert!(grown >= initial);
}

#[test]
fn disabling_every_learner_but_one_makes_that_learner_the_winner() {
    let mut config = AMASConfig::default();
    config.feature_flags.thompson_enabled = false;
    config.feature_flags.actr_enabled = false;
    config.feature_flags.heuristic_enabled = false;
    // Only linucb_enabled remains true.

    let mut ensemble = EnsembleDecision::new(&config);
    let selection = ensemble.select(&UserState::default(), &ctx(), ColdStartPhase::Normal, None);
    assert_eq!(selection.winning_learner, "linucb");
    assert_eq!(selection.members.len(), 1);
}

#[test]
fn weight_adaptation_disabled_keeps_weights_exactly_at_default() {
    let mut config = AMASConfig::default();
    config.feature_flags.ensemble_weight_adaptation_enabled = false;
    let mut ensemble = EnsembleDecision::new(&config);
    let default_weights = ensemble.weights();

    for _ in 0..15 {
        let selection = ensemble.select(&UserState::default(), &ctx(), ColdStartPhase::Normal, None);
        ensemble.update(&UserState::default(), &ctx(), &selection.action_key, outcome(0.95, true));
    }

    let after = ensemble.weights();
    assert_eq!(after.thompson, default_weights.thompson);
    assert_eq!(after.linucb, default_weights.linucb);
    assert_eq!(after.actr, default_weights.actr);
    assert_eq!(after.heuristic, default_weights.heuristic);
}

#[test]
fn ensemble_select_during_classify_phase_ignores_learners_entirely() {
    let config = AMASConfig::default();
    let mut ensemble = EnsembleDecision::new(&config);
    let probe = StrategyParams::probe(1);
    let selection = ensemble.select(&UserState::default(), &ctx(), ColdStartPhase::Classify, Some(probe));
    assert_eq!(selection.winning_learner, "coldstart");
    assert!(selection.members.is_empty());
    assert_eq!(selection.strategy.difficulty, Difficulty::Hard);
}

#[test]
fn cold_start_manager_runs_through_all_three_phases_for_a_strong_performer() {
    let mut manager = ColdStartManager::new(ColdStartConfig::default());
    assert_eq!(manager.phase(), ColdStartPhase::Classify);

    manager.update(0.9, 0.05);
    manager.update(0.85, 0.05);
    manager.update(0.9, 0.05);
    assert_eq!(manager.phase(), ColdStartPhase::Explore);
    assert_eq!(manager.user_type(), Some(UserType::Fast));

    let mut settled_into_normal = false;
    for _ in 0..10 {
        if manager.update(0.6, 0.2).is_none() {
            settled_into_normal = true;
            break;
        }
    }
    assert!(settled_into_normal);
    assert_eq!(manager.phase(), ColdStartPhase::Normal);
}

#[test]
fn cold_start_state_round_trips_through_manager_snapshot_and_restore() {
    let mut manager = ColdStartManager::new(ColdStartConfig::default());
    manager.update(0.9, 0.05);
    manager.update(0.85, 0.05);
    manager.update(0.9, 0.05);
    let state = manager.state().clone();

    let restored = ColdStartManager::from_state(ColdStartConfig::default(), state.clone());
    assert_eq!(restored.phase(), manager.phase());
    assert_eq!(restored.user_type(), manager.user_type());
}

#[test]
fn ensemble_snapshot_restore_preserves_linucb_and_thompson_state_after_many_updates() {
    let config = AMASConfig::default();
    let mut ensemble = EnsembleDecision::new(&config);
    for i in 0..30 {
        let selection = ensemble.select(&UserState::default(), &ctx(), ColdStartPhase::Normal, None);
        ensemble.update(&UserState::default(), &ctx(), &selection.action_key, outcome(if i % 2 == 0 { 0.8 } else { -0.2 }, i % 2 == 0));
    }
    let snapshot = ensemble.snapshot();

    let mut restored = EnsembleDecision::new(&config);
    restored.restore(snapshot).unwrap();

    let original_selection = ensemble.select(&UserState::default(), &ctx(), ColdStartPhase::Normal, None);
    let restored_selection = restored.select(&UserState::default(), &ctx(), ColdStartPhase::Normal, None);
    assert_eq!(original_selection.action_key, restored_selection.action_key);
}
