//! Concurrent access from many sessions at once.

use hebb_runtime::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use ConversationState::*;

const THREADS: usize = 8;
const ROUNDS: usize = 50;

#[test]
fn concurrent_observations_are_not_lost() {
    let manager = Arc::new(LearningManager::default());
    let readings: BTreeMap<String, f64> = [("humor", 0.9), ("warmth", 0.8)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let manager = Arc::clone(&manager);
            let readings = readings.clone();
            thread::spawn(move || {
                let session = SessionId::from(format!("worker-{}", t));
                for _ in 0..ROUNDS {
                    manager.vocabulary().observe("ngl", ContextType::CasualChat).unwrap();
                    manager.dimensions().observe(&readings, Some(0.8)).unwrap();
                    manager
                        .sequences()
                        .observe_transition(&session, ProblemStatement, TechnicalExplanation, None)
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let total = (THREADS * ROUNDS) as u64;
    let ngl = manager
        .vocabulary()
        .export_all()
        .into_iter()
        .find(|a| a.term == "ngl" && a.context == ContextType::CasualChat)
        .unwrap();
    assert_eq!(ngl.observation_count, total);

    let pair = manager
        .dimensions()
        .export_all()
        .coactivations
        .into_iter()
        .find(|c| c.pair == DimensionPair::new("humor", "warmth"))
        .unwrap();
    assert_eq!(pair.observation_count, total);
    assert!(pair.strength <= 1.0);

    let edge = manager
        .sequences()
        .export_all()
        .transitions
        .into_iter()
        .find(|t| t.state_from == ProblemStatement && t.state_to == TechnicalExplanation)
        .unwrap();
    assert_eq!(edge.transition_count, total);
    assert_eq!(edge.transition_probability, 1.0);
}

#[test]
fn parallel_sessions_keep_separate_histories() {
    let manager = Arc::new(LearningManager::default());
    let scripts: [(&str, [&str; 3]); 2] = [
        ("alpha", ["hey", "I need to parse CSV files", "thanks, that worked"]),
        ("beta", ["I need help", "thanks", "hey"]),
    ];

    let handles: Vec<_> = scripts
        .iter()
        .map(|(name, messages)| {
            let manager = Arc::clone(&manager);
            let session = SessionId::from(*name);
            let messages = *messages;
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    for message in messages {
                        let result = manager.process_turn(
                            &session,
                            message,
                            "",
                            &ContextSignals::default(),
                            &BTreeMap::new(),
                        );
                        assert!(result.errors.is_empty());
                    }
                    assert!(manager.end_session(&session));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(manager.turn_count(), (2 * 3 * ROUNDS) as u64);
    // a shared previous state would let beta's turns follow alpha's greeting
    assert_eq!(
        manager.sequences().predict_next_states(CasualChat, 1)[0].0,
        ProblemStatement
    );
    let stats = manager.system_stats();
    assert_eq!(stats.sequences.observations, (2 * 2 * ROUNDS) as u64);
    assert_eq!(stats.sequences.sessions, 0);
}

#[test]
fn turn_numbers_are_unique_under_contention() {
    let manager = Arc::new(LearningManager::default());
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                let session = SessionId::from(format!("s-{}", t));
                (0..ROUNDS)
                    .map(|_| {
                        manager
                            .process_turn(&session, "hey", "", &ContextSignals::default(), &BTreeMap::new())
                            .turn
                    })
                    .collect::<Vec<u64>>()
            })
        })
        .collect();

    let mut turns: Vec<u64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
    turns.sort_unstable();
    let expected: Vec<u64> = (1..=(THREADS * ROUNDS) as u64).collect();
    assert_eq!(turns, expected);
}

#[test]
fn cache_stays_consistent_with_concurrent_readers() {
    let manager = Arc::new(LearningManager::default());
    for _ in 0..20 {
        manager.vocabulary().observe("ngl", ContextType::CasualChat).unwrap();
    }

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    assert!(manager.cached_should_use("ngl", ContextType::CasualChat, None));
                    assert!(!manager.cached_should_use("ngl", ContextType::Debugging, None));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let stats = manager.system_stats().should_use_cache;
    assert_eq!(stats.hits + stats.misses, (THREADS * ROUNDS * 2) as u64);
    assert_eq!(stats.size, 2);
}
