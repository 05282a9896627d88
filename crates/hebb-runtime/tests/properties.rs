//! Property-based tests for the learning invariants.
//!
//! Strengths stay in [0, 1] whatever the rates, pairs are order-free,
//! decay only ever lowers strengths and every source state's outgoing
//! probabilities sum to one.

#![allow(clippy::float_cmp)]

use chrono::{Duration, Utc};
use hebb_core::config::{DimensionConfig, VocabConfig};
use hebb_runtime::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

const TERMS: [&str; 4] = ["ngl", "lol", "indeed", "segfault"];
const DIMENSIONS: [&str; 5] = ["humor", "warmth", "verbosity", "formality", "empathy"];

fn rate() -> impl Strategy<Value = f64> {
    0.0f64..=1.0f64
}

fn context() -> impl Strategy<Value = ContextType> {
    (0usize..ContextType::ALL.len()).prop_map(|i| ContextType::ALL[i])
}

fn state() -> impl Strategy<Value = ConversationState> {
    (0usize..ConversationState::ALL.len()).prop_map(|i| ConversationState::ALL[i])
}

/// A reading for a random subset of the known dimensions.
fn readings() -> impl Strategy<Value = BTreeMap<String, f64>> {
    proptest::collection::btree_map(
        (0usize..DIMENSIONS.len()).prop_map(|i| DIMENSIONS[i].to_string()),
        0.0f64..=1.0f64,
        0..=DIMENSIONS.len(),
    )
}

fn vocab_engine(learning_rate: f64, competitive_rate: f64) -> VocabularyAssociationEngine {
    let config = VocabConfig {
        learning_rate,
        competitive_rate,
        ..LearningConfig::default().vocab
    };
    VocabularyAssociationEngine::new(config, Arc::new(PersistenceLane::detached()))
}

fn dimension_engine(learning_rate: f64) -> DimensionCoactivationEngine {
    let config = DimensionConfig {
        learning_rate,
        ..LearningConfig::default().dimensions
    };
    DimensionCoactivationEngine::new(config, Arc::new(PersistenceLane::detached()))
}

proptest! {
    #[test]
    fn vocabulary_strengths_stay_in_unit_interval(
        learning_rate in rate(),
        competitive_rate in rate(),
        observations in proptest::collection::vec((0usize..TERMS.len(), context()), 1..60),
    ) {
        let vocab = vocab_engine(learning_rate, competitive_rate);
        for (term, context) in &observations {
            let event = vocab.observe(TERMS[*term], *context).unwrap();
            prop_assert!(event.after >= event.before);
        }
        for a in vocab.export_all() {
            prop_assert!((0.0..=1.0).contains(&a.strength), "{} / {} = {}", a.term, a.context, a.strength);
        }
    }

    #[test]
    fn coactivation_is_symmetric_and_bounded(
        learning_rate in rate(),
        batches in proptest::collection::vec(readings(), 1..30),
    ) {
        let dims = dimension_engine(learning_rate);
        for r in &batches {
            dims.observe(r, None).unwrap();
        }
        for a in DIMENSIONS {
            for b in DIMENSIONS {
                let ab = dims.coactivation_strength(a, b);
                prop_assert_eq!(ab, dims.coactivation_strength(b, a));
                prop_assert!((0.0..=1.0).contains(&ab));
            }
        }
        for n in dims.negative_correlations(0.0) {
            prop_assert!((0.0..=1.0).contains(&n.correlation_strength));
        }
    }

    #[test]
    fn decay_never_strengthens(
        observations in proptest::collection::vec((0usize..TERMS.len(), context()), 1..30),
        batches in proptest::collection::vec(readings(), 1..10),
        idle_days in 0i64..400,
        threshold in 0.0f64..30.0,
    ) {
        let manager = LearningManager::default();
        let start = Utc::now();
        for (term, context) in &observations {
            manager.vocabulary().observe_at(TERMS[*term], *context, start).unwrap();
        }
        for r in &batches {
            manager.dimensions().observe_at(r, None, start).unwrap();
        }
        let before = manager.export_all();

        manager.apply_decay_all_at(threshold, start + Duration::days(idle_days)).unwrap();
        let after = manager.export_all();

        prop_assert_eq!(before.associations.len(), after.associations.len());
        for (b, a) in before.associations.iter().zip(&after.associations) {
            prop_assert!(a.strength <= b.strength);
            prop_assert!(a.strength >= 0.0);
        }
        for (b, a) in before.dimensions.coactivations.iter().zip(&after.dimensions.coactivations) {
            prop_assert!(a.strength <= b.strength);
            prop_assert!(a.strength >= 0.0);
        }
    }

    #[test]
    fn outgoing_probabilities_sum_to_one(
        transitions in proptest::collection::vec((state(), state()), 1..80),
    ) {
        let seq = SequenceLearningEngine::in_memory();
        let session = SessionId::from("prop");
        for (from, to) in &transitions {
            seq.observe_transition(&session, *from, *to, None).unwrap();
        }
        for (from, row) in seq.export_transition_matrix() {
            let total: f64 = row.values().sum();
            prop_assert!((total - 1.0).abs() < 1e-9, "row {} sums to {}", from, total);
            let ranked = seq.predict_next_states(from, ConversationState::ALL.len());
            prop_assert!(ranked.windows(2).all(|w| w[0].1 >= w[1].1));
        }
    }

    #[test]
    fn predictions_respect_threshold_and_input(
        batches in proptest::collection::vec(readings(), 1..30),
        known in readings(),
        threshold in 0.0f64..=1.0,
    ) {
        let dims = dimension_engine(0.3);
        for r in &batches {
            dims.observe(r, None).unwrap();
        }
        for (name, p) in dims.predict(&known, Some(threshold)) {
            prop_assert!(!known.contains_key(&name));
            prop_assert!(p.confidence >= threshold);
            prop_assert!((0.0..=1.0).contains(&p.value));
            prop_assert!(!p.sources.is_empty());
        }
    }
}
