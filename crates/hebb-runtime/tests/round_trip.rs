//! Export/import of whole learned state.

use hebb_runtime::prelude::*;
use std::collections::BTreeMap;
use ConversationState::*;

fn readings(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

/// A manager that has learned a little of everything, templates included.
fn trained() -> LearningManager {
    let mut config = LearningConfig::default();
    config.sequences.pattern_threshold = 2;
    let manager = LearningManager::new(config).unwrap();
    for i in 0..3 {
        let session = SessionId::from(format!("s-{}", i));
        for message in ["hey", "I need to parse CSV files", "thanks, that worked"] {
            manager.process_turn(
                &session,
                message,
                "",
                &ContextSignals::default(),
                &readings(&[("humor", 0.9), ("warmth", 0.8), ("empathy", 0.75), ("verbosity", 0.1)]),
            );
        }
    }
    for _ in 0..12 {
        manager.vocabulary().observe("ngl", ContextType::CasualChat).unwrap();
    }
    manager
        .vocabulary()
        .set_override("lol", ContextType::FormalTechnical, 0.0)
        .unwrap();
    manager
        .vocabulary()
        .set_substitution("gonna", ContextType::FormalTechnical, "going to")
        .unwrap();
    manager
}

#[test]
fn json_export_loads_into_an_equivalent_manager() {
    let original = trained();
    let exported = original.export_all();
    assert!(!exported.sequences.templates.is_empty());
    assert!(!exported.dimensions.patterns.is_empty());
    assert!(!exported.dimensions.negative_correlations.is_empty());

    let json = serde_json::to_string(&exported).unwrap();
    let parsed: LearningSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, exported);

    let fresh = LearningManager::default();
    let loaded = fresh.import(&parsed).unwrap();
    assert_eq!(loaded, exported.record_count());
    assert!(fresh.export_all().same_contents(&exported));
    assert_eq!(fresh.config().sequences.pattern_threshold, 2);

    for (term, context) in [
        ("ngl", ContextType::CasualChat),
        ("ngl", ContextType::FormalTechnical),
        ("lol", ContextType::FormalTechnical),
        ("csv", ContextType::Debugging),
    ] {
        assert_eq!(
            fresh.vocabulary().strength_of(term, context),
            original.vocabulary().strength_of(term, context)
        );
        assert_eq!(
            fresh.cached_should_use(term, context, None),
            original.cached_should_use(term, context, None)
        );
    }
    assert_eq!(
        fresh.sequences().export_transition_matrix(),
        original.sequences().export_transition_matrix()
    );
    let known = readings(&[("humor", 0.95)]);
    assert_eq!(fresh.cached_predict(&known, Some(0.0)), original.cached_predict(&known, Some(0.0)));
}

#[test]
fn imported_adjustments_shape_filtering() {
    let original = LearningManager::default();
    for term in ["lol", "gonna"] {
        original.vocabulary().observe(term, ContextType::CasualChat).unwrap();
    }
    original
        .vocabulary()
        .set_override("lol", ContextType::FormalTechnical, 0.0)
        .unwrap();
    original
        .vocabulary()
        .set_substitution("gonna", ContextType::FormalTechnical, "going to")
        .unwrap();

    let fresh = LearningManager::default();
    fresh.import(&original.export_all()).unwrap();
    let text = "I'm gonna check that, lol.";
    assert_eq!(
        fresh.filter_vocabulary(text, ContextType::FormalTechnical, None),
        "I'm going to check that."
    );
    assert_eq!(fresh.filter_vocabulary(text, ContextType::CasualChat, Some(0.0)), text);
}

#[test]
fn import_replaces_same_keyed_records() {
    let manager = trained();
    let mut snapshot = manager.export_all();
    for a in snapshot.associations.iter_mut().filter(|a| a.term == "ngl") {
        a.strength = 0.2;
    }
    manager.import(&snapshot).unwrap();
    assert_eq!(manager.vocabulary().strength_of("ngl", ContextType::CasualChat), 0.2);
    assert_eq!(
        manager.export_all().associations.len(),
        snapshot.associations.len()
    );
}

#[test]
fn invalid_config_in_snapshot_changes_nothing() {
    let manager = LearningManager::default();
    let mut snapshot = trained().export_all();
    let rate = snapshot
        .config
        .iter_mut()
        .find(|c| c.component == "vocab" && c.parameter == "learning_rate")
        .unwrap();
    rate.value = 3.0;

    assert!(manager.import(&snapshot).is_err());
    assert_eq!(manager.config(), LearningConfig::default());
    assert!(manager.vocabulary().export_all().is_empty());
    assert_eq!(manager.sequences().transition_probability(CasualChat, ProblemStatement), 0.0);
}

#[test]
fn sparse_snapshot_fills_defaults() {
    let json = r#"{
        "metadata": {
            "snapshotId": "hand-written",
            "createdAt": "2026-01-01T00:00:00Z",
            "version": 1
        },
        "associations": [{
            "term": "ngl",
            "contextType": "casual_chat",
            "strength": 0.8,
            "observationCount": 9,
            "firstObserved": "2026-01-01T00:00:00Z",
            "lastUpdated": "2026-01-01T00:00:00Z"
        }]
    }"#;
    let snapshot: LearningSnapshot = serde_json::from_str(json).unwrap();
    assert_eq!(snapshot.metadata.turns, 0);
    assert!(snapshot.sequences.transitions.is_empty());

    let manager = LearningManager::default();
    assert_eq!(manager.import(&snapshot).unwrap(), 1);
    assert_eq!(manager.vocabulary().strength_of("ngl", ContextType::CasualChat), 0.8);
    assert_eq!(manager.config(), LearningConfig::default());
}
