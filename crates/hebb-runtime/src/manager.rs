//! Learning manager: one entry point over the three engines.
//!
//! Each turn is classified, fanned out to the vocabulary, dimension and
//! sequence engines, and answered with predictions. Engine failures are
//! recorded in the turn result and never stop the other engines. Query
//! caches are dropped wholesale every `cache_refresh_interval` turns and
//! decay/prune maintenance runs every `maintenance_interval` turns.

use crate::backend::{create_store, DynStore, StoreConfig};
use crate::cache::QueryCache;
use crate::classifier::ContextClassifier;
use crate::dimensions::{DimensionCoactivationEngine, DimensionExport, DimensionPrediction};
use crate::metrics::{HealthSummary, SystemStats};
use crate::persistence::PersistenceLane;
use crate::sequence::{Anticipation, SequenceExport, SequenceLearningEngine};
use crate::snapshot::{self, LearningSnapshot, SnapshotMetadata};
use crate::vocabulary::VocabularyAssociationEngine;
use chrono::Utc;
use hebb_core::config::{param_spec, LearningConfig};
use hebb_core::error::{ConfigError, HebbError, Result};
use hebb_core::records::{Association, ConfigRecord};
use hebb_core::store::{Record, RecordKind};
use hebb_core::text::normalize_term;
use hebb_core::types::{ContextSignals, ContextType, ConversationState, SessionId, Timestamp};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How many next states a turn result lists.
const NEXT_STATE_PREDICTIONS: usize = 3;

type ShouldUseKey = (String, ContextType, u64);
type PredictKey = (Vec<(String, u64)>, u64);

/// Which engine a turn error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStage {
    Dimensions,
    Sequences,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnError {
    pub stage: TurnStage,
    #[serde(serialize_with = "serialize_display")]
    pub error: HebbError,
}

fn serialize_display<S: serde::Serializer>(error: &HebbError, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.collect_str(error)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TurnPredictions {
    pub next_states: Vec<(ConversationState, f64)>,
    /// Dimensions not supplied this turn, predicted from the ones that were.
    pub coactivations: BTreeMap<String, DimensionPrediction>,
    pub anticipation: Option<Anticipation>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecayReport {
    pub associations: usize,
    pub coactivations: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub associations: usize,
    pub coactivations: usize,
    pub sequences: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub decayed: DecayReport,
    pub pruned: PruneReport,
}

/// Outcome of one processed turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnResult {
    pub session: SessionId,
    pub turn: u64,
    pub state: ConversationState,
    pub context_type: ContextType,
    pub vocab_observations: usize,
    pub coactivations_updated: usize,
    pub state_transitions: usize,
    /// Pattern templates created or refreshed by this turn.
    pub templates: Vec<String>,
    pub predictions: TurnPredictions,
    pub latency: Duration,
    pub errors: Vec<TurnError>,
    pub caches_invalidated: bool,
    pub maintenance: Option<MaintenanceReport>,
}

/// Record counts loaded by [`LearningManager::hydrate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HydrationReport {
    pub config: usize,
    pub associations: usize,
    pub dimension_records: usize,
    pub sequence_records: usize,
}

pub struct LearningManager {
    config: RwLock<LearningConfig>,
    vocab: VocabularyAssociationEngine,
    dimensions: DimensionCoactivationEngine,
    sequences: SequenceLearningEngine,
    contexts: ContextClassifier,
    lane: Arc<PersistenceLane>,
    should_use_cache: QueryCache<ShouldUseKey, bool>,
    predict_cache: QueryCache<PredictKey, BTreeMap<String, DimensionPrediction>>,
    turns: AtomicU64,
    turn_errors: AtomicU64,
    maintenance_runs: AtomicU64,
    latency_total_us: AtomicU64,
}

impl LearningManager {
    /// A manager with no store: learning lives in memory only.
    pub fn new(config: LearningConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, PersistenceLane::detached()))
    }

    /// A manager writing through to `store`. Call [`hydrate`](Self::hydrate)
    /// to load what the store already holds.
    pub fn with_store(config: LearningConfig, store: DynStore) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, PersistenceLane::new(store)))
    }

    pub fn from_store_config(config: LearningConfig, store: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let store = create_store(store)?;
        Ok(Self::build(config, PersistenceLane::from_option(store)))
    }

    fn build(config: LearningConfig, lane: PersistenceLane) -> Self {
        let lane = Arc::new(lane);
        Self {
            vocab: VocabularyAssociationEngine::new(config.vocab.clone(), lane.clone()),
            dimensions: DimensionCoactivationEngine::new(config.dimensions.clone(), lane.clone()),
            sequences: SequenceLearningEngine::new(
                config.sequences.clone(),
                config.safety.max_sessions,
                lane.clone(),
            ),
            contexts: ContextClassifier::default(),
            should_use_cache: QueryCache::new(config.performance.cache_size),
            predict_cache: QueryCache::new(config.performance.cache_size),
            config: RwLock::new(config),
            lane,
            turns: AtomicU64::new(0),
            turn_errors: AtomicU64::new(0),
            maintenance_runs: AtomicU64::new(0),
            latency_total_us: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> LearningConfig {
        self.config.read().clone()
    }

    pub fn vocabulary(&self) -> &VocabularyAssociationEngine {
        &self.vocab
    }

    pub fn dimensions(&self) -> &DimensionCoactivationEngine {
        &self.dimensions
    }

    pub fn sequences(&self) -> &SequenceLearningEngine {
        &self.sequences
    }

    pub fn persistence(&self) -> &PersistenceLane {
        &self.lane
    }

    pub fn turn_count(&self) -> u64 {
        self.turns.load(Ordering::Relaxed)
    }

    /// Context type used for vocabulary learning on this message.
    pub fn classify_context(&self, message: &str, signals: &ContextSignals) -> ContextType {
        self.contexts.classify(message, signals)
    }

    /// Learn from one conversational turn and answer with predictions.
    ///
    /// Only the user `message` feeds vocabulary learning; the assistant
    /// `response` is logged by length and otherwise ignored.
    pub fn process_turn_at(
        &self,
        session: &SessionId,
        message: &str,
        response: &str,
        signals: &ContextSignals,
        readings: &BTreeMap<String, f64>,
        at: Timestamp,
    ) -> TurnResult {
        let started = Instant::now();
        let turn = self.turns.fetch_add(1, Ordering::Relaxed) + 1;
        let mut errors = Vec::new();

        let state = self.sequences.classify_state(message, signals);
        let context_type = self.contexts.classify(message, signals);

        let observed = self.vocab.observe_message_at(message, context_type, at);

        let mut coactivations_updated = 0;
        if !readings.is_empty() {
            match self.dimensions.observe_at(readings, signals.satisfaction, at) {
                Ok(update) => coactivations_updated = update.pairs_updated,
                Err(error) => errors.push(TurnError {
                    stage: TurnStage::Dimensions,
                    error,
                }),
            }
        }

        let mut state_transitions = 0;
        let mut templates = Vec::new();
        if let Some(previous) = self.sequences.previous_state(session) {
            match self
                .sequences
                .observe_transition_at(session, previous, state, signals.satisfaction, at)
            {
                Ok(outcome) => {
                    state_transitions = 1;
                    templates = outcome.templates;
                }
                Err(error) => errors.push(TurnError {
                    stage: TurnStage::Sequences,
                    error,
                }),
            }
        }
        self.sequences.set_previous_state_at(session, state, at);

        let predictions = TurnPredictions {
            next_states: self.sequences.predict_next_states(state, NEXT_STATE_PREDICTIONS),
            coactivations: self.cached_predict(readings, None),
            anticipation: self.sequences.anticipate_need_at(session, state, at),
        };

        let performance = self.config.read().performance.clone();
        let caches_invalidated =
            performance.cache_refresh_interval > 0 && turn % performance.cache_refresh_interval == 0;
        if caches_invalidated {
            self.invalidate_caches();
        }
        let maintenance = (performance.maintenance_interval > 0
            && turn % performance.maintenance_interval == 0)
            .then(|| self.run_maintenance_at(at));

        if !errors.is_empty() {
            self.turn_errors.fetch_add(errors.len() as u64, Ordering::Relaxed);
            for e in &errors {
                warn!(%session, stage = ?e.stage, error = %e.error, "turn stage failed");
            }
        }

        let latency = started.elapsed();
        self.latency_total_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        debug!(
            %session,
            turn,
            %state,
            context = %context_type,
            terms = observed.len(),
            coactivations = coactivations_updated,
            transitions = state_transitions,
            response_len = response.len(),
            latency_us = latency.as_micros() as u64,
            "processed turn"
        );

        TurnResult {
            session: session.clone(),
            turn,
            state,
            context_type,
            vocab_observations: observed.len(),
            coactivations_updated,
            state_transitions,
            templates,
            predictions,
            latency,
            errors,
            caches_invalidated,
            maintenance,
        }
    }

    pub fn process_turn(
        &self,
        session: &SessionId,
        message: &str,
        response: &str,
        signals: &ContextSignals,
        readings: &BTreeMap<String, f64>,
    ) -> TurnResult {
        self.process_turn_at(session, message, response, signals, readings, Utc::now())
    }

    /// `should_use` through the query cache, keyed by (term, context, threshold).
    pub fn cached_should_use(&self, term: &str, context: ContextType, threshold: Option<f64>) -> bool {
        let threshold = threshold.unwrap_or_else(|| self.config.read().vocab.confidence_threshold);
        let key = (normalize_term(term), context, threshold.to_bits());
        self.should_use_cache
            .get_or_insert_with(key, || self.vocab.should_use(term, context, Some(threshold)))
    }

    /// `predict` through the query cache, keyed by the sorted readings and threshold.
    pub fn cached_predict(
        &self,
        known: &BTreeMap<String, f64>,
        threshold: Option<f64>,
    ) -> BTreeMap<String, DimensionPrediction> {
        let threshold =
            threshold.unwrap_or_else(|| self.config.read().dimensions.prediction_confidence);
        let snapshot = known.iter().map(|(k, v)| (k.clone(), v.to_bits())).collect();
        self.predict_cache
            .get_or_insert_with((snapshot, threshold.to_bits()), || {
                self.dimensions.predict(known, Some(threshold))
            })
    }

    /// Drop every cached query. Returns how many entries were dropped.
    pub fn invalidate_caches(&self) -> usize {
        let dropped = self.should_use_cache.invalidate() + self.predict_cache.invalidate();
        info!(dropped, "invalidated query caches");
        dropped
    }

    pub fn filter_vocabulary(&self, response: &str, context: ContextType, threshold: Option<f64>) -> String {
        self.vocab.filter_vocabulary(response, context, threshold)
    }

    pub fn anticipate_need(&self, session: &SessionId, current: ConversationState) -> Option<Anticipation> {
        self.sequences.anticipate_need(session, current)
    }

    pub fn end_session(&self, session: &SessionId) -> bool {
        self.sequences.end_session(session)
    }

    pub fn apply_decay_all_at(&self, days_inactive: f64, now: Timestamp) -> Result<DecayReport> {
        let report = DecayReport {
            associations: self.vocab.apply_decay_at(days_inactive, now)?,
            coactivations: self.dimensions.apply_decay_at(days_inactive, now)?,
        };
        self.invalidate_caches();
        Ok(report)
    }

    pub fn apply_decay_all(&self, days_inactive: f64) -> Result<DecayReport> {
        self.apply_decay_all_at(days_inactive, Utc::now())
    }

    pub fn prune_all(&self, min_strength: f64, min_observations: u64) -> PruneReport {
        let report = PruneReport {
            associations: self.vocab.prune(min_strength, min_observations),
            coactivations: self.dimensions.prune(min_strength, min_observations),
            sequences: self.sequences.prune_sequences(min_observations),
        };
        self.invalidate_caches();
        report
    }

    /// Decay then prune with the configured safety thresholds.
    pub fn run_maintenance_at(&self, now: Timestamp) -> MaintenanceReport {
        let safety = self.config.read().safety.clone();
        let decayed = self
            .apply_decay_all_at(safety.decay_inactive_days, now)
            .unwrap_or_else(|e| {
                warn!(error = %e, "scheduled decay skipped");
                DecayReport::default()
            });
        let pruned = self.prune_all(safety.prune_min_strength, safety.prune_min_observations);
        self.maintenance_runs.fetch_add(1, Ordering::Relaxed);
        let report = MaintenanceReport { decayed, pruned };
        info!(?report, "maintenance complete");
        report
    }

    /// Validate and apply one parameter, then persist it.
    ///
    /// On rejection nothing changes.
    pub fn set_parameter(&self, component: &str, parameter: &str, value: f64) -> std::result::Result<(), ConfigError> {
        let updated = {
            let mut config = self.config.write();
            config.set_parameter(component, parameter, value)?;
            config.clone()
        };
        self.apply_config(&updated);

        let spec = param_spec(component, parameter)?;
        self.lane.write(Record::Config(ConfigRecord {
            component: component.to_string(),
            parameter: parameter.to_string(),
            value: updated.get_parameter(component, parameter)?,
            description: spec.description.to_string(),
        }));
        info!(component, parameter, value, "parameter updated");
        Ok(())
    }

    fn apply_config(&self, config: &LearningConfig) {
        self.vocab.set_config(config.vocab.clone());
        self.dimensions.set_config(config.dimensions.clone());
        self.sequences.set_config(config.sequences.clone());
        self.sequences.set_max_sessions(config.safety.max_sessions);
        self.should_use_cache.set_capacity(config.performance.cache_size);
        self.predict_cache.set_capacity(config.performance.cache_size);
        self.invalidate_caches();
    }

    fn apply_config_records(&self, records: &[ConfigRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let updated = {
            let mut config = self.config.write();
            config.apply_records(records)?;
            config.clone()
        };
        self.apply_config(&updated);
        Ok(())
    }

    /// Load everything the store holds, configuration first.
    pub fn hydrate(&self) -> Result<HydrationReport> {
        let mut config = Vec::new();
        for record in self.lane.load(RecordKind::Config)? {
            if let Record::Config(c) = record {
                config.push(c);
            }
        }
        self.apply_config_records(&config)?;

        let mut associations: Vec<Association> = Vec::new();
        let mut dimensions = DimensionExport::default();
        let mut sequences = SequenceExport::default();
        for kind in [
            RecordKind::Association,
            RecordKind::Coactivation,
            RecordKind::Pattern,
            RecordKind::NegativeCorrelation,
            RecordKind::Transition,
            RecordKind::Sequence,
            RecordKind::Template,
        ] {
            for record in self.lane.load(kind)? {
                match record {
                    Record::Association(a) => associations.push(a),
                    Record::Coactivation(c) => dimensions.coactivations.push(c),
                    Record::Pattern(p) => dimensions.patterns.push(p),
                    Record::NegativeCorrelation(n) => dimensions.negative_correlations.push(n),
                    Record::Transition(t) => sequences.transitions.push(t),
                    Record::Sequence(s) => sequences.sequences.push(s),
                    Record::Template(t) => sequences.templates.push(t),
                    Record::Config(_) => {}
                }
            }
        }

        let report = HydrationReport {
            config: config.len(),
            associations: self.vocab.restore(&associations, false),
            dimension_records: self.dimensions.restore(&dimensions, false),
            sequence_records: self.sequences.restore(&sequences, false),
        };
        self.invalidate_caches();
        info!(?report, backend = self.lane.backend_name(), "hydrated from store");
        Ok(report)
    }

    /// Everything learned, plus configuration and manual adjustments.
    pub fn export_all(&self) -> LearningSnapshot {
        LearningSnapshot::new(
            self.config.read().records(),
            self.vocab.export_all(),
            self.vocab.export_overrides(),
            self.vocab.export_substitutions(),
            self.dimensions.export_all(),
            self.sequences.export_all(),
            self.turn_count(),
        )
    }

    /// Load a snapshot, replacing same-keyed records. Configuration is
    /// applied all-or-nothing before any record is touched.
    pub fn import(&self, snapshot: &LearningSnapshot) -> Result<usize> {
        self.apply_config_records(&snapshot.config)?;
        for record in &snapshot.config {
            self.lane.write(Record::Config(record.clone()));
        }

        let mut loaded = self.vocab.import(&snapshot.associations);
        for o in &snapshot.overrides {
            self.vocab.set_override(&o.term, o.context, o.value)?;
        }
        for s in &snapshot.substitutions {
            self.vocab.set_substitution(&s.term, s.context, &s.replacement)?;
        }
        loaded += self.dimensions.import(&snapshot.dimensions);
        loaded += self.sequences.import(&snapshot.sequences);
        self.invalidate_caches();
        info!(loaded, snapshot = %snapshot.metadata.snapshot_id, "imported snapshot");
        Ok(loaded)
    }

    pub fn save_snapshot(&self, path: &Path) -> Result<SnapshotMetadata> {
        let snapshot = self.export_all();
        snapshot::save_snapshot(&snapshot, path)?;
        Ok(snapshot.metadata)
    }

    pub fn load_snapshot(&self, path: &Path) -> Result<usize> {
        let snapshot = snapshot::load_snapshot(path)?;
        self.import(&snapshot)
    }

    /// Probe a degraded store; true when persistence is healthy afterwards.
    pub fn try_recover_persistence(&self) -> bool {
        self.lane.try_recover()
    }

    pub fn system_stats(&self) -> SystemStats {
        let turns = self.turn_count();
        SystemStats {
            turns,
            turn_errors: self.turn_errors.load(Ordering::Relaxed),
            maintenance_runs: self.maintenance_runs.load(Ordering::Relaxed),
            avg_turn_latency_us: if turns == 0 {
                0.0
            } else {
                self.latency_total_us.load(Ordering::Relaxed) as f64 / turns as f64
            },
            vocab: self.vocab.stats(),
            dimensions: self.dimensions.stats(),
            sequences: self.sequences.stats(),
            persistence: self.lane.stats(),
            should_use_cache: self.should_use_cache.stats(),
            predict_cache: self.predict_cache.stats(),
        }
    }

    pub fn health_summary(&self) -> HealthSummary {
        HealthSummary::from(&self.system_stats())
    }
}

impl Default for LearningManager {
    fn default() -> Self {
        Self::build(LearningConfig::default(), PersistenceLane::detached())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::metrics::HealthStatus;
    use crate::persistence::testing::FlakyStore;
    use hebb_core::store::AssociationStore;

    fn readings(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn signals() -> ContextSignals {
        ContextSignals::default()
    }

    #[test]
    fn turn_fans_out_to_every_engine() {
        let m = LearningManager::default();
        let s = SessionId::from("s");
        let first = m.process_turn(&s, "I need to parse CSV files", "", &signals(), &readings(&[("humor", 0.9), ("warmth", 0.8)]));
        assert_eq!(first.state, ConversationState::ProblemStatement);
        assert_eq!(first.turn, 1);
        assert!(first.vocab_observations > 0);
        assert_eq!(first.coactivations_updated, 1);
        assert_eq!(first.state_transitions, 0);
        assert!(first.errors.is_empty());

        let second = m.process_turn(&s, "thanks, that worked", "", &signals(), &BTreeMap::new());
        assert_eq!(second.state, ConversationState::PositiveFeedback);
        assert_eq!(second.state_transitions, 1);
        assert_eq!(
            m.sequences().transition_probability(ConversationState::ProblemStatement, ConversationState::PositiveFeedback),
            1.0
        );
    }

    #[test]
    fn response_text_is_not_learned() {
        let m = LearningManager::default();
        m.process_turn(&SessionId::from("s"), "hey", "totally unique wording", &signals(), &BTreeMap::new());
        assert!(m.vocabulary().top_contexts("wording", 6).is_empty());
        assert!(!m.vocabulary().top_contexts("hey", 6).is_empty());
    }

    #[test]
    fn bad_readings_are_reported_not_fatal() {
        let m = LearningManager::default();
        let s = SessionId::from("s");
        m.process_turn(&s, "hello", "", &signals(), &BTreeMap::new());
        let result = m.process_turn(&s, "I need help", "", &signals(), &readings(&[("humor", f64::NAN)]));
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].stage, TurnStage::Dimensions);
        assert_eq!(result.state_transitions, 1);
        assert!(result.vocab_observations > 0);
        assert_eq!(m.system_stats().turn_errors, 1);
    }

    #[test]
    fn caches_count_and_refresh() {
        let mut config = LearningConfig::default();
        config.performance.cache_refresh_interval = 2;
        let m = LearningManager::new(config).unwrap();
        m.cached_should_use("ngl", ContextType::CasualChat, None);
        m.cached_should_use("ngl", ContextType::CasualChat, None);
        let stats = m.system_stats().should_use_cache;
        assert_eq!((stats.hits, stats.misses, stats.size), (1, 1, 1));

        let s = SessionId::from("s");
        assert!(!m.process_turn(&s, "hi", "", &signals(), &BTreeMap::new()).caches_invalidated);
        assert!(m.process_turn(&s, "hi", "", &signals(), &BTreeMap::new()).caches_invalidated);
        assert_eq!(m.system_stats().should_use_cache.size, 0);
    }

    #[test]
    fn cached_predict_keys_on_values() {
        let m = LearningManager::default();
        let r = readings(&[("humor", 1.0), ("warmth", 1.0)]);
        for _ in 0..6 {
            m.dimensions().observe(&r, None).unwrap();
        }
        let a = m.cached_predict(&readings(&[("humor", 0.9)]), Some(0.5));
        let b = m.cached_predict(&readings(&[("humor", 0.9)]), Some(0.5));
        assert_eq!(a, b);
        assert!(a.contains_key("warmth"));
        m.cached_predict(&readings(&[("humor", 0.8)]), Some(0.5));
        let stats = m.system_stats().predict_cache;
        assert_eq!((stats.hits, stats.misses), (1, 2));
    }

    #[test]
    fn scheduled_maintenance_runs() {
        let mut config = LearningConfig::default();
        config.performance.maintenance_interval = 3;
        let m = LearningManager::new(config).unwrap();
        let s = SessionId::from("s");
        let results: Vec<_> = (0..3)
            .map(|_| m.process_turn(&s, "hey", "", &signals(), &BTreeMap::new()))
            .collect();
        assert!(results[0].maintenance.is_none());
        assert!(results[2].maintenance.is_some());
        assert_eq!(m.system_stats().maintenance_runs, 1);
    }

    #[test]
    fn turn_touches_session_at_the_given_time() {
        let m = LearningManager::default();
        let s = SessionId::from("s");
        let at = Utc::now() - chrono::Duration::days(2);
        m.process_turn_at(&s, "hey", "", &signals(), &BTreeMap::new(), at);
        assert_eq!(m.sequences().last_touched(&s), Some(at));
    }

    #[test]
    fn maintenance_passes_at_one_instant_decay_once() {
        let start = Utc::now();
        let later = start + chrono::Duration::days(8);
        let once = LearningManager::default();
        let many = LearningManager::default();
        for m in [&once, &many] {
            m.vocabulary().observe_at("rust", ContextType::Teaching, start).unwrap();
        }

        once.apply_decay_all_at(7.0, later).unwrap();
        for _ in 0..20 {
            many.run_maintenance_at(later);
        }

        let expected = once.vocabulary().strength_of("rust", ContextType::Teaching);
        assert!((expected - 0.525 * 0.92).abs() < 1e-9);
        assert_eq!(many.vocabulary().strength_of("rust", ContextType::Teaching), expected);
        assert_eq!(many.vocabulary().export_all().len(), ContextType::ALL.len());
    }

    #[test]
    fn set_parameter_applies_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let m = LearningManager::with_store(LearningConfig::default(), store.clone()).unwrap();
        m.set_parameter("vocab", "learning_rate", 0.2).unwrap();
        assert_eq!(m.vocabulary().config().learning_rate, 0.2);
        let stored = store
            .get(&hebb_core::store::RecordKey::config("vocab", "learning_rate"))
            .unwrap();
        assert!(matches!(stored, Some(Record::Config(c)) if c.value == 0.2));

        assert!(m.set_parameter("vocab", "learning_rate", 1.5).is_err());
        assert!(m.set_parameter("telemetry", "rate", 0.1).is_err());
        assert_eq!(m.config().vocab.learning_rate, 0.2);
    }

    #[test]
    fn hydrate_restores_from_store() {
        let store: DynStore = Arc::new(MemoryStore::new());
        {
            let m = LearningManager::with_store(LearningConfig::default(), store.clone()).unwrap();
            m.set_parameter("sequences", "pattern_threshold", 2.0).unwrap();
            let s = SessionId::from("s");
            for message in ["hey", "I need help", "thanks"] {
                m.process_turn(&s, message, "", &signals(), &readings(&[("humor", 0.9), ("warmth", 0.9)]));
            }
            m.vocabulary().observe("ngl", ContextType::CasualChat).unwrap();
        }
        let fresh = LearningManager::with_store(LearningConfig::default(), store).unwrap();
        let report = fresh.hydrate().unwrap();
        assert!(report.associations > 0);
        assert_eq!(fresh.config().sequences.pattern_threshold, 2);
        assert!(fresh.vocabulary().strength_of("ngl", ContextType::CasualChat) > 0.5);
        assert!(fresh.dimensions().coactivation_strength("warmth", "humor") > 0.0);
        assert!(fresh.sequences().transition_probability(ConversationState::CasualChat, ConversationState::ProblemStatement) > 0.0);
    }

    #[test]
    fn degraded_store_keeps_learning() {
        let store = Arc::new(FlakyStore::default());
        let m = LearningManager::with_store(LearningConfig::default(), store.clone()).unwrap();
        store.set_down(true);
        let s = SessionId::from("s");
        for _ in 0..3 {
            let r = m.process_turn(&s, "ngl this slaps", "", &signals(), &BTreeMap::new());
            assert!(r.errors.is_empty());
        }
        let health = m.health_summary();
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.persistence_incidents, 1);
        assert!(m.vocabulary().strength_of("slaps", ContextType::CasualChat) > 0.5);

        assert!(!m.try_recover_persistence());
        store.set_down(false);
        assert!(m.try_recover_persistence());
        assert_eq!(m.health_summary().status, HealthStatus::Healthy);
    }

    #[test]
    fn snapshot_round_trip_through_file() {
        let m = LearningManager::default();
        let s = SessionId::from("s");
        for message in ["hey", "I need help", "thanks"] {
            m.process_turn(&s, message, "", &signals(), &readings(&[("humor", 0.9), ("warmth", 0.9)]));
        }
        m.vocabulary().set_override("lol", ContextType::FormalTechnical, 0.0).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        m.save_snapshot(&path).unwrap();

        let fresh = LearningManager::default();
        let loaded = fresh.load_snapshot(&path).unwrap();
        assert!(loaded > 0);
        assert!(fresh.export_all().same_contents(&m.export_all()));
        assert!(!fresh.vocabulary().should_use("lol", ContextType::FormalTechnical, Some(0.0)));
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let mut config = LearningConfig::default();
        config.dimensions.learning_rate = 2.0;
        assert!(LearningManager::new(config).is_err());
    }
}
