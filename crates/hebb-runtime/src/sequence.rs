//! Conversation-state sequence learning.
//!
//! Transitions between conversation states form a directed graph whose
//! edges carry observed counts and Markov probabilities. Each session's
//! recent states are mined for recurring windows; a window seen often
//! enough becomes a pattern template that can anticipate the next state
//! and point out intermediate states the conversation tends to skip.

use crate::classifier::StateClassifier;
use crate::persistence::PersistenceLane;
use crate::session::SessionRegistry;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hebb_core::config::SequenceConfig;
use hebb_core::error::{HebbError, Result};
use hebb_core::numeric::{is_unit, sanitize_strength};
use hebb_core::records::{
    PatternTemplate, SkipOpportunity, StateSequence, StateTransition, DEFAULT_TRANSITION_PROBABILITY,
    NEUTRAL_SATISFACTION,
};
use hebb_core::store::{Record, RecordKey};
use hebb_core::types::{sequence_hash, stable_id, ContextSignals, ConversationState, SessionId, Timestamp};
use parking_lot::RwLock;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Ranks competing templates during anticipation. Higher wins.
pub type PatternScore = fn(&PatternTemplate) -> f64;

/// `success_rate × ln(1 + frequency)`.
pub fn default_pattern_score(template: &PatternTemplate) -> f64 {
    template.success_rate * (1.0 + template.frequency as f64).ln()
}

/// What backed an anticipation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnticipationSource {
    Transition,
    Template,
}

/// A suggested next state with enough confidence to act on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anticipation {
    pub current: ConversationState,
    pub next_state: ConversationState,
    pub confidence: f64,
    pub source: AnticipationSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    /// An intermediate state the conversation can likely skip from here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<SkipOpportunity>,
}

/// What a single observed transition changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionOutcome {
    pub from: ConversationState,
    pub to: ConversationState,
    /// P(from → to) after the update.
    pub probability: f64,
    pub windows_mined: usize,
    /// Templates created or refreshed by this observation.
    pub templates: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceExport {
    pub transitions: Vec<StateTransition>,
    pub sequences: Vec<StateSequence>,
    pub templates: Vec<PatternTemplate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SequenceStats {
    pub states: usize,
    pub transitions: usize,
    pub sequences: usize,
    pub templates: usize,
    pub sessions: usize,
    pub session_evictions: u64,
    pub observations: u64,
    pub faults_recovered: u64,
}

/// Markov matrix as a directed graph over states.
#[derive(Default)]
struct TransitionGraph {
    graph: DiGraph<ConversationState, StateTransition>,
    node_index: HashMap<ConversationState, NodeIndex>,
}

impl TransitionGraph {
    fn ensure_node(&mut self, state: ConversationState) -> NodeIndex {
        if let Some(&idx) = self.node_index.get(&state) {
            idx
        } else {
            let idx = self.graph.add_node(state);
            self.node_index.insert(state, idx);
            idx
        }
    }

    fn edge(&self, from: ConversationState, to: ConversationState) -> Option<&StateTransition> {
        let a = *self.node_index.get(&from)?;
        let b = *self.node_index.get(&to)?;
        let e = self.graph.find_edge(a, b)?;
        Some(&self.graph[e])
    }

    fn probability(&self, from: ConversationState, to: ConversationState) -> f64 {
        self.edge(from, to)
            .map_or(DEFAULT_TRANSITION_PROBABILITY, |t| t.transition_probability)
    }

    fn outgoing(&self, from: ConversationState) -> Vec<StateTransition> {
        let Some(&idx) = self.node_index.get(&from) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| e.weight().clone())
            .collect()
    }

    /// Recompute count/total for every outgoing edge of `from`.
    fn renormalize(&mut self, from: ConversationState) {
        let Some(&idx) = self.node_index.get(&from) else { return };
        let edges: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| e.id())
            .collect();
        let total: u64 = edges.iter().map(|&e| self.graph[e].transition_count).sum();
        for e in edges {
            let edge = &mut self.graph[e];
            edge.transition_probability = if total == 0 {
                DEFAULT_TRANSITION_PROBABILITY
            } else {
                edge.transition_count as f64 / total as f64
            };
        }
    }

    /// Count one transition; returns every outgoing edge of `from` afterwards.
    fn observe(&mut self, from: ConversationState, to: ConversationState, at: Timestamp) -> Vec<StateTransition> {
        let a = self.ensure_node(from);
        let b = self.ensure_node(to);
        if let Some(e) = self.graph.find_edge(a, b) {
            let edge = &mut self.graph[e];
            edge.transition_count += 1;
            edge.last_observed = at;
        } else {
            self.graph.add_edge(
                a,
                b,
                StateTransition {
                    state_from: from,
                    state_to: to,
                    transition_count: 1,
                    transition_probability: DEFAULT_TRANSITION_PROBABILITY,
                    first_observed: at,
                    last_observed: at,
                },
            );
        }
        self.renormalize(from);
        self.outgoing(from)
    }

    fn insert(&mut self, transition: StateTransition) {
        let a = self.ensure_node(transition.state_from);
        let b = self.ensure_node(transition.state_to);
        self.graph.update_edge(a, b, transition);
    }

    fn all(&self) -> Vec<StateTransition> {
        let mut out: Vec<StateTransition> = self.graph.edge_weights().cloned().collect();
        out.sort_by_key(|t| (t.state_from, t.state_to));
        out
    }
}

pub struct SequenceLearningEngine {
    config: RwLock<SequenceConfig>,
    graph: RwLock<TransitionGraph>,
    sequences: DashMap<String, StateSequence>,
    templates: DashMap<String, PatternTemplate>,
    sessions: SessionRegistry,
    classifier: StateClassifier,
    scorer: RwLock<PatternScore>,
    lane: Arc<PersistenceLane>,
    observations: AtomicU64,
    faults: AtomicU64,
}

impl SequenceLearningEngine {
    pub fn new(config: SequenceConfig, max_sessions: usize, lane: Arc<PersistenceLane>) -> Self {
        Self {
            config: RwLock::new(config),
            graph: RwLock::new(TransitionGraph::default()),
            sequences: DashMap::new(),
            templates: DashMap::new(),
            sessions: SessionRegistry::new(max_sessions),
            classifier: StateClassifier::default(),
            scorer: RwLock::new(default_pattern_score),
            lane,
            observations: AtomicU64::new(0),
            faults: AtomicU64::new(0),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(
            SequenceConfig::default(),
            hebb_core::config::SafetyConfig::default().max_sessions,
            Arc::new(PersistenceLane::detached()),
        )
    }

    pub fn config(&self) -> SequenceConfig {
        self.config.read().clone()
    }

    pub fn set_config(&self, config: SequenceConfig) {
        *self.config.write() = config;
    }

    pub fn set_max_sessions(&self, max_sessions: usize) {
        self.sessions.set_capacity(max_sessions);
    }

    /// Replace the function ranking competing templates.
    pub fn set_pattern_score(&self, score: PatternScore) {
        *self.scorer.write() = score;
    }

    pub fn classifier(&self) -> &StateClassifier {
        &self.classifier
    }

    pub fn classify_state(&self, message: &str, signals: &ContextSignals) -> ConversationState {
        self.classifier.classify(message, signals)
    }

    fn guard(&self, value: f64, default: f64, key: impl FnOnce() -> RecordKey) -> f64 {
        if value.is_finite() {
            return value.clamp(0.0, 1.0);
        }
        self.faults.fetch_add(1, Ordering::Relaxed);
        sanitize_strength(value, default, &key().to_string()).value
    }

    pub fn observe_transition_at(
        &self,
        session: &SessionId,
        from: ConversationState,
        to: ConversationState,
        satisfaction: Option<f64>,
        at: Timestamp,
    ) -> Result<TransitionOutcome> {
        if let Some(s) = satisfaction {
            if !is_unit(s) {
                return Err(HebbError::invalid_input(format!(
                    "satisfaction must be in [0,1], got {}",
                    s
                )));
            }
        }
        let config = self.config();

        let outgoing = self.graph.write().observe(from, to, at);
        let probability = outgoing
            .iter()
            .find(|t| t.state_to == to)
            .map_or(DEFAULT_TRANSITION_PROBABILITY, |t| t.transition_probability);
        self.lane.write_all(outgoing.into_iter().map(Record::Transition));

        let history = self.sessions.with_session_at(session, at, |s| {
            if s.last() != Some(from) {
                s.push(from, config.max_history_length);
            }
            s.push(to, config.max_history_length);
            s.history()
        });

        let mut outcome = TransitionOutcome {
            from,
            to,
            probability,
            windows_mined: 0,
            templates: Vec::new(),
        };

        let longest = config.max_sequence_length.min(history.len());
        for len in config.min_sequence_length..=longest {
            let window = &history[history.len() - len..];
            let sequence = {
                let mut entry = self
                    .sequences
                    .entry(sequence_hash(window))
                    .or_insert_with(|| StateSequence::new(window.to_vec(), at));
                entry.record(satisfaction, at);
                entry.clone()
            };
            self.lane.write(Record::Sequence(sequence.clone()));
            outcome.windows_mined += 1;

            if sequence.frequency >= config.pattern_threshold {
                let template = self.materialize(&sequence, &config);
                outcome.templates.push(template.pattern_id.clone());
                if let Some(installed) = self.install_template(template) {
                    self.lane.write(Record::Template(installed));
                }
            }
        }

        self.observations.fetch_add(1, Ordering::Relaxed);
        debug!(
            %session,
            %from,
            %to,
            probability,
            windows = outcome.windows_mined,
            templates = outcome.templates.len(),
            "observed transition"
        );
        Ok(outcome)
    }

    pub fn observe_transition(
        &self,
        session: &SessionId,
        from: ConversationState,
        to: ConversationState,
        satisfaction: Option<f64>,
    ) -> Result<TransitionOutcome> {
        self.observe_transition_at(session, from, to, satisfaction, Utc::now())
    }

    /// Store `template` unless a racing observation already stored one built
    /// from a higher frequency. Returns what was stored.
    fn install_template(&self, mut template: PatternTemplate) -> Option<PatternTemplate> {
        match self.templates.entry(template.pattern_id.clone()) {
            Entry::Occupied(mut stored) => {
                if stored.get().frequency > template.frequency {
                    return None;
                }
                template.last_applied = template.last_applied.max(stored.get().last_applied);
                stored.insert(template.clone());
            }
            Entry::Vacant(slot) => {
                slot.insert(template.clone());
            }
        }
        Some(template)
    }

    fn template_id(sequence: &[ConversationState]) -> String {
        stable_id("tpl-", sequence.iter().map(|s| s.as_str()), ">")
    }

    /// Build the template view of a sequence against the current matrix.
    fn materialize(&self, sequence: &StateSequence, config: &SequenceConfig) -> PatternTemplate {
        let graph = self.graph.read();
        let states = &sequence.sequence;
        let pattern_id = Self::template_id(states);

        let edges: Vec<f64> = states
            .windows(2)
            .map(|w| graph.probability(w[0], w[1]))
            .collect();
        let raw = if edges.is_empty() {
            0.0
        } else {
            edges.iter().product::<f64>().powf(1.0 / edges.len() as f64)
        };
        let confidence = self.guard(raw, DEFAULT_TRANSITION_PROBABILITY, || {
            RecordKey::template(&pattern_id)
        });

        let skip_opportunities = states
            .windows(3)
            .filter_map(|w| {
                let (a, b, c) = (w[0], w[1], w[2]);
                let direct = graph.probability(a, c);
                let two_hop = graph.probability(a, b) * graph.probability(b, c);
                (direct > config.skip_probability && direct > two_hop).then_some(SkipOpportunity {
                    from_state: a,
                    skip_state: b,
                    to_state: c,
                    confidence: direct,
                })
            })
            .collect();

        let last_applied = self.templates.get(&pattern_id).and_then(|t| t.last_applied);
        PatternTemplate {
            pattern_id,
            sequence: states.clone(),
            frequency: sequence.frequency,
            success_rate: sequence.avg_satisfaction,
            confidence,
            skip_opportunities,
            last_applied,
        }
    }

    /// Observed P(from → to), 0.0 when never seen.
    pub fn transition_probability(&self, from: ConversationState, to: ConversationState) -> f64 {
        self.graph.read().probability(from, to)
    }

    /// Observed successors of `current`, most probable first, ties by count.
    pub fn predict_next_states(&self, current: ConversationState, n: usize) -> Vec<(ConversationState, f64)> {
        let mut edges = self.graph.read().outgoing(current);
        edges.sort_by(|a, b| {
            b.transition_probability
                .total_cmp(&a.transition_probability)
                .then_with(|| b.transition_count.cmp(&a.transition_count))
                .then_with(|| a.state_to.cmp(&b.state_to))
        });
        edges
            .into_iter()
            .take(n)
            .map(|t| (t.state_to, t.transition_probability))
            .collect()
    }

    /// Sequences seen at least `min_frequency` times, annotated against the
    /// current matrix. Most frequent first.
    pub fn detect_recurring_patterns(&self, min_frequency: u64) -> Vec<PatternTemplate> {
        let config = self.config();
        let candidates: Vec<StateSequence> = self
            .sequences
            .iter()
            .filter(|s| s.frequency >= min_frequency)
            .map(|s| s.value().clone())
            .collect();
        let mut out: Vec<PatternTemplate> = candidates
            .iter()
            .map(|s| self.materialize(s, &config))
            .collect();
        out.sort_by(|a, b| {
            b.frequency
                .cmp(&a.frequency)
                .then_with(|| a.pattern_id.cmp(&b.pattern_id))
        });
        out
    }

    pub fn templates(&self) -> Vec<PatternTemplate> {
        let mut out: Vec<PatternTemplate> = self.templates.iter().map(|t| t.value().clone()).collect();
        out.sort_by(|a, b| a.pattern_id.cmp(&b.pattern_id));
        out
    }

    /// Best template whose proper prefix ends the history: (id, suggested next state).
    fn best_template(&self, history: &[ConversationState]) -> Option<(String, ConversationState)> {
        let score = *self.scorer.read();
        let mut best: Option<(f64, String, ConversationState)> = None;
        for t in self.templates.iter() {
            let seq = &t.sequence;
            let matched = (1..seq.len())
                .rev()
                .find(|&k| history.ends_with(&seq[..k]))
                .map(|k| seq[k]);
            let Some(next) = matched else { continue };
            let s = score(t.value());
            let better = match &best {
                None => true,
                Some((bs, bid, _)) => s > *bs || (s == *bs && t.pattern_id < *bid),
            };
            if better {
                best = Some((s, t.pattern_id.clone(), next));
            }
        }
        best.map(|(_, id, next)| (id, next))
    }

    /// Suggest the next state for a session currently in `current`.
    ///
    /// Returns `None` unless the stronger of the top Markov prediction and
    /// the best matching template is strictly above the configured
    /// confidence. Applying a template stamps its `last_applied`.
    pub fn anticipate_need_at(
        &self,
        session: &SessionId,
        current: ConversationState,
        at: Timestamp,
    ) -> Option<Anticipation> {
        let threshold = self.config.read().prediction_confidence;
        let mut history = self.session_history(session);
        if history.last() != Some(&current) {
            history.push(current);
        }

        let markov = self.predict_next_states(current, 1).into_iter().next();
        let template = self.best_template(&history).and_then(|(id, next)| {
            self.templates.get(&id).map(|t| (id, next, t.confidence))
        });

        let use_template = match (&markov, &template) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some((_, p)), Some((_, _, c))) => c > p,
        };

        if use_template {
            let (id, next, confidence) = template?;
            if confidence <= threshold {
                return None;
            }
            let mut entry = self.templates.get_mut(&id)?;
            entry.last_applied = Some(at);
            let skip = entry
                .skip_opportunities
                .iter()
                .find(|s| s.from_state == current)
                .cloned();
            self.lane.write(Record::Template(entry.clone()));
            drop(entry);
            debug!(%current, next = %next, confidence, template = %id, "anticipated from template");
            Some(Anticipation {
                current,
                next_state: next,
                confidence,
                source: AnticipationSource::Template,
                template_id: Some(id),
                skip,
            })
        } else {
            let (next, probability) = markov?;
            if probability <= threshold {
                return None;
            }
            Some(Anticipation {
                current,
                next_state: next,
                confidence: probability,
                source: AnticipationSource::Transition,
                template_id: None,
                skip: None,
            })
        }
    }

    pub fn anticipate_need(&self, session: &SessionId, current: ConversationState) -> Option<Anticipation> {
        self.anticipate_need_at(session, current, Utc::now())
    }

    /// from → (to → probability) for every observed edge.
    pub fn export_transition_matrix(&self) -> BTreeMap<ConversationState, BTreeMap<ConversationState, f64>> {
        let mut matrix: BTreeMap<ConversationState, BTreeMap<ConversationState, f64>> = BTreeMap::new();
        for t in self.graph.read().all() {
            matrix
                .entry(t.state_from)
                .or_default()
                .insert(t.state_to, t.transition_probability);
        }
        matrix
    }

    pub fn previous_state(&self, session: &SessionId) -> Option<ConversationState> {
        self.sessions.get(session).and_then(|s| s.previous())
    }

    pub fn set_previous_state_at(&self, session: &SessionId, state: ConversationState, at: Timestamp) {
        self.sessions.with_session_at(session, at, |s| s.set_previous(Some(state)));
    }

    pub fn set_previous_state(&self, session: &SessionId, state: ConversationState) {
        self.set_previous_state_at(session, state, Utc::now());
    }

    /// When the session was last used, `None` for unknown sessions.
    pub fn last_touched(&self, session: &SessionId) -> Option<Timestamp> {
        self.sessions.get(session).map(|s| s.last_touched)
    }

    /// Recent states of a session, oldest first. Empty for unknown sessions.
    pub fn session_history(&self, session: &SessionId) -> Vec<ConversationState> {
        self.sessions.get(session).map(|s| s.history()).unwrap_or_default()
    }

    pub fn end_session(&self, session: &SessionId) -> bool {
        self.sessions.remove(session).is_some()
    }

    /// Remove sequences seen fewer than `min_observations` times that never
    /// became templates.
    pub fn prune_sequences(&self, min_observations: u64) -> usize {
        let mut deleted = 0;
        self.sequences.retain(|hash, s| {
            let doomed = s.frequency < min_observations
                && !self.templates.contains_key(&Self::template_id(&s.sequence));
            if doomed {
                self.lane.remove(&RecordKey::sequence(hash));
                deleted += 1;
            }
            !doomed
        });
        if deleted > 0 {
            info!(deleted, min_observations, "pruned state sequences");
        }
        deleted
    }

    pub fn export_all(&self) -> SequenceExport {
        let mut sequences: Vec<StateSequence> = self.sequences.iter().map(|s| s.value().clone()).collect();
        sequences.sort_by(|a, b| a.sequence_hash.cmp(&b.sequence_hash));
        SequenceExport {
            transitions: self.graph.read().all(),
            sequences,
            templates: self.templates(),
        }
    }

    pub fn import(&self, export: &SequenceExport) -> usize {
        self.restore(export, true)
    }

    pub(crate) fn restore(&self, export: &SequenceExport, persist: bool) -> usize {
        {
            let mut graph = self.graph.write();
            let mut sources = Vec::new();
            for t in &export.transitions {
                graph.insert(t.clone());
                sources.push(t.state_from);
            }
            sources.sort();
            sources.dedup();
            for from in sources {
                graph.renormalize(from);
            }
            if persist {
                self.lane.write_all(graph.all().into_iter().map(Record::Transition));
            }
        }
        for s in &export.sequences {
            let mut s = s.clone();
            s.avg_satisfaction = self.guard(s.avg_satisfaction, NEUTRAL_SATISFACTION, || {
                RecordKey::sequence(&s.sequence_hash)
            });
            if persist {
                self.lane.write(Record::Sequence(s.clone()));
            }
            self.sequences.insert(s.sequence_hash.clone(), s);
        }
        for t in &export.templates {
            let mut t = t.clone();
            t.confidence = self.guard(t.confidence, DEFAULT_TRANSITION_PROBABILITY, || {
                RecordKey::template(&t.pattern_id)
            });
            if persist {
                self.lane.write(Record::Template(t.clone()));
            }
            self.templates.insert(t.pattern_id.clone(), t);
        }
        export.transitions.len() + export.sequences.len() + export.templates.len()
    }

    pub fn stats(&self) -> SequenceStats {
        let graph = self.graph.read();
        SequenceStats {
            states: graph.graph.node_count(),
            transitions: graph.graph.edge_count(),
            sequences: self.sequences.len(),
            templates: self.templates.len(),
            sessions: self.sessions.len(),
            session_evictions: self.sessions.evictions(),
            observations: self.observations.load(Ordering::Relaxed),
            faults_recovered: self.faults.load(Ordering::Relaxed),
        }
    }
}
