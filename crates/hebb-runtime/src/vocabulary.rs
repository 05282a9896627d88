//! Vocabulary ↔ context associations.
//!
//! Every term carries at most one association per [`ContextType`]. Observing
//! a term in a context strengthens that association asymptotically toward 1.0
//! and weakens the term's associations with every other context. All
//! contexts of a term live behind one map entry, so an observation's
//! strengthen-then-weaken step is atomic with respect to concurrent callers.

use crate::persistence::PersistenceLane;
use chrono::Utc;
use dashmap::DashMap;
use hebb_core::config::VocabConfig;
use hebb_core::error::{ConfigError, HebbError, Result};
use hebb_core::numeric::{is_unit, sanitize_strength};
use hebb_core::records::{Association, DEFAULT_VOCAB_STRENGTH};
use hebb_core::store::{Record, RecordKey};
use hebb_core::text::{normalize_term, segments, tokenize_terms, Segment};
use hebb_core::types::{ContextType, Timestamp};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// One entry of the bounded observation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationEvent {
    pub term: String,
    pub context: ContextType,
    pub before: f64,
    pub after: f64,
    pub at: Timestamp,
}

/// A manually pinned strength.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrengthOverride {
    pub term: String,
    pub context: ContextType,
    pub value: f64,
}

/// A replacement used by response filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Substitution {
    pub term: String,
    pub context: ContextType,
    pub replacement: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VocabStats {
    pub terms: usize,
    pub associations: usize,
    pub observations: u64,
    pub overrides: usize,
    pub substitutions: usize,
    pub history_len: usize,
    pub faults_recovered: u64,
}

type TermContexts = BTreeMap<ContextType, Association>;

pub struct VocabularyAssociationEngine {
    config: RwLock<VocabConfig>,
    associations: DashMap<String, TermContexts>,
    overrides: DashMap<(String, ContextType), f64>,
    substitutions: DashMap<(String, ContextType), String>,
    history: Mutex<VecDeque<ObservationEvent>>,
    lane: Arc<PersistenceLane>,
    observations: AtomicU64,
    faults: AtomicU64,
}

impl VocabularyAssociationEngine {
    pub fn new(config: VocabConfig, lane: Arc<PersistenceLane>) -> Self {
        Self {
            history: Mutex::new(VecDeque::with_capacity(config.history_capacity.min(4096))),
            config: RwLock::new(config),
            associations: DashMap::new(),
            overrides: DashMap::new(),
            substitutions: DashMap::new(),
            lane,
            observations: AtomicU64::new(0),
            faults: AtomicU64::new(0),
        }
    }

    /// Default configuration, no store.
    pub fn in_memory() -> Self {
        Self::new(VocabConfig::default(), Arc::new(PersistenceLane::detached()))
    }

    pub fn config(&self) -> VocabConfig {
        self.config.read().clone()
    }

    pub fn set_config(&self, config: VocabConfig) {
        let capacity = config.history_capacity;
        *self.config.write() = config;
        let mut history = self.history.lock();
        while history.len() > capacity {
            history.pop_front();
        }
    }

    /// Clamp finite values, reset non-finite ones to the default and count the fault.
    fn guard(&self, value: f64, term: &str, context: ContextType) -> f64 {
        if value.is_finite() {
            return value.clamp(0.0, 1.0);
        }
        let key = RecordKey::association(term, context).to_string();
        let out = sanitize_strength(value, DEFAULT_VOCAB_STRENGTH, &key);
        self.faults.fetch_add(1, Ordering::Relaxed);
        out.value
    }

    /// Observe `term` used in `context` at `at`.
    ///
    /// The observed association is strengthened first, then every other
    /// context of the term is weakened from its own prior value.
    pub fn observe_at(&self, term: &str, context: ContextType, at: Timestamp) -> Result<ObservationEvent> {
        let term = normalize_term(term);
        if term.is_empty() {
            return Err(HebbError::invalid_input("empty vocabulary term"));
        }
        let (learning_rate, competitive_rate, capacity) = {
            let c = self.config.read();
            (c.learning_rate, c.competitive_rate, c.history_capacity)
        };

        let event = {
            let mut entry = self.associations.entry(term.clone()).or_default();
            let contexts = entry.value_mut();

            let observed = contexts
                .entry(context)
                .or_insert_with(|| Association::new(term.as_str(), context, at));
            let before = observed.strength;
            let strengthened = before + learning_rate * (1.0 - before);
            observed.strength = self.guard(strengthened, &term, context);
            observed.observation_count += 1;
            observed.last_updated = at;
            let after = observed.strength;
            self.lane.write(Record::Association(observed.clone()));

            for other in ContextType::ALL {
                if other == context {
                    continue;
                }
                let competitor = contexts
                    .entry(other)
                    .or_insert_with(|| Association::new(term.as_str(), other, at));
                let s = competitor.strength;
                let weakened = (s - competitive_rate * s).max(0.0);
                competitor.strength = self.guard(weakened, &term, other);
                competitor.last_updated = at;
                self.lane.write(Record::Association(competitor.clone()));
            }

            ObservationEvent {
                term: term.clone(),
                context,
                before,
                after,
                at,
            }
        };

        self.observations.fetch_add(1, Ordering::Relaxed);
        let mut history = self.history.lock();
        history.push_back(event.clone());
        while history.len() > capacity {
            history.pop_front();
        }
        Ok(event)
    }

    pub fn observe(&self, term: &str, context: ContextType) -> Result<ObservationEvent> {
        self.observe_at(term, context, Utc::now())
    }

    /// Tokenize `text` and observe every surviving term. Returns the terms observed.
    pub fn observe_message_at(&self, text: &str, context: ContextType, at: Timestamp) -> Vec<String> {
        let mut observed = Vec::new();
        for term in tokenize_terms(text) {
            if self.observe_at(&term, context, at).is_ok() {
                observed.push(term);
            }
        }
        debug!(context = %context, terms = observed.len(), "observed message vocabulary");
        observed
    }

    pub fn observe_message(&self, text: &str, context: ContextType) -> Vec<String> {
        self.observe_message_at(text, context, Utc::now())
    }

    /// Current strength. Overrides win; unknown pairs read as 0.5 without
    /// creating a record.
    pub fn strength_of(&self, term: &str, context: ContextType) -> f64 {
        let term = normalize_term(term);
        if let Some(value) = self.overrides.get(&(term.clone(), context)) {
            return *value;
        }
        self.associations
            .get(&term)
            .and_then(|contexts| contexts.get(&context).map(|a| a.strength))
            .unwrap_or(DEFAULT_VOCAB_STRENGTH)
    }

    /// Whether the term clears `threshold` (configured default when `None`).
    /// A 0.0 override is a hard block.
    pub fn should_use(&self, term: &str, context: ContextType, threshold: Option<f64>) -> bool {
        let term = normalize_term(term);
        if let Some(value) = self.overrides.get(&(term.clone(), context)) {
            if *value == 0.0 {
                return false;
            }
        }
        let threshold = threshold.unwrap_or_else(|| self.config.read().confidence_threshold);
        self.strength_of(&term, context) >= threshold
    }

    /// Contexts the term has evidence for, strongest first.
    ///
    /// Ties break on higher observation count, then context name.
    pub fn top_contexts(&self, term: &str, n: usize) -> Vec<(ContextType, f64)> {
        let term = normalize_term(term);
        let mut ranked: Vec<(ContextType, f64, u64)> = Vec::new();
        let stored = self.associations.get(&term).map(|c| c.value().clone()).unwrap_or_default();

        for context in ContextType::ALL {
            let count = stored.get(&context).map_or(0, |a| a.observation_count);
            let has_override = self.overrides.contains_key(&(term.clone(), context));
            if stored.contains_key(&context) || has_override {
                ranked.push((context, self.strength_of(&term, context), count));
            }
        }

        ranked.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then(b.2.cmp(&a.2))
                .then_with(|| a.0.as_str().cmp(b.0.as_str()))
        });
        ranked.into_iter().take(n).map(|(c, s, _)| (c, s)).collect()
    }

    fn has_evidence(&self, term: &str, context: ContextType) -> bool {
        self.associations.contains_key(term) || self.overrides.contains_key(&(term.to_string(), context))
    }

    /// Remove or substitute words that should not be used in `context`.
    ///
    /// Only words with learned evidence are candidates. A removed word takes
    /// its preceding whitespace with it. Punctuation it leaves dangling is
    /// dropped: a clause mark after another clause mark, a mark opening a
    /// sentence that lost all its words, and an emptied bracket pair.
    pub fn filter_vocabulary(&self, response: &str, context: ContextType, threshold: Option<f64>) -> String {
        enum Piece<'a> {
            Word(Cow<'a, str>),
            Space(&'a str),
            Punct(&'a str),
        }

        fn last_kept(out: &[Piece<'_>]) -> Option<usize> {
            out.iter().rposition(|p| !matches!(p, Piece::Space(_)))
        }

        let mut out: Vec<Piece<'_>> = Vec::new();
        let mut removed = 0usize;
        // A word was dropped since the last kept word.
        let mut pending = false;

        for segment in segments(response) {
            match segment {
                Segment::Word(word) => {
                    let term = normalize_term(word);
                    if !self.has_evidence(&term, context) || self.should_use(&term, context, threshold) {
                        out.push(Piece::Word(Cow::Borrowed(word)));
                        pending = false;
                    } else if let Some(replacement) = self.substitutions.get(&(term, context)) {
                        out.push(Piece::Word(Cow::Owned(match_case(word, replacement.value()))));
                        pending = false;
                    } else {
                        removed += 1;
                        pending = true;
                        if matches!(out.last(), Some(Piece::Space(_))) {
                            out.pop();
                        }
                    }
                }
                Segment::Space(space) => {
                    if !out.is_empty() {
                        out.push(Piece::Space(space));
                    }
                }
                Segment::Punct(punct) if pending => {
                    let mut rest = punct;

                    // an emptied bracket pair collapses with the space before it
                    if let Some(i) = last_kept(&out) {
                        if let Piece::Punct(prev) = &mut out[i] {
                            let current = *prev;
                            let collapsed = BRACKETS.iter().find_map(|&(open, close)| {
                                Some((current.strip_suffix(open)?, rest.strip_prefix(close)?))
                            });
                            if let Some((before, after)) = collapsed {
                                *prev = before;
                                rest = after;
                                if before.is_empty() {
                                    out.truncate(i);
                                    if matches!(out.last(), Some(Piece::Space(_))) {
                                        out.pop();
                                    }
                                }
                            }
                        }
                    }

                    let previous = last_kept(&out).map(|i| &out[i]);
                    let sentence_start = match previous {
                        None => true,
                        Some(Piece::Punct(prev)) => prev.ends_with(SENTENCE_END),
                        Some(_) => false,
                    };
                    let after_clause = matches!(
                        previous,
                        Some(Piece::Punct(prev)) if prev.ends_with(CLAUSE) || prev.ends_with(OPENERS)
                    );
                    let mut kept = rest;
                    if sentence_start || after_clause {
                        kept = kept.trim_start_matches(CLAUSE);
                    }
                    if sentence_start {
                        kept = kept.trim_start_matches(SENTENCE_END);
                    }
                    if kept.is_empty() {
                        continue;
                    }
                    if kept.starts_with(SENTENCE_END) {
                        let emptied = match out.last_mut() {
                            Some(Piece::Punct(prev)) => {
                                let current = *prev;
                                *prev = current.trim_end_matches(CLAUSE);
                                prev.is_empty()
                            }
                            _ => false,
                        };
                        if emptied {
                            out.pop();
                        }
                    }
                    out.push(Piece::Punct(kept));
                }
                Segment::Punct(punct) => out.push(Piece::Punct(punct)),
            }
        }

        if removed > 0 {
            debug!(context = %context, removed, "filtered response vocabulary");
        }

        let mut text = String::with_capacity(response.len());
        for piece in &out {
            match piece {
                Piece::Word(w) => text.push_str(w),
                Piece::Space(s) | Piece::Punct(s) => text.push_str(s),
            }
        }
        text.trim_end().to_string()
    }

    /// Decay associations idle for at least `days_inactive` days as of `now`.
    ///
    /// `strength *= 1 - rate × days`, floored at 0, where `days` counts from
    /// the later of the last update and the last decay. Returns the number
    /// of associations touched.
    pub fn apply_decay_at(&self, days_inactive: f64, now: Timestamp) -> Result<usize> {
        if !days_inactive.is_finite() || days_inactive < 0.0 {
            return Err(HebbError::invalid_input(format!(
                "days_inactive must be a non-negative number, got {}",
                days_inactive
            )));
        }
        let rate = self.config.read().decay_rate_per_day;
        let mut touched = 0;

        for mut entry in self.associations.iter_mut() {
            let term = entry.key().clone();
            for (context, association) in entry.value_mut().iter_mut() {
                let idle_days = days_between(association.last_updated, now);
                if idle_days <= 0.0 || idle_days < days_inactive {
                    continue;
                }
                let days = undecayed_days(association.last_updated, association.last_decayed, now);
                if days <= 0.0 {
                    continue;
                }
                let decayed = (association.strength * (1.0 - rate * days)).max(0.0);
                association.strength = self.guard(decayed, &term, *context);
                association.last_decayed = Some(now);
                self.lane.write(Record::Association(association.clone()));
                touched += 1;
            }
        }

        if touched > 0 {
            info!(touched, days_inactive, "decayed vocabulary associations");
        }
        Ok(touched)
    }

    pub fn apply_decay(&self, days_inactive: f64) -> Result<usize> {
        self.apply_decay_at(days_inactive, Utc::now())
    }

    /// Delete associations that are both weak and rarely observed.
    pub fn prune(&self, min_strength: f64, min_observations: u64) -> usize {
        let mut deleted = 0;
        self.associations.retain(|_, contexts| {
            contexts.retain(|_, a| {
                let doomed = a.strength < min_strength && a.observation_count < min_observations;
                if doomed {
                    self.lane.remove(&RecordKey::association(&a.term, a.context));
                    deleted += 1;
                }
                !doomed
            });
            !contexts.is_empty()
        });
        if deleted > 0 {
            info!(deleted, min_strength, min_observations, "pruned vocabulary associations");
        }
        deleted
    }

    /// Every association, ordered by term then context.
    pub fn export_all(&self) -> Vec<Association> {
        let mut out: Vec<Association> = self
            .associations
            .iter()
            .flat_map(|entry| entry.value().values().cloned().collect::<Vec<_>>())
            .collect();
        out.sort_by(|a, b| a.term.cmp(&b.term).then(a.context.cmp(&b.context)));
        out
    }

    /// Load associations, replacing same-keyed ones, and write them through.
    pub fn import(&self, associations: &[Association]) -> usize {
        self.restore(associations, true)
    }

    /// Load associations without writing them back to the store.
    pub(crate) fn restore(&self, associations: &[Association], persist: bool) -> usize {
        for record in associations {
            let mut a = record.clone();
            a.term = normalize_term(&a.term);
            a.strength = self.guard(a.strength, &a.term, a.context);
            if persist {
                self.lane.write(Record::Association(a.clone()));
            }
            self.associations.entry(a.term.clone()).or_default().insert(a.context, a);
        }
        associations.len()
    }

    /// Pin a strength. 0.0 hard-blocks the term in that context.
    pub fn set_override(&self, term: &str, context: ContextType, value: f64) -> std::result::Result<(), ConfigError> {
        let term = normalize_term(term);
        if !is_unit(value) || term.is_empty() {
            return Err(ConfigError::InvalidOverride {
                term,
                context: context.as_str().to_string(),
                value,
            });
        }
        self.overrides.insert((term, context), value);
        Ok(())
    }

    pub fn clear_override(&self, term: &str, context: ContextType) -> bool {
        self.overrides.remove(&(normalize_term(term), context)).is_some()
    }

    /// Replacement used by [`filter_vocabulary`](Self::filter_vocabulary)
    /// instead of dropping the term.
    pub fn set_substitution(&self, term: &str, context: ContextType, replacement: &str) -> Result<()> {
        let term = normalize_term(term);
        let replacement = replacement.trim();
        if term.is_empty() || replacement.is_empty() {
            return Err(HebbError::invalid_input("substitution needs a term and a replacement"));
        }
        self.substitutions.insert((term, context), replacement.to_string());
        Ok(())
    }

    pub fn clear_substitution(&self, term: &str, context: ContextType) -> bool {
        self.substitutions.remove(&(normalize_term(term), context)).is_some()
    }

    pub fn export_overrides(&self) -> Vec<StrengthOverride> {
        let mut out: Vec<StrengthOverride> = self
            .overrides
            .iter()
            .map(|e| StrengthOverride {
                term: e.key().0.clone(),
                context: e.key().1,
                value: *e.value(),
            })
            .collect();
        out.sort_by(|a, b| a.term.cmp(&b.term).then(a.context.cmp(&b.context)));
        out
    }

    pub fn export_substitutions(&self) -> Vec<Substitution> {
        let mut out: Vec<Substitution> = self
            .substitutions
            .iter()
            .map(|e| Substitution {
                term: e.key().0.clone(),
                context: e.key().1,
                replacement: e.value().clone(),
            })
            .collect();
        out.sort_by(|a, b| a.term.cmp(&b.term).then(a.context.cmp(&b.context)));
        out
    }

    /// The `n` most recent observations, newest first.
    pub fn recent_observations(&self, n: usize) -> Vec<ObservationEvent> {
        self.history.lock().iter().rev().take(n).cloned().collect()
    }

    pub fn stats(&self) -> VocabStats {
        VocabStats {
            terms: self.associations.len(),
            associations: self.associations.iter().map(|e| e.value().len()).sum(),
            observations: self.observations.load(Ordering::Relaxed),
            overrides: self.overrides.len(),
            substitutions: self.substitutions.len(),
            history_len: self.history.lock().len(),
            faults_recovered: self.faults.load(Ordering::Relaxed),
        }
    }
}

const CLAUSE: [char; 3] = [',', ';', ':'];
const SENTENCE_END: [char; 3] = ['.', '!', '?'];
const OPENERS: [char; 2] = ['(', '['];
const BRACKETS: [(char, char); 2] = [('(', ')'), ('[', ']')];

/// Fractional days from `from` to `to`; negative when `to` is earlier.
pub(crate) fn days_between(from: Timestamp, to: Timestamp) -> f64 {
    (to - from).num_milliseconds() as f64 / 86_400_000.0
}

/// Days since a record was last updated or decayed, whichever is later.
pub(crate) fn undecayed_days(last_updated: Timestamp, last_decayed: Option<Timestamp>, now: Timestamp) -> f64 {
    let since = last_decayed.map_or(last_updated, |d| d.max(last_updated));
    days_between(since, now)
}

fn match_case(original: &str, replacement: &str) -> String {
    let capitalized = original.chars().next().is_some_and(char::is_uppercase);
    if !capitalized {
        return replacement.to_string();
    }
    let mut chars = replacement.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
