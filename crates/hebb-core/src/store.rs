//! Store contract: the persistence boundary.
//!
//! The engines never talk to a database directly. They write canonical
//! composite keys and typed records through [`AssociationStore`], which can
//! be backed by anything that offers get/upsert/delete/prefix-scan.

use crate::error::StoreError;
use crate::records::*;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between key parts in the rendered form. Never appears in
/// normalized terms, dimension names or state names.
pub const KEY_SEPARATOR: char = '\u{1f}';

/// The table a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Association,
    Coactivation,
    Pattern,
    NegativeCorrelation,
    Transition,
    Sequence,
    Template,
    Config,
}

impl RecordKind {
    pub const ALL: [RecordKind; 8] = [
        RecordKind::Association,
        RecordKind::Coactivation,
        RecordKind::Pattern,
        RecordKind::NegativeCorrelation,
        RecordKind::Transition,
        RecordKind::Sequence,
        RecordKind::Template,
        RecordKind::Config,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Association => "vocab",
            RecordKind::Coactivation => "coact",
            RecordKind::Pattern => "pattern",
            RecordKind::NegativeCorrelation => "negcorr",
            RecordKind::Transition => "transition",
            RecordKind::Sequence => "sequence",
            RecordKind::Template => "template",
            RecordKind::Config => "config",
        }
    }

    fn parse_name(s: &str) -> Option<Self> {
        RecordKind::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

/// A canonical composite key.
///
/// Construct through the typed constructors so canonicalization (lowercase
/// terms, ordered dimension pairs) always happens before store access.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    kind: RecordKind,
    parts: Vec<String>,
}

impl RecordKey {
    pub fn association(term: &str, context: ContextType) -> Self {
        Self {
            kind: RecordKind::Association,
            parts: vec![term.to_string(), context.as_str().to_string()],
        }
    }

    pub fn coactivation(pair: &DimensionPair) -> Self {
        Self {
            kind: RecordKind::Coactivation,
            parts: vec![pair.first().to_string(), pair.second().to_string()],
        }
    }

    pub fn pattern(pattern_id: &str) -> Self {
        Self {
            kind: RecordKind::Pattern,
            parts: vec![pattern_id.to_string()],
        }
    }

    pub fn negative_correlation(dim_high: &str, dim_low: &str) -> Self {
        Self {
            kind: RecordKind::NegativeCorrelation,
            parts: vec![dim_high.to_string(), dim_low.to_string()],
        }
    }

    pub fn transition(from: ConversationState, to: ConversationState) -> Self {
        Self {
            kind: RecordKind::Transition,
            parts: vec![from.as_str().to_string(), to.as_str().to_string()],
        }
    }

    pub fn sequence(sequence_hash: &str) -> Self {
        Self {
            kind: RecordKind::Sequence,
            parts: vec![sequence_hash.to_string()],
        }
    }

    pub fn template(pattern_id: &str) -> Self {
        Self {
            kind: RecordKind::Template,
            parts: vec![pattern_id.to_string()],
        }
    }

    pub fn config(component: &str, parameter: &str) -> Self {
        Self {
            kind: RecordKind::Config,
            parts: vec![component.to_string(), parameter.to_string()],
        }
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Flat string form used by string-keyed backends.
    pub fn render(&self) -> String {
        let mut out = self.kind.as_str().to_string();
        for part in &self.parts {
            out.push(KEY_SEPARATOR);
            out.push_str(part);
        }
        out
    }

    /// Inverse of [`RecordKey::render`].
    pub fn parse(rendered: &str) -> Option<Self> {
        let mut pieces = rendered.split(KEY_SEPARATOR);
        let kind = RecordKind::parse_name(pieces.next()?)?;
        let parts: Vec<String> = pieces.map(str::to_string).collect();
        if parts.is_empty() {
            return None;
        }
        Some(Self { kind, parts })
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind.as_str(), self.parts.join("/"))
    }
}

/// Selects every key of a kind whose leading parts equal `parts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPrefix {
    kind: RecordKind,
    parts: Vec<String>,
}

impl KeyPrefix {
    /// All records of a kind.
    pub fn kind(kind: RecordKind) -> Self {
        Self { kind, parts: Vec::new() }
    }

    /// All associations of one term.
    pub fn term(term: &str) -> Self {
        Self {
            kind: RecordKind::Association,
            parts: vec![term.to_string()],
        }
    }

    /// All outgoing transitions of one state.
    pub fn transitions_from(state: ConversationState) -> Self {
        Self {
            kind: RecordKind::Transition,
            parts: vec![state.as_str().to_string()],
        }
    }

    pub fn matches(&self, key: &RecordKey) -> bool {
        key.kind == self.kind
            && key.parts.len() >= self.parts.len()
            && key.parts.iter().zip(&self.parts).all(|(a, b)| a == b)
    }

    /// Rendered prefix; every matching key's rendering starts with it.
    pub fn render(&self) -> String {
        let mut out = self.kind.as_str().to_string();
        for part in &self.parts {
            out.push(KEY_SEPARATOR);
            out.push_str(part);
        }
        out.push(KEY_SEPARATOR);
        out
    }
}

/// A typed record as it crosses the store boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "recordType", content = "body", rename_all = "snake_case")]
pub enum Record {
    Association(Association),
    Coactivation(Coactivation),
    Pattern(MultiDimensionalPattern),
    NegativeCorrelation(NegativeCorrelation),
    Transition(StateTransition),
    Sequence(StateSequence),
    Template(PatternTemplate),
    Config(ConfigRecord),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Association(_) => RecordKind::Association,
            Record::Coactivation(_) => RecordKind::Coactivation,
            Record::Pattern(_) => RecordKind::Pattern,
            Record::NegativeCorrelation(_) => RecordKind::NegativeCorrelation,
            Record::Transition(_) => RecordKind::Transition,
            Record::Sequence(_) => RecordKind::Sequence,
            Record::Template(_) => RecordKind::Template,
            Record::Config(_) => RecordKind::Config,
        }
    }

    /// The canonical key this record is stored under.
    pub fn key(&self) -> RecordKey {
        match self {
            Record::Association(a) => RecordKey::association(&a.term, a.context),
            Record::Coactivation(c) => RecordKey::coactivation(&c.pair),
            Record::Pattern(p) => RecordKey::pattern(&p.pattern_id),
            Record::NegativeCorrelation(n) => RecordKey::negative_correlation(&n.dim_high, &n.dim_low),
            Record::Transition(t) => RecordKey::transition(t.state_from, t.state_to),
            Record::Sequence(s) => RecordKey::sequence(&s.sequence_hash),
            Record::Template(t) => RecordKey::template(&t.pattern_id),
            Record::Config(c) => RecordKey::config(&c.component, &c.parameter),
        }
    }
}

/// A keyed persistent record store.
///
/// Implementations must make `upsert` atomic per key. A missing record is
/// `Ok(None)` / `Ok(false)`, never an error.
pub trait AssociationStore: Send + Sync {
    /// Point lookup.
    fn get(&self, key: &RecordKey) -> Result<Option<Record>, StoreError>;

    /// Insert or replace the record under `key`.
    fn upsert(&self, key: &RecordKey, record: Record) -> Result<(), StoreError>;

    /// Remove a record. Returns whether it existed.
    fn delete(&self, key: &RecordKey) -> Result<bool, StoreError>;

    /// All records whose key matches `prefix`, in key order.
    fn scan_prefix(&self, prefix: &KeyPrefix) -> Result<Vec<(RecordKey, Record)>, StoreError>;

    /// Short backend name for logs and health reports.
    fn backend_name(&self) -> &'static str {
        "store"
    }
}
