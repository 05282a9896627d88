//! Persisted record layout.
//!
//! Each learned entity is exclusively owned by one engine. Field names
//! serialize in camelCase to match the persisted schema.

use crate::numeric::running_mean;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Strength of a vocabulary association that has never been observed.
pub const DEFAULT_VOCAB_STRENGTH: f64 = 0.5;
/// Strength of a co-activation that has never been observed.
///
/// Absence means "no evidence", not "neutral".
pub const DEFAULT_COACTIVATION_STRENGTH: f64 = 0.0;
/// Probability of a transition that has never been observed.
pub const DEFAULT_TRANSITION_PROBABILITY: f64 = 0.0;
/// Satisfaction assumed when no sample has been supplied.
pub const NEUTRAL_SATISFACTION: f64 = 0.5;

/// Strength of a term in one conversational context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Association {
    pub term: String,
    #[serde(rename = "contextType")]
    pub context: ContextType,
    pub strength: f64,
    pub observation_count: u64,
    pub first_observed: Timestamp,
    pub last_updated: Timestamp,
    /// When decay last ran over this record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_decayed: Option<Timestamp>,
}

impl Association {
    /// A fresh, unobserved association at default strength.
    pub fn new(term: impl Into<String>, context: ContextType, at: Timestamp) -> Self {
        Self {
            term: term.into(),
            context,
            strength: DEFAULT_VOCAB_STRENGTH,
            observation_count: 0,
            first_observed: at,
            last_updated: at,
            last_decayed: None,
        }
    }
}

/// Hebbian co-activation strength of two personality/style dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coactivation {
    #[serde(flatten)]
    pub pair: DimensionPair,
    pub strength: f64,
    pub observation_count: u64,
    pub first_observed: Timestamp,
    pub last_updated: Timestamp,
    /// When decay last ran over this record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_decayed: Option<Timestamp>,
}

impl Coactivation {
    pub fn new(pair: DimensionPair, at: Timestamp) -> Self {
        Self {
            pair,
            strength: DEFAULT_COACTIVATION_STRENGTH,
            observation_count: 0,
            first_observed: at,
            last_updated: at,
            last_decayed: None,
        }
    }
}

/// Three or more dimensions observed active together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiDimensionalPattern {
    pub pattern_id: String,
    /// Typical (running mean) value per participating dimension.
    pub dimensions: BTreeMap<String, f64>,
    pub frequency: u64,
    pub avg_satisfaction: f64,
    #[serde(default)]
    pub satisfaction_samples: u64,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
}

impl MultiDimensionalPattern {
    pub fn new(pattern_id: impl Into<String>, at: Timestamp) -> Self {
        Self {
            pattern_id: pattern_id.into(),
            dimensions: BTreeMap::new(),
            frequency: 0,
            avg_satisfaction: NEUTRAL_SATISFACTION,
            satisfaction_samples: 0,
            first_seen: at,
            last_seen: at,
        }
    }

    /// Fold one joint activation into the pattern.
    pub fn record(&mut self, values: &BTreeMap<String, f64>, satisfaction: Option<f64>, at: Timestamp) {
        for (name, value) in values {
            let typical = self.dimensions.entry(name.clone()).or_insert(0.0);
            *typical = running_mean(*typical, self.frequency, *value);
        }
        self.frequency += 1;
        if let Some(s) = satisfaction {
            self.avg_satisfaction = if self.satisfaction_samples == 0 {
                s
            } else {
                running_mean(self.avg_satisfaction, self.satisfaction_samples, s)
            };
            self.satisfaction_samples += 1;
        }
        self.last_seen = at;
    }
}

/// `dim_high` tends high while `dim_low` tends low. Ordered, not canonicalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegativeCorrelation {
    pub dim_high: String,
    pub dim_low: String,
    pub correlation_strength: f64,
    pub observation_count: u64,
}

/// An edge of the conversation-state Markov matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTransition {
    pub state_from: ConversationState,
    pub state_to: ConversationState,
    pub transition_count: u64,
    pub transition_probability: f64,
    pub first_observed: Timestamp,
    pub last_observed: Timestamp,
}

/// A recurring ordered window of conversation states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSequence {
    pub sequence_hash: String,
    pub sequence: Vec<ConversationState>,
    pub frequency: u64,
    pub avg_satisfaction: f64,
    #[serde(default)]
    pub satisfaction_samples: u64,
    pub first_observed: Timestamp,
    pub last_observed: Timestamp,
}

impl StateSequence {
    pub fn new(sequence: Vec<ConversationState>, at: Timestamp) -> Self {
        Self {
            sequence_hash: sequence_hash(&sequence),
            sequence,
            frequency: 0,
            avg_satisfaction: NEUTRAL_SATISFACTION,
            satisfaction_samples: 0,
            first_observed: at,
            last_observed: at,
        }
    }

    pub fn record(&mut self, satisfaction: Option<f64>, at: Timestamp) {
        self.frequency += 1;
        if let Some(s) = satisfaction {
            self.avg_satisfaction = if self.satisfaction_samples == 0 {
                s
            } else {
                running_mean(self.avg_satisfaction, self.satisfaction_samples, s)
            };
            self.satisfaction_samples += 1;
        }
        self.last_observed = at;
    }
}

/// An intermediate state that the direct transition tends to bypass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipOpportunity {
    pub from_state: ConversationState,
    pub skip_state: ConversationState,
    pub to_state: ConversationState,
    /// Directly observed P(from → to).
    pub confidence: f64,
}

/// A state sequence whose frequency crossed the pattern threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternTemplate {
    pub pattern_id: String,
    pub sequence: Vec<ConversationState>,
    pub frequency: u64,
    /// Average satisfaction of the underlying sequence.
    pub success_rate: f64,
    /// Geometric mean of transition probabilities along the sequence.
    pub confidence: f64,
    pub skip_opportunities: Vec<SkipOpportunity>,
    pub last_applied: Option<Timestamp>,
}

/// One tunable parameter, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRecord {
    pub component: String,
    pub parameter: String,
    pub value: f64,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn association_serializes_with_persisted_field_names() {
        let at = Utc::now();
        let a = Association::new("ngl", ContextType::CasualChat, at);
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["term"], "ngl");
        assert_eq!(json["contextType"], "casual_chat");
        assert_eq!(json["strength"], 0.5);
        assert_eq!(json["observationCount"], 0);
        assert!(json.get("lastUpdated").is_some());
    }

    #[test]
    fn coactivation_flattens_canonical_pair() {
        let c = Coactivation::new(DimensionPair::new("warmth", "humor"), Utc::now());
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["dim1"], "humor");
        assert_eq!(json["dim2"], "warmth");
        assert_eq!(json["strength"], 0.0);
        let back: Coactivation = serde_json::from_value(json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn pattern_tracks_running_values_and_satisfaction() {
        let at = Utc::now();
        let mut p = MultiDimensionalPattern::new("mdp-x", at);
        let mut values = BTreeMap::new();
        values.insert("humor".to_string(), 0.8);
        p.record(&values, Some(0.9), at);
        values.insert("humor".to_string(), 0.6);
        p.record(&values, None, at);
        p.record(&values, Some(0.5), at);

        assert_eq!(p.frequency, 3);
        assert!((p.dimensions["humor"] - (0.8 + 0.6 + 0.6) / 3.0).abs() < 1e-9);
        assert!((p.avg_satisfaction - 0.7).abs() < 1e-9);
        assert_eq!(p.satisfaction_samples, 2);
    }

    #[test]
    fn sequence_without_satisfaction_stays_neutral() {
        use ConversationState::*;
        let mut s = StateSequence::new(vec![CasualChat, ProblemStatement, DebuggingHelp], Utc::now());
        s.record(None, Utc::now());
        assert_eq!(s.frequency, 1);
        assert_eq!(s.avg_satisfaction, NEUTRAL_SATISFACTION);
    }
}
