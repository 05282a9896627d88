//! Shared types used across all Hebb engines and crates.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Timestamps are UTC wall-clock instants.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Conversational context a vocabulary term can be associated with.
///
/// Exactly six kinds exist; every term carries at most one association
/// per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    CasualChat,
    FormalTechnical,
    EmotionalSupport,
    Debugging,
    Teaching,
    Creative,
}

impl ContextType {
    /// Every context kind, in declaration order.
    pub const ALL: [ContextType; 6] = [
        ContextType::CasualChat,
        ContextType::FormalTechnical,
        ContextType::EmotionalSupport,
        ContextType::Debugging,
        ContextType::Teaching,
        ContextType::Creative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContextType::CasualChat => "casual_chat",
            ContextType::FormalTechnical => "formal_technical",
            ContextType::EmotionalSupport => "emotional_support",
            ContextType::Debugging => "debugging",
            ContextType::Teaching => "teaching",
            ContextType::Creative => "creative",
        }
    }

    /// Position in [`ContextType::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContextType::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown context type: {}", s))
    }
}

/// A state in the closed conversation-state vocabulary.
///
/// Classification never produces anything outside this enum; input that
/// matches no rule falls back to `CasualChat` or `TechnicalExplanation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    ProblemStatement,
    ClarificationQuestion,
    TechnicalExplanation,
    SimplifiedExplanation,
    SimplificationRequest,
    CodeReview,
    DebuggingHelp,
    OpinionRequest,
    CasualChat,
    FollowUpQuestion,
    PositiveFeedback,
    CorrectionRequest,
    FrustrationExpression,
}

impl ConversationState {
    pub const ALL: [ConversationState; 13] = [
        ConversationState::ProblemStatement,
        ConversationState::ClarificationQuestion,
        ConversationState::TechnicalExplanation,
        ConversationState::SimplifiedExplanation,
        ConversationState::SimplificationRequest,
        ConversationState::CodeReview,
        ConversationState::DebuggingHelp,
        ConversationState::OpinionRequest,
        ConversationState::CasualChat,
        ConversationState::FollowUpQuestion,
        ConversationState::PositiveFeedback,
        ConversationState::CorrectionRequest,
        ConversationState::FrustrationExpression,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::ProblemStatement => "problem_statement",
            ConversationState::ClarificationQuestion => "clarification_question",
            ConversationState::TechnicalExplanation => "technical_explanation",
            ConversationState::SimplifiedExplanation => "simplified_explanation",
            ConversationState::SimplificationRequest => "simplification_request",
            ConversationState::CodeReview => "code_review",
            ConversationState::DebuggingHelp => "debugging_help",
            ConversationState::OpinionRequest => "opinion_request",
            ConversationState::CasualChat => "casual_chat",
            ConversationState::FollowUpQuestion => "follow_up_question",
            ConversationState::PositiveFeedback => "positive_feedback",
            ConversationState::CorrectionRequest => "correction_request",
            ConversationState::FrustrationExpression => "frustration_expression",
        }
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConversationState::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown conversation state: {}", s))
    }
}

/// Identifier for a logical conversation.
///
/// Per-session state (recent history, previous state) is keyed by this,
/// never held process-wide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-turn signals supplied by the owning dialogue pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextSignals {
    /// 0.0 = very casual, 1.0 = very formal.
    pub formality: f64,
    /// 0.0 = no technical content, 1.0 = deeply technical.
    pub technical_depth: f64,
    pub is_follow_up: bool,
    pub has_code_block: bool,
    /// Free-form mood label from the pipeline ("frustrated", "sad", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    /// User satisfaction with the previous turn (0.0-1.0), if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satisfaction: Option<f64>,
}

/// An unordered pair of dimension names, stored in canonical order.
///
/// `dim1 < dim2` lexicographically. Every lookup and every store key goes
/// through [`DimensionPair::new`], so `(a, b)` and `(b, a)` are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawDimensionPair")]
pub struct DimensionPair {
    dim1: String,
    dim2: String,
}

#[derive(Deserialize)]
struct RawDimensionPair {
    dim1: String,
    dim2: String,
}

impl From<RawDimensionPair> for DimensionPair {
    fn from(raw: RawDimensionPair) -> Self {
        DimensionPair::new(raw.dim1, raw.dim2)
    }
}

impl DimensionPair {
    /// The single canonicalization point for dimension pairs.
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let a = a.into();
        let b = b.into();
        if a <= b {
            Self { dim1: a, dim2: b }
        } else {
            Self { dim1: b, dim2: a }
        }
    }

    pub fn first(&self) -> &str {
        &self.dim1
    }

    pub fn second(&self) -> &str {
        &self.dim2
    }

    pub fn contains(&self, dimension: &str) -> bool {
        self.dim1 == dimension || self.dim2 == dimension
    }

    /// The member that is not `dimension`, if `dimension` is in the pair.
    pub fn other(&self, dimension: &str) -> Option<&str> {
        if self.dim1 == dimension {
            Some(&self.dim2)
        } else if self.dim2 == dimension {
            Some(&self.dim1)
        } else {
            None
        }
    }
}

/// Lowercase hex SHA-256 of the parts joined by `separator`.
fn digest_hex<'a>(parts: impl IntoIterator<Item = &'a str>, separator: &str) -> String {
    let joined = parts.into_iter().collect::<Vec<_>>().join(separator);
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Deterministic identifier: `prefix` + first 16 hex chars of SHA-256 over
/// the parts joined by `separator`.
pub fn stable_id<'a>(prefix: &str, parts: impl IntoIterator<Item = &'a str>, separator: &str) -> String {
    let digest = digest_hex(parts, separator);
    format!("{}{}", prefix, &digest[..16])
}

/// Full hex SHA-256 of the state names joined by `>`.
pub fn sequence_hash(sequence: &[ConversationState]) -> String {
    digest_hex(sequence.iter().map(|s| s.as_str()), ">")
}

/// Identifier of a multi-dimensional pattern. Order of `dimensions` does not matter.
pub fn pattern_id<S: AsRef<str>>(dimensions: &[S]) -> String {
    let mut names: Vec<&str> = dimensions.iter().map(|d| d.as_ref()).collect();
    names.sort_unstable();
    names.dedup();
    stable_id("mdp-", names, ",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_is_canonical_regardless_of_argument_order() {
        let ab = DimensionPair::new("warmth", "humor");
        let ba = DimensionPair::new("humor", "warmth");
        assert_eq!(ab, ba);
        assert_eq!(ab.first(), "humor");
        assert_eq!(ab.second(), "warmth");
        assert_eq!(ab.other("humor"), Some("warmth"));
        assert_eq!(ab.other("verbosity"), None);
    }

    #[test]
    fn pair_deserialization_recanonicalizes() {
        let pair: DimensionPair =
            serde_json::from_str(r#"{"dim1":"zeal","dim2":"apathy"}"#).unwrap();
        assert_eq!(pair.first(), "apathy");
        assert_eq!(pair.second(), "zeal");
    }

    #[test]
    fn state_names_round_trip_through_from_str() {
        for state in ConversationState::ALL {
            assert_eq!(state.as_str().parse::<ConversationState>().unwrap(), state);
        }
        assert!("small_talk".parse::<ConversationState>().is_err());
    }

    #[test]
    fn context_index_matches_all_order() {
        for (i, ctx) in ContextType::ALL.iter().enumerate() {
            assert_eq!(ctx.index(), i);
        }
    }

    #[test]
    fn pattern_id_ignores_dimension_order() {
        let a = pattern_id(&["humor", "warmth", "brevity"]);
        let b = pattern_id(&["warmth", "brevity", "humor"]);
        assert_eq!(a, b);
        assert!(a.starts_with("mdp-"));
        assert_eq!(a.len(), 4 + 16);
    }

    #[test]
    fn sequence_hash_depends_on_order() {
        use ConversationState::*;
        let a = sequence_hash(&[ProblemStatement, TechnicalExplanation, PositiveFeedback]);
        let b = sequence_hash(&[TechnicalExplanation, ProblemStatement, PositiveFeedback]);
        assert_ne!(a, b);
        assert_eq!(a, sequence_hash(&[ProblemStatement, TechnicalExplanation, PositiveFeedback]));
    }

    #[test]
    fn sequence_hash_is_full_sha256_of_joined_names() {
        use ConversationState::*;
        let hash = sequence_hash(&[ProblemStatement, TechnicalExplanation, PositiveFeedback]);
        // sha256("problem_statement>technical_explanation>positive_feedback")
        assert_eq!(hash, "7603b88532736240b7d2f7b06f6d0f8682f92394cec39de31d3f7b9841dcf2e2");
    }
}
