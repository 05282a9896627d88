//! Ordered rule lists for conversation-state and context-type labelling.
//!
//! A rule list is evaluated top to bottom and the first matching rule
//! wins, so the list order is the classification behaviour. Nothing here
//! can fail: when no rule matches, the list's fallback applies.

use hebb_core::text::NormalizedText;
use hebb_core::types::{ContextSignals, ContextType, ConversationState};
use tracing::debug;

/// A test applied to one message and its pipeline signals.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Any phrase occurs on word boundaries in the normalized message.
    Phrases(&'static [&'static str]),
    CodeBlock,
    FollowUp,
    /// The pipeline's mood label is one of these (case-insensitive).
    Mood(&'static [&'static str]),
    /// Either signal at or above its bound.
    Signals { technical_depth: f64, formality: f64 },
    Any(Vec<Predicate>),
}

impl Predicate {
    pub fn matches(&self, text: &NormalizedText, signals: &ContextSignals) -> bool {
        match self {
            Predicate::Phrases(phrases) => text.contains_any(phrases),
            Predicate::CodeBlock => signals.has_code_block,
            Predicate::FollowUp => signals.is_follow_up,
            Predicate::Mood(moods) => signals
                .mood
                .as_deref()
                .map(|m| m.trim().to_lowercase())
                .is_some_and(|m| moods.contains(&m.as_str())),
            Predicate::Signals {
                technical_depth,
                formality,
            } => signals.technical_depth >= *technical_depth || signals.formality >= *formality,
            Predicate::Any(inner) => inner.iter().any(|p| p.matches(text, signals)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule<T> {
    pub name: &'static str,
    pub predicate: Predicate,
    pub outcome: T,
}

impl<T> Rule<T> {
    pub fn new(name: &'static str, predicate: Predicate, outcome: T) -> Self {
        Self {
            name,
            predicate,
            outcome,
        }
    }
}

/// First-match-wins rule list with a fallback outcome.
#[derive(Debug, Clone)]
pub struct RuleList<T> {
    rules: Vec<Rule<T>>,
    fallback: T,
}

pub type StateClassifier = RuleList<ConversationState>;
pub type ContextClassifier = RuleList<ContextType>;

impl<T: Copy + std::fmt::Debug> RuleList<T> {
    pub fn new(rules: Vec<Rule<T>>, fallback: T) -> Self {
        Self { rules, fallback }
    }

    pub fn rules(&self) -> &[Rule<T>] {
        &self.rules
    }

    pub fn fallback(&self) -> T {
        self.fallback
    }

    /// Outcome and the name of the rule that produced it (`"fallback"` if none).
    pub fn evaluate(&self, message: &str, signals: &ContextSignals) -> (T, &'static str) {
        let text = NormalizedText::new(message);
        for rule in &self.rules {
            if rule.predicate.matches(&text, signals) {
                debug!(rule = rule.name, outcome = ?rule.outcome, "classified");
                return (rule.outcome, rule.name);
            }
        }
        (self.fallback, "fallback")
    }

    pub fn classify(&self, message: &str, signals: &ContextSignals) -> T {
        self.evaluate(message, signals).0
    }
}

const FRUSTRATION: &[&str] = &[
    "frustrated", "frustrating", "this is annoying", "so annoying", "doesn't work",
    "still not working", "still doesn't", "i give up", "ugh", "wtf", "this sucks",
    "not helpful", "useless",
];

const CORRECTION: &[&str] = &[
    "that's wrong", "that is wrong", "that's not right", "that's not correct", "incorrect",
    "you're wrong", "not what i asked", "not what i meant", "you made a mistake",
    "wrong answer",
];

const POSITIVE: &[&str] = &[
    "thanks", "thank you", "perfect", "great job", "awesome", "that worked", "works now",
    "that helps", "that helped", "exactly what i needed", "brilliant", "nice one",
];

const SIMPLIFICATION: &[&str] = &[
    "simpler", "simplify", "eli5", "explain like i'm five", "in simple terms",
    "too complicated", "too complex", "dumb it down", "plain english", "layman's terms",
    "break it down",
];

const DEBUGGING: &[&str] = &[
    "error", "bug", "exception", "stack trace", "traceback", "crash", "crashes",
    "crashing", "segfault", "panic", "panicked", "failing", "broken", "debug",
];

const CODE_REVIEW: &[&str] = &[
    "review my code", "code review", "review this", "look at my code", "check my code",
    "refactor", "improve this code", "feedback on my",
];

const OPINION: &[&str] = &[
    "what do you think", "your opinion", "do you prefer", "which is better",
    "would you recommend", "should i use", "what's your take", "thoughts on",
];

const CLARIFICATION: &[&str] = &[
    "what do you mean", "what does that mean", "can you clarify", "clarify",
    "i don't understand", "i'm confused", "confused", "not sure what",
];

const FOLLOW_UP: &[&str] = &[
    "one more thing", "another question", "follow up", "following up", "what about",
    "what if", "and also", "building on that",
];

const TECHNICAL: &[&str] = &[
    "how does", "explain", "algorithm", "architecture", "implementation", "performance",
    "complexity", "under the hood", "difference between", "protocol", "concurrency",
];

const PROBLEM: &[&str] = &[
    "i need", "i'm trying to", "i am trying to", "how can i", "how do i", "i want to",
    "help me", "can't figure out", "stuck on", "problem", "issue", "need help",
];

const GREETINGS: &[&str] = &[
    "hi", "hello", "hey", "good morning", "good evening", "what's up", "how are you", "yo",
];

const EMOTIONAL_MOODS: &[&str] = &[
    "frustrated", "sad", "anxious", "stressed", "upset", "angry", "overwhelmed", "lonely",
    "worried",
];

const EMOTIONAL: &[&str] = &[
    "i feel", "feeling", "stressed", "anxious", "sad", "overwhelmed", "depressed", "lonely",
    "worried", "upset",
];

const TEACHING: &[&str] = &[
    "teach me", "explain", "learn", "learning", "tutorial", "how does", "what is",
    "for beginners", "walk me through", "lesson",
];

const CREATIVE: &[&str] = &[
    "story", "poem", "imagine", "brainstorm", "creative", "write a song", "invent",
    "fiction", "character", "lyrics",
];

impl RuleList<ConversationState> {
    /// The conversation-state rule order.
    pub fn conversation_states() -> Self {
        use ConversationState::*;
        use Predicate::*;
        Self::new(
            vec![
                Rule::new("frustration", Phrases(FRUSTRATION), FrustrationExpression),
                Rule::new("correction", Phrases(CORRECTION), CorrectionRequest),
                Rule::new("positive", Phrases(POSITIVE), PositiveFeedback),
                Rule::new("simplification", Phrases(SIMPLIFICATION), SimplificationRequest),
                Rule::new("debugging", Phrases(DEBUGGING), DebuggingHelp),
                Rule::new("code_review", Phrases(CODE_REVIEW), CodeReview),
                Rule::new("opinion", Phrases(OPINION), OpinionRequest),
                Rule::new("clarification", Phrases(CLARIFICATION), ClarificationQuestion),
                Rule::new("follow_up_keywords", Phrases(FOLLOW_UP), FollowUpQuestion),
                Rule::new("technical_keywords", Phrases(TECHNICAL), TechnicalExplanation),
                Rule::new("problem", Phrases(PROBLEM), ProblemStatement),
                Rule::new("greeting", Phrases(GREETINGS), CasualChat),
                Rule::new("code_block", CodeBlock, CodeReview),
                Rule::new("follow_up_flag", FollowUp, FollowUpQuestion),
                Rule::new(
                    "technical_signals",
                    Signals {
                        technical_depth: 0.5,
                        formality: 0.6,
                    },
                    TechnicalExplanation,
                ),
            ],
            CasualChat,
        )
    }
}

impl RuleList<ContextType> {
    /// The vocabulary context-type rule order.
    pub fn context_types() -> Self {
        use ContextType::*;
        use Predicate::*;
        Self::new(
            vec![
                Rule::new("emotional", Any(vec![Mood(EMOTIONAL_MOODS), Phrases(EMOTIONAL)]), EmotionalSupport),
                Rule::new("debugging", Any(vec![CodeBlock, Phrases(DEBUGGING)]), Debugging),
                Rule::new("teaching", Phrases(TEACHING), Teaching),
                Rule::new("creative", Phrases(CREATIVE), Creative),
                Rule::new(
                    "formal",
                    Signals {
                        technical_depth: 0.6,
                        formality: 0.6,
                    },
                    FormalTechnical,
                ),
            ],
            CasualChat,
        )
    }
}

impl Default for StateClassifier {
    fn default() -> Self {
        Self::conversation_states()
    }
}

impl Default for ContextClassifier {
    fn default() -> Self {
        Self::context_types()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConversationState::*;

    fn state(message: &str) -> (ConversationState, &'static str) {
        StateClassifier::default().evaluate(message, &ContextSignals::default())
    }

    #[test]
    fn each_keyword_rule_fires() {
        let cases = [
            ("ugh, this still doesn't compile", FrustrationExpression, "frustration"),
            ("No, that's wrong", CorrectionRequest, "correction"),
            ("Thanks, that did it!", PositiveFeedback, "positive"),
            ("Can you make it simpler?", SimplificationRequest, "simplification"),
            ("I get an error on line 3", DebuggingHelp, "debugging"),
            ("Could you review my code?", CodeReview, "code_review"),
            ("What do you think about Go?", OpinionRequest, "opinion"),
            ("What do you mean by lifetime?", ClarificationQuestion, "clarification"),
            ("What about async closures?", FollowUpQuestion, "follow_up_keywords"),
            ("How does the borrow checker reason about loops?", TechnicalExplanation, "technical_keywords"),
            ("I need to parse a CSV file", ProblemStatement, "problem"),
            ("hey there", CasualChat, "greeting"),
        ];
        for (message, expected, rule) in cases {
            assert_eq!(state(message), (expected, rule), "message: {message}");
        }
    }

    #[test]
    fn earlier_rules_win() {
        // frustration outranks positive feedback
        assert_eq!(state("thanks, but this is useless").0, FrustrationExpression);
        // simplification outranks technical keywords
        assert_eq!(state("explain it in simple terms").0, SimplificationRequest);
        // debugging outranks problem
        assert_eq!(state("I need help with this panic").0, DebuggingHelp);
    }

    #[test]
    fn phrases_respect_word_boundaries() {
        // "hi" inside "this" is not a greeting
        assert_eq!(state("this"), (CasualChat, "fallback"));
        assert_eq!(state("attach the debugger").0, CasualChat);
        assert_eq!(state("ship it").1, "fallback");
    }

    #[test]
    fn flag_rules_follow_keyword_rules() {
        let classifier = StateClassifier::default();
        let code = ContextSignals {
            has_code_block: true,
            ..Default::default()
        };
        assert_eq!(classifier.evaluate("fn main() {}", &code), (CodeReview, "code_block"));
        assert_eq!(classifier.classify("got an error here", &code), DebuggingHelp);

        let follow = ContextSignals {
            is_follow_up: true,
            ..Default::default()
        };
        assert_eq!(classifier.evaluate("and then?", &follow), (FollowUpQuestion, "follow_up_flag"));
    }

    #[test]
    fn default_split_uses_signals() {
        let classifier = StateClassifier::default();
        let deep = ContextSignals {
            technical_depth: 0.5,
            ..Default::default()
        };
        assert_eq!(classifier.classify("monads", &deep), TechnicalExplanation);
        let formal = ContextSignals {
            formality: 0.6,
            ..Default::default()
        };
        assert_eq!(classifier.classify("monads", &formal), TechnicalExplanation);
        let light = ContextSignals {
            technical_depth: 0.49,
            formality: 0.59,
            ..Default::default()
        };
        assert_eq!(classifier.evaluate("monads", &light), (CasualChat, "fallback"));
        assert_eq!(classifier.classify("", &ContextSignals::default()), CasualChat);
    }

    #[test]
    fn context_types_in_order() {
        let classifier = ContextClassifier::default();
        let plain = ContextSignals::default();
        let sad = ContextSignals {
            mood: Some("Sad".into()),
            ..Default::default()
        };
        assert_eq!(classifier.classify("there is a bug", &sad), ContextType::EmotionalSupport);
        assert_eq!(classifier.classify("I feel stuck", &plain), ContextType::EmotionalSupport);
        assert_eq!(classifier.classify("there is a bug", &plain), ContextType::Debugging);
        assert_eq!(classifier.classify("teach me rust", &plain), ContextType::Teaching);
        assert_eq!(classifier.classify("write a poem", &plain), ContextType::Creative);
        let formal = ContextSignals {
            formality: 0.8,
            ..Default::default()
        };
        assert_eq!(classifier.classify("quarterly numbers", &formal), ContextType::FormalTechnical);
        assert_eq!(classifier.classify("ngl that slaps", &plain), ContextType::CasualChat);
    }

    #[test]
    fn rule_list_is_exposed_in_order() {
        let names: Vec<&str> = StateClassifier::default().rules().iter().map(|r| r.name).collect();
        assert_eq!(names.first(), Some(&"frustration"));
        assert_eq!(names.last(), Some(&"technical_signals"));
        assert_eq!(names.len(), 15);
    }
}
