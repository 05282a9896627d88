//! Text normalization shared by the engines.
//!
//! Lowercase, split on non-word characters, drop stop words. No stemming,
//! no language models.

use std::collections::HashSet;

/// Function words that never carry a context association.
pub const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being",
    "have", "has", "had", "do", "does", "did", "will", "would", "shall",
    "should", "may", "might", "must", "can", "could", "of", "in", "to",
    "for", "with", "on", "at", "from", "by", "about", "as", "into",
    "through", "during", "before", "after", "above", "below", "between",
    "out", "off", "over", "under", "again", "further", "then", "once",
    "here", "there", "when", "where", "why", "how", "all", "each",
    "every", "both", "few", "more", "most", "other", "some", "such",
    "no", "nor", "not", "only", "own", "same", "so", "than", "too",
    "very", "just", "because", "but", "and", "or", "if", "while",
    "that", "this", "these", "those", "it", "its", "they", "them",
    "their", "we", "our", "you", "your", "he", "she", "his", "her",
    "which", "what", "who", "whom", "i", "me", "my", "im", "i'm",
    "it's", "that's", "don't", "i've", "you're", "am", "up",
];

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '\''
}

/// Normalize a single vocabulary term: trim, lowercase, strip edge apostrophes.
pub fn normalize_term(term: &str) -> String {
    term.trim()
        .replace('\u{2019}', "'")
        .to_lowercase()
        .trim_matches('\'')
        .to_string()
}

/// Extract candidate vocabulary terms from free text.
///
/// Lowercased, stop words and pure numbers removed, tokens shorter than two
/// characters dropped, duplicates removed (first occurrence wins).
pub fn tokenize_terms(text: &str) -> Vec<String> {
    let stop: HashSet<&str> = STOP_WORDS.iter().copied().collect();
    let text = text.replace('\u{2019}', "'");
    let mut seen = HashSet::new();
    let mut terms = Vec::new();

    for raw in text.split(|c: char| !is_word_char(c)) {
        let term = normalize_term(raw);
        if term.chars().count() < 2
            || stop.contains(term.as_str())
            || term.chars().all(|c| c.is_ascii_digit())
        {
            continue;
        }
        if seen.insert(term.clone()) {
            terms.push(term);
        }
    }
    terms
}

/// A message normalized for phrase matching.
///
/// Lowercase words separated by single spaces, padded with a space on both
/// ends so that phrase lookups respect word boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    padded: String,
}

impl NormalizedText {
    pub fn new(message: &str) -> Self {
        let lowered = message.replace('\u{2019}', "'").to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !is_word_char(c))
            .map(|w| w.trim_matches('\''))
            .filter(|w| !w.is_empty())
            .collect();
        Self {
            padded: format!(" {} ", words.join(" ")),
        }
    }

    /// Whether `phrase` (already lowercase, single-spaced) occurs on word boundaries.
    pub fn contains_phrase(&self, phrase: &str) -> bool {
        self.padded.contains(&format!(" {} ", phrase))
    }

    pub fn contains_any(&self, phrases: &[&str]) -> bool {
        phrases.iter().any(|p| self.contains_phrase(p))
    }

    pub fn as_str(&self) -> &str {
        self.padded.trim()
    }

    pub fn is_empty(&self) -> bool {
        self.padded.trim().is_empty()
    }
}

/// A piece of text as seen by response filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Word(&'a str),
    Space(&'a str),
    Punct(&'a str),
}

/// Split text into words, whitespace runs and punctuation runs without
/// losing any characters; concatenating the segments reproduces the input.
pub fn segments(text: &str) -> Vec<Segment<'_>> {
    #[derive(PartialEq, Clone, Copy)]
    enum Kind {
        Word,
        Space,
        Punct,
    }

    fn kind_of(c: char) -> Kind {
        if is_word_char(c) || c == '\u{2019}' {
            Kind::Word
        } else if c.is_whitespace() {
            Kind::Space
        } else {
            Kind::Punct
        }
    }

    let mut out = Vec::new();
    let mut start = 0;
    let mut current: Option<Kind> = None;

    for (i, c) in text.char_indices() {
        let k = kind_of(c);
        match current {
            Some(prev) if prev == k => {}
            Some(prev) => {
                out.push(make_segment(prev, &text[start..i]));
                start = i;
                current = Some(k);
            }
            None => current = Some(k),
        }
    }
    if let Some(k) = current {
        out.push(make_segment(k, &text[start..]));
    }

    fn make_segment(kind: Kind, s: &str) -> Segment<'_> {
        match kind {
            Kind::Word => Segment::Word(s),
            Kind::Space => Segment::Space(s),
            Kind::Punct => Segment::Punct(s),
        }
    }

    out
}
