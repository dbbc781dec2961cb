use std::collections::BTreeSet;

use quarry_core::models::{Annotation, Sentiment};
use quarry_core::traits::TextAnnotator;

const POSITIVE_TAGS: &[&str] = &["loved_it", "great"];
const NEGATIVE_TAGS: &[&str] = &["boring"];

/// Default tag → phrase table for exam-prep channels.
pub const DEFAULT_KEYWORDS: &[(&str, &[&str])] = &[
    ("loved_it", &["loved it", "love it", "loved this", "love this"]),
    (
        "great",
        &["great", "amazing", "awesome", "excellent", "fantastic", "wonderful"],
    ),
    ("boring", &["boring", "bored", "dull", "bekar", "tedious"]),
    (
        "explanation",
        &["explanation", "explanations", "explained", "explaining"],
    ),
    (
        "explain",
        &["explain", "explains", "clarify", "clarification", "understand"],
    ),
    (
        "physics_wallah",
        &["physics wallah", "pw", "physicswallah", "physics wala"],
    ),
    ("neetprep", &["neetprep", "neet prep", "neet preparation"]),
    ("neet", &["neet", "neet exam", "neet 2025"]),
];

/// Remove byte-order marks, NULs and links, then collapse whitespace.
pub fn clean_text(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| word.replace(['\u{feff}', '\0'], ""))
        .filter(|word| !word.is_empty() && !is_link(word))
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_link(word: &str) -> bool {
    let lower = word.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("www.")
}

/// Lowercased words with punctuation stripped, wrapped in spaces so phrases
/// only match on word boundaries.
fn match_form(text: &str) -> String {
    let words: Vec<String> = text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    format!(" {} ", words.join(" "))
}

/// Phrase-table annotator. Matching is case-insensitive on whole words.
#[derive(Debug, Clone)]
pub struct KeywordAnnotator {
    table: Vec<(String, Vec<String>)>,
}

impl Default for KeywordAnnotator {
    fn default() -> Self {
        Self::new(
            DEFAULT_KEYWORDS
                .iter()
                .map(|(tag, phrases)| (*tag, phrases.iter().copied())),
        )
    }
}

impl KeywordAnnotator {
    pub fn new<'a, I, P>(table: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, P)>,
        P: IntoIterator<Item = &'a str>,
    {
        let table = table
            .into_iter()
            .map(|(tag, phrases)| {
                let phrases = phrases
                    .into_iter()
                    .map(|p| match_form(p))
                    .filter(|p| !p.trim().is_empty())
                    .collect();
                (tag.to_string(), phrases)
            })
            .collect();
        Self { table }
    }
}

impl TextAnnotator for KeywordAnnotator {
    fn annotate(&self, raw_text: &str) -> Annotation {
        let cleaned_text = clean_text(raw_text);
        let haystack = match_form(&cleaned_text);

        let tags: BTreeSet<String> = self
            .table
            .iter()
            .filter(|(_, phrases)| phrases.iter().any(|p| haystack.contains(p.as_str())))
            .map(|(tag, _)| tag.clone())
            .collect();

        let positive = POSITIVE_TAGS.iter().any(|t| tags.contains(*t));
        let negative = NEGATIVE_TAGS.iter().any(|t| tags.contains(*t));
        let sentiment = match (positive, negative) {
            (true, true) => Sentiment::Mixed,
            (true, false) => Sentiment::Positive,
            (false, true) => Sentiment::Negative,
            (false, false) => Sentiment::Neutral,
        };

        Annotation {
            cleaned_text,
            tags,
            sentiment,
        }
    }
}
