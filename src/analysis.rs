#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Overall and per-sentence sentiment of a text.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Sentiment {
    /// `positive`, `neutral`, `negative` or `mixed`.
    pub label:     String,
    /// Confidence that the text is positive.
    pub positive:  f64,
    /// Confidence that the text is neutral.
    pub neutral:   f64,
    /// Confidence that the text is negative.
    pub negative:  f64,
    /// Sentences in order, each with its own label.
    pub sentences: Vec<SentenceSentiment>,
}

/// Sentiment of one sentence.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SentenceSentiment {
    /// The sentence.
    pub text:  String,
    /// Its sentiment label.
    pub label: String,
}

/// Counts derived from the sentence split.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyntaxSummary {
    /// Number of sentences.
    pub sentence_count: usize,
    /// Number of whitespace-separated tokens.
    pub token_count:    usize,
}

impl SyntaxSummary {
    /// Summarises `text` given the sentences it was split into.
    pub fn of(text: &str, sentence_count: usize) -> Self {
        Self {
            sentence_count,
            token_count: text.split_whitespace().count(),
        }
    }
}

/// Most likely language of a text.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct DetectedLanguage {
    /// English name, e.g. `English`.
    pub name:       String,
    /// ISO 639-1 code, e.g. `en`.
    pub iso_code:   String,
    /// Detection confidence.
    pub confidence: f64,
}

/// Supplementary linguistic signals about a text.
///
/// Purely informational: grading never depends on it.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct LanguageAnalysis {
    /// Sentiment of the text and each sentence.
    pub sentiment:         Sentiment,
    /// Key phrases, most salient first.
    pub key_phrases:       Vec<String>,
    /// Sentence and token counts.
    pub syntax:            SyntaxSummary,
    /// Detected language, when detection succeeded.
    pub detected_language: Option<DetectedLanguage>,
}

/// Produces a [`LanguageAnalysis`] for a text.
#[async_trait]
pub trait LanguageAnalyzer: Send + Sync {
    /// Analyses `text`.
    async fn analyze(&self, text: &str) -> Result<LanguageAnalysis>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_count_ignores_extra_whitespace() {
        let summary = SyntaxSummary::of("  One  two\nthree.\tFour. ", 2);
        assert_eq!(summary, SyntaxSummary {
            sentence_count: 2,
            token_count:    4,
        });
    }
}
