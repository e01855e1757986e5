#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};

use super::{SUBSCRIPTION_KEY_HEADER, ensure_success};
use crate::{
    analysis::{
        DetectedLanguage, LanguageAnalysis, LanguageAnalyzer, SentenceSentiment, Sentiment,
        SyntaxSummary,
    },
    config::AzureServiceEnv,
};

/// Synchronous analyze-text path.
const ANALYZE_TEXT_PATH: &str = "language/:analyze-text?api-version=2023-04-01";
/// The service rejects documents longer than this many characters.
const MAX_DOCUMENT_CHARS: usize = 5120;

/// Language analysis through the Azure Language service.
#[derive(Clone)]
pub struct AzureLanguageAnalyzer {
    /// Shared HTTP client.
    http:    Client,
    /// Language resource.
    service: AzureServiceEnv,
}

impl AzureLanguageAnalyzer {
    /// Creates an analyzer for the given resource.
    pub fn new(http: Client, service: AzureServiceEnv) -> Self {
        Self { http, service }
    }

    /// Runs one analyze-text task against a single document and returns that
    /// document's result.
    async fn run_task<D: DeserializeOwned>(&self, kind: &str, text: &str, parameters: Value) -> Result<D> {
        let body = json!({
            "kind": kind,
            "analysisInput": {"documents": [{"id": "1", "text": text}]},
            "parameters": parameters,
        });

        let response = self
            .http
            .post(self.service.url(ANALYZE_TEXT_PATH))
            .header(SUBSCRIPTION_KEY_HEADER, self.service.key())
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Could not reach Language service for {kind}"))?;
        let response: TaskResponse<D> = ensure_success(response, kind)
            .await?
            .json()
            .await
            .with_context(|| format!("{kind} response was not in the expected shape"))?;

        let TaskResults { documents, errors } = response.results;
        if let Some(document) = documents.into_iter().next() {
            return Ok(document);
        }
        match errors.into_iter().next() {
            Some(DocumentError { error }) => bail!("{kind} failed: {}: {}", error.code, error.message),
            None => bail!("{kind} returned no documents"),
        }
    }
}

/// Envelope of every analyze-text response.
#[derive(Deserialize, Debug)]
struct TaskResponse<D> {
    /// Per-document results.
    results: TaskResults<D>,
}

/// Documents that succeeded and those that did not.
#[derive(Deserialize, Debug)]
struct TaskResults<D> {
    /// Successful documents.
    #[serde(default = "Vec::new")]
    documents: Vec<D>,
    /// Failed documents.
    #[serde(default)]
    errors:    Vec<DocumentError>,
}

/// A document the service could not analyse.
#[derive(Deserialize, Debug)]
struct DocumentError {
    /// What went wrong.
    error: ServiceError,
}

/// Error detail reported by the service.
#[derive(Deserialize, Debug)]
struct ServiceError {
    /// Machine-readable code.
    #[serde(default)]
    code:    String,
    /// Human-readable message.
    #[serde(default)]
    message: String,
}

/// Positive/neutral/negative confidences.
#[derive(Deserialize, Debug, Default)]
struct ConfidenceScores {
    /// Positive confidence.
    #[serde(default)]
    positive: f64,
    /// Neutral confidence.
    #[serde(default)]
    neutral:  f64,
    /// Negative confidence.
    #[serde(default)]
    negative: f64,
}

/// Sentiment result for the document.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SentimentDocument {
    /// Overall label.
    sentiment:         String,
    /// Overall confidences.
    #[serde(default)]
    confidence_scores: ConfidenceScores,
    /// Sentence-level results.
    #[serde(default)]
    sentences:         Vec<SentenceDocument>,
}

/// Sentiment result for one sentence.
#[derive(Deserialize, Debug)]
struct SentenceDocument {
    /// The sentence.
    text:      String,
    /// Its label.
    sentiment: String,
}

/// Key phrase result for the document.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct KeyPhraseDocument {
    /// Phrases, most salient first.
    #[serde(default)]
    key_phrases: Vec<String>,
}

/// Language detection result for the document.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct LanguageDocument {
    /// Best guess.
    detected_language: DetectedLanguageDocument,
}

/// The detected language.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct DetectedLanguageDocument {
    /// English name.
    name:             String,
    /// ISO 639-1 code.
    iso6391_name:     String,
    /// Confidence.
    #[serde(default)]
    confidence_score: f64,
}

/// Combines the three task results into one analysis of `text`.
///
/// Counts are taken over the same prefix of `text` the service was sent.
fn combine(
    text: &str,
    sentiment: SentimentDocument,
    phrases: KeyPhraseDocument,
    language: LanguageDocument,
) -> LanguageAnalysis {
    let sentences: Vec<SentenceSentiment> = sentiment
        .sentences
        .into_iter()
        .map(|s| SentenceSentiment {
            text:  s.text,
            label: s.sentiment,
        })
        .collect();
    let syntax = SyntaxSummary::of(truncate_chars(text, MAX_DOCUMENT_CHARS), sentences.len());
    let detected = language.detected_language;

    LanguageAnalysis {
        sentiment: Sentiment {
            label: sentiment.sentiment,
            positive: sentiment.confidence_scores.positive,
            neutral: sentiment.confidence_scores.neutral,
            negative: sentiment.confidence_scores.negative,
            sentences,
        },
        key_phrases: phrases.key_phrases,
        syntax,
        detected_language: Some(DetectedLanguage {
            name:       detected.name,
            iso_code:   detected.iso6391_name,
            confidence: detected.confidence_score,
        }),
    }
}

/// Cuts `text` to at most `max` characters on a char boundary.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[async_trait]
impl LanguageAnalyzer for AzureLanguageAnalyzer {
    async fn analyze(&self, text: &str) -> Result<LanguageAnalysis> {
        let document = truncate_chars(text, MAX_DOCUMENT_CHARS);
        if document.len() < text.len() {
            tracing::debug!("Language analysis limited to the first {MAX_DOCUMENT_CHARS} characters");
        }

        let (sentiment, phrases, language) = tokio::try_join!(
            self.run_task::<SentimentDocument>(
                "SentimentAnalysis",
                document,
                json!({"opinionMining": true})
            ),
            self.run_task::<KeyPhraseDocument>("KeyPhraseExtraction", document, json!({})),
            self.run_task::<LanguageDocument>("LanguageDetection", document, json!({})),
        )?;

        Ok(combine(document, sentiment, phrases, language))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn task_results_combine() {
        let sentiment: TaskResponse<SentimentDocument> = serde_json::from_value(json!({
            "kind": "SentimentAnalysisResults",
            "results": {
                "documents": [{
                    "id": "1",
                    "sentiment": "mixed",
                    "confidenceScores": {"positive": 0.6, "neutral": 0.1, "negative": 0.3},
                    "sentences": [
                        {"text": "I loved the start.", "sentiment": "positive"},
                        {"text": "The end dragged.", "sentiment": "negative"}
                    ]
                }],
                "errors": []
            }
        }))
        .unwrap();
        let phrases: TaskResponse<KeyPhraseDocument> = serde_json::from_value(json!({
            "results": {"documents": [{"id": "1", "keyPhrases": ["start", "end"]}]}
        }))
        .unwrap();
        let language: TaskResponse<LanguageDocument> = serde_json::from_value(json!({
            "results": {"documents": [{
                "id": "1",
                "detectedLanguage": {"name": "English", "iso6391Name": "en", "confidenceScore": 0.99}
            }]}
        }))
        .unwrap();

        let analysis = combine(
            "I loved the start. The end dragged.",
            sentiment.results.documents.into_iter().next().unwrap(),
            phrases.results.documents.into_iter().next().unwrap(),
            language.results.documents.into_iter().next().unwrap(),
        );

        assert_eq!(analysis.sentiment.label, "mixed");
        assert_eq!(analysis.sentiment.sentences[1].label, "negative");
        assert_eq!(analysis.key_phrases, vec!["start", "end"]);
        assert_eq!(analysis.syntax, SyntaxSummary {
            sentence_count: 2,
            token_count:    7,
        });
        assert_eq!(analysis.detected_language.unwrap().iso_code, "en");
    }

    #[test]
    fn syntax_counts_cover_only_the_analyzed_prefix() {
        let long = "a ".repeat(3000);
        let sentiment: SentimentDocument = serde_json::from_value(json!({
            "sentiment": "neutral",
            "confidenceScores": {"positive": 0.0, "neutral": 1.0, "negative": 0.0},
            "sentences": [{"text": "a a a", "sentiment": "neutral"}]
        }))
        .unwrap();
        let phrases: KeyPhraseDocument = serde_json::from_value(json!({"keyPhrases": []})).unwrap();
        let language: LanguageDocument = serde_json::from_value(json!({
            "detectedLanguage": {"name": "English", "iso6391Name": "en", "confidenceScore": 0.5}
        }))
        .unwrap();

        let analysis = combine(&long, sentiment, phrases, language);

        assert_eq!(analysis.syntax, SyntaxSummary {
            sentence_count: 1,
            token_count:    MAX_DOCUMENT_CHARS / 2,
        });
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
