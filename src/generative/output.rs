#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::{error::GradingError, results::GradingFeedback};

/// One score as the grader reported it, before it is trusted.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct RawCriterionScore {
    /// Name the grader used for the criterion.
    #[serde(rename = "criterion")]
    pub criterion_name: String,
    /// Unvalidated score; may be fractional or out of range.
    #[serde(rename = "score", deserialize_with = "finite_score")]
    pub raw_score:      f64,
    /// The grader's justification, if it gave one.
    #[serde(default)]
    pub feedback:       Option<String>,
}

/// The grader's whole answer, with the keys the system prompt asks for.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct GradingOutput {
    /// `"success"` or `"error"`.
    #[serde(default)]
    pub status:          Option<String>,
    /// Error message accompanying an `"error"` status.
    #[serde(default)]
    pub error:           Option<String>,
    /// The grader's own overall score; informational only.
    #[serde(default, deserialize_with = "optional_score")]
    pub overall_score:   Option<f64>,
    /// Per-criterion scores.
    pub grading_results: Vec<RawCriterionScore>,
    /// Narrative feedback, suggestions, and the language-quality block.
    #[serde(flatten)]
    pub feedback:        GradingFeedback,
}

/// A score the grader may send as a JSON number or as a numeric string.
#[derive(Deserialize)]
#[serde(untagged)]
enum ScoreValue {
    /// `7.5`
    Number(f64),
    /// `"7.5"`
    Text(String),
}

impl ScoreValue {
    /// Converts to a finite number.
    fn into_finite(self) -> Result<f64, String> {
        let value = match self {
            ScoreValue::Number(n) => n,
            ScoreValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("score '{s}' is not a number"))?,
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(format!("score {value} is not finite"))
        }
    }
}

/// Deserializes a required score.
fn finite_score<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    ScoreValue::deserialize(deserializer)?
        .into_finite()
        .map_err(serde::de::Error::custom)
}

/// Deserializes an optional score, treating `null` as absent.
fn optional_score<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<ScoreValue>::deserialize(deserializer)?
        .map(ScoreValue::into_finite)
        .transpose()
        .map_err(serde::de::Error::custom)
}

/// Removes a surrounding markdown code fence, if the model added one.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string (```json)
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Validates the grader's reply and returns its structured content.
///
/// A reply with `"status": "error"` is reported as the grader refusing, not
/// as a malformed answer.
pub fn parse_grading_output(raw: &str) -> Result<GradingOutput, GradingError> {
    let value: Value = serde_json::from_str(strip_code_fence(raw))
        .map_err(|err| GradingError::GradingOutputUnparsable(err.to_string()))?;

    if value.get("status").and_then(Value::as_str) == Some("error") {
        let reason = value
            .get("error")
            .and_then(Value::as_str)
            .filter(|e| !e.trim().is_empty())
            .unwrap_or("grader reported an error without details");
        return Err(GradingError::GradingUnavailable(reason.to_string()));
    }

    serde_json::from_value(value).map_err(|err| GradingError::GradingOutputUnparsable(err.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn reply(results: serde_json::Value) -> String {
        json!({
            "status": "success",
            "overall_score": 80,
            "grading_results": results,
            "detailed_feedback": "Solid work.",
            "improvement_suggestions": ["Vary sentence length"],
            "language_quality": {
                "grammar": "Good",
                "vocabulary": "Adequate",
                "style": "Plain",
                "comments": "Readable"
            },
            "strengths": ["Clear thesis"],
            "weaknesses": ["Thin evidence"]
        })
        .to_string()
    }

    #[test]
    fn accepts_numbers_and_numeric_strings() {
        let output = parse_grading_output(&reply(json!([
            {"criterion": "Grammar", "score": 0.5, "feedback": "Minor slips"},
            {"criterion": "Style", "score": " 7 "}
        ])))
        .unwrap();

        assert_eq!(output.grading_results[0].raw_score, 0.5);
        assert_eq!(output.grading_results[0].feedback.as_deref(), Some("Minor slips"));
        assert_eq!(output.grading_results[1].raw_score, 7.0);
        assert_eq!(output.grading_results[1].feedback, None);
        assert_eq!(output.overall_score, Some(80.0));
        assert_eq!(output.feedback.language_quality.vocabulary, "Adequate");
        assert_eq!(output.feedback.strengths, vec!["Clear thesis".to_string()]);
    }

    #[test]
    fn fenced_reply_is_unwrapped() {
        let fenced = format!("```json\n{}\n```", reply(json!([])));
        assert!(parse_grading_output(&fenced).is_ok());
        let bare_fence = format!("```\n{}\n```\n", reply(json!([])));
        assert!(parse_grading_output(&bare_fence).is_ok());
    }

    #[test]
    fn prose_is_unparsable() {
        let err = parse_grading_output("I think this essay deserves a B+.").unwrap_err();
        assert!(matches!(err, GradingError::GradingOutputUnparsable(_)));
    }

    #[test]
    fn missing_required_key_is_unparsable() {
        let err = parse_grading_output(r#"{"grading_results": []}"#).unwrap_err();
        assert!(matches!(err, GradingError::GradingOutputUnparsable(_)));
    }

    #[test]
    fn non_numeric_and_non_finite_scores_are_rejected() {
        for bad in [json!("excellent"), json!("NaN"), json!("inf"), json!(null)] {
            let err = parse_grading_output(&reply(json!([{"criterion": "Grammar", "score": bad}])))
                .unwrap_err();
            assert!(matches!(err, GradingError::GradingOutputUnparsable(_)), "{bad}");
        }
    }

    #[test]
    fn error_status_means_grader_unavailable() {
        let raw = json!({"status": "error", "error": "content policy"}).to_string();

        assert_eq!(
            parse_grading_output(&raw).unwrap_err(),
            GradingError::GradingUnavailable("content policy".into())
        );
    }
}
