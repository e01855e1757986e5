#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use thiserror::Error;

/// Every way a grading run can end in the `Failed` state.
///
/// Language-analysis failures are absent: they are recovered
/// inside the pipeline and never surface here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GradingError {
    /// The submitted content's declared kind has no extraction route.
    #[error("Unsupported file type: {0}")]
    UnsupportedContentType(String),
    /// The extraction capability reported a failure.
    #[error("Failed to extract text from document: {0}")]
    ExtractionFailed(String),
    /// Extraction succeeded but recovered no usable text.
    #[error("No text could be extracted from the submitted content")]
    EmptyExtractionResult,
    /// The generative grading capability could not be reached or refused.
    #[error("Grading service unavailable: {0}")]
    GradingUnavailable(String),
    /// The generative grading capability answered with something that is not
    /// the expected JSON shape.
    #[error("Grading output could not be parsed: {0}")]
    GradingOutputUnparsable(String),
    /// The request was rejected before any stage ran.
    #[error("Invalid grading request: {0}")]
    InvalidRequest(String),
    /// Storing a computed result failed. Reported alongside the result, never
    /// in place of it.
    #[error("Failed to persist grading result: {0}")]
    PersistenceFailed(String),
}

impl GradingError {
    /// Wraps an adapter error, keeping its whole context chain in the message.
    pub(crate) fn extraction(err: &anyhow::Error) -> Self {
        Self::ExtractionFailed(format!("{err:#}"))
    }

    /// Wraps a failed generative call, keeping its whole context chain.
    pub(crate) fn grading(err: &anyhow::Error) -> Self {
        Self::GradingUnavailable(format!("{err:#}"))
    }
}

/// Rubric validation failure carrying every violation found, not just the
/// first one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", .violations.join("; "))]
pub struct RubricError {
    /// Human-readable description of each violation, in rubric order.
    pub violations: Vec<String>,
}

impl From<RubricError> for GradingError {
    fn from(err: RubricError) -> Self {
        GradingError::InvalidRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_context_is_kept_in_message() {
        let err = anyhow::anyhow!("connection reset").context("Read request to vision failed");
        let wrapped = GradingError::extraction(&err);
        assert_eq!(
            wrapped.to_string(),
            "Failed to extract text from document: Read request to vision failed: connection reset"
        );
    }

    #[test]
    fn rubric_error_lists_every_violation() {
        let err = RubricError {
            violations: vec!["a".into(), "b".into()],
        };
        assert_eq!(GradingError::from(err).to_string(), "Invalid grading request: a; b");
    }
}
