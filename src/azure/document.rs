#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{Operation, OperationStatus, analyze_bytes};
use crate::{
    config::AzureServiceEnv,
    extraction::{DocumentExtractor, ExtractedText, TextLine},
};

/// `prebuilt-read` analyze path, pinned to a GA API version.
const ANALYZE_PATH: &str =
    "formrecognizer/documentModels/prebuilt-read:analyze?api-version=2023-07-31";

/// Document extraction through Document Intelligence's read model.
#[derive(Clone)]
pub struct DocumentReader {
    /// Shared HTTP client.
    http:          Client,
    /// Document Intelligence resource.
    service:       AzureServiceEnv,
    /// Delay between status polls.
    poll_interval: Duration,
}

impl DocumentReader {
    /// Creates a reader for the given resource.
    pub fn new(http: Client, service: AzureServiceEnv, poll_interval: Duration) -> Self {
        Self {
            http,
            service,
            poll_interval,
        }
    }
}

/// Status body of an analyze operation.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct AnalyzeOperation {
    /// Lifecycle state.
    status:         OperationStatus,
    /// Present once the operation succeeded.
    #[serde(default)]
    analyze_result: Option<AnalyzeResult>,
    /// Present when the operation failed.
    #[serde(default)]
    error:          Option<ServiceError>,
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

/// Read-model output.
#[derive(Deserialize, Debug)]
struct AnalyzeResult {
    /// Pages in document order.
    #[serde(default)]
    pages: Vec<DocumentPage>,
}

/// One page of a document.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct DocumentPage {
    /// 1-based page number.
    page_number: u32,
    /// Lines in reading order.
    #[serde(default)]
    lines:       Vec<DocumentLine>,
}

/// One line of a page.
#[derive(Deserialize, Debug)]
struct DocumentLine {
    /// Line text.
    content: String,
}

impl Operation for AnalyzeOperation {
    fn status(&self) -> OperationStatus {
        self.status
    }

    fn failure(&self) -> Option<String> {
        self.error
            .as_ref()
            .map(|err| format!("{}: {}", err.code, err.message))
    }
}

impl AnalyzeOperation {
    /// Flattens pages into lines in reading order.
    fn into_text(self) -> Result<ExtractedText> {
        let result = self
            .analyze_result
            .context("Analyze operation succeeded without an analyzeResult")?;

        let lines = result
            .pages
            .into_iter()
            .flat_map(|page| {
                let number = page.page_number;
                page.lines.into_iter().map(move |line| TextLine {
                    text:       line.content,
                    confidence: None,
                    page:       number,
                })
            })
            .collect();

        Ok(ExtractedText::from_lines(lines))
    }
}

#[async_trait]
impl DocumentExtractor for DocumentReader {
    async fn extract_from_document(&self, document: &Path) -> Result<ExtractedText> {
        let bytes = tokio::fs::read(document)
            .await
            .with_context(|| format!("Could not read staged document {}", document.display()))?;

        let operation: AnalyzeOperation =
            analyze_bytes(&self.http, &self.service, ANALYZE_PATH, bytes, self.poll_interval)
                .await
                .context("Document Intelligence analyze failed")?;
        operation.into_text()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn pages_become_lines() {
        let operation: AnalyzeOperation = serde_json::from_value(json!({
            "status": "succeeded",
            "analyzeResult": {
                "pages": [
                    {"pageNumber": 1, "lines": [{"content": "Introduction"}, {"content": "Body"}]},
                    {"pageNumber": 2, "lines": [{"content": "Conclusion"}]}
                ]
            }
        }))
        .unwrap();

        let text = operation.into_text().unwrap();
        assert_eq!(text.full_text, "Introduction\nBody\nConclusion");
        assert_eq!(text.page_count, 2);
        assert_eq!(text.average_confidence(), None);
    }

    #[test]
    fn failure_reason_is_reported() {
        let operation: AnalyzeOperation = serde_json::from_value(json!({
            "status": "failed",
            "error": {"code": "InvalidContent", "message": "The file is corrupted."}
        }))
        .unwrap();

        assert_eq!(operation.status(), OperationStatus::Failed);
        assert_eq!(
            operation.failure().as_deref(),
            Some("InvalidContent: The file is corrupted.")
        );
    }
}
