#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{Operation, OperationStatus, analyze_bytes};
use crate::{
    config::AzureServiceEnv,
    extraction::{ExtractedText, OpticalExtractor, TextLine},
};

/// Read 3.2 analyze path.
const READ_PATH: &str = "vision/v3.2/read/analyze";

/// Optical extraction through Computer Vision Read 3.2.
#[derive(Clone)]
pub struct VisionReader {
    /// Shared HTTP client.
    http:          Client,
    /// Computer Vision resource.
    service:       AzureServiceEnv,
    /// Delay between status polls.
    poll_interval: Duration,
}

impl VisionReader {
    /// Creates a reader for the given resource.
    pub fn new(http: Client, service: AzureServiceEnv, poll_interval: Duration) -> Self {
        Self {
            http,
            service,
            poll_interval,
        }
    }
}

/// Status body of a Read operation.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ReadOperation {
    /// Lifecycle state.
    status:         OperationStatus,
    /// Present once the operation succeeded.
    #[serde(default)]
    analyze_result: Option<ReadAnalyzeResult>,
}

/// Recognised text, page by page.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ReadAnalyzeResult {
    /// One entry per page.
    #[serde(default)]
    read_results: Vec<ReadPage>,
}

/// A page of recognised text.
#[derive(Deserialize, Debug)]
struct ReadPage {
    /// 1-based page number.
    page:  u32,
    /// Lines in reading order.
    #[serde(default)]
    lines: Vec<ReadLine>,
}

/// A recognised line.
#[derive(Deserialize, Debug)]
struct ReadLine {
    /// Line text.
    text:  String,
    /// Words of the line, each with a confidence.
    #[serde(default)]
    words: Vec<ReadWord>,
}

/// A recognised word; only the confidence is used.
#[derive(Deserialize, Debug)]
struct ReadWord {
    /// Recognition confidence.
    #[serde(default)]
    confidence: Option<f64>,
}

impl Operation for ReadOperation {
    fn status(&self) -> OperationStatus {
        self.status
    }
}

impl ReadLine {
    /// Mean confidence of the line's words.
    fn confidence(&self) -> Option<f64> {
        let scores: Vec<f64> = self.words.iter().filter_map(|w| w.confidence).collect();
        (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64)
    }
}

impl ReadOperation {
    /// Flattens pages into lines in reading order.
    fn into_text(self) -> Result<ExtractedText> {
        let result = self
            .analyze_result
            .context("Read operation succeeded without an analyzeResult")?;

        let lines = result
            .read_results
            .into_iter()
            .flat_map(|page| {
                let number = page.page;
                page.lines.into_iter().map(move |line| TextLine {
                    confidence: line.confidence(),
                    text:       line.text,
                    page:       number,
                })
            })
            .collect();

        Ok(ExtractedText::from_lines(lines))
    }
}

#[async_trait]
impl OpticalExtractor for VisionReader {
    async fn extract_from_image(&self, image: &[u8]) -> Result<ExtractedText> {
        let operation: ReadOperation =
            analyze_bytes(&self.http, &self.service, READ_PATH, image.to_vec(), self.poll_interval)
                .await
                .context("Computer Vision Read failed")?;
        operation.into_text()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn read_result_becomes_lines() {
        let operation: ReadOperation = serde_json::from_value(json!({
            "status": "succeeded",
            "analyzeResult": {
                "readResults": [
                    {"page": 1, "lines": [
                        {"text": "Dear diary,", "words": [{"confidence": 0.9}, {"confidence": 0.7}]}
                    ]},
                    {"page": 2, "lines": [
                        {"text": "it rained.", "words": []}
                    ]}
                ]
            }
        }))
        .unwrap();

        let text = operation.into_text().unwrap();
        assert_eq!(text.full_text, "Dear diary,\nit rained.");
        assert_eq!(text.page_count, 2);
        assert!((text.lines[0].confidence.unwrap() - 0.8).abs() < 1e-9);
        assert_eq!(text.lines[1].confidence, None);
    }

    #[test]
    fn missing_result_is_an_error() {
        let operation: ReadOperation = serde_json::from_value(json!({"status": "succeeded"})).unwrap();
        assert!(operation.into_text().is_err());
    }
}
