#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Adapters for the Azure services behind each grading capability.

/// Document Intelligence `prebuilt-read` extraction.
pub mod document;
/// Language service text analysis.
pub mod language;
/// Azure OpenAI chat completions.
pub mod openai;
/// Computer Vision Read extraction.
pub mod vision;

use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::{Client, Response, header::CONTENT_TYPE};
use serde::{Deserialize, de::DeserializeOwned};

use crate::config::AzureServiceEnv;

/// Header carrying the resource key on every Cognitive Services call.
pub(crate) const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
/// Header pointing at the status of a long-running operation.
const OPERATION_LOCATION_HEADER: &str = "Operation-Location";
/// Give up polling after this many attempts.
const MAX_POLLS: u32 = 600;

/// Turns a non-2xx response into an error carrying the body.
pub(crate) async fn ensure_success(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    bail!("{what} failed with {status}: {body}")
}

/// Lifecycle of an Azure long-running operation.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) enum OperationStatus {
    /// Queued.
    NotStarted,
    /// In progress.
    Running,
    /// Finished; the result is present.
    Succeeded,
    /// Finished without a result.
    Failed,
    /// Anything this client does not know about.
    #[serde(other)]
    Unknown,
}

/// Status body of a long-running operation.
pub(crate) trait Operation: DeserializeOwned {
    /// Current lifecycle state.
    fn status(&self) -> OperationStatus;

    /// Service-provided failure reason, if any.
    fn failure(&self) -> Option<String> {
        None
    }
}

/// Submits `body` for analysis and polls the operation until it settles.
pub(crate) async fn analyze_bytes<T: Operation>(
    http: &Client,
    service: &AzureServiceEnv,
    path: &str,
    body: Vec<u8>,
    poll_interval: Duration,
) -> Result<T> {
    let response = http
        .post(service.url(path))
        .header(SUBSCRIPTION_KEY_HEADER, service.key())
        .header(CONTENT_TYPE, "application/octet-stream")
        .body(body)
        .send()
        .await
        .with_context(|| format!("Could not reach {}", service.endpoint()))?;
    let response = ensure_success(response, "Analyze request").await?;

    let location = response
        .headers()
        .get(OPERATION_LOCATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .context("Analyze response carried no Operation-Location header")?
        .to_string();

    poll_operation(http, service, &location, poll_interval).await
}

/// Polls `location` until the operation leaves the queued/running states.
pub(crate) async fn poll_operation<T: Operation>(
    http: &Client,
    service: &AzureServiceEnv,
    location: &str,
    interval: Duration,
) -> Result<T> {
    for attempt in 1..=MAX_POLLS {
        let response = http
            .get(location)
            .header(SUBSCRIPTION_KEY_HEADER, service.key())
            .send()
            .await
            .context("Could not poll analyze operation")?;
        let operation: T = ensure_success(response, "Operation poll")
            .await?
            .json()
            .await
            .context("Operation status was not valid JSON")?;

        match operation.status() {
            OperationStatus::Succeeded => return Ok(operation),
            OperationStatus::NotStarted | OperationStatus::Running => {
                tracing::trace!("Operation still pending after {attempt} polls");
                tokio::time::sleep(interval).await;
            }
            OperationStatus::Failed => bail!(
                "Analyze operation failed: {}",
                operation.failure().unwrap_or_else(|| "no reason given".into())
            ),
            OperationStatus::Unknown => bail!("Analyze operation reported an unknown status"),
        }
    }

    bail!("Analyze operation did not finish after {MAX_POLLS} polls")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_status_wire_names() {
        let parse = |s: &str| serde_json::from_str::<OperationStatus>(&format!("\"{s}\"")).unwrap();
        assert_eq!(parse("notStarted"), OperationStatus::NotStarted);
        assert_eq!(parse("running"), OperationStatus::Running);
        assert_eq!(parse("succeeded"), OperationStatus::Succeeded);
        assert_eq!(parse("failed"), OperationStatus::Failed);
        assert_eq!(parse("canceled"), OperationStatus::Unknown);
    }
}
