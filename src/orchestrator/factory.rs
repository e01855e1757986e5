#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;

use super::GradingPipeline;
use crate::{
    analysis::LanguageAnalyzer,
    azure::{
        document::DocumentReader, language::AzureLanguageAnalyzer, openai::AzureOpenAiGrader,
        vision::VisionReader,
    },
    config::{self, GraderConfig},
    extraction::{DocumentExtractor, ExtractedText, OpticalExtractor},
    store::{GradeStore, PostgrestStore},
};

/// Stand-in for a capability whose credentials were not provided.
///
/// Every call fails, which the pipeline reports as an extraction failure for
/// that submission only.
#[derive(Debug, Clone, Copy)]
pub struct NotConfigured {
    /// Human-readable capability name.
    capability: &'static str,
}

impl NotConfigured {
    /// Names the missing capability.
    pub fn new(capability: &'static str) -> Self {
        Self { capability }
    }
}

#[async_trait]
impl OpticalExtractor for NotConfigured {
    async fn extract_from_image(&self, _image: &[u8]) -> Result<ExtractedText> {
        bail!("{} is not configured", self.capability)
    }
}

#[async_trait]
impl DocumentExtractor for NotConfigured {
    async fn extract_from_document(&self, _document: &Path) -> Result<ExtractedText> {
        bail!("{} is not configured", self.capability)
    }
}

impl GradingPipeline {
    /// Wires the Azure and Supabase adapters named in `config`.
    ///
    /// Only the generative grader is mandatory. Missing extraction resources
    /// fail the submissions that need them, a missing language resource skips
    /// analysis, and a missing Supabase project skips persistence.
    pub fn from_config(config: GraderConfig) -> Result<Self> {
        let http = config::http_client(config.capability_timeout())?;

        let openai = config.openai().context(
            "AZURE_OPENAI_ENDPOINT, AZURE_OPENAI_KEY and AZURE_OPENAI_DEPLOYMENT_NAME must be set",
        )?;
        let grader = Arc::new(AzureOpenAiGrader::new(openai));

        let optical: Arc<dyn OpticalExtractor> = match config.vision() {
            Some(env) => Arc::new(VisionReader::new(http.clone(), env.clone(), config.poll_interval())),
            None => Arc::new(NotConfigured::new("Azure Computer Vision")),
        };
        let document: Arc<dyn DocumentExtractor> = match config.document() {
            Some(env) => Arc::new(DocumentReader::new(http.clone(), env.clone(), config.poll_interval())),
            None => Arc::new(NotConfigured::new("Azure Document Intelligence")),
        };
        let analyzer = config
            .language()
            .map(|env| Arc::new(AzureLanguageAnalyzer::new(http.clone(), env.clone())) as Arc<dyn LanguageAnalyzer>);
        let store = config
            .supabase()
            .map(|env| Arc::new(PostgrestStore::new(env)) as Arc<dyn GradeStore>);

        if analyzer.is_none() {
            tracing::debug!("AZURE_LANGUAGE_ENDPOINT not set, language analysis disabled");
        }
        if store.is_none() {
            tracing::debug!("SUPABASE_URL not set, results will not be stored");
        }

        Ok(Self {
            config,
            optical,
            document,
            analyzer,
            grader,
            store,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AzureOpenAiEnv;

    #[test]
    fn generative_credentials_are_required() {
        let err = GradingPipeline::from_config(GraderConfig::builder().build())
            .err()
            .expect("missing OpenAI config");
        assert!(err.to_string().contains("AZURE_OPENAI_ENDPOINT"));
    }

    #[test]
    fn optional_resources_may_be_missing() {
        let config = GraderConfig::builder()
            .openai(
                AzureOpenAiEnv::builder()
                    .endpoint("https://example.openai.azure.com")
                    .api_key("key")
                    .deployment("gpt-4o")
                    .build(),
            )
            .build();
        let pipeline = GradingPipeline::from_config(config).unwrap();
        assert!(pipeline.analyzer.is_none());
        assert!(pipeline.store.is_none());
    }

    #[tokio::test]
    async fn unconfigured_capability_fails_its_calls() {
        let missing = NotConfigured::new("Azure Computer Vision");
        let err = missing.extract_from_image(b"png").await.unwrap_err();
        assert_eq!(err.to_string(), "Azure Computer Vision is not configured");
    }
}
