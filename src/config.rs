#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use typed_builder::TypedBuilder;

use crate::rubric::RubricCatalog;

/// Azure OpenAI API version used when none is configured.
pub const DEFAULT_OPENAI_API_VERSION: &str = "2024-02-15-preview";

/// Reads a trimmed, non-empty environment variable.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// Endpoint and key for one Azure Cognitive Services resource.
#[derive(Clone, Debug)]
pub struct AzureServiceEnv {
    /// Resource endpoint without a trailing slash.
    endpoint: String,
    /// Subscription key sent as `Ocp-Apim-Subscription-Key`.
    key:      String,
}

impl AzureServiceEnv {
    /// Builds a credential bundle, normalising the endpoint.
    pub fn new(endpoint: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            key:      key.into(),
        }
    }

    /// Reads the pair from the environment; `None` if either is missing.
    fn from_env(endpoint_var: &str, key_var: &str) -> Option<Self> {
        Some(Self::new(env_value(endpoint_var)?, env_value(key_var)?))
    }

    /// Returns the resource endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the subscription key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Joins a path onto the endpoint.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }
}

/// Azure OpenAI deployment used for generative grading.
#[derive(Clone, Debug, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct AzureOpenAiEnv {
    /// Resource endpoint.
    endpoint:    String,
    /// API key.
    api_key:     String,
    /// Deployment name of the chat model.
    deployment:  String,
    /// REST API version.
    #[builder(default = DEFAULT_OPENAI_API_VERSION.to_string())]
    api_version: String,
    /// Sampling temperature.
    #[builder(default = 0.3)]
    temperature: f32,
    /// Upper bound on generated tokens.
    #[builder(default = 4000)]
    max_tokens:  u32,
}

impl AzureOpenAiEnv {
    /// Construct from environment variables; returns `None` if any required
    /// field is missing.
    fn from_env() -> Option<Self> {
        let endpoint = env_value("AZURE_OPENAI_ENDPOINT")?;
        let api_key = env_value("AZURE_OPENAI_KEY")?;
        let deployment = env_value("AZURE_OPENAI_DEPLOYMENT_NAME")?;

        let api_version = env_value("AZURE_OPENAI_API_VERSION")
            .unwrap_or_else(|| DEFAULT_OPENAI_API_VERSION.to_string());
        let temperature = env_value("AZURE_OPENAI_TEMPERATURE")
            .and_then(|s| s.parse::<f32>().ok())
            .unwrap_or(0.3);
        let max_tokens = env_value("AZURE_OPENAI_MAX_TOKENS")
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(4000);

        Some(Self {
            endpoint,
            api_key,
            deployment,
            api_version,
            temperature,
            max_tokens,
        })
    }

    /// Returns the resource endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the API key.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Returns the deployment name.
    pub fn deployment(&self) -> &str {
        &self.deployment
    }

    /// Returns the REST API version.
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Returns the sampling temperature.
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Returns the token limit.
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

/// Supabase credentials for the PostgREST grade store.
#[derive(Clone, Debug)]
pub struct SupabaseEnv {
    /// Fully qualified PostgREST endpoint.
    rest_endpoint: String,
    /// API key used for PostgREST requests.
    api_key:       String,
}

impl SupabaseEnv {
    /// Builds a Supabase credential bundle from a project URL and key.
    pub fn new(url: impl AsRef<str>, key: impl Into<String>) -> Self {
        let rest_endpoint = format!("{}/rest/v1", url.as_ref().trim_end_matches('/'));
        Self {
            rest_endpoint,
            api_key: key.into(),
        }
    }

    /// Returns the PostgREST endpoint.
    pub fn rest_endpoint(&self) -> &str {
        &self.rest_endpoint
    }

    /// Returns the API key.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

/// Prompt assets used to ask for a grade.
#[derive(Clone, Debug)]
pub struct GradingPrompts {
    /// System prompt pinning the response shape.
    system_message: String,
}

impl GradingPrompts {
    /// Load prompt templates embedded in the binary.
    pub fn load() -> Self {
        Self {
            system_message: include_str!("prompts/system_message.md").to_string(),
        }
    }

    /// Returns the system prompt.
    pub fn system_message(&self) -> &str {
        &self.system_message
    }
}

impl Default for GradingPrompts {
    fn default() -> Self {
        Self::load()
    }
}

/// Everything a grading pipeline needs to know, passed in explicitly.
#[derive(Clone, Debug, TypedBuilder)]
pub struct GraderConfig {
    /// Generative grading deployment.
    #[builder(default, setter(strip_option))]
    openai:             Option<AzureOpenAiEnv>,
    /// Language analysis resource.
    #[builder(default, setter(strip_option))]
    language:           Option<AzureServiceEnv>,
    /// Document Intelligence resource.
    #[builder(default, setter(strip_option))]
    document:           Option<AzureServiceEnv>,
    /// Computer Vision resource.
    #[builder(default, setter(strip_option))]
    vision:             Option<AzureServiceEnv>,
    /// Grade store credentials.
    #[builder(default, setter(strip_option))]
    supabase:           Option<SupabaseEnv>,
    /// Upper bound on any single capability call.
    #[builder(default = Duration::from_secs(120))]
    capability_timeout: Duration,
    /// Delay between polls of long-running Azure operations.
    #[builder(default = Duration::from_millis(1000))]
    poll_interval:      Duration,
    /// Prompt assets.
    #[builder(default)]
    prompts:            GradingPrompts,
    /// Default rubrics per rubric type.
    #[builder(default = RubricCatalog::builtin().unwrap_or_default())]
    rubrics:            RubricCatalog,
}

impl GraderConfig {
    /// Reads the configuration from the process environment.
    ///
    /// Callers are expected to have loaded any `.env` file beforehand.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            openai:             AzureOpenAiEnv::from_env(),
            language:           AzureServiceEnv::from_env(
                "AZURE_LANGUAGE_ENDPOINT",
                "AZURE_LANGUAGE_KEY",
            ),
            document:           AzureServiceEnv::from_env(
                "AZURE_DOCUMENT_ENDPOINT",
                "AZURE_DOCUMENT_KEY",
            ),
            vision:             AzureServiceEnv::from_env("AZURE_VISION_ENDPOINT", "AZURE_VISION_KEY"),
            supabase:           match (env_value("SUPABASE_URL"), env_value("SUPABASE_ANON_KEY")) {
                (Some(url), Some(key)) => Some(SupabaseEnv::new(url, key)),
                _ => None,
            },
            capability_timeout: read_duration("GRADEWISE_CAPABILITY_TIMEOUT_SECS", 120, Duration::from_secs),
            poll_interval:      read_duration("GRADEWISE_POLL_INTERVAL_MS", 1000, Duration::from_millis),
            prompts:            GradingPrompts::load(),
            rubrics:            RubricCatalog::builtin()?,
        })
    }

    /// Returns the generative grading deployment, if configured.
    pub fn openai(&self) -> Option<&AzureOpenAiEnv> {
        self.openai.as_ref()
    }

    /// Returns the language analysis resource, if configured.
    pub fn language(&self) -> Option<&AzureServiceEnv> {
        self.language.as_ref()
    }

    /// Returns the Document Intelligence resource, if configured.
    pub fn document(&self) -> Option<&AzureServiceEnv> {
        self.document.as_ref()
    }

    /// Returns the Computer Vision resource, if configured.
    pub fn vision(&self) -> Option<&AzureServiceEnv> {
        self.vision.as_ref()
    }

    /// Returns the grade store credentials, if configured.
    pub fn supabase(&self) -> Option<&SupabaseEnv> {
        self.supabase.as_ref()
    }

    /// Returns the per-call capability timeout.
    pub fn capability_timeout(&self) -> Duration {
        self.capability_timeout
    }

    /// Returns the polling delay for long-running operations.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Returns the prompt assets.
    pub fn prompts(&self) -> &GradingPrompts {
        &self.prompts
    }

    /// Returns the default rubric catalog.
    pub fn rubrics(&self) -> &RubricCatalog {
        &self.rubrics
    }
}

/// Builds the HTTP client shared by the Azure adapters.
pub fn http_client(timeout: Duration) -> Result<Client> {
    use anyhow::Context;

    Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to construct shared HTTP client")
}

/// Parses an environment variable into a `Duration`, falling back to
/// `default` when parsing fails or the variable is missing.
fn read_duration(env: &str, default: u64, unit: fn(u64) -> Duration) -> Duration {
    env_value(env)
        .and_then(|value| value.parse::<u64>().ok())
        .map(unit)
        .unwrap_or_else(|| unit(default))
}
