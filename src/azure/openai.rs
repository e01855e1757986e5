#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use anyhow::{Context, Result};
use async_openai::{
    Client as OpenAIClient,
    config::AzureConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
    },
};
use async_trait::async_trait;

use crate::{
    config::AzureOpenAiEnv,
    generative::{GenerativeGrader, GradingPrompt},
};

/// Generative grading through an Azure OpenAI chat deployment.
#[derive(Clone)]
pub struct AzureOpenAiGrader {
    /// Client bound to the deployment.
    client:      OpenAIClient<AzureConfig>,
    /// Deployment name, sent as the model.
    deployment:  String,
    /// Sampling temperature.
    temperature: f32,
    /// Upper bound on generated tokens.
    max_tokens:  u32,
}

impl AzureOpenAiGrader {
    /// Creates a grader for the configured deployment.
    pub fn new(env: &AzureOpenAiEnv) -> Self {
        let client = OpenAIClient::with_config(
            AzureConfig::new()
                .with_api_base(env.endpoint())
                .with_api_version(env.api_version())
                .with_deployment_id(env.deployment())
                .with_api_key(env.api_key()),
        );

        Self {
            client,
            deployment: env.deployment().to_owned(),
            temperature: env.temperature(),
            max_tokens: env.max_tokens(),
        }
    }
}

#[async_trait]
impl GenerativeGrader for AzureOpenAiGrader {
    async fn grade(&self, prompt: &GradingPrompt) -> Result<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(prompt.system.clone())
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt.user.clone())
                .build()?
                .into(),
        ];

        #[allow(deprecated)]
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.deployment)
            .messages(messages)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .response_format(ResponseFormat::JsonObject)
            .build()?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .context("Azure OpenAI chat completion failed")?;

        tracing::debug!(
            "Grading used {} prompt tokens",
            response.usage.as_ref().map_or(0, |usage| usage.prompt_tokens)
        );

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .context("Azure OpenAI returned no message content")
    }
}
