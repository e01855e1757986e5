#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Asking a generative model for a grade, and reading its answer back.

/// Schema-checked parsing of the grader's JSON answer.
pub mod output;

use anyhow::Result;
use async_trait::async_trait;
use itertools::Itertools;
pub use output::{GradingOutput, RawCriterionScore, parse_grading_output};

use crate::{config::GradingPrompts, request::GradingRequest, rubric::Rubric};

/// Placeholder used for prompt fields the request leaves empty.
const NOT_SPECIFIED: &str = "Not specified";

/// The two messages sent to the generative capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradingPrompt {
    /// Pins the model's role and the exact response shape.
    pub system: String,
    /// Carries the work, the rubric and the assignment context.
    pub user:   String,
}

/// A generative model that returns a JSON grading document as text.
#[async_trait]
pub trait GenerativeGrader: Send + Sync {
    /// Sends the prompt and returns the model's raw reply.
    async fn grade(&self, prompt: &GradingPrompt) -> Result<String>;
}

/// Renders each criterion with its weight, description and range.
fn describe_criteria(rubric: &Rubric, rubric_type: &str) -> String {
    if rubric.is_empty() {
        return format!("Use default {rubric_type} criteria");
    }

    rubric
        .criteria()
        .iter()
        .map(|c| {
            format!(
                "- {} (Weight: {}): {}\n  Score range: {} to {}",
                c.category,
                c.weight,
                c.description.trim(),
                c.min_score,
                c.max_score
            )
        })
        .join("\n")
}

/// Builds the grading prompt for a request against its effective rubric.
pub fn compose_prompt(request: &GradingRequest, rubric: &Rubric, prompts: &GradingPrompts) -> GradingPrompt {
    let requirements = request.requirements.clone().unwrap_or_default();
    let or_unspecified =
        |value: Option<String>| value.filter(|v| !v.trim().is_empty()).unwrap_or_else(|| NOT_SPECIFIED.into());

    let word_count = requirements
        .word_count
        .filter(|bounds| !bounds.is_empty())
        .map(|bounds| bounds.iter().map(|(k, v)| format!("{k}: {v}")).join(", "))
        .unwrap_or_else(|| NOT_SPECIFIED.into());

    let user = format!(
        include_str!("../prompts/user_message.md"),
        SUBJECT = or_unspecified(request.subject.clone()),
        LEVEL = or_unspecified(request.level.clone()),
        TEXT = request.text,
        CRITERIA = describe_criteria(rubric, &request.rubric_type),
        TITLE = or_unspecified(requirements.title),
        DESCRIPTION = or_unspecified(requirements.description),
        WORD_COUNT = word_count,
        SPECIAL_INSTRUCTIONS = or_unspecified(requirements.special_instructions),
    );

    GradingPrompt {
        system: prompts.system_message().to_string(),
        user,
    }
}
