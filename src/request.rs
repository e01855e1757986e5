#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use serde::{Deserialize, Deserializer, Serialize};
use typed_builder::TypedBuilder;

use crate::{
    extraction::ContentDescriptor,
    rubric::{AssignmentRequirements, GradingCriterion, null_as_empty},
};

/// Rubric type assumed when a request does not name one.
pub const DEFAULT_RUBRIC_TYPE: &str = "academic";

/// serde default for `rubric_type`.
fn default_rubric_type() -> String {
    DEFAULT_RUBRIC_TYPE.to_string()
}

/// Deserializes a missing or `null` rubric type as the default one.
fn rubric_type_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_rubric_type))
}

/// A text-ready grading request, as accepted on the wire.
///
/// `grading_criteria` may be empty, in which case the default rubric for
/// `rubric_type` applies.
#[derive(Serialize, Deserialize, TypedBuilder, Clone, Debug, PartialEq)]
#[builder(field_defaults(setter(into)))]
pub struct GradingRequest {
    /// The work being graded.
    pub text:         String,
    /// Subject the work belongs to.
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub subject:      Option<String>,
    /// Academic level the work should be judged at.
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub level:        Option<String>,
    /// Ordered rubric supplied by the caller.
    #[serde(rename = "grading_criteria", default, deserialize_with = "null_as_empty")]
    #[builder(default)]
    pub criteria:     Vec<GradingCriterion>,
    /// Assignment context passed through to the grader untouched.
    #[serde(rename = "assignment_requirements", default)]
    #[builder(default, setter(strip_option))]
    pub requirements: Option<AssignmentRequirements>,
    /// Which default rubric to fall back on.
    #[serde(default = "default_rubric_type", deserialize_with = "rubric_type_or_default")]
    #[builder(default = default_rubric_type())]
    pub rubric_type:  String,
}

/// A submission whose text may still need to be extracted.
#[derive(TypedBuilder, Clone, Debug)]
#[builder(field_defaults(setter(into)))]
pub struct Submission {
    /// The submitted content and its declared kind.
    pub content:      ContentDescriptor,
    /// Subject the work belongs to.
    #[builder(default, setter(strip_option))]
    pub subject:      Option<String>,
    /// Academic level the work should be judged at.
    #[builder(default, setter(strip_option))]
    pub level:        Option<String>,
    /// Ordered rubric supplied by the caller.
    #[builder(default)]
    pub criteria:     Vec<GradingCriterion>,
    /// Assignment context passed through to the grader untouched.
    #[builder(default, setter(strip_option))]
    pub requirements: Option<AssignmentRequirements>,
    /// Which default rubric to fall back on.
    #[builder(default = default_rubric_type())]
    pub rubric_type:  String,
}

impl From<GradingRequest> for Submission {
    fn from(request: GradingRequest) -> Self {
        Self {
            content:      ContentDescriptor::text(request.text),
            subject:      request.subject,
            level:        request.level,
            criteria:     request.criteria,
            requirements: request.requirements,
            rubric_type:  request.rubric_type,
        }
    }
}
