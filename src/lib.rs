//! # gradewise
//!
//! Grades academic writing against a caller-supplied rubric. Text is taken
//! as-is or recovered from an image or document, graded by a generative
//! model, and the model's raw scores are normalized into each criterion's
//! range before being combined into a weighted overall score.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Linguistic signals gathered alongside grading
pub mod analysis;
/// Adapters for the Azure services behind each capability
pub mod azure;
/// Explicit configuration, read from the environment or built in code
pub mod config;
/// The error taxonomy of a grading run
pub mod error;
/// Routing submissions to text extraction
pub mod extraction;
/// Prompting the generative grader and parsing its answer
pub mod generative;
/// The grading pipeline and its stage machine
pub mod orchestrator;
/// Grading requests and submissions
pub mod request;
/// Grading results and their wire shape
pub mod results;
/// Rubrics, their validation, and the default catalog
pub mod rubric;
/// Score normalization and weighted aggregation
pub mod scoring;
/// Persisting completed grades
pub mod store;

pub use config::GraderConfig;
pub use error::GradingError;
pub use orchestrator::{GradingPipeline, GradingRun, PipelineOutcome, Stage};
pub use request::{GradingRequest, Submission};
pub use results::{GradingResult, GradingStatus};
