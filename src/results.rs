#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::fmt::Write as _;

use colored::Colorize;
use serde::{Deserialize, Serialize};
use tabled::{
    Table,
    settings::{Alignment, Modify, Panel, Style, Width, object::Rows},
};

use crate::{error::GradingError, scoring::NormalizedCriterionScore};

/// Text placed in every language-quality field of a failed result.
const ERROR_OCCURRED: &str = "Error occurred";

/// Whether a grading run produced a grade.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GradingStatus {
    /// Every stage completed.
    Success,
    /// A stage failed; the result carries the reason.
    Error,
}

/// The grader's qualitative read of the writing itself.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct LanguageQuality {
    /// Grammar assessment.
    pub grammar:    String,
    /// Vocabulary assessment.
    pub vocabulary: String,
    /// Style assessment.
    pub style:      String,
    /// Anything else worth saying.
    pub comments:   String,
}

/// Everything the grader says besides the scores, passed through verbatim.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct GradingFeedback {
    /// Narrative feedback on the whole work.
    pub detailed_feedback:       String,
    /// Concrete next steps for the student.
    pub improvement_suggestions: Vec<String>,
    /// Qualitative language assessment.
    pub language_quality:        LanguageQuality,
    /// What the work does well.
    pub strengths:               Vec<String>,
    /// What the work does poorly.
    pub weaknesses:              Vec<String>,
}

/// What a grading run hands to the assembler: either the completed stage
/// outputs, or the error that stopped the run.
#[derive(Debug, Clone)]
pub enum StageOutputs {
    /// All stages completed.
    Completed {
        /// Normalized scores in rubric order.
        entries:       Vec<NormalizedCriterionScore>,
        /// Weighted aggregate of `entries`.
        overall_score: f64,
        /// The grader's narrative output.
        feedback:      GradingFeedback,
    },
    /// A stage failed.
    Failed(GradingError),
}

/// The final, well-formed outcome of grading one submission.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GradingResult {
    /// Success or error.
    pub status:                  GradingStatus,
    /// Failure reason; `None` on success.
    pub error:                   Option<String>,
    /// Weighted aggregate of the criterion scores; `0` on failure.
    pub overall_score:           f64,
    /// One entry per scored rubric criterion, in rubric order.
    #[serde(rename = "grading_results")]
    pub entries:                 Vec<NormalizedCriterionScore>,
    /// Narrative feedback on the whole work.
    pub detailed_feedback:       String,
    /// Concrete next steps for the student.
    pub improvement_suggestions: Vec<String>,
    /// Qualitative language assessment.
    pub language_quality:        LanguageQuality,
    /// What the work does well.
    pub strengths:               Vec<String>,
    /// What the work does poorly.
    pub weaknesses:              Vec<String>,
}

impl GradingResult {
    /// Builds the result for a run that failed with `err`.
    pub fn failure(err: &GradingError) -> Self {
        let message = err.to_string();
        Self {
            status:                  GradingStatus::Error,
            error:                   Some(message.clone()),
            overall_score:           0.0,
            entries:                 Vec::new(),
            detailed_feedback:       String::new(),
            improvement_suggestions: Vec::new(),
            language_quality:        LanguageQuality {
                grammar:    ERROR_OCCURRED.into(),
                vocabulary: ERROR_OCCURRED.into(),
                style:      ERROR_OCCURRED.into(),
                comments:   message,
            },
            strengths:               Vec::new(),
            weaknesses:              Vec::new(),
        }
    }

    /// Returns true if the run produced a grade.
    pub fn is_success(&self) -> bool {
        self.status == GradingStatus::Success
    }

    /// Renders the result for a terminal: a score table followed by the
    /// grader's narrative feedback.
    pub fn render(&self) -> String {
        if let Some(error) = &self.error {
            return format!("{} {}", "Grading failed:".red().bold(), error);
        }

        let mut out = Table::new(&self.entries)
            .with(Panel::header("Grading Overview"))
            .with(Panel::footer(format!("Overall: {:.2}", self.overall_score)))
            .with(Modify::new(Rows::new(1..)).with(Width::wrap(48).keep_words(true)))
            .with(
                Modify::new(Rows::first())
                    .with(Alignment::center())
                    .with(Alignment::center_vertical()),
            )
            .with(
                Modify::new(Rows::last())
                    .with(Alignment::center())
                    .with(Alignment::center_vertical()),
            )
            .with(Style::modern())
            .to_string();

        if !self.detailed_feedback.is_empty() {
            let _ = write!(out, "\n\n{}\n{}", "Feedback".bold(), self.detailed_feedback);
        }

        let quality = &self.language_quality;
        let _ = write!(
            out,
            "\n\n{}\n  Grammar: {}\n  Vocabulary: {}\n  Style: {}",
            "Language quality".bold(),
            quality.grammar,
            quality.vocabulary,
            quality.style
        );
        if !quality.comments.is_empty() {
            let _ = write!(out, "\n  {}", quality.comments);
        }

        for (title, items) in [
            ("Strengths".green(), &self.strengths),
            ("Weaknesses".yellow(), &self.weaknesses),
            ("Suggestions".cyan(), &self.improvement_suggestions),
        ] {
            if items.is_empty() {
                continue;
            }
            let _ = write!(out, "\n\n{}", title.bold());
            for item in items {
                let _ = write!(out, "\n  - {item}");
            }
        }

        out
    }
}

/// Builds the final result from whatever the stages produced.
///
/// This is the only place a [`GradingResult`] is constructed for a run, so
/// every run ends in exactly one well-formed result.
pub fn assemble(outputs: StageOutputs) -> GradingResult {
    match outputs {
        StageOutputs::Completed {
            entries,
            overall_score,
            feedback,
        } => {
            let GradingFeedback {
                detailed_feedback,
                improvement_suggestions,
                language_quality,
                strengths,
                weaknesses,
            } = feedback;

            GradingResult {
                status: GradingStatus::Success,
                error: None,
                overall_score,
                entries,
                detailed_feedback,
                improvement_suggestions,
                language_quality,
                strengths,
                weaknesses,
            }
        }
        StageOutputs::Failed(err) => GradingResult::failure(&err),
    }
}

/// Envelope returned for an uploaded document: the grade plus the text it
/// was computed from.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DocumentGradingResponse {
    /// Mirrors the result's status.
    pub status:         GradingStatus,
    /// Failure reason, when there is one.
    pub error:          Option<String>,
    /// Text recovered from the upload; empty if extraction never finished.
    #[serde(default)]
    pub extracted_text: String,
    /// The grade.
    pub grading_result: GradingResult,
}

impl DocumentGradingResponse {
    /// Wraps a result together with the text it was computed from.
    pub fn new(result: GradingResult, extracted_text: Option<String>) -> Self {
        Self {
            status: result.status,
            error: result.error.clone(),
            extracted_text: extracted_text.unwrap_or_default(),
            grading_result: result,
        }
    }
}
