#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Drives a submission through extraction, analysis, grading, normalization
//! and aggregation, and turns whatever happened into exactly one result.

/// Wiring capabilities from configuration.
mod factory;
/// The stage state machine.
pub mod stage;

use std::{future::Future, sync::Arc};

use anyhow::Context;
pub use factory::NotConfigured;
pub use stage::Stage;
use stage::StageTracker;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::{
    analysis::{LanguageAnalysis, LanguageAnalyzer},
    config::GraderConfig,
    error::GradingError,
    extraction::{DocumentExtractor, ExtractionDispatcher, OpticalExtractor, Route},
    generative::{GenerativeGrader, GradingPrompt, compose_prompt, parse_grading_output},
    request::{GradingRequest, Submission},
    results::{DocumentGradingResponse, GradingResult, StageOutputs, assemble},
    rubric::{GradingCriterion, Rubric},
    scoring::{aggregate, normalize_all},
    store::{GradeRecord, GradeStore, PersistedId},
};

/// Everything one grading run produced.
#[derive(Debug, Clone)]
pub struct GradingRun {
    /// The result; always well-formed.
    pub result:             GradingResult,
    /// Text the grade was computed from, if the run got that far.
    pub extracted_text:     Option<String>,
    /// Language analysis, if it succeeded.
    pub language_analysis:  Option<LanguageAnalysis>,
    /// Every stage entered, in order.
    pub stages:             Vec<Stage>,
    /// Rubric criteria the grader did not score.
    pub unmatched_criteria: Vec<String>,
    /// Where the result was stored, if it was.
    pub persisted_id:       Option<PersistedId>,
    /// Why storing the result failed, if it did.
    pub persistence_error:  Option<GradingError>,
}

impl GradingRun {
    /// The terminal stage of the run.
    pub fn final_stage(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::Received)
    }

    /// The upload-style envelope for this run.
    pub fn document_response(&self) -> DocumentGradingResponse {
        DocumentGradingResponse::new(self.result.clone(), self.extracted_text.clone())
    }
}

/// How a run ended.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// Reached `Completed` or `Failed`.
    Finished(GradingRun),
    /// The caller cancelled; nothing was persisted.
    Cancelled {
        /// Stage the run was in when it noticed.
        stage: Stage,
    },
}

impl PipelineOutcome {
    /// Returns the run, unless it was cancelled.
    pub fn finished(self) -> Option<GradingRun> {
        match self {
            PipelineOutcome::Finished(run) => Some(run),
            PipelineOutcome::Cancelled { .. } => None,
        }
    }
}

/// Why the stages stopped before `Completed`.
enum Interrupt {
    /// A stage failed.
    Failed(GradingError),
    /// The caller cancelled.
    Cancelled,
}

impl From<GradingError> for Interrupt {
    fn from(err: GradingError) -> Self {
        Interrupt::Failed(err)
    }
}

/// State gathered along the way that outlives the stages.
#[derive(Default)]
struct Draft {
    /// Text handed to grading.
    extracted_text: Option<String>,
    /// Language analysis, if any.
    analysis:       Option<LanguageAnalysis>,
    /// Criteria without a score.
    unmatched:      Vec<String>,
}

/// Awaits `future` unless `cancel` fires first.
async fn suspend<F: Future>(cancel: &CancellationToken, future: F) -> Result<F::Output, Interrupt> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupt::Cancelled),
        output = future => Ok(output),
    }
}

/// The grading orchestrator.
///
/// Holds only shared, immutable collaborators, so one pipeline can serve any
/// number of concurrent runs.
#[derive(Clone, TypedBuilder)]
pub struct GradingPipeline {
    /// Explicit configuration.
    #[builder(default = GraderConfig::builder().build())]
    config:   GraderConfig,
    /// Capability for images.
    #[builder(default = Arc::new(NotConfigured::new("Optical extraction")) as Arc<dyn OpticalExtractor>)]
    optical:  Arc<dyn OpticalExtractor>,
    /// Capability for documents.
    #[builder(default = Arc::new(NotConfigured::new("Document extraction")) as Arc<dyn DocumentExtractor>)]
    document: Arc<dyn DocumentExtractor>,
    /// Optional language analysis.
    #[builder(default, setter(strip_option))]
    analyzer: Option<Arc<dyn LanguageAnalyzer>>,
    /// Generative grading capability.
    grader:   Arc<dyn GenerativeGrader>,
    /// Optional grade store.
    #[builder(default, setter(strip_option))]
    store:    Option<Arc<dyn GradeStore>>,
}

impl GradingPipeline {
    /// Grades one submission.
    ///
    /// A completed result is saved when a store is configured and `owner_id`
    /// is given. Cancelling `cancel` stops the run at its next suspension
    /// point; a cancelled run is never saved.
    pub async fn run(
        &self,
        submission: Submission,
        owner_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> PipelineOutcome {
        let span = tracing::info_span!("grading", run_id = %Uuid::new_v4());
        self.execute(submission, owner_id, cancel).instrument(span).await
    }

    /// Grades text that needs no extraction.
    pub async fn grade_text(
        &self,
        request: GradingRequest,
        owner_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> PipelineOutcome {
        self.run(request.into(), owner_id, cancel).await
    }

    /// Runs the stages, assembles the result, and persists it.
    async fn execute(
        &self,
        submission: Submission,
        owner_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> PipelineOutcome {
        tracing::info!("Received {} ({})", submission.content.file_name, submission.content.kind);

        let mut tracker = StageTracker::new();
        let mut draft = Draft::default();
        let subject = submission.subject.clone();
        let level = submission.level.clone();

        let outputs = match self.stages(submission, &mut tracker, &mut draft, cancel).await {
            Ok(outputs) => {
                tracker.advance(Stage::Completed);
                outputs
            }
            Err(Interrupt::Failed(err)) => {
                tracing::warn!("Grading failed while {}: {err}", tracker.current());
                tracker.advance(Stage::Failed);
                StageOutputs::Failed(err)
            }
            Err(Interrupt::Cancelled) => {
                let stage = tracker.current();
                tracing::info!("Grading cancelled while {stage}");
                return PipelineOutcome::Cancelled { stage };
            }
        };

        let mut run = GradingRun {
            result:             assemble(outputs),
            extracted_text:     draft.extracted_text,
            language_analysis:  draft.analysis,
            stages:             tracker.into_trace(),
            unmatched_criteria: draft.unmatched,
            persisted_id:       None,
            persistence_error:  None,
        };

        if let (true, Some(store), Some(owner)) = (run.result.is_success(), &self.store, owner_id) {
            let record = GradeRecord::new(
                run.extracted_text.clone().unwrap_or_default(),
                subject,
                level,
                run.result.clone(),
            );
            let saved = suspend(cancel, timeout(self.config.capability_timeout(), store.save(&record, owner)));
            match saved.await {
                Err(_) => {
                    tracing::info!("Grading cancelled before the result was stored");
                    return PipelineOutcome::Cancelled {
                        stage: Stage::Completed,
                    };
                }
                Ok(saved) => match saved.context("Grade store timed out").and_then(|res| res) {
                    Ok(id) => run.persisted_id = Some(id),
                    Err(err) => {
                        let err = GradingError::PersistenceFailed(format!("{err:#}"));
                        tracing::error!("{err}");
                        run.persistence_error = Some(err);
                    }
                },
            }
        }

        tracing::info!("Finished with overall score {:.2}", run.result.overall_score);
        PipelineOutcome::Finished(run)
    }

    /// Everything between `Received` and `Aggregating`.
    async fn stages(
        &self,
        submission: Submission,
        tracker: &mut StageTracker,
        draft: &mut Draft,
        cancel: &CancellationToken,
    ) -> Result<StageOutputs, Interrupt> {
        let Submission {
            content,
            subject,
            level,
            criteria,
            requirements,
            rubric_type,
        } = submission;

        let rubric = self.resolve_rubric(criteria, &rubric_type)?;

        let extracted = match content.kind.route()? {
            Route::Bypass => {
                let text = content.as_text()?;
                if text.is_blank() {
                    return Err(GradingError::InvalidRequest("text must not be empty".into()).into());
                }
                text
            }
            Route::Optical | Route::Document => {
                tracker.advance(Stage::Extracting);
                let dispatcher = ExtractionDispatcher::new(
                    self.optical.clone(),
                    self.document.clone(),
                    self.config.capability_timeout(),
                );
                let text = suspend(cancel, dispatcher.dispatch(&content)).await??;
                if text.is_blank() {
                    return Err(GradingError::EmptyExtractionResult.into());
                }
                text
            }
        };

        tracker.advance(Stage::TextReady);
        match extracted.average_confidence() {
            Some(confidence) => tracing::info!(
                "Text ready: {} lines over {} pages, mean confidence {confidence:.2}",
                extracted.lines.len(),
                extracted.page_count
            ),
            None => tracing::info!("Text ready: {} lines", extracted.lines.len()),
        }
        draft.extracted_text = Some(extracted.full_text.clone());

        let request = GradingRequest {
            text: extracted.full_text,
            subject,
            level,
            criteria: rubric.criteria().to_vec(),
            requirements,
            rubric_type,
        };
        let prompt = compose_prompt(&request, &rubric, self.config.prompts());

        tracker.advance(Stage::AnalyzingLanguage);
        tracker.advance(Stage::Grading);
        // A grading error drops the analysis still in flight.
        let (analysis, reply) = suspend(cancel, async {
            tokio::try_join!(
                async { Ok::<_, GradingError>(self.analyze(&request.text).await) },
                self.request_grade(&prompt)
            )
        })
        .await??;
        draft.analysis = analysis;
        let output = parse_grading_output(&reply)?;

        tracker.advance(Stage::Normalizing);
        let normalization = normalize_all(&output.grading_results, &rubric);
        if !normalization.ignored.is_empty() {
            tracing::debug!(
                "Ignoring scores for criteria not in the rubric: {}",
                normalization.ignored.join(", ")
            );
        }
        draft.unmatched = normalization.unmatched;

        tracker.advance(Stage::Aggregating);
        let overall_score = aggregate(&normalization.entries, &rubric);

        Ok(StageOutputs::Completed {
            entries: normalization.entries,
            overall_score,
            feedback: output.feedback,
        })
    }

    /// Validates the caller's criteria, falling back on the default rubric
    /// for `rubric_type` when none were given.
    fn resolve_rubric(&self, criteria: Vec<GradingCriterion>, rubric_type: &str) -> Result<Rubric, GradingError> {
        if !criteria.is_empty() {
            return Ok(Rubric::new(criteria)?);
        }

        match self.config.rubrics().get(rubric_type) {
            Some(defaults) => {
                tracing::debug!("Using the default {rubric_type} rubric");
                Ok(Rubric::new(defaults.to_vec())?)
            }
            None => {
                tracing::warn!("No criteria given and no default rubric for '{rubric_type}'");
                Ok(Rubric::default())
            }
        }
    }

    /// Runs language analysis, swallowing any failure.
    async fn analyze(&self, text: &str) -> Option<LanguageAnalysis> {
        let Some(analyzer) = &self.analyzer else {
            tracing::debug!("Language analysis not configured, skipping");
            return None;
        };

        match timeout(self.config.capability_timeout(), analyzer.analyze(text)).await {
            Ok(Ok(analysis)) => Some(analysis),
            Ok(Err(err)) => {
                tracing::warn!("Language analysis failed, grading without it: {err:#}");
                None
            }
            Err(_) => {
                tracing::warn!("Language analysis timed out, grading without it");
                None
            }
        }
    }

    /// Asks the generative capability for a grade.
    async fn request_grade(&self, prompt: &GradingPrompt) -> Result<String, GradingError> {
        timeout(self.config.capability_timeout(), self.grader.grade(prompt))
            .await
            .context("Grading request timed out")
            .and_then(|res| res)
            .map_err(|err| GradingError::grading(&err))
    }
}
