#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::fmt::Display;

use anyhow::{Context, Result, ensure};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use postgrest::Postgrest;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::SupabaseEnv,
    results::{GradingResult, LanguageQuality},
    scoring::NormalizedCriterionScore,
};

/// Table completed grades are written to.
const GRADES_TABLE: &str = "grades";

/// Identifier a store assigned to a saved grade.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct PersistedId(pub Uuid);

impl Display for PersistedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A completed grade plus the context it was computed in.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct GradeRecord {
    /// The graded text.
    pub text:       String,
    /// Subject, if the request gave one.
    pub subject:    Option<String>,
    /// Academic level, if the request gave one.
    pub level:      Option<String>,
    /// The grade.
    pub result:     GradingResult,
    /// When the grade was computed.
    pub created_at: DateTime<Utc>,
}

impl GradeRecord {
    /// Stamps a result with the current time.
    pub fn new(text: String, subject: Option<String>, level: Option<String>, result: GradingResult) -> Self {
        Self {
            text,
            subject,
            level,
            result,
            created_at: Utc::now(),
        }
    }
}

/// Somewhere completed grades can be kept.
#[async_trait]
pub trait GradeStore: Send + Sync {
    /// Saves `record` on behalf of `owner_id`.
    async fn save(&self, record: &GradeRecord, owner_id: &str) -> Result<PersistedId>;
}

/// Row layout of the `grades` table.
#[derive(Serialize, Debug)]
struct GradeRow<'a> {
    /// Primary key, generated client-side.
    id:                      Uuid,
    /// Owner of the grade.
    user_id:                 &'a str,
    /// The graded text.
    text:                    &'a str,
    /// Subject of the work.
    subject:                 Option<&'a str>,
    /// Academic level.
    level:                   Option<&'a str>,
    /// Aggregate score.
    overall_score:           f64,
    /// Per-criterion scores.
    grading_results:         &'a [NormalizedCriterionScore],
    /// Narrative feedback.
    detailed_feedback:       &'a str,
    /// Suggestions for the student.
    improvement_suggestions: &'a [String],
    /// Language quality block.
    language_quality:        &'a LanguageQuality,
    /// Strengths.
    strengths:               &'a [String],
    /// Weaknesses.
    weaknesses:              &'a [String],
    /// Creation time.
    created_at:              DateTime<Utc>,
}

impl<'a> GradeRow<'a> {
    /// Flattens a record into a row.
    fn new(id: Uuid, record: &'a GradeRecord, owner_id: &'a str) -> Self {
        let result = &record.result;
        Self {
            id,
            user_id: owner_id,
            text: &record.text,
            subject: record.subject.as_deref(),
            level: record.level.as_deref(),
            overall_score: result.overall_score,
            grading_results: &result.entries,
            detailed_feedback: &result.detailed_feedback,
            improvement_suggestions: &result.improvement_suggestions,
            language_quality: &result.language_quality,
            strengths: &result.strengths,
            weaknesses: &result.weaknesses,
            created_at: record.created_at,
        }
    }
}

/// Grade store backed by Supabase's PostgREST API.
#[derive(Clone)]
pub struct PostgrestStore {
    /// PostgREST client with the API key header set.
    client: Postgrest,
}

impl PostgrestStore {
    /// Creates a store for the given Supabase project.
    pub fn new(env: &SupabaseEnv) -> Self {
        let client = Postgrest::new(env.rest_endpoint()).insert_header("apiKey", env.api_key());
        Self { client }
    }
}

#[async_trait]
impl GradeStore for PostgrestStore {
    async fn save(&self, record: &GradeRecord, owner_id: &str) -> Result<PersistedId> {
        let id = Uuid::new_v4();
        let body = serde_json::to_string(&GradeRow::new(id, record, owner_id))
            .context("Failed to serialize grade row")?;

        let response = self
            .client
            .from(GRADES_TABLE)
            .insert(body)
            .execute()
            .await
            .context("Failed to write grade row to Supabase")?;

        let status = response.status();
        let detail = response.text().await.unwrap_or_default();
        ensure!(status.is_success(), "Supabase rejected grade row ({status}): {detail}");

        tracing::debug!("Stored grade {id} for {owner_id}");
        Ok(PersistedId(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::GradingError, results::GradingResult};

    #[test]
    fn row_flattens_result() {
        let record = GradeRecord::new(
            "Essay".into(),
            Some("History".into()),
            None,
            GradingResult::failure(&GradingError::EmptyExtractionResult),
        );
        let id = Uuid::new_v4();
        let row = serde_json::to_value(GradeRow::new(id, &record, "user-1")).unwrap();

        assert_eq!(row["id"], id.to_string());
        assert_eq!(row["user_id"], "user-1");
        assert_eq!(row["subject"], "History");
        assert!(row["level"].is_null());
        assert_eq!(row["overall_score"], 0.0);
        assert!(row["grading_results"].as_array().unwrap().is_empty());
        assert_eq!(row["language_quality"]["grammar"], "Error occurred");
        assert!(row.get("status").is_none());
    }
}
