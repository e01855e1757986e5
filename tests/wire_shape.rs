//! JSON shapes exchanged with callers.

use gradewise::{
    GradingError, GradingPipeline, GradingRequest,
    generative::{GenerativeGrader, GradingPrompt},
    results::{DocumentGradingResponse, GradingResult},
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

struct FixedReply(String);

#[async_trait::async_trait]
impl GenerativeGrader for FixedReply {
    async fn grade(&self, _prompt: &GradingPrompt) -> anyhow::Result<String> {
        Ok(self.0.clone())
    }
}

#[test]
fn request_accepts_the_documented_shape() {
    let request: GradingRequest = serde_json::from_value(json!({
        "text": "Photosynthesis converts light into chemical energy.",
        "subject": "Biology",
        "level": "High School",
        "grading_criteria": [
            {"category": "Accuracy", "weight": 0.6, "description": "Facts are right", "min_score": 0, "max_score": 10},
            {"category": "Clarity", "weight": 0.4}
        ],
        "assignment_requirements": {
            "title": "Energy in cells",
            "word_count": {"min": 150, "max": 300},
            "special_instructions": "Use one diagram"
        },
        "rubric_type": "academic"
    }))
    .expect("valid request");

    assert_eq!(request.criteria.len(), 2);
    assert_eq!(request.criteria[1].max_score, 100);
    assert_eq!(
        request.requirements.and_then(|r| r.special_instructions).as_deref(),
        Some("Use one diagram")
    );
}

#[tokio::test]
async fn successful_result_serializes_with_wire_names() {
    let reply = json!({
        "status": "success",
        "grading_results": [{"criterion": "Accuracy", "score": "8", "feedback": "One slip"}],
        "detailed_feedback": "Accurate overall.",
        "improvement_suggestions": [],
        "language_quality": {"grammar": "Good", "vocabulary": "Good", "style": "Good", "comments": ""},
        "strengths": [],
        "weaknesses": []
    })
    .to_string();
    let pipeline = GradingPipeline::builder()
        .grader(std::sync::Arc::new(FixedReply(reply)))
        .build();
    let request: GradingRequest = serde_json::from_value(json!({
        "text": "Photosynthesis converts light into chemical energy.",
        "grading_criteria": [{"category": "Accuracy", "weight": 1.0, "min_score": 0, "max_score": 10}]
    }))
    .expect("valid request");

    let run = pipeline
        .grade_text(request, None, &CancellationToken::new())
        .await
        .finished()
        .expect("not cancelled");
    let value = serde_json::to_value(&run.result).expect("serializable");

    assert_eq!(value["status"], "success");
    assert_eq!(value["error"], Value::Null);
    assert_eq!(value["overall_score"], 8.0);
    assert_eq!(
        value["grading_results"],
        json!([{"criterion": "Accuracy", "score": 8, "feedback": "One slip"}])
    );
    for key in [
        "detailed_feedback",
        "improvement_suggestions",
        "language_quality",
        "strengths",
        "weaknesses",
    ] {
        assert!(value.get(key).is_some(), "missing {key}");
    }

    let envelope = serde_json::to_value(run.document_response()).expect("serializable");
    assert_eq!(envelope["status"], "success");
    assert_eq!(
        envelope["extracted_text"],
        "Photosynthesis converts light into chemical energy."
    );
    assert_eq!(envelope["grading_result"]["overall_score"], 8.0);
}

#[test]
fn failed_envelope_round_trips() {
    let response = DocumentGradingResponse::new(
        GradingResult::failure(&GradingError::ExtractionFailed("timeout".into())),
        None,
    );
    let text = serde_json::to_string(&response).expect("serializable");
    let back: DocumentGradingResponse = serde_json::from_str(&text).expect("deserializable");

    assert_eq!(back, response);
    assert_eq!(
        back.error.as_deref(),
        Some("Failed to extract text from document: timeout")
    );
    assert_eq!(back.extracted_text, "");
}
