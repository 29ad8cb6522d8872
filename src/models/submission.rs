// src/models/submission.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Represents the 'submissions' table: one row per attempt, never updated.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    /// Monotonic sequence; breaks ties between attempts with equal timestamps.
    pub id: i64,
    pub quiz_id: i64,
    pub participant_name: String,
    pub total_questions: i32,
    pub total_correct: i32,
    pub total_score: i32,
    pub duration_seconds: i32,
    pub submitted_at: chrono::DateTime<chrono::Utc>,
}

/// A scored attempt about to be persisted.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub quiz_id: i64,
    pub participant_name: String,
    pub total_questions: i32,
    pub total_correct: i32,
    pub total_score: i32,
    pub duration_seconds: i32,
    pub submitted_at: chrono::DateTime<chrono::Utc>,
}

/// One leaderboard row after competition ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntry {
    pub name: String,
    pub score: i32,
    pub duration_seconds: i32,
    pub rank: u32,
}

/// A single selected option. Either field may be missing; such items are ignored.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerDto {
    pub question_id: Option<i64>,
    /// Option letter: A/B/C/D.
    pub selected: Option<String>,
}

/// DTO for submitting a quiz attempt.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    #[validate(custom(function = not_blank))]
    pub quiz_code: String,

    /// Participant display name.
    #[validate(custom(function = not_blank), length(max = 100))]
    pub name: String,

    pub duration_seconds: Option<i32>,

    #[serde(default)]
    pub answers: Vec<AnswerDto>,
}

fn not_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        return Err(validator::ValidationError::new("must_not_be_blank"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_request_rejects_blank_name() {
        let req: SubmitRequest = serde_json::from_value(serde_json::json!({
            "quizCode": "QZ1",
            "name": "   ",
        }))
        .unwrap();
        assert!(req.validate().is_err());
        assert!(req.answers.is_empty());
    }

    #[test]
    fn test_submit_request_accepts_sparse_answers() {
        let req: SubmitRequest = serde_json::from_value(serde_json::json!({
            "quizCode": "QZ1",
            "name": "Ann",
            "answers": [{"questionId": 1, "selected": "a"}, {"questionId": null}]
        }))
        .unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.answers.len(), 2);
        assert_eq!(req.answers[1].selected, None);
    }
}
