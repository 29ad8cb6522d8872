// src/models/quiz.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use crate::store::Document;

/// Represents the 'quizzes' table, with its questions owned by value.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: i64,

    /// Human-shareable unique code (e.g. "QZ7K2M9P").
    pub quiz_code: String,

    pub title: Option<String>,
    pub description: Option<String>,
    pub difficulty: Option<String>,

    /// Session timer in minutes.
    pub session_timer: Option<i32>,

    pub creator_uid: Option<String>,
    pub creator_name: Option<String>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,

    /// Ordered by position. Loaded separately from the 'questions' table.
    #[sqlx(skip)]
    pub questions: Vec<Question>,
}

/// Represents the 'questions' table. A question has no reference back to its
/// quiz; it is addressed by id within the quiz that owns it.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: i64,
    pub position: i32,
    pub question_text: Option<String>,
    pub option_a: Option<String>,
    pub option_b: Option<String>,
    pub option_c: Option<String>,
    pub option_d: Option<String>,

    /// Correct option letter (A/B/C/D).
    #[serde(skip_serializing)]
    pub correct_answer: Option<String>,

    /// Marks awarded for a correct answer; 1 when absent.
    pub marks: Option<i32>,

    /// Per-question timer in seconds.
    pub timer: Option<i32>,
}

impl Question {
    pub fn new(prompt: &str, options: [&str; 4], correct: &str, marks: Option<i32>) -> Self {
        let [a, b, c, d] = options.map(|o| Some(o.to_string()));
        Self {
            id: 0,
            position: 0,
            question_text: Some(prompt.to_string()),
            option_a: a,
            option_b: b,
            option_c: c,
            option_d: d,
            correct_answer: Some(correct.to_string()),
            marks,
            timer: None,
        }
    }
}

/// Lightweight listing row.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSummary {
    pub id: i64,
    pub quiz_code: String,
    pub title: Option<String>,
}

/// Quiz fields replicated from the document store into the 'quizzes' table.
/// `None` leaves the stored column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuizMetadata {
    pub quiz_code: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub difficulty: Option<String>,
    pub session_timer: Option<i32>,
    pub creator_uid: Option<String>,
    pub creator_name: Option<String>,
}

impl QuizMetadata {
    /// Builds metadata from a `quizzes/{code}` document. Values of the wrong
    /// type are coerced where possible and dropped otherwise.
    pub fn from_document(quiz_code: &str, doc: &Document) -> Self {
        Self {
            quiz_code: quiz_code.to_string(),
            title: as_string(doc.get("title")),
            description: as_string(doc.get("description")),
            difficulty: as_string(doc.get("difficulty")),
            session_timer: as_int(doc.get("sessionTimer")),
            creator_uid: as_string(doc.get("creatorUid")),
            creator_name: as_string(doc.get("creatorName")),
        }
    }
}

fn as_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn as_int(value: Option<&Value>) -> Option<i32> {
    match value? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|i| i32::try_from(i).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_from_document_coerces_values() {
        let doc = json!({
            "title": "Rust basics",
            "difficulty": 3,
            "sessionTimer": "15",
            "creatorUid": "uid-1",
            "creatorName": null
        });
        let meta = QuizMetadata::from_document("QZ1", doc.as_object().unwrap());

        assert_eq!(meta.quiz_code, "QZ1");
        assert_eq!(meta.title.as_deref(), Some("Rust basics"));
        assert_eq!(meta.difficulty.as_deref(), Some("3"));
        assert_eq!(meta.session_timer, Some(15));
        assert_eq!(meta.creator_uid.as_deref(), Some("uid-1"));
        assert_eq!(meta.creator_name, None);
        assert_eq!(meta.description, None);
    }

    #[test]
    fn test_metadata_drops_unparseable_timer() {
        let doc = json!({"sessionTimer": "soon"});
        let meta = QuizMetadata::from_document("QZ1", doc.as_object().unwrap());
        assert_eq!(meta.session_timer, None);
    }

    #[test]
    fn test_question_hides_answer_when_serialized() {
        let q = Question::new("2 + 2?", ["3", "4", "5", "6"], "B", None);
        let value = serde_json::to_value(&q).unwrap();
        assert!(value.get("correctAnswer").is_none());
        assert_eq!(value["optionB"], "4");
    }
}
