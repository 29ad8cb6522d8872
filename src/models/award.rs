// src/models/award.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::store::{Document, StoreError, StoreResult, read_f64, read_i64, read_str};

/// Award ledger entry, stored at `users/{uid}/awards/{awardKey}`.
///
/// The award key is a quiz code or a milestone id. An entry is written at
/// most once and never modified.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AwardLedgerEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz_code: Option<String>,
    pub xp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    pub awarded_at: DateTime<Utc>,
}

impl AwardLedgerEntry {
    pub fn to_document(&self) -> StoreResult<Document> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(StoreError::Malformed("award entry".to_string())),
            Err(e) => Err(StoreError::Malformed(e.to_string())),
        }
    }

    /// Lenient read: missing or mistyped fields fall back to defaults.
    pub fn from_document(doc: &Document) -> Self {
        Self {
            quiz_code: read_str(doc, "quizCode").map(str::to_string),
            xp: read_i64(doc, "xp"),
            badge: read_str(doc, "badge").map(str::to_string),
            rank: doc
                .get("rank")
                .and_then(Value::as_u64)
                .and_then(|r| u32::try_from(r).ok()),
            percent: read_f64(doc, "percent"),
            awarded_at: read_str(doc, "awardedAt")
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        }
    }
}

/// Per-account totals stored at `users/{uid}`.
///
/// `xp` is a legacy mirror of `total_xp` and always receives the same deltas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserAggregate {
    pub name: Option<String>,
    pub total_xp: i64,
    pub xp: i64,
    pub badges_count: i64,
    pub quizzes_played: i64,
    pub total_correct: i64,
    pub total_questions: i64,
}

impl UserAggregate {
    pub fn from_document(doc: Option<&Document>) -> Self {
        let Some(doc) = doc else {
            return Self::default();
        };
        Self {
            name: read_str(doc, "name").map(str::to_string),
            total_xp: read_i64(doc, "totalXp"),
            xp: read_i64(doc, "xp"),
            badges_count: read_i64(doc, "badgesCount"),
            quizzes_played: read_i64(doc, "quizzesPlayed"),
            total_correct: read_i64(doc, "totalCorrect"),
            total_questions: read_i64(doc, "totalQuestions"),
        }
    }
}

/// A ledger entry together with its award key.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AwardRecord {
    pub id: String,
    #[serde(flatten)]
    pub entry: AwardLedgerEntry,
}

/// Admin view of one account's gamification state.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub account_id: String,
    /// `None` when the account has no aggregate document yet.
    pub user: Option<UserAggregate>,
    pub awards: Vec<AwardRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_document_omits_absent_fields() {
        let entry = AwardLedgerEntry {
            quiz_code: None,
            xp: 0,
            badge: Some("XP Master".to_string()),
            rank: None,
            percent: None,
            awarded_at: Utc::now(),
        };
        let doc = entry.to_document().unwrap();
        assert!(doc.get("quizCode").is_none());
        assert!(doc.get("rank").is_none());
        assert_eq!(doc["badge"], "XP Master");
        assert!(doc["awardedAt"].is_string());
    }

    #[test]
    fn test_entry_survives_document_round_trip() {
        let entry = AwardLedgerEntry {
            quiz_code: Some("QZ1".to_string()),
            xp: 9,
            badge: Some("Silver".to_string()),
            rank: Some(2),
            percent: None,
            awarded_at: DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        let back = AwardLedgerEntry::from_document(&entry.to_document().unwrap());
        assert_eq!(back, entry);
    }

    #[test]
    fn test_aggregate_reads_missing_fields_as_zero() {
        let doc = json!({"name": "Ann", "totalXp": 12, "badgesCount": "two"});
        let agg = UserAggregate::from_document(doc.as_object());
        assert_eq!(agg.name.as_deref(), Some("Ann"));
        assert_eq!(agg.total_xp, 12);
        assert_eq!(agg.xp, 0);
        assert_eq!(agg.badges_count, 0);

        assert_eq!(UserAggregate::from_document(None), UserAggregate::default());
    }
}
