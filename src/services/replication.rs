// src/services/replication.rs

//! One-way copy of `quizzes/{code}` documents into the relational quiz table.
//! The document store is authoritative for quiz metadata; questions and
//! submissions are never touched.

use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;

use super::{GamificationError, require};
use crate::{
    models::quiz::QuizMetadata,
    repository::QuizRepository,
    store::{SecondaryStore, paths},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailure {
    pub quiz_code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub synced: Vec<String>,
    pub failed: Vec<SyncFailure>,
}

#[derive(Clone)]
pub struct QuizReplicator {
    store: SecondaryStore,
    repo: Arc<dyn QuizRepository>,
}

impl QuizReplicator {
    pub fn new(store: SecondaryStore, repo: Arc<dyn QuizRepository>) -> Self {
        Self { store, repo }
    }

    /// Copies every quiz document. A failing quiz is reported and the rest
    /// still sync.
    pub async fn sync_all(&self) -> Result<SyncReport, GamificationError> {
        let documents = require(&self.store)?.list(&paths::quizzes()).await?;
        let mut report = SyncReport::default();

        for (quiz_code, doc) in documents {
            let meta = QuizMetadata::from_document(&quiz_code, &doc);
            match self.repo.upsert_quiz_metadata(&meta).await {
                Ok(()) => report.synced.push(quiz_code),
                Err(e) => {
                    tracing::warn!("Quiz sync failed for {}: {}", quiz_code, e);
                    report.failed.push(SyncFailure {
                        quiz_code,
                        message: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "Quiz sync: {} synced, {} failed",
            report.synced.len(),
            report.failed.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        repository::memory::MemoryQuizRepository,
        store::{DocumentStore, SetMode, memory::MemoryDocumentStore},
    };

    #[tokio::test]
    async fn test_sync_all_upserts_metadata() {
        let store = MemoryDocumentStore::new();
        let repo = MemoryQuizRepository::new();
        repo.insert_quiz("QZ1", Vec::new()).unwrap();
        for (code, doc) in [
            ("QZ1", json!({"title": "Rust basics", "sessionTimer": "90"})),
            ("QZ2", json!({"title": "Ownership", "creatorUid": "u1"})),
        ] {
            store
                .set(
                    &paths::quizzes().doc(code),
                    doc.as_object().cloned().unwrap(),
                    SetMode::Replace,
                )
                .await
                .unwrap();
        }

        let replicator = QuizReplicator::new(
            SecondaryStore::available(Arc::new(store)),
            Arc::new(repo.clone()),
        );
        let report = replicator.sync_all().await.unwrap();

        assert_eq!(report.synced, vec!["QZ1".to_string(), "QZ2".to_string()]);
        assert!(report.failed.is_empty());

        let quiz = repo.find_quiz_by_code("QZ1").await.unwrap().unwrap();
        assert_eq!(quiz.title.as_deref(), Some("Rust basics"));
        assert_eq!(quiz.session_timer, Some(90));
        let created = repo.find_quiz_by_code("QZ2").await.unwrap().unwrap();
        assert_eq!(created.creator_uid.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_sync_requires_store() {
        let replicator = QuizReplicator::new(
            SecondaryStore::unavailable(),
            Arc::new(MemoryQuizRepository::new()),
        );
        assert!(matches!(
            replicator.sync_all().await,
            Err(GamificationError::StoreUnavailable)
        ));
    }
}
