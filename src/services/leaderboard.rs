// src/services/leaderboard.rs

//! Denormalized latest-score copy per (quiz, participant) in the document
//! store. Last write wins; the relational submissions stay authoritative.

use serde_json::{Value, json};

use super::{GamificationError, require};
use crate::store::{Document, SecondaryStore, SetMode, paths, read_str};

#[derive(Clone, Debug)]
pub struct LeaderboardMirror {
    store: SecondaryStore,
    legacy_realtime_push: bool,
}

impl LeaderboardMirror {
    pub fn new(store: SecondaryStore, legacy_realtime_push: bool) -> Self {
        Self {
            store,
            legacy_realtime_push,
        }
    }

    pub async fn publish(
        &self,
        quiz_code: &str,
        name: &str,
        score: i32,
        duration_seconds: i32,
        account: Option<&str>,
    ) -> Result<(), GamificationError> {
        let store = require(&self.store)?;

        let mut entry = Document::new();
        entry.insert("name".to_string(), Value::from(name));
        entry.insert("score".to_string(), Value::from(score));
        entry.insert("durationSeconds".to_string(), Value::from(duration_seconds));
        if let Some(uid) = account.map(str::trim).filter(|uid| !uid.is_empty()) {
            entry.insert("uid".to_string(), Value::from(uid));
        }
        store
            .set(&paths::leaderboard_entry(quiz_code, name), entry, SetMode::Replace)
            .await?;

        if self.legacy_realtime_push {
            let mut score_doc = Document::new();
            score_doc.insert("score".to_string(), json!(score));
            if let Err(e) = store
                .set(&paths::realtime_score(quiz_code, name), score_doc, SetMode::Replace)
                .await
            {
                tracing::warn!("Realtime push failed for {}/{}: {}", quiz_code, name, e);
            }
        }
        Ok(())
    }

    /// Account id attached to the mirror entry, if one was recorded.
    pub async fn attached_account(
        &self,
        quiz_code: &str,
        name: &str,
    ) -> Result<Option<String>, GamificationError> {
        let entry = require(&self.store)?
            .get(&paths::leaderboard_entry(quiz_code, name))
            .await?;
        Ok(entry
            .as_ref()
            .and_then(|doc| read_str(doc, "uid"))
            .map(|uid| uid.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::{DocumentStore, memory::MemoryDocumentStore, read_i64};

    fn mirror(store: &MemoryDocumentStore, legacy: bool) -> LeaderboardMirror {
        LeaderboardMirror::new(SecondaryStore::available(Arc::new(store.clone())), legacy)
    }

    #[tokio::test]
    async fn test_publish_keeps_latest_score() {
        let store = MemoryDocumentStore::new();
        let mirror = mirror(&store, false);

        mirror.publish("QZ1", "Ann", 7, 30, Some("u1")).await.unwrap();
        mirror.publish("QZ1", "Ann", 4, 12, None).await.unwrap();

        let entry = store
            .get(&paths::leaderboard_entry("QZ1", "Ann"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read_i64(&entry, "score"), 4);
        assert_eq!(read_i64(&entry, "durationSeconds"), 12);
        assert!(entry.get("uid").is_none());
        assert!(mirror.attached_account("QZ1", "Ann").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_attached_account() {
        let store = MemoryDocumentStore::new();
        let mirror = mirror(&store, false);
        mirror.publish("QZ1", "Ann", 7, 30, Some("u1")).await.unwrap();

        assert_eq!(
            mirror.attached_account("QZ1", "Ann").await.unwrap().as_deref(),
            Some("u1")
        );
        assert!(mirror.attached_account("QZ1", "Bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_realtime_push_only_when_enabled() {
        let store = MemoryDocumentStore::new();
        mirror(&store, false)
            .publish("QZ1", "Ann", 5, 10, None)
            .await
            .unwrap();
        assert!(store
            .get(&paths::realtime_score("QZ1", "Ann"))
            .await
            .unwrap()
            .is_none());

        mirror(&store, true)
            .publish("QZ1", "Ann", 6, 10, None)
            .await
            .unwrap();
        let pushed = store
            .get(&paths::realtime_score("QZ1", "Ann"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read_i64(&pushed, "score"), 6);
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let mirror = LeaderboardMirror::new(SecondaryStore::unavailable(), true);
        assert!(matches!(
            mirror.publish("QZ1", "Ann", 1, 1, None).await,
            Err(GamificationError::StoreUnavailable)
        ));
    }
}
