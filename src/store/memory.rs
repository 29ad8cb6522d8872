// src/store/memory.rs

//! In-process document store.
//!
//! Every document carries a version; a transaction remembers the version of
//! each document it read and its commit fails with `StoreError::Conflict` if
//! any of them changed in the meantime (absent documents count as version 0).

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;

use super::{
    DocPath, DocTransaction, Document, DocumentStore, SetMode, StagedWrites, StoreError,
    StoreResult, add_deltas, apply,
};

#[derive(Debug, Clone)]
struct StoredDoc {
    path: DocPath,
    data: Document,
    version: u64,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    docs: Arc<Mutex<BTreeMap<String, StoredDoc>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, BTreeMap<String, StoredDoc>>> {
        self.docs
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

fn write(
    docs: &mut BTreeMap<String, StoredDoc>,
    path: &DocPath,
    f: impl FnOnce(&mut Document),
) {
    let entry = docs.entry(path.key()).or_insert_with(|| StoredDoc {
        path: path.clone(),
        data: Document::new(),
        version: 0,
    });
    f(&mut entry.data);
    entry.version += 1;
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &DocPath) -> StoreResult<Option<Document>> {
        Ok(self.lock()?.get(&path.key()).map(|d| d.data.clone()))
    }

    async fn create(&self, path: &DocPath, data: Document) -> StoreResult<()> {
        let mut docs = self.lock()?;
        if docs.contains_key(&path.key()) {
            return Err(StoreError::AlreadyExists(path.to_string()));
        }
        write(&mut docs, path, |d| *d = data);
        Ok(())
    }

    async fn set(&self, path: &DocPath, data: Document, mode: SetMode) -> StoreResult<()> {
        let mut docs = self.lock()?;
        write(&mut docs, path, |d| apply(d, data, mode));
        Ok(())
    }

    async fn increment(&self, path: &DocPath, deltas: &[(&str, i64)]) -> StoreResult<()> {
        let mut docs = self.lock()?;
        write(&mut docs, path, |d| add_deltas(d, deltas));
        Ok(())
    }

    async fn list(&self, collection: &DocPath) -> StoreResult<Vec<(String, Document)>> {
        let parent = collection.key();
        let mut children: Vec<(String, Document)> = self
            .lock()?
            .values()
            .filter(|d| d.path.parent_key() == parent)
            .map(|d| (d.path.id().to_string(), d.data.clone()))
            .collect();
        children.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(children)
    }

    async fn begin(&self) -> StoreResult<Box<dyn DocTransaction>> {
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            read_versions: HashMap::new(),
            staged: StagedWrites::default(),
        }))
    }
}

struct MemoryTransaction {
    store: MemoryDocumentStore,
    read_versions: HashMap<String, u64>,
    staged: StagedWrites,
}

#[async_trait]
impl DocTransaction for MemoryTransaction {
    async fn get(&mut self, path: &DocPath) -> StoreResult<Option<Document>> {
        self.staged.guard_read(path)?;
        let docs = self.store.lock()?;
        let found = docs.get(&path.key());
        self.read_versions
            .insert(path.key(), found.map_or(0, |d| d.version));
        Ok(found.map(|d| d.data.clone()))
    }

    fn set(&mut self, path: &DocPath, data: Document, mode: SetMode) {
        self.staged.stage(path, data, mode);
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let Self {
            store,
            read_versions,
            staged,
        } = *self;
        let mut docs = store.lock()?;

        for (key, seen) in &read_versions {
            let current = docs.get(key).map_or(0, |d| d.version);
            if current != *seen {
                return Err(StoreError::Conflict(key.clone()));
            }
        }

        for (path, data, mode) in staged.into_inner() {
            write(&mut docs, &path, |d| apply(d, data, mode));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{paths, read_i64};
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_create_is_exclusive() {
        let store = MemoryDocumentStore::new();
        let path = paths::award("u1", "QZ1");
        store.create(&path, doc(json!({"xp": 1}))).await.unwrap();

        let again = store.create(&path, doc(json!({"xp": 2}))).await;
        assert!(matches!(again, Err(StoreError::AlreadyExists(_))));
        let stored = store.get(&path).await.unwrap().unwrap();
        assert_eq!(read_i64(&stored, "xp"), 1);
    }

    #[tokio::test]
    async fn test_list_returns_direct_children_only() {
        let store = MemoryDocumentStore::new();
        store
            .set(&paths::user("b"), doc(json!({"name": "B"})), SetMode::Merge)
            .await
            .unwrap();
        store
            .set(&paths::user("a"), doc(json!({"name": "A"})), SetMode::Merge)
            .await
            .unwrap();
        store
            .create(&paths::award("a", "QZ1"), doc(json!({"xp": 3})))
            .await
            .unwrap();

        let users = store.list(&paths::users()).await.unwrap();
        let ids: Vec<&str> = users.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let awards = store.list(&paths::awards("a")).await.unwrap();
        assert_eq!(awards.len(), 1);
        assert_eq!(awards[0].0, "QZ1");
    }

    #[tokio::test]
    async fn test_transaction_commits_staged_writes() {
        let store = MemoryDocumentStore::new();
        let path = paths::user("u1");

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get(&path).await.unwrap().is_none());
        tx.set(&path, doc(json!({"totalXp": 4})), SetMode::Merge);
        tx.commit().await.unwrap();

        let stored = store.get(&path).await.unwrap().unwrap();
        assert_eq!(read_i64(&stored, "totalXp"), 4);
    }

    #[tokio::test]
    async fn test_transaction_conflicts_when_read_document_changes() {
        let store = MemoryDocumentStore::new();
        let path = paths::award("u1", "QZ1");

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get(&path).await.unwrap().is_none());
        store.create(&path, doc(json!({"xp": 10}))).await.unwrap();
        tx.set(&path, doc(json!({"xp": 7})), SetMode::Replace);

        assert!(matches!(tx.commit().await, Err(StoreError::Conflict(_))));
        let stored = store.get(&path).await.unwrap().unwrap();
        assert_eq!(read_i64(&stored, "xp"), 10);
    }

    #[tokio::test]
    async fn test_read_after_write_is_rejected() {
        let store = MemoryDocumentStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.set(&paths::user("u1"), Document::new(), SetMode::Merge);

        let late = tx.get(&paths::award("u1", "QZ1")).await;
        assert!(matches!(late, Err(StoreError::ReadAfterWrite(_))));
    }

    #[tokio::test]
    async fn test_dropped_transaction_writes_nothing() {
        let store = MemoryDocumentStore::new();
        let path = paths::user("u1");
        {
            let mut tx = store.begin().await.unwrap();
            tx.get(&path).await.unwrap();
            tx.set(&path, doc(json!({"xp": 1})), SetMode::Merge);
        }
        assert!(store.get(&path).await.unwrap().is_none());
    }
}
