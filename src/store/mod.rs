// src/store/mod.rs

//! Document store used for gamification state (user aggregates, award ledger,
//! leaderboard mirror).
//!
//! Documents are flat JSON objects addressed by a `DocPath` of alternating
//! collection / document segments. Transactions follow a strict
//! read-then-write discipline: once a write has been staged, further reads in
//! the same transaction are rejected with `StoreError::ReadAfterWrite`.

pub mod memory;
pub mod postgres;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde_json::{Map, Value};

/// A stored document: a flat JSON object.
pub type Document = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("document already exists: {0}")]
    AlreadyExists(String),
    #[error("transaction conflict: {0}")]
    Conflict(String),
    #[error("read of {0} after a staged write in the same transaction")]
    ReadAfterWrite(String),
    #[error("document store unavailable: {0}")]
    Unavailable(String),
    #[error("document store backend error: {0}")]
    Backend(String),
    #[error("malformed document: {0}")]
    Malformed(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// How `set` combines new data with an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    Replace,
    /// Top-level fields of the new data overwrite, all others are kept.
    Merge,
}

/// Path to a document or a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath {
    segments: Vec<String>,
}

impl DocPath {
    /// Path of a top-level collection.
    pub fn root(collection: &str) -> Self {
        Self {
            segments: vec![collection.to_string()],
        }
    }

    pub fn doc(mut self, id: &str) -> Self {
        self.segments.push(id.to_string());
        self
    }

    pub fn sub(mut self, collection: &str) -> Self {
        self.segments.push(collection.to_string());
        self
    }

    /// Last segment: the document id, or the collection name.
    pub fn id(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// Encoded key of the enclosing collection (or document, for a collection path).
    pub fn parent_key(&self) -> String {
        encode(&self.segments[..self.segments.len().saturating_sub(1)])
    }

    /// Encoded, unambiguous key of this path.
    pub fn key(&self) -> String {
        encode(&self.segments)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

// Display names end up as document ids, so '/' must not split a segment.
fn encode(segments: &[String]) -> String {
    segments
        .iter()
        .map(|s| s.replace('%', "%25").replace('/', "%2F"))
        .collect::<Vec<_>>()
        .join("/")
}

/// Well-known locations.
pub mod paths {
    use super::DocPath;

    pub fn users() -> DocPath {
        DocPath::root("users")
    }

    pub fn user(account: &str) -> DocPath {
        users().doc(account)
    }

    pub fn awards(account: &str) -> DocPath {
        user(account).sub("awards")
    }

    pub fn award(account: &str, award_key: &str) -> DocPath {
        awards(account).doc(award_key)
    }

    pub fn leaderboard_entry(quiz_code: &str, name: &str) -> DocPath {
        DocPath::root("leaderboards")
            .doc(quiz_code)
            .sub("entries")
            .doc(name)
    }

    /// Legacy realtime channel: one bare score per participant.
    pub fn realtime_score(quiz_code: &str, name: &str) -> DocPath {
        DocPath::root("realtime")
            .doc("leaderboards")
            .sub(quiz_code)
            .doc(name)
    }

    pub fn quizzes() -> DocPath {
        DocPath::root("quizzes")
    }
}

/// Reads an integer field, treating absent or non-numeric values as 0.
pub fn read_i64(doc: &Document, field: &str) -> i64 {
    match doc.get(field) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        _ => 0,
    }
}

pub fn read_f64(doc: &Document, field: &str) -> Option<f64> {
    doc.get(field).and_then(Value::as_f64)
}

/// Reads a non-blank string field.
pub fn read_str<'a>(doc: &'a Document, field: &str) -> Option<&'a str> {
    doc.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Applies `data` on top of `target` according to `mode`.
pub fn apply(target: &mut Document, data: Document, mode: SetMode) {
    if mode == SetMode::Replace {
        target.clear();
    }
    for (k, v) in data {
        target.insert(k, v);
    }
}

/// Adds `deltas` to the numeric fields of `target`.
pub fn add_deltas(target: &mut Document, deltas: &[(&str, i64)]) {
    for (field, delta) in deltas {
        let current = read_i64(target, field);
        target.insert((*field).to_string(), Value::from(current + delta));
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &DocPath) -> StoreResult<Option<Document>>;

    /// Creates the document; fails with `AlreadyExists` if it is present.
    async fn create(&self, path: &DocPath, data: Document) -> StoreResult<()>;

    async fn set(&self, path: &DocPath, data: Document, mode: SetMode) -> StoreResult<()>;

    /// Atomic numeric increment; creates the document if needed.
    async fn increment(&self, path: &DocPath, deltas: &[(&str, i64)]) -> StoreResult<()>;

    /// Direct children of a collection as `(document id, data)`, ordered by id.
    async fn list(&self, collection: &DocPath) -> StoreResult<Vec<(String, Document)>>;

    async fn begin(&self) -> StoreResult<Box<dyn DocTransaction>>;
}

/// A read-then-write transaction. Dropping it without `commit` discards
/// every staged write.
#[async_trait]
pub trait DocTransaction: Send {
    async fn get(&mut self, path: &DocPath) -> StoreResult<Option<Document>>;

    fn set(&mut self, path: &DocPath, data: Document, mode: SetMode);

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Writes staged by a transaction, in order.
#[derive(Debug, Default)]
pub(crate) struct StagedWrites {
    writes: Vec<(DocPath, Document, SetMode)>,
}

impl StagedWrites {
    pub(crate) fn guard_read(&self, path: &DocPath) -> StoreResult<()> {
        if self.writes.is_empty() {
            Ok(())
        } else {
            Err(StoreError::ReadAfterWrite(path.to_string()))
        }
    }

    pub(crate) fn stage(&mut self, path: &DocPath, data: Document, mode: SetMode) {
        self.writes.push((path.clone(), data, mode));
    }

    pub(crate) fn into_inner(self) -> Vec<(DocPath, Document, SetMode)> {
        self.writes
    }
}

/// Availability capability for the secondary store, decided once at startup.
#[derive(Clone, Default)]
pub struct SecondaryStore {
    inner: Option<Arc<dyn DocumentStore>>,
}

impl SecondaryStore {
    pub fn available(store: Arc<dyn DocumentStore>) -> Self {
        Self { inner: Some(store) }
    }

    pub fn unavailable() -> Self {
        Self { inner: None }
    }

    pub fn is_available(&self) -> bool {
        self.inner.is_some()
    }

    pub fn handle(&self) -> Option<&dyn DocumentStore> {
        self.inner.as_deref()
    }
}

impl fmt::Debug for SecondaryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecondaryStore")
            .field("available", &self.is_available())
            .finish()
    }
}
