// src/store/postgres.rs

//! Document store backed by a Postgres `documents` table (JSONB payloads).
//!
//! Transactions lock every document they read with `FOR UPDATE`. A document
//! that was read as absent is written back with a plain `INSERT`, so a
//! concurrent creator makes the commit fail with a unique violation, which
//! is reported as `StoreError::Conflict`.

use std::{collections::HashSet, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction, postgres::PgPoolOptions, types::Json};

use super::{
    DocPath, DocTransaction, Document, DocumentStore, SetMode, StagedWrites, StoreError,
    StoreResult,
};

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(code) = err.as_database_error().and_then(|d| d.code()) {
            // unique_violation, serialization_failure, deadlock_detected
            if matches!(code.as_ref(), "23505" | "40001" | "40P01") {
                return StoreError::Conflict(err.to_string());
            }
        }
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

fn into_document(path: &DocPath, value: Value) -> StoreResult<Document> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::Malformed(path.to_string())),
    }
}

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(url)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self::new(pool))
    }

    pub async fn init_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                path TEXT PRIMARY KEY,
                parent TEXT NOT NULL,
                doc_id TEXT NOT NULL,
                data JSONB NOT NULL DEFAULT '{}'::JSONB,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_parent ON documents(parent)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

const UPSERT_REPLACE: &str = r#"
    INSERT INTO documents (path, parent, doc_id, data)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (path) DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()
"#;

const UPSERT_MERGE: &str = r#"
    INSERT INTO documents (path, parent, doc_id, data)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (path) DO UPDATE SET data = documents.data || EXCLUDED.data, updated_at = NOW()
"#;

const INSERT_NEW: &str = r#"
    INSERT INTO documents (path, parent, doc_id, data)
    VALUES ($1, $2, $3, $4)
"#;

const INCREMENT_FIELD: &str = r#"
    INSERT INTO documents (path, parent, doc_id, data)
    VALUES ($1, $2, $3, jsonb_build_object($4::TEXT, $5::BIGINT))
    ON CONFLICT (path) DO UPDATE SET
        data = documents.data || jsonb_build_object(
            $4::TEXT,
            CASE WHEN jsonb_typeof(documents.data -> $4::TEXT) = 'number'
                THEN (documents.data ->> $4::TEXT)::NUMERIC::BIGINT
                ELSE 0
            END + $5::BIGINT
        ),
        updated_at = NOW()
"#;

fn write_query(
    sql: &'static str,
    path: &DocPath,
    data: Document,
) -> sqlx::query::Query<'static, Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(sql)
        .bind(path.key())
        .bind(path.parent_key())
        .bind(path.id().to_string())
        .bind(Json(Value::Object(data)))
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, path: &DocPath) -> StoreResult<Option<Document>> {
        let row: Option<Json<Value>> =
            sqlx::query_scalar("SELECT data FROM documents WHERE path = $1")
                .bind(path.key())
                .fetch_optional(&self.pool)
                .await?;
        row.map(|Json(v)| into_document(path, v)).transpose()
    }

    async fn create(&self, path: &DocPath, data: Document) -> StoreResult<()> {
        let sql = r#"
            INSERT INTO documents (path, parent, doc_id, data)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (path) DO NOTHING
        "#;
        let result = write_query(sql, path, data).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists(path.to_string()));
        }
        Ok(())
    }

    async fn set(&self, path: &DocPath, data: Document, mode: SetMode) -> StoreResult<()> {
        let sql = match mode {
            SetMode::Replace => UPSERT_REPLACE,
            SetMode::Merge => UPSERT_MERGE,
        };
        write_query(sql, path, data).execute(&self.pool).await?;
        Ok(())
    }

    async fn increment(&self, path: &DocPath, deltas: &[(&str, i64)]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for (field, delta) in deltas {
            sqlx::query(INCREMENT_FIELD)
                .bind(path.key())
                .bind(path.parent_key())
                .bind(path.id().to_string())
                .bind(*field)
                .bind(*delta)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list(&self, collection: &DocPath) -> StoreResult<Vec<(String, Document)>> {
        let rows: Vec<(String, Json<Value>)> =
            sqlx::query_as("SELECT doc_id, data FROM documents WHERE parent = $1 ORDER BY doc_id")
                .bind(collection.key())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(id, Json(v))| {
                let doc = into_document(&collection.clone().doc(&id), v)?;
                Ok((id, doc))
            })
            .collect()
    }

    async fn begin(&self) -> StoreResult<Box<dyn DocTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgDocTransaction {
            tx,
            read_absent: HashSet::new(),
            staged: StagedWrites::default(),
        }))
    }
}

struct PgDocTransaction {
    tx: Transaction<'static, Postgres>,
    read_absent: HashSet<String>,
    staged: StagedWrites,
}

#[async_trait]
impl DocTransaction for PgDocTransaction {
    async fn get(&mut self, path: &DocPath) -> StoreResult<Option<Document>> {
        self.staged.guard_read(path)?;
        let row: Option<Json<Value>> =
            sqlx::query_scalar("SELECT data FROM documents WHERE path = $1 FOR UPDATE")
                .bind(path.key())
                .fetch_optional(&mut *self.tx)
                .await?;
        match row {
            Some(Json(v)) => into_document(path, v).map(Some),
            None => {
                self.read_absent.insert(path.key());
                Ok(None)
            }
        }
    }

    fn set(&mut self, path: &DocPath, data: Document, mode: SetMode) {
        self.staged.stage(path, data, mode);
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let Self {
            mut tx,
            read_absent,
            staged,
        } = *self;

        for (path, data, mode) in staged.into_inner() {
            let sql = if read_absent.contains(&path.key()) {
                INSERT_NEW
            } else if mode == SetMode::Merge {
                UPSERT_MERGE
            } else {
                UPSERT_REPLACE
            };
            write_query(sql, &path, data).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
