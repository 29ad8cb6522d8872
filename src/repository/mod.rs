// src/repository/mod.rs

//! Relational store for quizzes, questions, participants and submissions.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::models::{
    participant::Participant,
    quiz::{Quiz, QuizMetadata, QuizSummary},
    submission::{NewSubmission, Submission},
};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

pub type RepoResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// Quiz with its questions in position order.
    async fn find_quiz_by_code(&self, quiz_code: &str) -> RepoResult<Option<Quiz>>;

    async fn list_quizzes(&self) -> RepoResult<Vec<QuizSummary>>;

    /// Persists a new attempt atomically and returns it with its id.
    async fn create_submission(&self, new: NewSubmission) -> RepoResult<Submission>;

    /// Every attempt for the quiz, in insertion order.
    async fn list_submissions(&self, quiz_id: i64) -> RepoResult<Vec<Submission>>;

    async fn list_participants(&self, quiz_id: i64) -> RepoResult<Vec<Participant>>;

    /// Target of the document-store quiz replication. Inserts a bare quiz for
    /// an unknown code; `None` fields keep their stored values.
    async fn upsert_quiz_metadata(&self, meta: &QuizMetadata) -> RepoResult<()>;
}
