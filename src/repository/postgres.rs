// src/repository/postgres.rs

use async_trait::async_trait;
use sqlx::PgPool;

use super::{QuizRepository, RepoResult};
use crate::models::{
    participant::Participant,
    quiz::{Question, Quiz, QuizMetadata, QuizSummary},
    submission::{NewSubmission, Submission},
};

#[derive(Clone)]
pub struct PgQuizRepository {
    pool: PgPool,
}

impl PgQuizRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl QuizRepository for PgQuizRepository {
    async fn find_quiz_by_code(&self, quiz_code: &str) -> RepoResult<Option<Quiz>> {
        let quiz: Option<Quiz> = sqlx::query_as(
            r#"
            SELECT
                id, quiz_code, title, description, difficulty, session_timer,
                creator_uid, creator_name, created_at
            FROM quizzes
            WHERE quiz_code = $1
            "#,
        )
        .bind(quiz_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch quiz {}: {:?}", quiz_code, e);
            e
        })?;

        let Some(mut quiz) = quiz else {
            return Ok(None);
        };

        quiz.questions = sqlx::query_as::<_, Question>(
            r#"
            SELECT
                id, position, question_text,
                option_a, option_b, option_c, option_d,
                correct_answer, marks, timer
            FROM questions
            WHERE quiz_id = $1
            ORDER BY position, id
            "#,
        )
        .bind(quiz.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(quiz))
    }

    async fn list_quizzes(&self) -> RepoResult<Vec<QuizSummary>> {
        let quizzes = sqlx::query_as("SELECT id, quiz_code, title FROM quizzes ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(quizzes)
    }

    async fn create_submission(&self, new: NewSubmission) -> RepoResult<Submission> {
        let mut tx = self.pool.begin().await?;

        let submission: Submission = sqlx::query_as(
            r#"
            INSERT INTO submissions
            (quiz_id, participant_name, total_questions, total_correct,
             total_score, duration_seconds, submitted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING
                id, quiz_id, participant_name, total_questions, total_correct,
                total_score, duration_seconds, submitted_at
            "#,
        )
        .bind(new.quiz_id)
        .bind(&new.participant_name)
        .bind(new.total_questions)
        .bind(new.total_correct)
        .bind(new.total_score)
        .bind(new.duration_seconds)
        .bind(new.submitted_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert submission: {:?}", e);
            e
        })?;

        tx.commit().await?;
        Ok(submission)
    }

    async fn list_submissions(&self, quiz_id: i64) -> RepoResult<Vec<Submission>> {
        let submissions = sqlx::query_as(
            r#"
            SELECT
                id, quiz_id, participant_name, total_questions, total_correct,
                total_score, duration_seconds, submitted_at
            FROM submissions
            WHERE quiz_id = $1
            ORDER BY id
            "#,
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(submissions)
    }

    async fn list_participants(&self, quiz_id: i64) -> RepoResult<Vec<Participant>> {
        let participants = sqlx::query_as(
            r#"
            SELECT id, name, joined_at
            FROM participants
            WHERE quiz_id = $1
            ORDER BY joined_at, id
            "#,
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(participants)
    }

    async fn upsert_quiz_metadata(&self, meta: &QuizMetadata) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO quizzes
            (quiz_code, title, description, difficulty, session_timer, creator_uid, creator_name)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (quiz_code) DO UPDATE SET
                title = COALESCE(EXCLUDED.title, quizzes.title),
                description = COALESCE(EXCLUDED.description, quizzes.description),
                difficulty = COALESCE(EXCLUDED.difficulty, quizzes.difficulty),
                session_timer = COALESCE(EXCLUDED.session_timer, quizzes.session_timer),
                creator_uid = COALESCE(EXCLUDED.creator_uid, quizzes.creator_uid),
                creator_name = COALESCE(EXCLUDED.creator_name, quizzes.creator_name)
            "#,
        )
        .bind(&meta.quiz_code)
        .bind(&meta.title)
        .bind(&meta.description)
        .bind(&meta.difficulty)
        .bind(meta.session_timer)
        .bind(&meta.creator_uid)
        .bind(&meta.creator_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
