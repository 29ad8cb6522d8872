// src/repository/memory.rs

//! In-process relational store, used for local runs and tests.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::{QuizRepository, RepoResult, RepositoryError};
use crate::models::{
    participant::Participant,
    quiz::{Question, Quiz, QuizMetadata, QuizSummary},
    submission::{NewSubmission, Submission},
};

#[derive(Debug, Default)]
struct Tables {
    quizzes: Vec<Quiz>,
    participants: Vec<(i64, Participant)>,
    submissions: Vec<Submission>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn blank_quiz(&mut self, quiz_code: &str) -> Quiz {
        Quiz {
            id: self.next_id(),
            quiz_code: quiz_code.to_string(),
            title: None,
            description: None,
            difficulty: None,
            session_timer: None,
            creator_uid: None,
            creator_name: None,
            created_at: Some(Utc::now()),
            questions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryQuizRepository {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryQuizRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> RepoResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("memory repository lock poisoned".to_string()))
    }

    /// Stores a quiz under `quiz_code`, assigning ids and positions to its questions.
    pub fn insert_quiz(&self, quiz_code: &str, questions: Vec<Question>) -> RepoResult<Quiz> {
        let mut tables = self.lock()?;
        let mut quiz = tables.blank_quiz(quiz_code);
        for (position, mut question) in questions.into_iter().enumerate() {
            question.id = tables.next_id();
            question.position = position as i32;
            quiz.questions.push(question);
        }
        tables.quizzes.retain(|q| q.quiz_code != quiz_code);
        tables.quizzes.push(quiz.clone());
        Ok(quiz)
    }

    /// Records a join, the way the join flow would.
    pub fn add_participant(&self, quiz_code: &str, name: &str) -> RepoResult<Option<Participant>> {
        let mut tables = self.lock()?;
        let Some(quiz_id) = tables
            .quizzes
            .iter()
            .find(|q| q.quiz_code == quiz_code)
            .map(|q| q.id)
        else {
            return Ok(None);
        };
        if let Some((_, existing)) = tables
            .participants
            .iter()
            .find(|(qid, p)| *qid == quiz_id && p.name == name)
        {
            return Ok(Some(existing.clone()));
        }
        let participant = Participant {
            id: tables.next_id(),
            name: name.to_string(),
            joined_at: Utc::now(),
        };
        tables.participants.push((quiz_id, participant.clone()));
        Ok(Some(participant))
    }
}

#[async_trait]
impl QuizRepository for MemoryQuizRepository {
    async fn find_quiz_by_code(&self, quiz_code: &str) -> RepoResult<Option<Quiz>> {
        Ok(self
            .lock()?
            .quizzes
            .iter()
            .find(|q| q.quiz_code == quiz_code)
            .cloned())
    }

    async fn list_quizzes(&self) -> RepoResult<Vec<QuizSummary>> {
        Ok(self
            .lock()?
            .quizzes
            .iter()
            .map(|q| QuizSummary {
                id: q.id,
                quiz_code: q.quiz_code.clone(),
                title: q.title.clone(),
            })
            .collect())
    }

    async fn create_submission(&self, new: NewSubmission) -> RepoResult<Submission> {
        let mut tables = self.lock()?;
        let submission = Submission {
            id: tables.next_id(),
            quiz_id: new.quiz_id,
            participant_name: new.participant_name,
            total_questions: new.total_questions,
            total_correct: new.total_correct,
            total_score: new.total_score,
            duration_seconds: new.duration_seconds,
            submitted_at: new.submitted_at,
        };
        tables.submissions.push(submission.clone());
        Ok(submission)
    }

    async fn list_submissions(&self, quiz_id: i64) -> RepoResult<Vec<Submission>> {
        Ok(self
            .lock()?
            .submissions
            .iter()
            .filter(|s| s.quiz_id == quiz_id)
            .cloned()
            .collect())
    }

    async fn list_participants(&self, quiz_id: i64) -> RepoResult<Vec<Participant>> {
        Ok(self
            .lock()?
            .participants
            .iter()
            .filter(|(qid, _)| *qid == quiz_id)
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn upsert_quiz_metadata(&self, meta: &QuizMetadata) -> RepoResult<()> {
        let mut tables = self.lock()?;
        if !tables.quizzes.iter().any(|q| q.quiz_code == meta.quiz_code) {
            let quiz = tables.blank_quiz(&meta.quiz_code);
            tables.quizzes.push(quiz);
        }
        let Some(quiz) = tables
            .quizzes
            .iter_mut()
            .find(|q| q.quiz_code == meta.quiz_code)
        else {
            return Ok(());
        };

        fn keep_or_replace<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }
        keep_or_replace(&mut quiz.title, &meta.title);
        keep_or_replace(&mut quiz.description, &meta.description);
        keep_or_replace(&mut quiz.difficulty, &meta.difficulty);
        keep_or_replace(&mut quiz.session_timer, &meta.session_timer);
        keep_or_replace(&mut quiz.creator_uid, &meta.creator_uid);
        keep_or_replace(&mut quiz.creator_name, &meta.creator_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_quiz_assigns_ids_and_positions() {
        let repo = MemoryQuizRepository::new();
        let quiz = repo
            .insert_quiz(
                "QZ1",
                vec![
                    Question::new("a?", ["1", "2", "3", "4"], "A", None),
                    Question::new("b?", ["1", "2", "3", "4"], "B", Some(2)),
                ],
            )
            .unwrap();

        let found = repo.find_quiz_by_code("QZ1").await.unwrap().unwrap();
        assert_eq!(found.id, quiz.id);
        assert_eq!(found.questions.len(), 2);
        assert_eq!(found.questions[1].position, 1);
        assert_ne!(found.questions[0].id, found.questions[1].id);
        assert!(repo.find_quiz_by_code("QZ2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_metadata_keeps_unset_fields() {
        let repo = MemoryQuizRepository::new();
        repo.upsert_quiz_metadata(&QuizMetadata {
            quiz_code: "QZ9".to_string(),
            title: Some("First".to_string()),
            difficulty: Some("easy".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
        repo.upsert_quiz_metadata(&QuizMetadata {
            quiz_code: "QZ9".to_string(),
            title: Some("Second".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

        let quiz = repo.find_quiz_by_code("QZ9").await.unwrap().unwrap();
        assert_eq!(quiz.title.as_deref(), Some("Second"));
        assert_eq!(quiz.difficulty.as_deref(), Some("easy"));
        assert_eq!(repo.list_quizzes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_participant_is_idempotent_per_name() {
        let repo = MemoryQuizRepository::new();
        let quiz = repo.insert_quiz("QZ1", Vec::new()).unwrap();
        let first = repo.add_participant("QZ1", "Ann").unwrap().unwrap();
        let again = repo.add_participant("QZ1", "Ann").unwrap().unwrap();
        assert_eq!(first.id, again.id);
        assert!(repo.add_participant("QZX", "Ann").unwrap().is_none());
        assert_eq!(repo.list_participants(quiz.id).await.unwrap().len(), 1);
    }
}
