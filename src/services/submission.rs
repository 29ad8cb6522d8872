// src/services/submission.rs

//! Per-request submission flow and the quiz read paths.

use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use chrono::Utc;
use tokio::task::JoinHandle;

use super::{
    GamificationError, aggregate::AggregateRecomputer, leaderboard::LeaderboardMirror,
    ledger::AwardLedger, ranking, resolver::NameResolver, scoring,
};
use crate::{
    models::{
        participant::Participant,
        submission::{NewSubmission, RankedEntry, Submission},
    },
    repository::{QuizRepository, RepoResult},
};

/// One attempt as received from a participant.
#[derive(Debug, Clone)]
pub struct SubmissionInput {
    pub quiz_code: String,
    pub participant_name: String,
    /// `question id -> selected option letter`.
    pub answers: HashMap<i64, String>,
    pub duration_seconds: Option<i32>,
    pub account_id: Option<String>,
}

/// Secondary-store work started by one submission. Dropping it leaves the
/// tasks running.
#[derive(Debug)]
pub struct Followup {
    mirror: JoinHandle<()>,
    rewards: JoinHandle<()>,
}

impl Followup {
    /// Waits for the mirror publish and the reward chain.
    pub async fn finished(self) {
        for (what, task) in [("leaderboard mirror", self.mirror), ("rewards", self.rewards)] {
            if let Err(e) = task.await {
                tracing::error!("{} task failed: {}", what, e);
            }
        }
    }
}

fn logged<T>(what: &str, result: Result<T, GamificationError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(GamificationError::AmbiguousIdentity { name, matches }) => {
            tracing::debug!("{}: '{}' matched {} accounts", what, name, matches);
            None
        }
        Err(e) => {
            tracing::warn!("{} failed: {}", what, e);
            None
        }
    }
}

#[derive(Clone)]
pub struct SubmissionService {
    repo: Arc<dyn QuizRepository>,
    mirror: LeaderboardMirror,
    resolver: NameResolver,
    ledger: AwardLedger,
    aggregates: AggregateRecomputer,
    secondary_timeout: Duration,
}

impl SubmissionService {
    pub fn new(
        repo: Arc<dyn QuizRepository>,
        mirror: LeaderboardMirror,
        resolver: NameResolver,
        ledger: AwardLedger,
        aggregates: AggregateRecomputer,
        secondary_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            mirror,
            resolver,
            ledger,
            aggregates,
            secondary_timeout,
        }
    }

    /// Scores and persists an attempt. Secondary-store work runs detached.
    ///
    /// Returns `Ok(None)` for an unknown quiz code. Only a relational failure
    /// is an error; secondary-store problems are logged and swallowed.
    pub async fn submit(&self, input: SubmissionInput) -> RepoResult<Option<Submission>> {
        Ok(self
            .submit_with_followup(input)
            .await?
            .map(|(submission, _)| submission))
    }

    /// Like `submit`, but also hands back the detached secondary-store work.
    /// The followup is `None` when the secondary store is unavailable.
    pub async fn submit_with_followup(
        &self,
        input: SubmissionInput,
    ) -> RepoResult<Option<(Submission, Option<Followup>)>> {
        let Some(quiz) = self.repo.find_quiz_by_code(&input.quiz_code).await? else {
            return Ok(None);
        };

        let card = scoring::score(&quiz.questions, &input.answers);
        let duration_seconds = input.duration_seconds.unwrap_or(0).max(0);

        let submission = self
            .repo
            .create_submission(NewSubmission {
                quiz_id: quiz.id,
                participant_name: input.participant_name.clone(),
                total_questions: card.total_questions,
                total_correct: card.total_correct,
                total_score: card.total_score,
                duration_seconds,
                submitted_at: Utc::now(),
            })
            .await?;

        tracing::info!(
            "Submission {} for quiz {} by '{}': {}/{} correct, score {}",
            submission.id,
            quiz.quiz_code,
            submission.participant_name,
            submission.total_correct,
            submission.total_questions,
            submission.total_score
        );

        if !self.ledger.is_available() {
            tracing::debug!("Secondary store unavailable; skipping mirror and awards");
            return Ok(Some((submission, None)));
        }

        let account = input
            .account_id
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string);

        let followup = self.start_followup(quiz.quiz_code, submission.clone(), account);
        Ok(Some((submission, Some(followup))))
    }

    fn start_followup(
        &self,
        quiz_code: String,
        submission: Submission,
        account: Option<String>,
    ) -> Followup {
        let mirror = {
            let svc = self.clone();
            let quiz_code = quiz_code.clone();
            let submission = submission.clone();
            let account = account.clone();
            tokio::spawn(async move {
                // A single replace: safe to abandon on timeout.
                svc.bounded(
                    "leaderboard mirror",
                    svc.mirror.publish(
                        &quiz_code,
                        &submission.participant_name,
                        submission.total_score,
                        submission.duration_seconds,
                        account.as_deref(),
                    ),
                )
                .await;
            })
        };

        let svc = self.clone();
        let rewards = tokio::spawn(async move {
            let account = match account {
                Some(account) => Some(account),
                None => {
                    svc.bounded(
                        "name resolution",
                        svc.resolver
                            .resolve_account_by_name(&submission.participant_name),
                    )
                    .await
                }
            };
            if let Some(account) = account {
                svc.reward(account, quiz_code, submission).await;
            }
        });

        Followup { mirror, rewards }
    }

    async fn reward(&self, account: String, quiz_code: String, submission: Submission) {
        let aggregates = self.aggregates.clone();
        let (acct, correct, questions) = (
            account.clone(),
            submission.total_correct,
            submission.total_questions,
        );
        self.detached("attempt counters", async move {
            aggregates.record_attempt(&acct, correct, questions).await
        })
        .await;

        let percent =
            scoring::performance_percent(submission.total_correct, submission.total_questions);
        let xp = scoring::performance_xp(percent);

        let ledger = self.ledger.clone();
        let (acct, code) = (account.clone(), quiz_code.clone());
        if let Some(outcome) = self
            .detached("performance award", async move {
                ledger
                    .grant_performance_award(&acct, &code, xp, percent)
                    .await
            })
            .await
        {
            tracing::info!(
                "Performance award for {} on {}: {:?}",
                account,
                quiz_code,
                outcome
            );
        }

        let ledger = self.ledger.clone();
        self.detached("milestone badge", async move {
            ledger.ensure_milestone_badge(&account).await
        })
        .await;
    }

    /// Runs a read or a single write under `secondary_timeout`. The call is
    /// dropped when the timeout fires.
    async fn bounded<T>(
        &self,
        what: &str,
        call: impl Future<Output = Result<T, GamificationError>>,
    ) -> Option<T> {
        match tokio::time::timeout(self.secondary_timeout, call).await {
            Ok(result) => logged(what, result),
            Err(_) => {
                tracing::warn!("{} timed out after {:?}", what, self.secondary_timeout);
                None
            }
        }
    }

    /// Runs a multi-write ledger step on its own task and waits for it at
    /// most `secondary_timeout`. A step that outlives the wait still runs to
    /// completion, so its writes are never cut in half.
    async fn detached<T: Send + 'static>(
        &self,
        what: &str,
        step: impl Future<Output = Result<T, GamificationError>> + Send + 'static,
    ) -> Option<T> {
        match tokio::time::timeout(self.secondary_timeout, tokio::spawn(step)).await {
            Ok(Ok(result)) => logged(what, result),
            Ok(Err(e)) => {
                tracing::error!("{} task failed: {}", what, e);
                None
            }
            Err(_) => {
                tracing::warn!(
                    "{} still running after {:?}; continuing without it",
                    what,
                    self.secondary_timeout
                );
                None
            }
        }
    }

    /// Latest attempt per participant, in leaderboard order.
    pub async fn results(&self, quiz_code: &str) -> RepoResult<Vec<Submission>> {
        Ok(ranking::latest_sorted(self.history(quiz_code).await?))
    }

    pub async fn leaderboard(&self, quiz_code: &str) -> RepoResult<Vec<RankedEntry>> {
        Ok(ranking::rank_submissions(self.history(quiz_code).await?))
    }

    pub async fn participants(&self, quiz_code: &str) -> RepoResult<Vec<Participant>> {
        match self.repo.find_quiz_by_code(quiz_code).await? {
            Some(quiz) => self.repo.list_participants(quiz.id).await,
            None => Ok(Vec::new()),
        }
    }

    async fn history(&self, quiz_code: &str) -> RepoResult<Vec<Submission>> {
        match self.repo.find_quiz_by_code(quiz_code).await? {
            Some(quiz) => self.repo.list_submissions(quiz.id).await,
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::{
        models::{award::UserAggregate, quiz::Question},
        repository::memory::MemoryQuizRepository,
        store::{
            DocPath, DocTransaction, Document, DocumentStore, SecondaryStore, SetMode, StoreError,
            StoreResult, memory::MemoryDocumentStore, paths, read_i64,
        },
    };

    fn service(repo: &MemoryQuizRepository, store: SecondaryStore) -> SubmissionService {
        service_with_timeout(repo, store, Duration::from_secs(2))
    }

    fn service_with_timeout(
        repo: &MemoryQuizRepository,
        store: SecondaryStore,
        timeout: Duration,
    ) -> SubmissionService {
        SubmissionService::new(
            Arc::new(repo.clone()),
            LeaderboardMirror::new(store.clone(), false),
            NameResolver::new(store.clone()),
            AwardLedger::new(store.clone(), 5),
            AggregateRecomputer::new(store),
            timeout,
        )
    }

    /// Memory store with slow plain writes. Without `transactions` every
    /// `begin` fails, which sends awards down the fallback path.
    struct SlowStore {
        inner: MemoryDocumentStore,
        set_delay: Duration,
        increment_delay: Duration,
        transactions: bool,
    }

    impl SlowStore {
        fn over(inner: &MemoryDocumentStore) -> Self {
            Self {
                inner: inner.clone(),
                set_delay: Duration::ZERO,
                increment_delay: Duration::ZERO,
                transactions: true,
            }
        }
    }

    #[async_trait]
    impl DocumentStore for SlowStore {
        async fn get(&self, path: &DocPath) -> StoreResult<Option<Document>> {
            self.inner.get(path).await
        }
        async fn create(&self, path: &DocPath, data: Document) -> StoreResult<()> {
            self.inner.create(path, data).await
        }
        async fn set(&self, path: &DocPath, data: Document, mode: SetMode) -> StoreResult<()> {
            tokio::time::sleep(self.set_delay).await;
            self.inner.set(path, data, mode).await
        }
        async fn increment(&self, path: &DocPath, deltas: &[(&str, i64)]) -> StoreResult<()> {
            tokio::time::sleep(self.increment_delay).await;
            self.inner.increment(path, deltas).await
        }
        async fn list(&self, collection: &DocPath) -> StoreResult<Vec<(String, Document)>> {
            self.inner.list(collection).await
        }
        async fn begin(&self) -> StoreResult<Box<dyn DocTransaction>> {
            if !self.transactions {
                return Err(StoreError::Unavailable("transactions disabled".into()));
            }
            self.inner.begin().await
        }
    }

    /// Submits and waits for the detached secondary-store work.
    async fn submit_settled(svc: &SubmissionService, attempt: SubmissionInput) -> Option<Submission> {
        let (submission, followup) = svc.submit_with_followup(attempt).await.unwrap()?;
        if let Some(followup) = followup {
            followup.finished().await;
        }
        Some(submission)
    }

    /// Polls the aggregate until `done` holds or about two seconds pass.
    async fn eventually(
        store: &MemoryDocumentStore,
        account: &str,
        done: impl Fn(&UserAggregate) -> bool,
    ) -> UserAggregate {
        for _ in 0..100 {
            let agg = aggregate(store, account).await;
            if done(&agg) {
                return agg;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        aggregate(store, account).await
    }

    /// Quiz "QZ1" with ten one-mark questions, all answered "A".
    fn seed_quiz(repo: &MemoryQuizRepository) -> Vec<i64> {
        let questions = (0..10)
            .map(|i| Question::new(&format!("q{i}"), ["1", "2", "3", "4"], "A", None))
            .collect();
        repo.insert_quiz("QZ1", questions)
            .unwrap()
            .questions
            .iter()
            .map(|q| q.id)
            .collect()
    }

    fn input(name: &str, answers: HashMap<i64, String>, account: Option<&str>) -> SubmissionInput {
        SubmissionInput {
            quiz_code: "QZ1".to_string(),
            participant_name: name.to_string(),
            answers,
            duration_seconds: Some(42),
            account_id: account.map(str::to_string),
        }
    }

    fn correct(ids: &[i64], n: usize) -> HashMap<i64, String> {
        ids.iter().take(n).map(|id| (*id, "a".to_string())).collect()
    }

    async fn aggregate(store: &MemoryDocumentStore, account: &str) -> UserAggregate {
        UserAggregate::from_document(store.get(&paths::user(account)).await.unwrap().as_ref())
    }

    #[tokio::test]
    async fn test_unknown_quiz_is_absent() {
        let repo = MemoryQuizRepository::new();
        let svc = service(&repo, SecondaryStore::unavailable());
        let mut attempt = input("Ann", HashMap::new(), None);
        attempt.quiz_code = "NOPE".to_string();

        assert!(svc.submit(attempt).await.unwrap().is_none());
        assert!(svc.results("NOPE").await.unwrap().is_empty());
        assert!(svc.participants("NOPE").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_scores_and_awards_with_account() {
        let repo = MemoryQuizRepository::new();
        let ids = seed_quiz(&repo);
        let store = MemoryDocumentStore::new();
        let svc = service(&repo, SecondaryStore::available(Arc::new(store.clone())));

        let submission = submit_settled(&svc, input("Ann", correct(&ids, 10), Some("u1")))
            .await
            .unwrap();
        assert_eq!(submission.total_correct, 10);
        assert_eq!(submission.total_score, 10);
        assert_eq!(submission.duration_seconds, 42);

        let agg = aggregate(&store, "u1").await;
        assert_eq!(agg.total_xp, 110);
        assert_eq!(agg.badges_count, 1);
        assert_eq!(agg.quizzes_played, 1);
        assert_eq!(agg.total_correct, 10);

        let entry = store
            .get(&paths::leaderboard_entry("QZ1", "Ann"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read_i64(&entry, "score"), 10);
        assert_eq!(entry["uid"], "u1");
    }

    #[tokio::test]
    async fn test_second_attempt_counts_but_is_not_rewarded_again() {
        let repo = MemoryQuizRepository::new();
        let ids = seed_quiz(&repo);
        let store = MemoryDocumentStore::new();
        let svc = service(&repo, SecondaryStore::available(Arc::new(store.clone())));

        submit_settled(&svc, input("Ann", correct(&ids, 5), Some("u1"))).await;
        submit_settled(&svc, input("Ann", correct(&ids, 10), Some("u1"))).await;

        let agg = aggregate(&store, "u1").await;
        assert_eq!(agg.total_xp, 50);
        assert_eq!(agg.quizzes_played, 2);
        assert_eq!(store.list(&paths::awards("u1")).await.unwrap().len(), 1);

        let results = svc.results("QZ1").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].total_score, 10);
    }

    #[tokio::test]
    async fn test_account_resolved_from_name() {
        let repo = MemoryQuizRepository::new();
        let ids = seed_quiz(&repo);
        let store = MemoryDocumentStore::new();
        let doc = json!({"name": "Bob"}).as_object().cloned().unwrap();
        store.set(&paths::user("u7"), doc, SetMode::Merge).await.unwrap();
        let svc = service(&repo, SecondaryStore::available(Arc::new(store.clone())));

        submit_settled(&svc, input("bob", correct(&ids, 9), None)).await;

        assert_eq!(aggregate(&store, "u7").await.total_xp, 90);
    }

    #[tokio::test]
    async fn test_unresolved_name_gets_no_award() {
        let repo = MemoryQuizRepository::new();
        let ids = seed_quiz(&repo);
        let store = MemoryDocumentStore::new();
        let svc = service(&repo, SecondaryStore::available(Arc::new(store.clone())));

        let submission = submit_settled(&svc, input("Nobody", correct(&ids, 3), None)).await;

        assert!(submission.is_some());
        assert!(store.list(&paths::users()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_slow_mirror_does_not_delay_submit() {
        let repo = MemoryQuizRepository::new();
        let ids = seed_quiz(&repo);
        let store = MemoryDocumentStore::new();
        let slow = SlowStore {
            set_delay: Duration::from_millis(800),
            ..SlowStore::over(&store)
        };
        let svc = service_with_timeout(
            &repo,
            SecondaryStore::available(Arc::new(slow)),
            Duration::from_secs(3),
        );

        let started = Instant::now();
        let (_, followup) = svc
            .submit_with_followup(input("Ann", correct(&ids, 7), None))
            .await
            .unwrap()
            .unwrap();
        assert!(
            started.elapsed() < Duration::from_millis(400),
            "submit waited {:?}",
            started.elapsed()
        );

        followup.unwrap().finished().await;
        let entry = store
            .get(&paths::leaderboard_entry("QZ1", "Ann"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read_i64(&entry, "score"), 7);
    }

    #[tokio::test]
    async fn test_award_outliving_timeout_still_completes() {
        let repo = MemoryQuizRepository::new();
        let ids = seed_quiz(&repo);
        let store = MemoryDocumentStore::new();
        // Fallback path: the ledger entry is created at once, the aggregate
        // increment lands well after the timeout.
        let slow = SlowStore {
            increment_delay: Duration::from_millis(150),
            transactions: false,
            ..SlowStore::over(&store)
        };
        let svc = service_with_timeout(
            &repo,
            SecondaryStore::available(Arc::new(slow)),
            Duration::from_millis(20),
        );

        submit_settled(&svc, input("Ann", correct(&ids, 10), Some("u1"))).await;

        let agg = eventually(&store, "u1", |agg| agg.total_xp > 0 && agg.quizzes_played > 0).await;
        assert_eq!(agg.total_xp, 110);
        assert_eq!(agg.badges_count, 1);
        assert_eq!(agg.quizzes_played, 1);
        assert_eq!(store.list(&paths::awards("u1")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_works_without_secondary_store() {
        let repo = MemoryQuizRepository::new();
        let ids = seed_quiz(&repo);
        let svc = service(&repo, SecondaryStore::unavailable());

        let mut attempt = input("Ann", correct(&ids, 4), Some("u1"));
        attempt.duration_seconds = Some(-5);
        let submission = svc.submit(attempt).await.unwrap().unwrap();

        assert_eq!(submission.total_score, 4);
        assert_eq!(submission.duration_seconds, 0);
        assert_eq!(svc.leaderboard("QZ1").await.unwrap()[0].rank, 1);
    }

    #[tokio::test]
    async fn test_leaderboard_and_participants() {
        let repo = MemoryQuizRepository::new();
        let ids = seed_quiz(&repo);
        repo.add_participant("QZ1", "Ann").unwrap();
        repo.add_participant("QZ1", "Bob").unwrap();
        let svc = service(&repo, SecondaryStore::unavailable());

        svc.submit(input("Ann", correct(&ids, 6), None)).await.unwrap();
        svc.submit(input("Bob", correct(&ids, 8), None)).await.unwrap();

        let board = svc.leaderboard("QZ1").await.unwrap();
        let names: Vec<&str> = board.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Bob", "Ann"]);
        assert_eq!(board[1].rank, 2);
        assert_eq!(svc.participants("QZ1").await.unwrap().len(), 2);
    }
}
