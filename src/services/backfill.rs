// src/services/backfill.rs

//! Retroactive rank awards from the persisted submission history.

use std::sync::Arc;

use futures::{StreamExt, stream};
use serde::Serialize;
use utoipa::ToSchema;

use super::{
    GamificationError, leaderboard::LeaderboardMirror, ledger::AwardLedger, ranking,
    resolver::{NameIndex, NameResolver},
};
use crate::{
    models::{quiz::QuizSummary, submission::RankedEntry},
    repository::QuizRepository,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillTarget {
    All,
    Quiz(String),
}

impl BackfillTarget {
    /// A blank code means every quiz.
    pub fn from_code(code: Option<&str>) -> Self {
        match code.map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => BackfillTarget::Quiz(code.to_string()),
            None => BackfillTarget::All,
        }
    }

    /// Quiz code used for failures that are not tied to a single quiz.
    pub fn scope(&self) -> &str {
        match self {
            BackfillTarget::All => "*",
            BackfillTarget::Quiz(code) => code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedAward {
    pub quiz_code: String,
    pub account_id: String,
    pub rank: u32,
    /// False when the ledger already held an award for this quiz.
    pub granted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SkippedEntry {
    pub quiz_code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackfillFailure {
    pub quiz_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    pub processed: Vec<ProcessedAward>,
    pub skipped: Vec<SkippedEntry>,
    pub errors: Vec<BackfillFailure>,
}

enum EntryOutcome {
    Processed(ProcessedAward),
    Skipped(SkippedEntry),
    Failed(BackfillFailure),
}

#[derive(Clone)]
pub struct BackfillJob {
    repo: Arc<dyn QuizRepository>,
    mirror: LeaderboardMirror,
    resolver: NameResolver,
    ledger: AwardLedger,
    concurrency: usize,
}

impl BackfillJob {
    pub fn new(
        repo: Arc<dyn QuizRepository>,
        mirror: LeaderboardMirror,
        resolver: NameResolver,
        ledger: AwardLedger,
        concurrency: usize,
    ) -> Self {
        Self {
            repo,
            mirror,
            resolver,
            ledger,
            concurrency: concurrency.max(1),
        }
    }

    /// Runs the backfill. Only an unavailable store or a failure to list the
    /// quizzes fails the run; everything else is reported per quiz or entry.
    /// A failed account listing is reported under the target's scope.
    pub async fn run(&self, target: &BackfillTarget) -> Result<BackfillReport, GamificationError> {
        if !self.ledger.is_available() {
            return Err(GamificationError::StoreUnavailable);
        }

        let quiz_codes = match target {
            BackfillTarget::Quiz(code) => vec![code.clone()],
            BackfillTarget::All => self
                .repo
                .list_quizzes()
                .await?
                .into_iter()
                .map(|QuizSummary { quiz_code, .. }| quiz_code)
                .collect(),
        };

        let mut report = BackfillReport::default();

        // Without the account listing only mirror uids can resolve entries.
        let index = match self.resolver.index().await {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!("Backfill: account index unavailable: {}", e);
                report.errors.push(BackfillFailure {
                    quiz_code: target.scope().to_string(),
                    name: None,
                    message: format!("account index unavailable: {e}"),
                });
                NameIndex::default()
            }
        };

        for quiz_code in &quiz_codes {
            match self.ranked_entries(quiz_code).await {
                Ok(entries) => self.backfill_quiz(quiz_code, entries, &index, &mut report).await,
                Err(message) => {
                    tracing::warn!("Backfill: skipping quiz {}: {}", quiz_code, message);
                    report.errors.push(BackfillFailure {
                        quiz_code: quiz_code.clone(),
                        name: None,
                        message,
                    });
                }
            }
        }

        tracing::info!(
            "Backfill over {} quizzes: {} processed, {} skipped, {} errors",
            quiz_codes.len(),
            report.processed.len(),
            report.skipped.len(),
            report.errors.len()
        );
        Ok(report)
    }

    async fn ranked_entries(&self, quiz_code: &str) -> Result<Vec<RankedEntry>, String> {
        let Some(quiz) = self
            .repo
            .find_quiz_by_code(quiz_code)
            .await
            .map_err(|e| e.to_string())?
        else {
            tracing::debug!("Backfill: unknown quiz {}", quiz_code);
            return Ok(Vec::new());
        };
        let history = self
            .repo
            .list_submissions(quiz.id)
            .await
            .map_err(|e| e.to_string())?;
        Ok(ranking::rank_submissions(history))
    }

    async fn backfill_quiz(
        &self,
        quiz_code: &str,
        entries: Vec<RankedEntry>,
        index: &NameIndex,
        report: &mut BackfillReport,
    ) {
        let outcomes: Vec<EntryOutcome> = stream::iter(entries)
            .map(|entry| self.backfill_entry(quiz_code, entry, index))
            .buffered(self.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                EntryOutcome::Processed(p) => report.processed.push(p),
                EntryOutcome::Skipped(s) => report.skipped.push(s),
                EntryOutcome::Failed(f) => report.errors.push(f),
            }
        }
    }

    async fn backfill_entry(
        &self,
        quiz_code: &str,
        entry: RankedEntry,
        index: &NameIndex,
    ) -> EntryOutcome {
        let failed = |message: String| {
            tracing::warn!("Backfill: {}/{}: {}", quiz_code, entry.name, message);
            EntryOutcome::Failed(BackfillFailure {
                quiz_code: quiz_code.to_string(),
                name: Some(entry.name.clone()),
                message,
            })
        };

        let attached = match self.mirror.attached_account(quiz_code, &entry.name).await {
            Ok(attached) => attached,
            Err(e) => return failed(e.to_string()),
        };
        let account = match attached.map_or_else(|| index.resolve(&entry.name), Ok) {
            Ok(account) => account,
            Err(GamificationError::AmbiguousIdentity { matches, .. }) => {
                tracing::debug!(
                    "Backfill: {}/{} unresolved ({} matches)",
                    quiz_code,
                    entry.name,
                    matches
                );
                return EntryOutcome::Skipped(SkippedEntry {
                    quiz_code: quiz_code.to_string(),
                    name: entry.name.clone(),
                });
            }
            Err(e) => return failed(e.to_string()),
        };

        match self
            .ledger
            .grant_rank_award(&account, quiz_code, entry.rank)
            .await
        {
            Ok(outcome) => EntryOutcome::Processed(ProcessedAward {
                quiz_code: quiz_code.to_string(),
                account_id: account,
                rank: entry.rank,
                granted: outcome.is_new_entry(),
            }),
            Err(e) => failed(e.to_string()),
        }
    }
}
