// src/services/ledger.rs

//! Idempotent XP / badge grants.
//!
//! Every grant is keyed by (account, award key). The award key of a quiz
//! award is the quiz code, shared by the rank-based and the performance-based
//! policy, so a quiz yields at most one award per account. The milestone
//! badge uses the fixed key `badge_xp_master`.
//!
//! A grant runs in a document-store transaction that reads the award entry
//! and the user aggregate before staging any write. Commit conflicts are
//! retried. If the transaction still fails, the grant falls back to a
//! create-if-absent of the entry plus an unconditional atomic increment of
//! the aggregate. That fallback can double count when it races a concurrent
//! transaction that did commit; this is accepted and logged.
//!
//! Badge counting differs between policies: rank awards and the milestone
//! always add one to `badgesCount`, performance awards only when a badge was
//! assigned. `AggregateRecomputer::recompute` counts every entry instead.
//! The two totals can disagree until that product question is settled.

use chrono::Utc;
use serde_json::Value;

use super::{GamificationError, require, require_account};
use crate::{
    models::award::{AwardLedgerEntry, UserAggregate},
    store::{DocPath, Document, DocumentStore, SecondaryStore, SetMode, StoreError, paths},
};

pub const MILESTONE_KEY: &str = "badge_xp_master";
pub const MILESTONE_BADGE: &str = "XP Master";
pub const MILESTONE_MIN_TOTAL_XP: i64 = 1000;
pub const SPEED_LEARNER_BADGE: &str = "Speed Learner";
pub const SPEED_LEARNER_MIN_PERCENT: f64 = 0.9;

/// 10 XP for first place, one less per place, never below 1.
pub fn rank_xp(rank: u32) -> i64 {
    (10 - (i64::from(rank) - 1)).max(1)
}

pub fn rank_badge(rank: u32) -> &'static str {
    match rank {
        1 => "Gold",
        2 => "Silver",
        3 => "Bronze",
        _ => "Participant",
    }
}

pub fn performance_badge(percent: f64) -> Option<&'static str> {
    (percent >= SPEED_LEARNER_MIN_PERCENT).then_some(SPEED_LEARNER_BADGE)
}

#[derive(Debug, Clone, PartialEq)]
pub enum AwardOutcome {
    /// The transaction wrote the entry and updated the aggregate.
    Granted(AwardLedgerEntry),
    /// An entry already exists for this key; nothing was written.
    AlreadyGranted,
    /// Milestone not reached yet.
    BelowThreshold,
    /// Written by the non-transactional fallback.
    GrantedBestEffort { entry_created: bool },
}

impl AwardOutcome {
    /// Whether this call wrote a new ledger entry.
    pub fn is_new_entry(&self) -> bool {
        matches!(
            self,
            AwardOutcome::Granted(_) | AwardOutcome::GrantedBestEffort { entry_created: true }
        )
    }
}

/// Everything one grant writes.
struct AwardPlan {
    account: String,
    award_key: String,
    entry: AwardLedgerEntry,
    badges_delta: i64,
    min_total_xp: Option<i64>,
}

impl AwardPlan {
    fn award_path(&self) -> DocPath {
        paths::award(&self.account, &self.award_key)
    }

    fn user_path(&self) -> DocPath {
        paths::user(&self.account)
    }

    fn deltas(&self) -> Vec<(&'static str, i64)> {
        let mut deltas = Vec::new();
        if self.entry.xp != 0 {
            deltas.push(("totalXp", self.entry.xp));
            deltas.push(("xp", self.entry.xp));
        }
        if self.badges_delta != 0 {
            deltas.push(("badgesCount", self.badges_delta));
        }
        deltas
    }
}

#[derive(Clone, Debug)]
pub struct AwardLedger {
    store: SecondaryStore,
    max_attempts: u32,
}

impl AwardLedger {
    pub fn new(store: SecondaryStore, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn is_available(&self) -> bool {
        self.store.is_available()
    }

    /// Rank-based award for a finished quiz.
    pub async fn grant_rank_award(
        &self,
        account: &str,
        quiz_code: &str,
        rank: u32,
    ) -> Result<AwardOutcome, GamificationError> {
        let plan = AwardPlan {
            account: require_account(account)?.to_string(),
            award_key: quiz_code.to_string(),
            entry: AwardLedgerEntry {
                quiz_code: Some(quiz_code.to_string()),
                xp: rank_xp(rank),
                badge: Some(rank_badge(rank).to_string()),
                rank: Some(rank),
                percent: None,
                awarded_at: Utc::now(),
            },
            badges_delta: 1,
            min_total_xp: None,
        };
        self.apply(plan).await
    }

    /// Performance-based award for one attempt. `xp` is computed by the
    /// caller (see `scoring::performance_xp`).
    pub async fn grant_performance_award(
        &self,
        account: &str,
        quiz_code: &str,
        xp: i64,
        percent: f64,
    ) -> Result<AwardOutcome, GamificationError> {
        let badge = performance_badge(percent);
        let plan = AwardPlan {
            account: require_account(account)?.to_string(),
            award_key: quiz_code.to_string(),
            entry: AwardLedgerEntry {
                quiz_code: Some(quiz_code.to_string()),
                xp,
                badge: badge.map(str::to_string),
                rank: None,
                percent: Some(percent),
                awarded_at: Utc::now(),
            },
            badges_delta: i64::from(badge.is_some()),
            min_total_xp: None,
        };
        self.apply(plan).await
    }

    /// Grants "XP Master" once the account reaches 1000 total XP.
    pub async fn ensure_milestone_badge(
        &self,
        account: &str,
    ) -> Result<AwardOutcome, GamificationError> {
        let plan = AwardPlan {
            account: require_account(account)?.to_string(),
            award_key: MILESTONE_KEY.to_string(),
            entry: AwardLedgerEntry {
                quiz_code: None,
                xp: 0,
                badge: Some(MILESTONE_BADGE.to_string()),
                rank: None,
                percent: None,
                awarded_at: Utc::now(),
            },
            badges_delta: 1,
            min_total_xp: Some(MILESTONE_MIN_TOTAL_XP),
        };
        self.apply(plan).await
    }

    async fn apply(&self, plan: AwardPlan) -> Result<AwardOutcome, GamificationError> {
        let store = require(&self.store)?;

        let mut cause = StoreError::Conflict("no attempt made".to_string());
        for attempt in 1..=self.max_attempts {
            match try_transaction(store, &plan).await {
                Ok(outcome) => {
                    tracing::debug!(
                        "Award {}/{} -> {:?} (attempt {})",
                        plan.account,
                        plan.award_key,
                        outcome,
                        attempt
                    );
                    return Ok(outcome);
                }
                Err(StoreError::Conflict(msg)) => {
                    tracing::debug!(
                        "Award transaction conflict for {}/{} (attempt {}): {}",
                        plan.account,
                        plan.award_key,
                        attempt,
                        msg
                    );
                    cause = StoreError::Conflict(msg);
                }
                Err(StoreError::ReadAfterWrite(path)) => {
                    tracing::error!(
                        "Award transaction for {}/{} read {} after writing",
                        plan.account,
                        plan.award_key,
                        path
                    );
                    return Err(GamificationError::InvalidTransaction(path));
                }
                Err(other) => {
                    cause = other;
                    break;
                }
            }
        }

        tracing::warn!(
            "Award transaction failed for {}/{}: {}; using best-effort fallback",
            plan.account,
            plan.award_key,
            cause
        );
        fallback(store, &plan, &cause).await
    }
}

async fn try_transaction(
    store: &dyn DocumentStore,
    plan: &AwardPlan,
) -> Result<AwardOutcome, StoreError> {
    let award_path = plan.award_path();
    let user_path = plan.user_path();

    let mut tx = store.begin().await?;

    // All reads happen before the first staged write.
    let existing = tx.get(&award_path).await?;
    let user = tx.get(&user_path).await?;

    if existing.is_some() {
        return Ok(AwardOutcome::AlreadyGranted);
    }

    let aggregate = UserAggregate::from_document(user.as_ref());
    if plan
        .min_total_xp
        .is_some_and(|min| aggregate.total_xp < min)
    {
        return Ok(AwardOutcome::BelowThreshold);
    }

    let mut totals = Document::new();
    if plan.entry.xp != 0 {
        totals.insert(
            "totalXp".to_string(),
            Value::from(aggregate.total_xp + plan.entry.xp),
        );
        totals.insert("xp".to_string(), Value::from(aggregate.xp + plan.entry.xp));
    }
    if plan.badges_delta != 0 {
        totals.insert(
            "badgesCount".to_string(),
            Value::from(aggregate.badges_count + plan.badges_delta),
        );
    }

    tx.set(&award_path, plan.entry.to_document()?, SetMode::Replace);
    if !totals.is_empty() {
        tx.set(&user_path, totals, SetMode::Merge);
    }
    tx.commit().await?;

    Ok(AwardOutcome::Granted(plan.entry.clone()))
}

async fn fallback(
    store: &dyn DocumentStore,
    plan: &AwardPlan,
    cause: &StoreError,
) -> Result<AwardOutcome, GamificationError> {
    let user_path = plan.user_path();
    let failed = |e: StoreError| {
        tracing::error!(
            "Award fallback failed for {}/{}: {}",
            plan.account,
            plan.award_key,
            e
        );
        GamificationError::TransactionConflict(format!("{cause}; fallback: {e}"))
    };

    if let Some(min) = plan.min_total_xp {
        let user = store.get(&user_path).await.map_err(failed)?;
        if UserAggregate::from_document(user.as_ref()).total_xp < min {
            return Ok(AwardOutcome::BelowThreshold);
        }
    }

    let entry = plan.entry.to_document().map_err(failed)?;
    let entry_created = match store.create(&plan.award_path(), entry).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                "Award fallback could not create {}/{} (may already exist): {}",
                plan.account,
                plan.award_key,
                e
            );
            false
        }
    };

    let deltas = plan.deltas();
    if !deltas.is_empty() {
        store.increment(&user_path, &deltas).await.map_err(failed)?;
    }

    tracing::warn!(
        "Award fallback applied for {}/{} (entry created: {}); aggregate may be double counted",
        plan.account,
        plan.award_key,
        entry_created
    );
    Ok(AwardOutcome::GrantedBestEffort { entry_created })
}
