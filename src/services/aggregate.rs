// src/services/aggregate.rs

use serde_json::Value;

use super::{GamificationError, require, require_account};
use crate::{
    models::award::{AwardLedgerEntry, AwardRecord, UserAggregate, UserStats},
    store::{Document, SecondaryStore, SetMode, paths},
};

/// Sum of xp and number of entries.
///
/// Every entry counts toward `badgesCount`, with or without a badge label.
/// The incremental performance path only counts labelled entries, so a
/// recompute can raise the badge count of an account.
pub fn ledger_totals<'a>(entries: impl IntoIterator<Item = &'a AwardLedgerEntry>) -> (i64, i64) {
    entries
        .into_iter()
        .fold((0, 0), |(xp, count), entry| (xp + entry.xp, count + 1))
}

#[derive(Clone, Debug)]
pub struct AggregateRecomputer {
    store: SecondaryStore,
}

impl AggregateRecomputer {
    pub fn new(store: SecondaryStore) -> Self {
        Self { store }
    }

    async fn ledger(&self, account: &str) -> Result<Vec<AwardRecord>, GamificationError> {
        let entries = require(&self.store)?.list(&paths::awards(account)).await?;
        Ok(entries
            .into_iter()
            .map(|(id, doc)| AwardRecord {
                id,
                entry: AwardLedgerEntry::from_document(&doc),
            })
            .collect())
    }

    /// Rebuilds totalXp, xp and badgesCount from the ledger. Other aggregate
    /// fields are left as they are.
    pub async fn recompute(&self, account: &str) -> Result<UserAggregate, GamificationError> {
        let account = require_account(account)?;
        let store = require(&self.store)?;

        let records = self.ledger(account).await?;
        let (total_xp, badges_count) = ledger_totals(records.iter().map(|r| &r.entry));

        let mut totals = Document::new();
        totals.insert("totalXp".to_string(), Value::from(total_xp));
        totals.insert("xp".to_string(), Value::from(total_xp));
        totals.insert("badgesCount".to_string(), Value::from(badges_count));
        store
            .set(&paths::user(account), totals, SetMode::Merge)
            .await?;

        tracing::info!(
            "Recomputed {}: totalXp={} badgesCount={} from {} entries",
            account,
            total_xp,
            badges_count,
            records.len()
        );

        let user = store.get(&paths::user(account)).await?;
        Ok(UserAggregate::from_document(user.as_ref()))
    }

    /// Attempt counters, incremented for every attempt with a known account.
    pub async fn record_attempt(
        &self,
        account: &str,
        total_correct: i32,
        total_questions: i32,
    ) -> Result<(), GamificationError> {
        let account = require_account(account)?;
        require(&self.store)?
            .increment(
                &paths::user(account),
                &[
                    ("quizzesPlayed", 1),
                    ("totalCorrect", i64::from(total_correct)),
                    ("totalQuestions", i64::from(total_questions)),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn user_stats(&self, account: &str) -> Result<UserStats, GamificationError> {
        let account = require_account(account)?;
        let user = require(&self.store)?.get(&paths::user(account)).await?;
        Ok(UserStats {
            account_id: account.to_string(),
            user: user.as_ref().map(|doc| UserAggregate::from_document(Some(doc))),
            awards: self.ledger(account).await?,
        })
    }
}
