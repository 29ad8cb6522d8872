// src/services/mod.rs

pub mod aggregate;
pub mod backfill;
pub mod leaderboard;
pub mod ledger;
pub mod ranking;
pub mod replication;
pub mod resolver;
pub mod scoring;
pub mod submission;

use crate::{
    repository::RepositoryError,
    store::{DocumentStore, SecondaryStore, StoreError},
};

/// Failure of a gamification call. Callers decide per variant whether to
/// log, skip or fall back; none of them is fatal to a request.
#[derive(Debug, thiserror::Error)]
pub enum GamificationError {
    /// The secondary store was not configured or could not be reached at startup.
    #[error("secondary store is not available")]
    StoreUnavailable,

    /// A display name matched zero or several accounts.
    #[error("display name '{name}' matched {matches} accounts")]
    AmbiguousIdentity { name: String, matches: usize },

    /// The award transaction and its best-effort fallback both failed.
    #[error("award could not be recorded: {0}")]
    TransactionConflict(String),

    /// A transaction was used against its read-then-write contract.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("account id must not be blank")]
    InvalidAccount,

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The relational side failed while a gamification job was reading it.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub(crate) fn require(store: &SecondaryStore) -> Result<&dyn DocumentStore, GamificationError> {
    store.handle().ok_or(GamificationError::StoreUnavailable)
}

pub(crate) fn require_account(account: &str) -> Result<&str, GamificationError> {
    let account = account.trim();
    if account.is_empty() {
        return Err(GamificationError::InvalidAccount);
    }
    Ok(account)
}
