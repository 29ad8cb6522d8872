// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    config::Config,
    repository::QuizRepository,
    services::{
        aggregate::AggregateRecomputer, backfill::BackfillJob, leaderboard::LeaderboardMirror,
        ledger::AwardLedger, replication::QuizReplicator, resolver::NameResolver,
        submission::SubmissionService,
    },
    store::SecondaryStore,
};

/// Shared handler state. Every service is wired once here from the two
/// stores; the secondary store's availability is fixed at construction.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: SecondaryStore,
    pub submissions: SubmissionService,
    pub aggregates: AggregateRecomputer,
    pub resolver: NameResolver,
    pub backfill: BackfillJob,
    pub replicator: QuizReplicator,
}

impl AppState {
    pub fn new(config: Config, repo: Arc<dyn QuizRepository>, store: SecondaryStore) -> Self {
        let mirror = LeaderboardMirror::new(store.clone(), config.legacy_realtime_push);
        let resolver = NameResolver::new(store.clone());
        let ledger = AwardLedger::new(store.clone(), config.award_max_attempts);
        let aggregates = AggregateRecomputer::new(store.clone());

        Self {
            submissions: SubmissionService::new(
                repo.clone(),
                mirror.clone(),
                resolver.clone(),
                ledger.clone(),
                aggregates.clone(),
                config.secondary_timeout,
            ),
            backfill: BackfillJob::new(
                repo.clone(),
                mirror,
                resolver.clone(),
                ledger,
                config.backfill_concurrency,
            ),
            replicator: QuizReplicator::new(store.clone(), repo),
            aggregates,
            resolver,
            store,
            config,
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for SubmissionService {
    fn from_ref(state: &AppState) -> Self {
        state.submissions.clone()
    }
}

impl FromRef<AppState> for AggregateRecomputer {
    fn from_ref(state: &AppState) -> Self {
        state.aggregates.clone()
    }
}

impl FromRef<AppState> for NameResolver {
    fn from_ref(state: &AppState) -> Self {
        state.resolver.clone()
    }
}

impl FromRef<AppState> for BackfillJob {
    fn from_ref(state: &AppState) -> Self {
        state.backfill.clone()
    }
}

impl FromRef<AppState> for QuizReplicator {
    fn from_ref(state: &AppState) -> Self {
        state.replicator.clone()
    }
}
