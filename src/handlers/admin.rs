// src/handlers/admin.rs

//! Operator endpoints for the gamification state. There is no
//! authentication in this service; deployments keep `/api/admin` private.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::AppError,
    models::award::UserStats,
    services::{
        aggregate::AggregateRecomputer,
        backfill::{BackfillJob, BackfillReport, BackfillTarget},
        replication::{QuizReplicator, SyncReport},
        resolver::NameResolver,
    },
    state::AppState,
};

/// Liveness, plus whether gamification is running.
#[utoipa::path(
    get,
    path = "/api/admin/ping",
    responses((status = 200, description = "Service is up")),
    tag = "admin"
)]
pub async fn ping(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "secondaryStore": state.store.is_available(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/user-stats/{uid}",
    params(("uid" = String, Path, description = "Account id")),
    responses(
        (status = 200, description = "Aggregate and ledger of the account", body = UserStats),
        (status = 503, description = "Secondary store unavailable")
    ),
    tag = "admin"
)]
pub async fn user_stats(
    State(aggregates): State<AggregateRecomputer>,
    Path(uid): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let stats = aggregates.user_stats(&uid).await?;
    Ok(Json(stats))
}

/// Rebuilds the account's totals from its ledger and returns the result.
#[utoipa::path(
    post,
    path = "/api/admin/recompute/{uid}",
    params(("uid" = String, Path, description = "Account id")),
    responses(
        (status = 200, description = "Recomputed aggregate and ledger", body = UserStats),
        (status = 503, description = "Secondary store unavailable")
    ),
    tag = "admin"
)]
pub async fn recompute(
    State(aggregates): State<AggregateRecomputer>,
    Path(uid): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    aggregates.recompute(&uid).await?;
    let stats = aggregates.user_stats(&uid).await?;
    Ok(Json(stats))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ResolveQuery {
    /// Display name to look up.
    pub name: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAccount {
    pub name: String,
    pub account_id: String,
}

/// Resolves a display name to its account. 404 when zero or several
/// accounts carry the name.
#[utoipa::path(
    get,
    path = "/api/admin/resolve",
    params(ResolveQuery),
    responses(
        (status = 200, description = "Exactly one account matched", body = ResolvedAccount),
        (status = 404, description = "No match or ambiguous name"),
        (status = 503, description = "Secondary store unavailable")
    ),
    tag = "admin"
)]
pub async fn resolve(
    State(resolver): State<NameResolver>,
    Query(query): Query<ResolveQuery>,
) -> Result<impl IntoResponse, AppError> {
    let account_id = resolver.resolve_account_by_name(&query.name).await?;
    Ok(Json(ResolvedAccount {
        name: query.name,
        account_id,
    }))
}

/// Optional body of `POST /api/admin/backfill-awards`.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackfillRequest {
    pub quiz_code: Option<String>,
}

/// Grants rank awards for every quiz. A POST body may narrow the run to
/// one quiz with `{"quizCode": "..."}`.
#[utoipa::path(
    post,
    path = "/api/admin/backfill-awards",
    request_body(content = Option<BackfillRequest>, description = "Optional quiz filter"),
    responses(
        (status = 200, description = "Processed, skipped and failed entries", body = BackfillReport),
        (status = 400, description = "Malformed body"),
        (status = 503, description = "Secondary store unavailable")
    ),
    tag = "admin"
)]
pub async fn backfill_awards(
    State(job): State<BackfillJob>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let request: BackfillRequest = if body.iter().all(u8::is_ascii_whitespace) {
        BackfillRequest::default()
    } else {
        serde_json::from_slice(&body)?
    };
    let target = BackfillTarget::from_code(request.quiz_code.as_deref());
    tracing::info!("Backfill requested: {:?}", target);

    let report = job.run(&target).await?;
    Ok(Json(report))
}

#[utoipa::path(
    get,
    path = "/api/admin/backfill-awards/{code}",
    params(("code" = String, Path, description = "Quiz code")),
    responses(
        (status = 200, description = "Processed, skipped and failed entries", body = BackfillReport),
        (status = 503, description = "Secondary store unavailable")
    ),
    tag = "admin"
)]
pub async fn backfill_quiz_awards(
    State(job): State<BackfillJob>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let report = job.run(&BackfillTarget::from_code(Some(&code))).await?;
    Ok(Json(report))
}

/// Copies quiz metadata from the document store into the relational table.
#[utoipa::path(
    post,
    path = "/api/admin/sync-quizzes",
    responses(
        (status = 200, description = "Synced and failed quiz codes", body = SyncReport),
        (status = 503, description = "Secondary store unavailable")
    ),
    tag = "admin"
)]
pub async fn sync_quizzes(
    State(replicator): State<QuizReplicator>,
) -> Result<impl IntoResponse, AppError> {
    let report = replicator.sync_all().await?;
    Ok(Json(report))
}
