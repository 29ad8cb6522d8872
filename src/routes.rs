// src/routes.rs

use axum::{
    Json, Router,
    http::{HeaderName, HeaderValue, Method},
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;

use crate::{
    handlers::{admin, quiz},
    models::{
        award::{AwardLedgerEntry, AwardRecord, UserAggregate, UserStats},
        participant::Participant,
        submission::{AnswerDto, RankedEntry, Submission, SubmitRequest},
    },
    services::{
        backfill::{BackfillFailure, BackfillReport, ProcessedAward, SkippedEntry},
        replication::{SyncFailure, SyncReport},
    },
    state::AppState,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        quiz::submit,
        quiz::results,
        quiz::leaderboard,
        quiz::participants,
        admin::ping,
        admin::user_stats,
        admin::recompute,
        admin::resolve,
        admin::backfill_awards,
        admin::backfill_quiz_awards,
        admin::sync_quizzes,
    ),
    components(schemas(
        SubmitRequest,
        AnswerDto,
        Submission,
        RankedEntry,
        Participant,
        UserStats,
        UserAggregate,
        AwardRecord,
        AwardLedgerEntry,
        admin::ResolvedAccount,
        admin::BackfillRequest,
        BackfillReport,
        ProcessedAward,
        SkippedEntry,
        BackfillFailure,
        SyncReport,
        SyncFailure,
    )),
    tags(
        (name = "quizzes", description = "Submissions, results and leaderboards"),
        (name = "admin", description = "XP ledger inspection and repair")
    )
)]
pub struct ApiDoc;

/// Assembles the main application router.
///
/// * Merges the quiz and admin sub-routers.
/// * Serves the OpenAPI document at `/api-docs/openapi.json`.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            HeaderName::from_static(quiz::ACCOUNT_HEADER),
        ]);

    let quiz_routes = Router::new()
        .route("/submit", post(quiz::submit))
        .route("/{code}/results", get(quiz::results))
        .route("/{code}/leaderboard", get(quiz::leaderboard))
        .route("/{code}/participants", get(quiz::participants));

    let admin_routes = Router::new()
        .route("/ping", get(admin::ping))
        .route("/user-stats/{uid}", get(admin::user_stats))
        .route("/recompute/{uid}", post(admin::recompute))
        .route("/resolve", get(admin::resolve))
        .route(
            "/backfill-awards",
            get(admin::backfill_awards).post(admin::backfill_awards),
        )
        .route("/backfill-awards/{code}", get(admin::backfill_quiz_awards))
        .route("/sync-quizzes", post(admin::sync_quizzes));

    Router::new()
        .nest("/api/quizzes", quiz_routes)
        .nest("/api/admin", admin_routes)
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
