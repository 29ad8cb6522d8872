// src/handlers/quiz.rs

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        participant::Participant,
        submission::{RankedEntry, Submission, SubmitRequest},
    },
    services::{
        scoring,
        submission::{SubmissionInput, SubmissionService},
    },
};

pub const ACCOUNT_HEADER: &str = "x-account-id";

/// Scores and stores one attempt.
///
/// * `x-account-id` is optional; without it the account is looked up by
///   the participant name.
/// * XP and badges are granted before responding, each call bounded by the
///   secondary timeout; their failures never fail the request.
#[utoipa::path(
    post,
    path = "/api/quizzes/submit",
    request_body = SubmitRequest,
    params(
        ("x-account-id" = Option<String>, Header, description = "Account of the participant, if known.")
    ),
    responses(
        (status = 201, description = "Attempt stored", body = Submission),
        (status = 400, description = "Blank quiz code or name"),
        (status = 404, description = "Unknown quiz code"),
        (status = 500, description = "Internal server error")
    ),
    tag = "quizzes"
)]
pub async fn submit(
    State(submissions): State<SubmissionService>,
    headers: HeaderMap,
    Json(req): Json<SubmitRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let account_id = headers
        .get(ACCOUNT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let input = SubmissionInput {
        quiz_code: req.quiz_code.trim().to_string(),
        participant_name: req.name.trim().to_string(),
        answers: scoring::answers_from_request(&req.answers),
        duration_seconds: req.duration_seconds,
        account_id,
    };

    let submission = submissions
        .submit(input)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Quiz '{}' not found", req.quiz_code.trim())))?;

    Ok((StatusCode::CREATED, Json(submission)))
}

/// Latest attempt per participant, best first.
#[utoipa::path(
    get,
    path = "/api/quizzes/{code}/results",
    params(("code" = String, Path, description = "Quiz code")),
    responses((status = 200, description = "Latest attempts in leaderboard order", body = [Submission])),
    tag = "quizzes"
)]
pub async fn results(
    State(submissions): State<SubmissionService>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let results: Vec<Submission> = submissions.results(&code).await?;
    Ok(Json(results))
}

/// Ranked leaderboard, recomputed from the full history on every call.
#[utoipa::path(
    get,
    path = "/api/quizzes/{code}/leaderboard",
    params(("code" = String, Path, description = "Quiz code")),
    responses((status = 200, description = "Competition-ranked rows", body = [RankedEntry])),
    tag = "quizzes"
)]
pub async fn leaderboard(
    State(submissions): State<SubmissionService>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let rows: Vec<RankedEntry> = submissions.leaderboard(&code).await?;
    Ok(Json(rows))
}

#[utoipa::path(
    get,
    path = "/api/quizzes/{code}/participants",
    params(("code" = String, Path, description = "Quiz code")),
    responses((status = 200, description = "Participants who joined the quiz", body = [Participant])),
    tag = "quizzes"
)]
pub async fn participants(
    State(submissions): State<SubmissionService>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let participants: Vec<Participant> = submissions.participants(&code).await?;
    Ok(Json(participants))
}
