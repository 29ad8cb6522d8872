// src/models/participant.rs

use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

/// Represents the 'participants' table. Rows are written by the join flow,
/// this service only reads them.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: i64,
    pub name: String,
    pub joined_at: chrono::DateTime<chrono::Utc>,
}
