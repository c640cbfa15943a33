//! `GET /v1/history?user_id&thread_id`: persisted conversation messages.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use super::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub user_id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

pub async fn list_history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if q.user_id.trim().is_empty() {
        return Err(ApiError::validation("user_id is required"));
    }
    let limit = q.limit.clamp(1, 1000);

    let messages = state
        .history
        .store()
        .list(&q.user_id, q.thread_id.as_deref().filter(|t| !t.is_empty()))
        .await?;

    // Most recent `limit` messages, oldest first.
    let total = messages.len();
    let recent = &messages[total.saturating_sub(limit)..];

    Ok(Json(json!({
        "user_id": q.user_id,
        "messages": recent,
        "total": total,
    })))
}
