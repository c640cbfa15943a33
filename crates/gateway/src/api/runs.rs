//! Run status endpoints.
//!
//! - `GET /v1/runs/status`: one upstream status check for a run
//! - `GET /v1/runs/:id`: the relay's own record of a run

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use tr_domain::chat::{is_placeholder_run_id, RunState};
use tr_domain::error::Error;

use super::error::ApiError;
use crate::runtime::runs::PlaceholderResolution;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/runs/status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct RunStatusQuery {
    pub thread_id: String,
    pub run_id: String,
    /// Caller polling the run. A completed reply is recorded under the
    /// run's owner from the ledger; this id is used only for unknown runs.
    #[serde(default)]
    pub user_id: String,
}

pub async fn run_status(
    State(state): State<AppState>,
    Query(q): Query<RunStatusQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if q.thread_id.is_empty() || q.run_id.is_empty() || q.user_id.trim().is_empty() {
        return Err(ApiError::validation(
            "thread_id, run_id and user_id are required",
        ));
    }

    let mut run_id = q.run_id.clone();
    if is_placeholder_run_id(&run_id) {
        match state.orchestrator.resolve_placeholder(&run_id) {
            PlaceholderResolution::Pending => {
                return Ok(Json(json!({ "status": "processing", "run_id": run_id })));
            }
            PlaceholderResolution::Failed(error) => {
                return Ok(Json(json!({ "status": "failed", "error": error, "run_id": run_id })));
            }
            PlaceholderResolution::Unknown => {
                return Err(Error::InvalidRun(format!("unknown placeholder run {run_id}")).into());
            }
            PlaceholderResolution::Resolved(real) => run_id = real,
        }
    }

    let result = state
        .orchestrator
        .poll_run(&q.user_id, &q.thread_id, &run_id)
        .await?;

    let mut body = json!({
        "status": result.state.caller_status(),
        "run_id": run_id,
    });
    match result.state {
        RunState::Completed => body["content"] = json!(result.content.unwrap_or_default()),
        RunState::Failed => body["error"] = json!(result.error.unwrap_or_default()),
        _ => {}
    }
    Ok(Json(body))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/runs/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .ledger
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("run not found".into()))
}
