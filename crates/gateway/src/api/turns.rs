//! Turn submission.
//!
//! - `POST /v1/turns`: append the user's message and start a run. Returns
//!   as soon as the run exists (or the create-run deadline passes). With
//!   `wait_ms` the handler keeps polling until the run settles or the wait
//!   budget is spent.

use std::time::Duration;

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tr_domain::chat::{Personality, RunState, ThreadHandle};
use tr_domain::error::Error;

use super::error::ApiError;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request shape
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub user_id: String,
    pub personality: String,
    pub message: String,
    /// Continue in this thread instead of the user's stored one.
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Keep polling for up to this long before answering
    /// (capped by `orchestrator.max_wait_ms`).
    #[serde(default)]
    pub wait_ms: Option<u64>,
}

impl TurnRequest {
    pub fn validate(&self) -> Result<Personality, ApiError> {
        if self.user_id.trim().is_empty() {
            return Err(ApiError::validation("user_id is required"));
        }
        if self.message.trim().is_empty() {
            return Err(ApiError::validation("message is required"));
        }
        Personality::parse(&self.personality).ok_or_else(|| {
            ApiError::validation(format!("unknown personality '{}'", self.personality))
        })
    }
}

/// Find (or create) the thread this turn belongs to.
pub async fn resolve_turn_thread(
    state: &AppState,
    body: &TurnRequest,
    personality: Personality,
) -> Result<ThreadHandle, ApiError> {
    let upstream = state.upstream.clone();
    let handle = state
        .registry
        .resolve_thread(
            &body.user_id,
            personality,
            body.thread_id.as_deref(),
            move || async move { upstream.create_thread().await },
        )
        .await?;
    Ok(handle)
}

/// Drop the user's stored thread when upstream no longer knows it, so the
/// next turn starts a fresh one. Explicit thread ids are never stored.
pub fn forget_if_missing(
    state: &AppState,
    body: &TurnRequest,
    thread: &ThreadHandle,
    err: &Error,
) {
    let missing = matches!(err, Error::Upstream { status: 404, .. });
    if !missing || body.thread_id.is_some() {
        return;
    }
    let stored = state.registry.get(&body.user_id);
    if stored.is_some_and(|h| h.thread_id == thread.thread_id) {
        state.registry.forget(&body.user_id);
        tracing::warn!(
            user_id = %body.user_id,
            thread_id = %thread.thread_id,
            "upstream lost the stored thread, forgetting it"
        );
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/turns
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn submit_turn(
    State(state): State<AppState>,
    Json(body): Json<TurnRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let personality = body.validate()?;
    let thread = resolve_turn_thread(&state, &body, personality).await?;

    let handle = match state
        .orchestrator
        .submit_turn(&body.user_id, &thread, &body.message)
        .await
    {
        Ok(h) => h,
        Err(e) => {
            forget_if_missing(&state, &body, &thread, &e);
            return Err(e.into());
        }
    };

    let wait = body
        .wait_ms
        .unwrap_or(0)
        .min(state.config.orchestrator.max_wait_ms);
    if wait == 0 {
        return Ok(Json(processing(&handle.thread_id, &handle.run_id)));
    }

    let (run_id, result) = state
        .orchestrator
        .wait_for_run(
            &body.user_id,
            handle.clone(),
            Duration::from_millis(wait),
            Duration::from_millis(state.config.orchestrator.poll_interval_ms),
        )
        .await?;

    let body = match result.state {
        RunState::Completed => json!({
            "status": "completed",
            "thread_id": handle.thread_id,
            "run_id": run_id,
            "content": result.content.unwrap_or_default(),
        }),
        RunState::Failed => json!({
            "status": "failed",
            "thread_id": handle.thread_id,
            "run_id": run_id,
            "error": result.error.unwrap_or_default(),
        }),
        _ => processing(&handle.thread_id, &run_id),
    };
    Ok(Json(body))
}

fn processing(thread_id: &str, run_id: &str) -> Value {
    json!({ "status": "processing", "thread_id": thread_id, "run_id": run_id })
}
