//! `GET /health`: liveness plus a few in-memory counters. Public.

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "threads": state.registry.len(),
        "runs": state.ledger.status_counts(),
        "active_streams": state.cancel_map.len(),
        "rate_limited_clients": state
            .rate_limiter
            .as_ref()
            .map(|l| l.tracked_clients())
            .unwrap_or(0),
        "cached_assistants": state.assistant_cache.len(),
    }))
}
