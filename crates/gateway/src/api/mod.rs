pub mod assistants;
pub mod auth;
pub mod error;
pub mod health;
pub mod history;
pub mod personalities;
pub mod runs;
pub mod stream;
pub mod turns;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::runtime::rate_limit;
use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (no auth required) and **protected**
/// (gated behind the `TR_API_TOKEN` bearer-token middleware). The turn
/// routes are additionally rate limited per client when enabled.
///
/// `state` is needed to wire up the middleware at build time.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/health", get(health::health));

    let mut turns = Router::new()
        .route("/v1/turns", post(turns::submit_turn))
        .route("/v1/turns/stream", post(stream::stream_turn));
    if let Some(limiter) = state.rate_limiter.clone() {
        turns = turns.route_layer(middleware::from_fn_with_state(
            limiter,
            rate_limit::limit_requests,
        ));
    }

    let protected = Router::new()
        // Runs
        .route("/v1/runs/status", get(runs::run_status))
        .route("/v1/runs/:id", get(runs::get_run))
        // Streams
        .route("/v1/threads/:thread_id/stop", post(stream::stop_stream))
        // History
        .route("/v1/history", get(history::list_history))
        // Personas
        .route("/v1/personalities", get(personalities::list_personalities))
        .route("/v1/assistants/:personality", get(assistants::get_assistant))
        .merge(turns)
        // Apply API auth middleware to all protected routes.
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public.merge(protected)
}
