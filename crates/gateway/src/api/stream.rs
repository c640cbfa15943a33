//! Streaming turns.
//!
//! - `POST /v1/turns/stream`: SSE `delta` events, then `done` or `error`
//! - `POST /v1/threads/:thread_id/stop`: cancel the thread's in-flight stream

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures_util::stream::Stream;
use futures_util::StreamExt;
use serde_json::json;
use tr_domain::error::Result;
use tr_domain::stream::BoxStream;

use super::turns::{forget_if_missing, resolve_turn_thread, TurnRequest};
use crate::runtime::cancel::StreamGuard;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/turns/stream
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn stream_turn(
    State(state): State<AppState>,
    Json(body): Json<TurnRequest>,
) -> Response {
    let personality = match body.validate() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    let thread = match resolve_turn_thread(&state, &body, personality).await {
        Ok(t) => t,
        Err(e) => return e.into_response(),
    };

    // One stream per thread: a new turn supersedes the one in flight.
    if state.cancel_map.is_running(&thread.thread_id) {
        tracing::info!(thread_id = %thread.thread_id, "superseding in-flight stream");
        state.cancel_map.cancel(&thread.thread_id);
    }

    let guard = state.cancel_map.register_guarded(&thread.thread_id);
    let deltas = match state
        .orchestrator
        .stream_turn(&body.user_id, &thread, &body.message, guard.token().clone())
        .await
    {
        Ok(d) => d,
        Err(e) => {
            forget_if_missing(&state, &body, &thread, &e);
            // Report upstream failures as a single SSE error event.
            let stream = futures_util::stream::once(async move {
                Ok::<_, Infallible>(
                    Event::default()
                        .event("error")
                        .data(json!({ "error": e.to_string() }).to_string()),
                )
            });
            return Sse::new(stream)
                .keep_alive(KeepAlive::default())
                .into_response();
        }
    };

    let stream = make_sse_stream(deltas, thread.thread_id, guard);
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// Map deltas to SSE events. `guard` lives inside the stream, so the
/// thread's registration ends even when the client disconnects mid-stream.
fn make_sse_stream(
    mut deltas: BoxStream<'static, Result<String>>,
    thread_id: String,
    guard: StreamGuard,
) -> impl Stream<Item = std::result::Result<Event, Infallible>> {
    async_stream::stream! {
        let mut failed = false;
        while let Some(item) = deltas.next().await {
            match item {
                Ok(text) => {
                    yield Ok(Event::default()
                        .event("delta")
                        .data(json!({ "text": text }).to_string()));
                }
                Err(e) => {
                    failed = true;
                    yield Ok(Event::default()
                        .event("error")
                        .data(json!({ "error": e.to_string() }).to_string()));
                }
            }
        }

        if !failed && !guard.token().is_cancelled() {
            yield Ok(Event::default()
                .event("done")
                .data(json!({ "thread_id": thread_id }).to_string()));
        }
        drop(guard);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/threads/:thread_id/stop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn stop_stream(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> impl IntoResponse {
    let stopped = state.cancel_map.cancel(&thread_id);
    if stopped {
        tracing::info!(thread_id = %thread_id, "stream stop requested");
    }
    Json(json!({ "thread_id": thread_id, "stopped": stopped }))
}
