//! `GET /v1/personalities`: the persona table callers can choose from.

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

pub async fn list_personalities(State(state): State<AppState>) -> impl IntoResponse {
    let items: Vec<serde_json::Value> = state
        .registry
        .personalities()
        .iter()
        .map(|(personality, profile)| {
            json!({
                "personality": personality,
                "display_name": profile.display_name,
                "sample_prompts": profile.sample_prompts,
                "configured": !profile.assistant_id.is_empty(),
            })
        })
        .collect();
    Json(json!({ "personalities": items }))
}
