//! `GET /v1/assistants/:personality?refresh=bool`: upstream assistant
//! metadata for a persona, served from the TTL cache.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use tr_domain::chat::Personality;

use super::error::ApiError;
use crate::runtime::cache::CacheOptions;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct AssistantQuery {
    /// Skip the cache and refetch (the fresh value is cached).
    #[serde(default)]
    pub refresh: bool,
}

pub async fn get_assistant(
    State(state): State<AppState>,
    Path(personality): Path<String>,
    Query(q): Query<AssistantQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let personality = Personality::parse(&personality)
        .ok_or_else(|| ApiError::validation(format!("unknown personality '{personality}'")))?;
    let assistant_id = state.config.personalities.assistant_id(personality)?;

    let upstream = state.upstream.clone();
    let fetch_id = assistant_id.clone();
    let metadata = state
        .assistant_cache
        .cached_fetch(
            assistant_id,
            move || async move { upstream.retrieve_assistant(&fetch_id).await },
            CacheOptions {
                bypass: q.refresh,
                ..Default::default()
            },
        )
        .await?;

    Ok(Json(metadata))
}
