//! AppState construction and background-task spawning extracted from `main.rs`.
//!
//! `serve` and `ask` share [`build_app_state`] so both run the same wiring;
//! only `serve` starts the background sweeper.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use tr_assistants::OpenAiAssistants;
use tr_domain::config::{Config, ConfigSeverity, HistoryBackend};
use tr_sessions::{HistoryStore, InMemoryHistoryStore, JsonlHistoryStore};

use crate::state::AppState;

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`].
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Upstream client ──────────────────────────────────────────────
    let upstream = Arc::new(
        OpenAiAssistants::from_config(&config.upstream)
            .context("initializing upstream assistants client")?,
    );
    tracing::info!(base_url = %config.upstream.base_url, "upstream client ready");

    // ── History store ────────────────────────────────────────────────
    let store: Arc<dyn HistoryStore> = match config.history.backend {
        HistoryBackend::Jsonl => {
            let store = JsonlHistoryStore::new(&config.history.state_path)
                .context("initializing JSONL history store")?;
            tracing::info!(path = %store.base_dir().display(), "JSONL history store ready");
            Arc::new(store)
        }
        HistoryBackend::Memory => {
            tracing::info!("in-memory history store ready (not persisted)");
            Arc::new(InMemoryHistoryStore::new())
        }
    };

    let mut state = AppState::new(config.clone(), upstream, store);
    tracing::info!(
        deadline_ms = state.orchestrator.deadline().as_millis() as u64,
        ledger_capacity = config.orchestrator.ledger_capacity,
        "run orchestrator ready"
    );
    if state.rate_limiter.is_some() {
        tracing::info!(
            max_requests = config.server.rate_limit.max_requests,
            window_secs = config.server.rate_limit.window_secs,
            "per-client rate limiting enabled"
        );
    } else {
        tracing::info!("per-client rate limiting disabled");
    }

    // ── API token (read once, hash for constant-time comparison) ────
    // Priority: config.server.api_token > env var (config.server.api_token_env)
    let env_var = &config.server.api_token_env;
    let token = config
        .server
        .api_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(|t| ("config".to_string(), t.to_string()))
        .or_else(|| {
            std::env::var(env_var)
                .ok()
                .filter(|t| !t.is_empty())
                .map(|t| (format!("env:{env_var}"), t))
        });
    match token {
        Some((source, t)) => {
            tracing::info!(source = %source, "API bearer-token auth enabled");
            state = state.with_api_token(&t);
        }
        None => {
            tracing::warn!(
                "API bearer-token auth DISABLED, set server.api_token in config.toml \
                 or {env_var} env var"
            );
        }
    }

    Ok(state)
}

/// Spawn the long-running background sweeper: expired cache entries,
/// stale rate-limit windows and idle per-user locks.
///
/// Call this **after** [`build_app_state`] when running the HTTP server.
pub fn spawn_background_tasks(state: &AppState) {
    let every = state.config.cache.sweep_interval_secs;
    if every == 0 {
        tracing::info!("background sweeper disabled");
        return;
    }

    let cache = state.assistant_cache.clone();
    let limiter = state.rate_limiter.clone();
    let registry = state.registry.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(every));
        loop {
            interval.tick().await;
            let expired = cache.purge_expired();
            let windows = limiter.as_ref().map(|l| l.prune_expired()).unwrap_or(0);
            registry.prune_idle_locks();
            if expired + windows > 0 {
                tracing::debug!(expired, windows, "sweeper pass");
            }
        }
    });
    tracing::info!(interval_secs = every, "background tasks spawned");
}
