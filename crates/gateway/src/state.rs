use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tr_assistants::AssistantsApi;
use tr_domain::config::Config;
use tr_sessions::{HistoryStore, HistoryWriter, ThreadRegistry};

use crate::runtime::cache::TtlCache;
use crate::runtime::cancel::CancelMap;
use crate::runtime::orchestrator::RunOrchestrator;
use crate::runtime::rate_limit::RateLimiter;
use crate::runtime::runs::RunLedger;

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core services**: config, upstream client
/// - **Conversation**: thread registry, history, orchestrator, run ledger
/// - **Limits & caching**: request limiter, assistant metadata cache
/// - **Security**: API token hash
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub upstream: Arc<dyn AssistantsApi>,

    // ── Conversation ──────────────────────────────────────────────────
    pub registry: Arc<ThreadRegistry>,
    pub history: HistoryWriter,
    pub orchestrator: Arc<RunOrchestrator>,
    pub ledger: Arc<RunLedger>,
    /// In-flight streams keyed by thread id.
    pub cancel_map: Arc<CancelMap>,

    // ── Limits & caching ──────────────────────────────────────────────
    /// `None` when `server.rate_limit.enabled = false`.
    pub rate_limiter: Option<Arc<RateLimiter>>,
    /// Assistant metadata keyed by assistant id.
    pub assistant_cache: Arc<TtlCache<String, Value>>,

    // ── Security (startup-computed) ───────────────────────────────────
    /// SHA-256 hash of the API bearer token (read once at startup).
    /// `None` = dev mode (no auth enforced).
    pub api_token_hash: Option<Vec<u8>>,

    pub started_at: Instant,
}

impl AppState {
    /// Wire every component from config around the given upstream client
    /// and history store. Auth is disabled until a token hash is set.
    pub fn new(
        config: Arc<Config>,
        upstream: Arc<dyn AssistantsApi>,
        store: Arc<dyn HistoryStore>,
    ) -> Self {
        let history = HistoryWriter::new(store);
        let ledger = Arc::new(RunLedger::new(config.orchestrator.ledger_capacity));
        let orchestrator = Arc::new(RunOrchestrator::from_config(
            upstream.clone(),
            history.clone(),
            ledger.clone(),
            &config.orchestrator,
        ));
        let registry = Arc::new(ThreadRegistry::new(config.personalities.clone()));
        let rate_limiter = config
            .server
            .rate_limit
            .enabled
            .then(|| Arc::new(RateLimiter::from_config(&config.server.rate_limit)));
        let assistant_cache = Arc::new(TtlCache::new(
            Duration::from_secs(config.cache.default_ttl_secs),
            config.cache.max_size,
        ));

        Self {
            config,
            upstream,
            registry,
            history,
            orchestrator,
            ledger,
            cancel_map: Arc::new(CancelMap::new()),
            rate_limiter,
            assistant_cache,
            api_token_hash: None,
            started_at: Instant::now(),
        }
    }

    /// Require `Authorization: Bearer <token>` on protected routes.
    pub fn with_api_token(mut self, token: &str) -> Self {
        self.api_token_hash = Some(crate::api::auth::hash_token(token));
        self
    }
}
