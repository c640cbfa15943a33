//! Fixed-window request limiter keyed by client.
//!
//! A client may make `max_requests` calls per window. The window starts at
//! the client's first call and restarts on the first call after it has
//! elapsed. Rejected calls neither count nor move the window.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;
use tr_domain::config::RateLimitConfig;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

pub struct RateLimiter {
    windows: Mutex<HashMap<String, Window>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_requests,
            window,
        }
    }

    pub fn from_config(cfg: &RateLimitConfig) -> Self {
        Self::new(cfg.max_requests, Duration::from_secs(cfg.window_secs))
    }

    pub fn allow(&self, client_id: &str) -> bool {
        self.allow_at(client_id, Instant::now())
    }

    /// [`allow`](Self::allow) against an explicit clock reading.
    pub fn allow_at(&self, client_id: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock();
        match windows.get_mut(client_id) {
            None => {
                windows.insert(client_id.to_owned(), Window { count: 1, started: now });
                true
            }
            Some(w) if now.saturating_duration_since(w.started) > self.window => {
                *w = Window { count: 1, started: now };
                true
            }
            Some(w) if w.count < self.max_requests => {
                w.count += 1;
                true
            }
            Some(_) => false,
        }
    }

    /// Drop windows that have fully elapsed. Returns how many were removed.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, w| now.saturating_duration_since(w.started) <= self.window);
        before - windows.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.lock().len()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Middleware
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Client key for a request: peer IP, then the first `x-forwarded-for`
/// hop, then `"unknown"`.
pub fn client_key(req: &Request<Body>) -> String {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| "unknown".into())
}

/// Axum middleware rejecting over-limit clients with 429.
/// Attach via `axum::middleware::from_fn_with_state(limiter, limit_requests)`.
pub async fn limit_requests(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let client = client_key(&req);
    if !limiter.allow(&client) {
        tracing::debug!(client = %client, "rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            axum::Json(serde_json::json!({ "error": "rate limit exceeded" })),
        )
            .into_response();
    }
    next.run(req).await
}
