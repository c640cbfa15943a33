use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_3210")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Environment variable holding the API bearer token for protected endpoints.
    /// If the env var is set and non-empty, all API endpoints (except `/health`)
    /// require `Authorization: Bearer <token>`.
    /// If unset, the server logs a warning and allows unauthenticated access.
    #[serde(default = "d_api_token_env")]
    pub api_token_env: String,
    /// Bearer token set directly in config. Takes precedence over the env var.
    #[serde(default)]
    pub api_token: Option<String>,
    /// Per-client fixed-window limit applied to the turn endpoints.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Global in-flight request cap (backpressure).
    #[serde(default = "d_256")]
    pub max_concurrent_requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3210,
            host: "127.0.0.1".into(),
            cors: CorsConfig::default(),
            api_token_env: d_api_token_env(),
            api_token: None,
            rate_limit: RateLimitConfig::default(),
            max_concurrent_requests: 256,
        }
    }
}

/// Fixed-window request counter per client address.
///
/// A client may send `max_requests` requests per `window_secs`; the window
/// restarts on the first request after it has elapsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default = "d_20")]
    pub max_requests: u32,
    #[serde(default = "d_60")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 20,
            window_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed for CORS. Use `["*"]` for permissive (NOT recommended).
    /// Defaults to localhost-only.
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: d_cors_origins(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_3210() -> u16 {
    3210
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:*".into(),
        "http://127.0.0.1:*".into(),
    ]
}
fn d_api_token_env() -> String {
    "TR_API_TOKEN".into()
}
fn d_256() -> usize {
    256
}
fn d_true() -> bool {
    true
}
fn d_20() -> u32 {
    20
}
fn d_60() -> u64 {
    60
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_default_limits_turns() {
        let cfg = ServerConfig::default();
        assert!(cfg.rate_limit.enabled);
        assert_eq!(cfg.rate_limit.max_requests, 20);
        assert_eq!(cfg.rate_limit.window_secs, 60);
    }

    #[test]
    fn server_config_parses_custom_rate_limit() {
        let toml_str = r#"
            port = 3210
            host = "127.0.0.1"

            [rate_limit]
            max_requests = 3
            window_secs = 1
        "#;
        let cfg: ServerConfig = toml::from_str(toml_str).unwrap();
        assert!(cfg.rate_limit.enabled);
        assert_eq!(cfg.rate_limit.max_requests, 3);
        assert_eq!(cfg.rate_limit.window_secs, 1);
    }

    #[test]
    fn server_config_empty_toml_uses_all_defaults() {
        let cfg: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.port, 3210);
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.api_token_env, "TR_API_TOKEN");
        assert!(cfg.api_token.is_none());
        assert_eq!(cfg.max_concurrent_requests, 256);
    }

    #[test]
    fn rate_limit_can_be_disabled() {
        let cfg: ServerConfig = toml::from_str("[rate_limit]\nenabled = false").unwrap();
        assert!(!cfg.rate_limit.enabled);
        assert_eq!(cfg.rate_limit.max_requests, 20);
    }
}
