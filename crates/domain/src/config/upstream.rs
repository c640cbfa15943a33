use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Upstream assistants service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Connection settings for the thread + run conversational service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Per-request HTTP timeout. Applies to every non-streaming call.
    #[serde(default = "d_60000")]
    pub timeout_ms: u64,
    /// Value of the `OpenAI-Beta` header. Empty disables the header.
    #[serde(default = "d_beta")]
    pub beta_header: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            auth: AuthConfig::default(),
            timeout_ms: 60_000,
            beta_header: d_beta(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Header name (e.g. "Authorization", "api-key").
    #[serde(default)]
    pub header: Option<String>,
    /// Header value prefix (e.g. "Bearer ").
    #[serde(default)]
    pub prefix: Option<String>,
    /// Env var containing the key.
    #[serde(default = "d_key_env")]
    pub env: Option<String>,
    /// Direct key (for config-only setups; prefer env).
    #[serde(default)]
    pub key: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            header: None,
            prefix: None,
            env: d_key_env(),
            key: None,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn d_60000() -> u64 {
    60_000
}
fn d_beta() -> String {
    "assistants=v2".into()
}
fn d_key_env() -> Option<String> {
    Some("OPENAI_API_KEY".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_openai() {
        let cfg = UpstreamConfig::default();
        assert_eq!(cfg.base_url, "https://api.openai.com/v1");
        assert_eq!(cfg.auth.env.as_deref(), Some("OPENAI_API_KEY"));
        assert_eq!(cfg.beta_header, "assistants=v2");
    }

    #[test]
    fn auth_key_overrides_parse() {
        let cfg: UpstreamConfig = toml::from_str(
            r#"
            base_url = "http://localhost:9999/v1"
            [auth]
            key = "sk-test"
            header = "api-key"
            prefix = ""
            "#,
        )
        .unwrap();
        assert_eq!(cfg.auth.key.as_deref(), Some("sk-test"));
        assert_eq!(cfg.auth.header.as_deref(), Some("api-key"));
        assert_eq!(cfg.auth.env.as_deref(), Some("OPENAI_API_KEY"));
    }
}
