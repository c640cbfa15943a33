mod cache;
mod history;
mod orchestrator;
mod personalities;
mod server;
mod telemetry;
mod upstream;

pub use cache::*;
pub use history::*;
pub use orchestrator::*;
pub use personalities::*;
pub use server::*;
pub use telemetry::*;
pub use upstream::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub personalities: PersonalityTable,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut push = |severity, field: &str, message: &str| {
            errors.push(ConfigError {
                severity,
                field: field.into(),
                message: message.into(),
            });
        };

        if self.server.port == 0 {
            push(ConfigSeverity::Error, "server.port", "port must be greater than 0");
        }
        if self.server.host.is_empty() {
            push(ConfigSeverity::Error, "server.host", "host must not be empty");
        }
        if self.server.rate_limit.enabled {
            if self.server.rate_limit.max_requests == 0 {
                push(
                    ConfigSeverity::Error,
                    "server.rate_limit.max_requests",
                    "max_requests must be greater than 0 when rate limiting is enabled",
                );
            }
            if self.server.rate_limit.window_secs == 0 {
                push(
                    ConfigSeverity::Error,
                    "server.rate_limit.window_secs",
                    "window_secs must be greater than 0 when rate limiting is enabled",
                );
            }
        }
        if self.upstream.base_url.is_empty() {
            push(ConfigSeverity::Error, "upstream.base_url", "base_url must not be empty");
        }
        if self.orchestrator.run_create_deadline_ms == 0 {
            push(
                ConfigSeverity::Error,
                "orchestrator.run_create_deadline_ms",
                "deadline must be greater than 0",
            );
        }
        if self.orchestrator.run_create_deadline_ms >= self.upstream.timeout_ms {
            push(
                ConfigSeverity::Warning,
                "orchestrator.run_create_deadline_ms",
                "deadline is not shorter than upstream.timeout_ms; runs will never detach",
            );
        }
        if self.orchestrator.poll_interval_ms == 0 {
            push(
                ConfigSeverity::Error,
                "orchestrator.poll_interval_ms",
                "poll interval must be greater than 0",
            );
        }
        if self.cache.max_size == 0 {
            push(ConfigSeverity::Error, "cache.max_size", "max_size must be greater than 0");
        }

        for personality in crate::chat::Personality::ALL {
            let field = format!("personalities.{personality}.assistant_id");
            if self.personalities.assistant_id(personality).is_err() {
                push(
                    ConfigSeverity::Warning,
                    &field,
                    "no assistant configured; turns for this personality will fail",
                );
            }
        }

        if !(0.0..=1.0).contains(&self.telemetry.sample_rate) {
            push(
                ConfigSeverity::Error,
                "telemetry.sample_rate",
                "sample_rate must be between 0.0 and 1.0",
            );
        }
        if let Some(endpoint) = &self.telemetry.otlp_endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                push(
                    ConfigSeverity::Warning,
                    "telemetry.otlp_endpoint",
                    "endpoint has no http(s) scheme; the exporter will likely fail to connect",
                );
            }
        }

        if self.server.cors.allowed_origins.len() == 1
            && self.server.cors.allowed_origins[0] == "*"
        {
            push(
                ConfigSeverity::Warning,
                "server.cors.allowed_origins",
                "wildcard \"*\" allows all origins (not recommended for production)",
            );
        }

        errors
    }
}
