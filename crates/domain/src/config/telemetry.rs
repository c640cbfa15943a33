use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Gateway telemetry: log output and optional span export
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Shape of the `serve` log lines on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event; what the turn trace events are built for.
    Json,
    /// Human-readable single-line output for local runs.
    Compact,
}

/// `[telemetry]`: how `threadrelay serve` reports turns, runs and cache hits.
///
/// `RUST_LOG` still overrides `log_filter` when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "d_log_filter")]
    pub log_filter: String,
    #[serde(default = "d_log_format")]
    pub log_format: LogFormat,
    /// OTLP/gRPC collector. Spans are only exported when this is set.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
    #[serde(default = "d_service_name")]
    pub service_name: String,
    /// Fraction of turns whose spans are exported, `0.0..=1.0`.
    #[serde(default = "d_sample_rate")]
    pub sample_rate: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: d_log_filter(),
            log_format: d_log_format(),
            otlp_endpoint: None,
            service_name: d_service_name(),
            sample_rate: d_sample_rate(),
        }
    }
}

impl TelemetryConfig {
    /// Whether an OTLP exporter should be started.
    pub fn exports_spans(&self) -> bool {
        self.otlp_endpoint.as_deref().is_some_and(|e| !e.trim().is_empty())
            && self.sample_rate > 0.0
    }
}

fn d_log_filter() -> String {
    "info,tr_gateway=debug".into()
}
fn d_log_format() -> LogFormat {
    LogFormat::Json
}
fn d_service_name() -> String {
    "threadrelay".into()
}
fn d_sample_rate() -> f64 {
    1.0
}
