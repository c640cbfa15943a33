use tr_domain::chat::Personality;
use tr_domain::config::{Config, ConfigSeverity, HistoryBackend, LogFormat};

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
}

#[test]
fn explicit_zero_host_parses() {
    let toml_str = r#"
[server]
host = "0.0.0.0"
port = 3210
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
}

#[test]
fn default_cors_allows_only_localhost() {
    let config = Config::default();
    assert!(config.server.cors.allowed_origins.contains(&"http://localhost:*".to_string()));
    assert!(config.server.cors.allowed_origins.contains(&"http://127.0.0.1:*".to_string()));
}

#[test]
fn cors_config_parses_custom_origins() {
    let toml_str = r#"
[server.cors]
allowed_origins = ["https://myapp.com", "http://localhost:3000"]
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.cors.allowed_origins.len(), 2);
    assert!(config.server.cors.allowed_origins.contains(&"https://myapp.com".to_string()));
}

#[test]
fn orchestrator_defaults() {
    let config = Config::default();
    assert_eq!(config.orchestrator.run_create_deadline_ms, 4_000);
    assert_eq!(config.orchestrator.poll_interval_ms, 1_000);
    assert_eq!(config.cache.default_ttl_secs, 300);
    assert_eq!(config.cache.max_size, 100);
    assert_eq!(config.history.backend, HistoryBackend::Jsonl);
}

#[test]
fn full_config_parses() {
    let toml_str = r#"
[server]
port = 8080

[server.rate_limit]
max_requests = 5
window_secs = 10

[upstream]
base_url = "http://localhost:9000/v1"

[orchestrator]
run_create_deadline_ms = 1500

[history]
backend = "memory"

[personalities.mentor]
assistant_id = "asst_m"

[personalities.companion]
assistant_id = "asst_c"
display_name = "Buddy"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.server.rate_limit.max_requests, 5);
    assert_eq!(config.orchestrator.run_create_deadline_ms, 1500);
    assert_eq!(config.orchestrator.max_wait_ms, 25_000);
    assert_eq!(config.history.backend, HistoryBackend::Memory);
    assert_eq!(
        config.personalities.assistant_id(Personality::Companion).unwrap(),
        "asst_c"
    );
    assert!(config.validate().is_empty(), "{:?}", config.validate());
}

#[test]
fn default_config_only_warns_about_missing_assistants() {
    let issues = Config::default().validate();
    assert_eq!(issues.len(), 2);
    assert!(issues.iter().all(|i| i.severity == ConfigSeverity::Warning));
    assert!(issues[0].field.starts_with("personalities."));
}

#[test]
fn zero_values_are_errors() {
    let mut config = Config::default();
    config.server.port = 0;
    config.cache.max_size = 0;
    config.orchestrator.run_create_deadline_ms = 0;
    config.server.rate_limit.max_requests = 0;

    let errors: Vec<_> = config
        .validate()
        .into_iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .collect();
    let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
    assert!(fields.contains(&"server.port"));
    assert!(fields.contains(&"cache.max_size"));
    assert!(fields.contains(&"orchestrator.run_create_deadline_ms"));
    assert!(fields.contains(&"server.rate_limit.max_requests"));
}

#[test]
fn wildcard_cors_warns() {
    let mut config = Config::default();
    config.server.cors.allowed_origins = vec!["*".into()];
    let issue = config
        .validate()
        .into_iter()
        .find(|e| e.field == "server.cors.allowed_origins")
        .unwrap();
    assert_eq!(issue.severity, ConfigSeverity::Warning);
    assert!(issue.to_string().starts_with("[WARN] server.cors.allowed_origins"));
}

#[test]
fn telemetry_section_parses_and_validates() {
    let toml_str = r#"
[telemetry]
log_format = "compact"
otlp_endpoint = "collector:4317"
sample_rate = 1.5
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.telemetry.log_format, LogFormat::Compact);

    let issues = config.validate();
    let rate = issues.iter().find(|e| e.field == "telemetry.sample_rate").unwrap();
    assert_eq!(rate.severity, ConfigSeverity::Error);
    let endpoint = issues.iter().find(|e| e.field == "telemetry.otlp_endpoint").unwrap();
    assert_eq!(endpoint.severity, ConfigSeverity::Warning);
}
