//! OpenAI Assistants adapter.
//!
//! Talks to any endpoint that follows the threads/runs/messages contract
//! (`/threads`, `/threads/{id}/runs`, `/threads/{id}/messages`). Every
//! non-2xx answer becomes [`Error::Upstream`] carrying the upstream
//! `error.message` when one is present.

use std::time::{Duration, Instant};

use futures_util::StreamExt;
use reqwest::Method;
use serde_json::Value;
use tr_domain::chat::{ContentPart, Role, RunStatusReport, UpstreamMessage};
use tr_domain::config::UpstreamConfig;
use tr_domain::error::{Error, Result};
use tr_domain::stream::BoxStream;
use tr_domain::trace::TraceEvent;

use crate::sse::relay_deltas;
use crate::traits::AssistantsApi;
use crate::util::{from_reqwest, resolve_api_key, upstream_error_message};

/// Messages fetched when looking for a run's reply; a run that also echoed
/// tool or user messages still has its reply within this page.
const MESSAGE_PAGE: usize = 20;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct OpenAiAssistants {
    base_url: String,
    api_key: String,
    auth_header: String,
    auth_prefix: String,
    beta_header: String,
    /// Bounded by `timeout_ms`; used for every request/response call.
    client: reqwest::Client,
    /// No total timeout, since a streaming run stays open while it generates.
    stream_client: reqwest::Client,
}

impl OpenAiAssistants {
    pub fn from_config(cfg: &UpstreamConfig) -> Result<Self> {
        let api_key = resolve_api_key(&cfg.auth)?;
        Self::with_key(cfg, api_key)
    }

    /// Build the adapter with an explicit key, bypassing `[upstream.auth]`.
    pub fn with_key(cfg: &UpstreamConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(from_reqwest)?;
        let stream_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            auth_header: cfg
                .auth
                .header
                .clone()
                .unwrap_or_else(|| "Authorization".into()),
            auth_prefix: cfg.auth.prefix.clone().unwrap_or_else(|| "Bearer ".into()),
            beta_header: cfg.beta_header.clone(),
            client,
            stream_client,
        })
    }

    // ── Internal: build authenticated request builder ──────────────

    fn authed(
        &self,
        client: &reqwest::Client,
        method: Method,
        path: &str,
    ) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = client
            .request(method, url)
            .header(&self.auth_header, format!("{}{}", self.auth_prefix, self.api_key));
        if !self.beta_header.is_empty() {
            req = req.header("OpenAI-Beta", &self.beta_header);
        }
        req
    }

    /// Send a request and decode the JSON body, mapping failures.
    async fn call(&self, operation: &str, req: reqwest::RequestBuilder) -> Result<Value> {
        let started = Instant::now();
        let resp = req.send().await.map_err(from_reqwest)?;
        let status = resp.status();
        let body = resp.text().await.map_err(from_reqwest)?;

        TraceEvent::UpstreamCall {
            operation: operation.into(),
            status: status.as_u16(),
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();

        if !status.is_success() {
            return Err(Error::Upstream {
                operation: operation.into(),
                status: status.as_u16(),
                message: upstream_error_message(&body),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

fn required_id(operation: &str, body: &Value) -> Result<String> {
    body.get("id")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| Error::Upstream {
            operation: operation.into(),
            status: 200,
            message: "response is missing 'id'".into(),
        })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message parsing helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_content_part(part: &Value) -> ContentPart {
    match part.get("type").and_then(Value::as_str) {
        Some("text") => match part.pointer("/text/value").and_then(Value::as_str) {
            Some(text) => ContentPart::Text { text: text.to_owned() },
            None => ContentPart::Unsupported,
        },
        Some("image_file") => match part.pointer("/image_file/file_id").and_then(Value::as_str) {
            Some(id) => ContentPart::ImageFile { file_id: id.to_owned() },
            None => ContentPart::Unsupported,
        },
        _ => ContentPart::Unsupported,
    }
}

fn parse_message(msg: &Value) -> UpstreamMessage {
    let role = match msg.get("role").and_then(Value::as_str) {
        Some("user") => Role::User,
        _ => Role::Assistant,
    };
    let content = msg
        .get("content")
        .and_then(Value::as_array)
        .map(|parts| parts.iter().map(parse_content_part).collect())
        .unwrap_or_default();
    UpstreamMessage { role, content }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl AssistantsApi for OpenAiAssistants {
    async fn create_thread(&self) -> Result<String> {
        let req = self
            .authed(&self.client, Method::POST, "/threads")
            .json(&serde_json::json!({}));
        let body = self.call("create_thread", req).await?;
        required_id("create_thread", &body)
    }

    async fn append_message(&self, thread_id: &str, text: &str) -> Result<()> {
        let req = self
            .authed(&self.client, Method::POST, &format!("/threads/{thread_id}/messages"))
            .json(&serde_json::json!({ "role": "user", "content": text }));
        self.call("append_message", req).await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<String> {
        let req = self
            .authed(&self.client, Method::POST, &format!("/threads/{thread_id}/runs"))
            .json(&serde_json::json!({ "assistant_id": assistant_id }));
        let body = self.call("create_run", req).await?;
        required_id("create_run", &body)
    }

    async fn get_run_status(&self, thread_id: &str, run_id: &str) -> Result<RunStatusReport> {
        let req = self.authed(
            &self.client,
            Method::GET,
            &format!("/threads/{thread_id}/runs/{run_id}"),
        );
        let body = self.call("get_run_status", req).await?;
        let status = body
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_owned();
        let error_message = body
            .pointer("/last_error/message")
            .and_then(Value::as_str)
            .map(str::to_owned);
        Ok(RunStatusReport { status, error_message })
    }

    async fn latest_assistant_message(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<Option<UpstreamMessage>> {
        let req = self.authed(
            &self.client,
            Method::GET,
            &format!(
                "/threads/{thread_id}/messages\
                 ?limit={MESSAGE_PAGE}&order=desc&run_id={run_id}"
            ),
        );
        let body = self.call("latest_assistant_message", req).await?;
        Ok(body
            .get("data")
            .and_then(Value::as_array)
            .and_then(|data| {
                data.iter()
                    .find(|m| m.get("role").and_then(Value::as_str) == Some("assistant"))
            })
            .map(parse_message))
    }

    async fn stream_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<BoxStream<'static, Result<String>>> {
        tracing::debug!(thread_id, assistant_id, "opening streaming run");

        let resp = self
            .authed(&self.stream_client, Method::POST, &format!("/threads/{thread_id}/runs"))
            .header("Accept", "text/event-stream")
            .json(&serde_json::json!({ "assistant_id": assistant_id, "stream": true }))
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.map_err(from_reqwest)?;
            return Err(Error::Upstream {
                operation: "stream_run".into(),
                status: status.as_u16(),
                message: upstream_error_message(&err_text),
            });
        }

        Ok(relay_deltas(
            resp.bytes_stream().map(|chunk| chunk.map_err(from_reqwest)),
        ))
    }

    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<Value> {
        let req = self.authed(
            &self.client,
            Method::GET,
            &format!("/assistants/{assistant_id}"),
        );
        self.call("retrieve_assistant", req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_and_image_parts() {
        let msg = serde_json::json!({
            "role": "assistant",
            "content": [
                {"type": "image_file", "image_file": {"file_id": "file_9"}},
                {"type": "text", "text": {"value": "Hi there!", "annotations": []}},
                {"type": "refusal", "refusal": "no"}
            ]
        });
        let parsed = parse_message(&msg);
        assert_eq!(parsed.role, Role::Assistant);
        assert_eq!(
            parsed.content,
            vec![
                ContentPart::ImageFile { file_id: "file_9".into() },
                ContentPart::Text { text: "Hi there!".into() },
                ContentPart::Unsupported,
            ]
        );
        assert_eq!(parsed.first_text(), "Hi there!");
    }

    #[test]
    fn text_part_without_value_is_unsupported() {
        let part = serde_json::json!({"type": "text", "text": {}});
        assert_eq!(parse_content_part(&part), ContentPart::Unsupported);
    }

    #[test]
    fn missing_id_is_an_upstream_error() {
        let err = required_id("create_run", &serde_json::json!({"object": "thread.run"}))
            .unwrap_err();
        assert!(matches!(err, Error::Upstream { ref operation, .. } if operation == "create_run"));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let cfg = UpstreamConfig {
            base_url: "http://localhost:1234/v1/".into(),
            ..Default::default()
        };
        let api = OpenAiAssistants::with_key(&cfg, "sk").unwrap();
        assert_eq!(api.base_url, "http://localhost:1234/v1");
        assert_eq!(api.auth_header, "Authorization");
        assert_eq!(api.auth_prefix, "Bearer ");
    }
}
