//! Wire-level tests for the Assistants adapter against a mock server.

use futures_util::StreamExt;
use tr_assistants::{AssistantsApi, OpenAiAssistants};
use tr_domain::chat::Role;
use tr_domain::config::UpstreamConfig;
use tr_domain::error::Error;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn adapter(server: &MockServer) -> OpenAiAssistants {
    let cfg = UpstreamConfig {
        base_url: format!("{}/v1", server.uri()),
        ..Default::default()
    };
    OpenAiAssistants::with_key(&cfg, "sk-test").unwrap()
}

#[tokio::test]
async fn create_thread_sends_auth_and_beta_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/threads"))
        .and(header("authorization", "Bearer sk-test"))
        .and(header("openai-beta", "assistants=v2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "thread_abc",
            "object": "thread"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = adapter(&server).create_thread().await.unwrap();
    assert_eq!(id, "thread_abc");
}

#[tokio::test]
async fn create_run_posts_assistant_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/threads/thread_1/runs"))
        .and(body_partial_json(serde_json::json!({"assistant_id": "asst_m"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "run_1",
            "status": "queued"
        })))
        .mount(&server)
        .await;

    let run_id = adapter(&server).create_run("thread_1", "asst_m").await.unwrap();
    assert_eq!(run_id, "run_1");
}

#[tokio::test]
async fn append_message_posts_user_role() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/threads/thread_1/messages"))
        .and(body_partial_json(serde_json::json!({"role": "user", "content": "Hello"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "msg_1"})))
        .expect(1)
        .mount(&server)
        .await;

    adapter(&server).append_message("thread_1", "Hello").await.unwrap();
}

#[tokio::test]
async fn failed_run_reports_last_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/threads/thread_1/runs/run_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "run_1",
            "status": "failed",
            "last_error": {"code": "server_error", "message": "boom"}
        })))
        .mount(&server)
        .await;

    let report = adapter(&server).get_run_status("thread_1", "run_1").await.unwrap();
    assert_eq!(report.status, "failed");
    assert_eq!(report.error_message.as_deref(), Some("boom"));
}

#[tokio::test]
async fn latest_assistant_message_filters_by_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/threads/thread_1/messages"))
        .and(query_param("order", "desc"))
        .and(query_param("run_id", "run_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "object": "list",
            "data": [{
                "id": "msg_2",
                "role": "assistant",
                "content": [{"type": "text", "text": {"value": "Hi there!", "annotations": []}}]
            }]
        })))
        .mount(&server)
        .await;

    let msg = adapter(&server)
        .latest_assistant_message("thread_1", "run_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(msg.first_text(), "Hi there!");
}

#[tokio::test]
async fn newer_user_message_is_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/threads/thread_1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {
                    "id": "msg_3",
                    "role": "user",
                    "content": [{"type": "text", "text": {"value": "another question", "annotations": []}}]
                },
                {
                    "id": "msg_2",
                    "role": "assistant",
                    "content": [{"type": "text", "text": {"value": "the answer", "annotations": []}}]
                }
            ]
        })))
        .mount(&server)
        .await;

    let msg = adapter(&server)
        .latest_assistant_message("thread_1", "run_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(msg.role, Role::Assistant);
    assert_eq!(msg.first_text(), "the answer");
}

#[tokio::test]
async fn only_user_messages_means_no_reply() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/threads/thread_1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{
                "id": "msg_1",
                "role": "user",
                "content": [{"type": "text", "text": {"value": "hello?", "annotations": []}}]
            }]
        })))
        .mount(&server)
        .await;

    assert!(adapter(&server)
        .latest_assistant_message("thread_1", "run_1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn empty_thread_has_no_reply() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/threads/thread_1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
        .mount(&server)
        .await;

    assert!(adapter(&server)
        .latest_assistant_message("thread_1", "run_1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn non_success_maps_to_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/threads/missing/runs"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": {"message": "No thread found with id 'missing'.", "type": "invalid_request_error"}
        })))
        .mount(&server)
        .await;

    let err = adapter(&server).create_run("missing", "asst_m").await.unwrap_err();
    match err {
        Error::Upstream { operation, status, message } => {
            assert_eq!(operation, "create_run");
            assert_eq!(status, 404);
            assert!(message.contains("No thread found"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn stream_run_relays_message_deltas() {
    let server = MockServer::start().await;
    let body = concat!(
        "event: thread.run.created\n",
        "data: {\"id\":\"run_1\",\"object\":\"thread.run\",\"status\":\"queued\"}\n\n",
        "event: thread.message.delta\n",
        "data: {\"object\":\"thread.message.delta\",\"delta\":{\"content\":[{\"index\":0,\"type\":\"text\",\"text\":{\"value\":\"Hi \"}}]}}\n\n",
        "event: thread.message.delta\n",
        "data: {\"object\":\"thread.message.delta\",\"delta\":{\"content\":[{\"index\":0,\"type\":\"text\",\"text\":{\"value\":\"there!\"}}]}}\n\n",
        "event: done\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/threads/thread_1/runs"))
        .and(body_partial_json(serde_json::json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&server)
        .await;

    let stream = adapter(&server).stream_run("thread_1", "asst_m").await.unwrap();
    let deltas: Vec<String> = stream.map(|d| d.unwrap()).collect().await;
    assert_eq!(deltas.concat(), "Hi there!");
}

#[tokio::test]
async fn retrieve_assistant_returns_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/assistants/asst_m"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "asst_m",
            "name": "Mentor",
            "model": "gpt-4o"
        })))
        .mount(&server)
        .await;

    let meta = adapter(&server).retrieve_assistant("asst_m").await.unwrap();
    assert_eq!(meta["name"], "Mentor");
}
