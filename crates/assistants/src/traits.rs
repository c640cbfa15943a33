use serde_json::Value;
use tr_domain::chat::{RunStatusReport, UpstreamMessage};
use tr_domain::error::Result;
use tr_domain::stream::BoxStream;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core upstream trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Operations the relay needs from the upstream conversational service.
///
/// A thread accumulates turns; a run asks an assistant to answer the turns
/// submitted so far. Every method is a single upstream round trip and never
/// retries or waits for a run to finish.
#[async_trait::async_trait]
pub trait AssistantsApi: Send + Sync {
    /// Create an empty thread and return its id.
    async fn create_thread(&self) -> Result<String>;

    /// Append a user turn to a thread.
    async fn append_message(&self, thread_id: &str, text: &str) -> Result<()>;

    /// Start a run of `assistant_id` on the thread and return the run id.
    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<String>;

    /// One status check for a run.
    async fn get_run_status(&self, thread_id: &str, run_id: &str) -> Result<RunStatusReport>;

    /// Most recent assistant message written by `run_id`, if any.
    async fn latest_assistant_message(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<Option<UpstreamMessage>>;

    /// Start a streaming run and yield text deltas as they arrive.
    async fn stream_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<BoxStream<'static, Result<String>>>;

    /// Assistant metadata (name, model, instructions) as returned upstream.
    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<Value>;
}
