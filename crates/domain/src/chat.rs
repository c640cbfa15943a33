//! Conversation data model: personalities, thread handles, run states and
//! the append-only chat message log.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Personality
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The persona selected by the user. Each maps to one upstream assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Personality {
    Mentor,
    Companion,
}

impl Personality {
    pub const ALL: [Personality; 2] = [Personality::Mentor, Personality::Companion];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mentor => "mentor",
            Self::Companion => "companion",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mentor" => Some(Self::Mentor),
            "companion" => Some(Self::Companion),
            _ => None,
        }
    }
}

impl std::fmt::Display for Personality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Thread handle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An upstream conversation thread bound to the assistant that answers in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadHandle {
    pub thread_id: String,
    pub assistant_id: String,
    pub personality: Personality,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run state machine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Lifecycle of one run as seen by the orchestrator.
///
/// ```text
/// Submitted ─► Polling ─► Completed | Failed
///     │
///     └─► TimedOutPending ─► Completed | Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Submitted,
    Polling,
    TimedOutPending,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is a legal forward edge.
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Submitted, Polling)
                | (Submitted, TimedOutPending)
                | (Submitted, Failed)
                | (Polling, Completed)
                | (Polling, Failed)
                | (TimedOutPending, Completed)
                | (TimedOutPending, Failed)
        )
    }

    /// Map an upstream run status string onto the local state machine.
    ///
    /// Unknown statuses are treated as still in flight.
    pub fn from_upstream(status: &str) -> Self {
        match status {
            "completed" => Self::Completed,
            "failed" | "cancelled" | "expired" | "incomplete" => Self::Failed,
            _ => Self::Polling,
        }
    }

    /// Caller-facing status label (`"completed" | "failed" | "processing"`).
    pub fn caller_status(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            _ => "processing",
        }
    }
}

/// What `submit_turn` hands back: enough to poll the run later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHandle {
    pub thread_id: String,
    pub run_id: String,
    pub state: RunState,
}

/// Outcome of a single status check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunResult {
    pub fn pending(state: RunState) -> Self {
        Self { state, content: None, error: None }
    }

    pub fn completed(content: impl Into<String>) -> Self {
        Self { state: RunState::Completed, content: Some(content.into()), error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { state: RunState::Failed, content: None, error: Some(error.into()) }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Placeholder run ids
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Reserved prefix for synthetic run ids. Upstream ids never carry it.
pub const PLACEHOLDER_RUN_PREFIX: &str = "pending_";

static PLACEHOLDER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Mint a new placeholder run id: prefix + unix millis + process-wide counter.
pub fn placeholder_run_id() -> String {
    let seq = PLACEHOLDER_SEQ.fetch_add(1, Ordering::Relaxed);
    format!(
        "{PLACEHOLDER_RUN_PREFIX}{}_{seq}",
        Utc::now().timestamp_millis()
    )
}

pub fn is_placeholder_run_id(run_id: &str) -> bool {
    run_id.starts_with(PLACEHOLDER_RUN_PREFIX)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Upstream message shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One content part of an upstream thread message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageFile { file_id: String },
    /// Anything the adapter could not interpret.
    Unsupported,
}

/// A thread message as reported upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamMessage {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

impl UpstreamMessage {
    /// Text of the first content part. `""` when the message is empty or
    /// starts with a non-text part; later parts are never consulted.
    pub fn first_text(&self) -> &str {
        match self.content.first() {
            Some(ContentPart::Text { text }) => text,
            _ => "",
        }
    }
}

/// Upstream answer to a run status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatusReport {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat message log
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One persisted conversation message. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub user_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personality: Option<Personality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(
        user_id: impl Into<String>,
        role: Role,
        content: impl Into<String>,
        personality: Option<Personality>,
        thread_id: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            role,
            content: content.into(),
            personality,
            thread_id,
            created_at: Utc::now(),
        }
    }

    pub fn user(user_id: &str, thread: &ThreadHandle, content: &str) -> Self {
        Self::new(
            user_id,
            Role::User,
            content,
            Some(thread.personality),
            Some(thread.thread_id.clone()),
        )
    }

    pub fn assistant(user_id: &str, thread: &ThreadHandle, content: &str) -> Self {
        Self::new(
            user_id,
            Role::Assistant,
            content,
            Some(thread.personality),
            Some(thread.thread_id.clone()),
        )
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_state_forward_edges_only() {
        use RunState::*;
        assert!(Submitted.can_transition_to(Polling));
        assert!(Submitted.can_transition_to(TimedOutPending));
        assert!(TimedOutPending.can_transition_to(Completed));
        assert!(Polling.can_transition_to(Failed));

        assert!(!Polling.can_transition_to(Submitted));
        assert!(!Completed.can_transition_to(Polling));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Polling.can_transition_to(Polling));
    }

    #[test]
    fn run_state_terminal() {
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::TimedOutPending.is_terminal());
        assert!(!RunState::Polling.is_terminal());
    }

    #[test]
    fn upstream_status_mapping() {
        assert_eq!(RunState::from_upstream("completed"), RunState::Completed);
        assert_eq!(RunState::from_upstream("failed"), RunState::Failed);
        assert_eq!(RunState::from_upstream("expired"), RunState::Failed);
        assert_eq!(RunState::from_upstream("in_progress"), RunState::Polling);
        assert_eq!(RunState::from_upstream("queued"), RunState::Polling);
        assert_eq!(RunState::from_upstream("something_new"), RunState::Polling);
    }

    #[test]
    fn placeholder_ids_are_distinct_and_recognizable() {
        let a = placeholder_run_id();
        let b = placeholder_run_id();
        assert_ne!(a, b);
        assert!(is_placeholder_run_id(&a));
        assert!(!is_placeholder_run_id("run_abc123"));
    }

    #[test]
    fn first_text_ignores_later_parts() {
        let msg = UpstreamMessage {
            role: Role::Assistant,
            content: vec![
                ContentPart::Text { text: "first".into() },
                ContentPart::Text { text: "second".into() },
            ],
        };
        assert_eq!(msg.first_text(), "first");
    }

    #[test]
    fn first_text_empty_when_first_part_is_not_text() {
        let msg = UpstreamMessage {
            role: Role::Assistant,
            content: vec![
                ContentPart::ImageFile { file_id: "file_1".into() },
                ContentPart::Text { text: "caption".into() },
            ],
        };
        assert_eq!(msg.first_text(), "");
    }

    #[test]
    fn first_text_empty_when_absent() {
        let msg = UpstreamMessage {
            role: Role::Assistant,
            content: vec![ContentPart::Unsupported],
        };
        assert_eq!(msg.first_text(), "");
    }

    #[test]
    fn personality_parse_and_serde() {
        assert_eq!(Personality::parse(" Mentor "), Some(Personality::Mentor));
        assert_eq!(Personality::parse("villain"), None);
        let json = serde_json::to_string(&Personality::Companion).unwrap();
        assert_eq!(json, r#""companion""#);
    }

    #[test]
    fn caller_status_labels() {
        assert_eq!(RunState::TimedOutPending.caller_status(), "processing");
        assert_eq!(RunState::Completed.caller_status(), "completed");
        assert_eq!(RunState::Failed.caller_status(), "failed");
    }
}
