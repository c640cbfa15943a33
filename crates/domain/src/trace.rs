use serde::Serialize;

/// Structured trace events emitted across all ThreadRelay crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    ThreadResolved {
        user_id: String,
        thread_id: String,
        personality: String,
        is_new: bool,
        explicit: bool,
    },
    RunSubmitted {
        thread_id: String,
        run_id: String,
        state: String,
        duration_ms: u64,
    },
    RunDetached {
        thread_id: String,
        placeholder_id: String,
        deadline_ms: u64,
    },
    DetachedRunSettled {
        thread_id: String,
        placeholder_id: String,
        run_id: Option<String>,
        error: Option<String>,
    },
    RunPolled {
        thread_id: String,
        run_id: String,
        upstream_status: String,
        state: String,
    },
    StreamFinished {
        thread_id: String,
        deltas: usize,
        chars: usize,
        cancelled: bool,
    },
    HistoryAppend {
        user_id: String,
        role: String,
        thread_id: Option<String>,
    },
    UpstreamCall {
        operation: String,
        status: u16,
        duration_ms: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "tr_event");
    }
}
