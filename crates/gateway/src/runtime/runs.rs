//! Run ledger: bounded in-memory records of every run the relay has seen.
//!
//! The ledger is how a detached create-run reports back. When the deadline
//! fires first, the caller gets a placeholder id; the background task later
//! records either the real run id or the failure under that placeholder.
//! It also remembers which completed runs already had their assistant reply
//! persisted, so repeated polls store it once.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tr_domain::chat::{Personality, RunState, ThreadHandle};

pub const DEFAULT_LEDGER_CAPACITY: usize = 2000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub run_id: String,
    pub thread_id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personality: Option<Personality>,
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Real upstream run id, set on placeholder records once create-run lands.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_run_id: Option<String>,
    pub assistant_persisted: bool,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    pub fn new(
        run_id: impl Into<String>,
        user_id: &str,
        thread: &ThreadHandle,
        state: RunState,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            thread_id: thread.thread_id.clone(),
            user_id: user_id.to_owned(),
            personality: Some(thread.personality),
            state,
            error: None,
            resolved_run_id: None,
            assistant_persisted: false,
            started_at: Utc::now(),
            ended_at: None,
        }
    }
}

/// Where a placeholder run stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceholderResolution {
    /// The detached create-run has not finished.
    Pending,
    Resolved(String),
    Failed(String),
    /// Never issued by this process, or already evicted.
    Unknown,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ledger
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct RunLedger {
    inner: RwLock<LedgerInner>,
    capacity: usize,
}

/// Ring of records (oldest first) plus an index from run id to a logical
/// sequence number. `base_seq` counts evictions so index values never need
/// shifting.
struct LedgerInner {
    runs: VecDeque<RunRecord>,
    index: HashMap<String, usize>,
    base_seq: usize,
}

impl LedgerInner {
    fn get(&self, run_id: &str) -> Option<&RunRecord> {
        let seq = *self.index.get(run_id)?;
        self.runs.get(seq - self.base_seq)
    }

    fn get_mut(&mut self, run_id: &str) -> Option<&mut RunRecord> {
        let seq = *self.index.get(run_id)?;
        self.runs.get_mut(seq - self.base_seq)
    }

    fn push_back(&mut self, record: RunRecord) {
        let seq = self.base_seq + self.runs.len();
        self.index.insert(record.run_id.clone(), seq);
        self.runs.push_back(record);
    }

    fn pop_front(&mut self) {
        if let Some(record) = self.runs.pop_front() {
            self.index.remove(&record.run_id);
            self.base_seq += 1;
        }
    }
}

impl Default for RunLedger {
    fn default() -> Self {
        Self::new(DEFAULT_LEDGER_CAPACITY)
    }
}

impl RunLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(LedgerInner {
                runs: VecDeque::new(),
                index: HashMap::new(),
                base_seq: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    /// Record a run. An existing record with the same id is left alone.
    pub fn insert(&self, record: RunRecord) {
        let mut inner = self.inner.write();
        if inner.index.contains_key(&record.run_id) {
            return;
        }
        inner.push_back(record);
        while inner.runs.len() > self.capacity {
            inner.pop_front();
        }
    }

    pub fn get(&self, run_id: &str) -> Option<RunRecord> {
        self.inner.read().get(run_id).cloned()
    }

    /// Move a run forward. Illegal transitions are logged and ignored;
    /// re-observing the current state is a silent no-op.
    pub fn advance(&self, run_id: &str, next: RunState, error: Option<String>) -> bool {
        let mut inner = self.inner.write();
        let Some(record) = inner.get_mut(run_id) else {
            return false;
        };
        if record.state == next {
            return false;
        }
        if !record.state.can_transition_to(next) {
            tracing::warn!(
                run_id,
                from = ?record.state,
                to = ?next,
                "ignoring illegal run state transition"
            );
            return false;
        }
        record.state = next;
        if error.is_some() {
            record.error = error;
        }
        if next.is_terminal() {
            record.ended_at = Some(Utc::now());
        }
        true
    }

    /// Record the outcome of a detached create-run under its placeholder.
    pub fn settle_placeholder(&self, placeholder: &str, outcome: Result<&str, &str>) {
        match outcome {
            Ok(run_id) => {
                if let Some(record) = self.inner.write().get_mut(placeholder) {
                    record.resolved_run_id = Some(run_id.to_owned());
                }
            }
            Err(message) => {
                self.advance(placeholder, RunState::Failed, Some(message.to_owned()));
            }
        }
    }

    pub fn resolve_placeholder(&self, placeholder: &str) -> PlaceholderResolution {
        match self.get(placeholder) {
            None => PlaceholderResolution::Unknown,
            Some(r) => match (r.resolved_run_id, r.state) {
                (Some(id), _) => PlaceholderResolution::Resolved(id),
                (None, RunState::Failed) => PlaceholderResolution::Failed(
                    r.error.unwrap_or_else(|| "Run failed".into()),
                ),
                (None, _) => PlaceholderResolution::Pending,
            },
        }
    }

    /// Mark a completed run's reply as persisted.
    ///
    /// Only the first caller gets the record back; later polls of the same
    /// run get `None` and must not store the reply again. The returned
    /// record names the run's owner, which is who the reply belongs to.
    /// Runs this ledger never saw are adopted on the spot under `user_id`.
    pub fn claim_assistant_persist(
        &self,
        run_id: &str,
        user_id: &str,
        thread_id: &str,
    ) -> Option<RunRecord> {
        let mut inner = self.inner.write();
        if inner.get(run_id).is_none() {
            inner.push_back(RunRecord {
                run_id: run_id.to_owned(),
                thread_id: thread_id.to_owned(),
                user_id: user_id.to_owned(),
                personality: None,
                state: RunState::Polling,
                error: None,
                resolved_run_id: None,
                assistant_persisted: false,
                started_at: Utc::now(),
                ended_at: None,
            });
            while inner.runs.len() > self.capacity {
                inner.pop_front();
            }
        }

        let record = inner.get_mut(run_id)?;
        if record.state.can_transition_to(RunState::Completed) {
            record.state = RunState::Completed;
            record.ended_at = Some(Utc::now());
        }
        if record.assistant_persisted {
            return None;
        }
        record.assistant_persisted = true;
        Some(record.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.read().runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().runs.is_empty()
    }

    /// Count runs by state (for the health endpoint).
    pub fn status_counts(&self) -> HashMap<String, usize> {
        let inner = self.inner.read();
        let mut counts = HashMap::new();
        for run in inner.runs.iter() {
            let key = serde_json::to_value(run.state)
                .ok()
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_else(|| format!("{:?}", run.state).to_lowercase());
            *counts.entry(key).or_insert(0) += 1;
        }
        counts
    }
}
