use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation history persistence
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    /// Append-only JSONL files under `state_path/history`.
    Jsonl,
    /// Process memory only; lost on restart.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "d_backend")]
    pub backend: HistoryBackend,
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: d_backend(),
            state_path: d_state_path(),
        }
    }
}

fn d_backend() -> HistoryBackend {
    HistoryBackend::Jsonl
}
fn d_state_path() -> PathBuf {
    PathBuf::from("./data/state")
}
