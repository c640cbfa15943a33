use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run orchestration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Upper bound on waiting for the upstream create-run call. When it
    /// elapses the caller gets a placeholder handle and the call continues
    /// in the background.
    #[serde(default = "d_4000")]
    pub run_create_deadline_ms: u64,
    /// Cadence used by callers that poll on the user's behalf
    /// (`wait_ms` on the turn endpoint, the `ask` command).
    #[serde(default = "d_1000")]
    pub poll_interval_ms: u64,
    /// Cap on the optional `wait_ms` of a turn request.
    #[serde(default = "d_25000")]
    pub max_wait_ms: u64,
    /// Number of run records kept in memory.
    #[serde(default = "d_2000")]
    pub ledger_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            run_create_deadline_ms: 4_000,
            poll_interval_ms: 1_000,
            max_wait_ms: 25_000,
            ledger_capacity: 2_000,
        }
    }
}

fn d_4000() -> u64 {
    4_000
}
fn d_1000() -> u64 {
    1_000
}
fn d_25000() -> u64 {
    25_000
}
fn d_2000() -> usize {
    2_000
}
