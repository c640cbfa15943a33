use serde::{Deserialize, Serialize};

/// Response cache for read-mostly upstream data (assistant metadata).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "d_300")]
    pub default_ttl_secs: u64,
    #[serde(default = "d_100")]
    pub max_size: usize,
    /// How often the background sweeper drops expired cache entries and
    /// stale rate-limit windows. `0` disables the sweeper.
    #[serde(default = "d_60")]
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300,
            max_size: 100,
            sweep_interval_secs: 60,
        }
    }
}

fn d_300() -> u64 {
    300
}
fn d_100() -> usize {
    100
}
fn d_60() -> u64 {
    60
}
