//! Core runtime: the run orchestrator and the process-lifetime state it
//! shares with the HTTP layer (run ledger, stream cancellation, the TTL
//! cache and the request limiter).

pub mod cache;
pub mod cancel;
pub mod orchestrator;
pub mod rate_limit;
pub mod runs;

pub use cache::{CacheOptions, TtlCache};
pub use cancel::{CancelMap, CancelToken, StreamGuard};
pub use orchestrator::RunOrchestrator;
pub use rate_limit::RateLimiter;
pub use runs::{PlaceholderResolution, RunLedger, RunRecord};
