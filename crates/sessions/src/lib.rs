//! Per-user conversation state for ThreadRelay.
//!
//! Tracks which upstream thread each user is talking in and keeps an
//! append-only log of every message exchanged, written in the background so
//! a slow or failing store never delays a turn.

pub mod history;
pub mod registry;

pub use history::{HistoryStore, HistoryWriter, InMemoryHistoryStore, JsonlHistoryStore};
pub use registry::ThreadRegistry;
