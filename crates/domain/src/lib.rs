//! Shared types for the ThreadRelay crates: conversation data model,
//! configuration, the common error type and structured trace events.

pub mod chat;
pub mod config;
pub mod error;
pub mod stream;
pub mod trace;
