//! ThreadRelay gateway: HTTP API, run orchestration and the `threadrelay`
//! command line.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod runtime;
pub mod state;
