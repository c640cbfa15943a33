//! `threadrelay ask`: one-shot turn from the command line.
//!
//! Submits a single message, polls until the run settles and prints the
//! reply to stdout. Useful for scripting and smoke-testing a config.

use std::sync::Arc;
use std::time::Duration;

use tr_domain::chat::{Personality, RunState};
use tr_domain::config::Config;

use crate::bootstrap;

/// Polling budget for the CLI; generous because nobody is waiting on a socket.
const ASK_WAIT: Duration = Duration::from_secs(120);

pub async fn ask(
    config: Arc<Config>,
    message: String,
    user: String,
    personality: String,
    thread: Option<String>,
) -> anyhow::Result<()> {
    let personality = Personality::parse(&personality)
        .ok_or_else(|| anyhow::anyhow!("unknown personality '{personality}' (mentor|companion)"))?;

    let state = bootstrap::build_app_state(config.clone()).await?;

    let upstream = state.upstream.clone();
    let handle = state
        .registry
        .resolve_thread(&user, personality, thread.as_deref(), move || async move {
            upstream.create_thread().await
        })
        .await?;
    eprintln!("thread: {}", handle.thread_id);

    let run = state
        .orchestrator
        .submit_turn(&user, &handle, &message)
        .await?;

    let (run_id, result) = state
        .orchestrator
        .wait_for_run(
            &user,
            run,
            ASK_WAIT,
            Duration::from_millis(config.orchestrator.poll_interval_ms),
        )
        .await?;

    match result.state {
        RunState::Completed => {
            println!("{}", result.content.unwrap_or_default());
            Ok(())
        }
        RunState::Failed => anyhow::bail!(
            "run {run_id} failed: {}",
            result.error.unwrap_or_else(|| "Run failed".into())
        ),
        _ => anyhow::bail!(
            "run {run_id} still processing after {}s",
            ASK_WAIT.as_secs()
        ),
    }
}
