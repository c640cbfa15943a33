//! Run orchestration: submit a turn, poll its run, or stream it.
//!
//! `submit_turn` never blocks longer than the create-run deadline. The
//! create-run call runs in its own task; if the deadline wins the race the
//! caller gets a placeholder id and the task keeps going detached, reporting
//! into the [`RunLedger`] when it settles.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tr_assistants::AssistantsApi;
use tr_domain::chat::{
    is_placeholder_run_id, placeholder_run_id, ChatMessage, Role, RunHandle, RunResult, RunState,
    ThreadHandle,
};
use tr_domain::config::OrchestratorConfig;
use tr_domain::error::{Error, Result};
use tr_domain::stream::BoxStream;
use tr_domain::trace::TraceEvent;
use tr_sessions::HistoryWriter;

use super::cancel::CancelToken;
use super::runs::{PlaceholderResolution, RunLedger, RunRecord};

const DEFAULT_FAILURE_MESSAGE: &str = "Run failed";

pub struct RunOrchestrator {
    upstream: Arc<dyn AssistantsApi>,
    history: HistoryWriter,
    ledger: Arc<RunLedger>,
    deadline: Duration,
}

impl RunOrchestrator {
    pub fn new(
        upstream: Arc<dyn AssistantsApi>,
        history: HistoryWriter,
        ledger: Arc<RunLedger>,
        deadline: Duration,
    ) -> Self {
        Self {
            upstream,
            history,
            ledger,
            deadline,
        }
    }

    pub fn from_config(
        upstream: Arc<dyn AssistantsApi>,
        history: HistoryWriter,
        ledger: Arc<RunLedger>,
        cfg: &OrchestratorConfig,
    ) -> Self {
        Self::new(
            upstream,
            history,
            ledger,
            Duration::from_millis(cfg.run_create_deadline_ms),
        )
    }

    pub fn ledger(&self) -> &Arc<RunLedger> {
        &self.ledger
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Submit
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Append the user's message and start a run, bounded by the configured
    /// create-run deadline.
    pub async fn submit_turn(
        &self,
        user_id: &str,
        thread: &ThreadHandle,
        message: &str,
    ) -> Result<RunHandle> {
        self.submit_turn_with_deadline(user_id, thread, message, self.deadline)
            .await
    }

    pub async fn submit_turn_with_deadline(
        &self,
        user_id: &str,
        thread: &ThreadHandle,
        message: &str,
        deadline: Duration,
    ) -> Result<RunHandle> {
        let started = Instant::now();
        let appended = self.start_append(user_id, thread, message);

        // The task records the run in the ledger itself; dropping this
        // future before the race is decided does not lose it.
        let mut create: JoinHandle<Result<String>> = {
            let upstream = self.upstream.clone();
            let ledger = self.ledger.clone();
            let user_id = user_id.to_owned();
            let thread = thread.clone();
            tokio::spawn(async move {
                // Create the run only once the append has been issued.
                if let Err(e) = appended.await {
                    tracing::warn!(
                        thread_id = %thread.thread_id,
                        error = %e,
                        "append task aborted"
                    );
                }
                let run_id = upstream
                    .create_run(&thread.thread_id, &thread.assistant_id)
                    .await?;
                ledger.insert(RunRecord::new(&run_id, &user_id, &thread, RunState::Submitted));
                ledger.advance(&run_id, RunState::Polling, None);
                Ok(run_id)
            })
        };

        tokio::select! {
            joined = &mut create => {
                let run_id = flatten_join(joined)?;

                TraceEvent::RunSubmitted {
                    thread_id: thread.thread_id.clone(),
                    run_id: run_id.clone(),
                    state: "polling".into(),
                    duration_ms: started.elapsed().as_millis() as u64,
                }
                .emit();

                Ok(RunHandle {
                    thread_id: thread.thread_id.clone(),
                    run_id,
                    state: RunState::Polling,
                })
            }
            _ = tokio::time::sleep(deadline) => {
                let placeholder = placeholder_run_id();
                self.ledger
                    .insert(RunRecord::new(&placeholder, user_id, thread, RunState::Submitted));
                self.ledger
                    .advance(&placeholder, RunState::TimedOutPending, None);

                TraceEvent::RunDetached {
                    thread_id: thread.thread_id.clone(),
                    placeholder_id: placeholder.clone(),
                    deadline_ms: deadline.as_millis() as u64,
                }
                .emit();

                self.settle_detached(create, placeholder.clone(), thread);

                Ok(RunHandle {
                    thread_id: thread.thread_id.clone(),
                    run_id: placeholder,
                    state: RunState::TimedOutPending,
                })
            }
        }
    }

    /// Persist the user message and issue the upstream append, both in the
    /// background. The returned handle completes once the append settles.
    fn start_append(&self, user_id: &str, thread: &ThreadHandle, message: &str) -> JoinHandle<()> {
        self.history
            .record(ChatMessage::user(user_id, thread, message));

        let upstream = self.upstream.clone();
        let thread_id = thread.thread_id.clone();
        let text = message.to_owned();
        tokio::spawn(async move {
            if let Err(e) = upstream.append_message(&thread_id, &text).await {
                tracing::warn!(
                    thread_id = %thread_id,
                    error = %e,
                    "failed to append message upstream"
                );
            }
        })
    }

    fn settle_detached(
        &self,
        create: JoinHandle<Result<String>>,
        placeholder: String,
        thread: &ThreadHandle,
    ) {
        let ledger = self.ledger.clone();
        let thread = thread.clone();

        tokio::spawn(async move {
            let outcome = flatten_join(create.await);
            match &outcome {
                Ok(run_id) => {
                    tracing::info!(
                        thread_id = %thread.thread_id,
                        placeholder = %placeholder,
                        run_id = %run_id,
                        "detached create-run resolved"
                    );
                    ledger.settle_placeholder(&placeholder, Ok(run_id));
                }
                Err(e) => {
                    tracing::warn!(
                        thread_id = %thread.thread_id,
                        placeholder = %placeholder,
                        error = %e,
                        "detached create-run failed"
                    );
                    ledger.settle_placeholder(&placeholder, Err(&e.to_string()));
                }
            }

            TraceEvent::DetachedRunSettled {
                thread_id: thread.thread_id.clone(),
                placeholder_id: placeholder,
                run_id: outcome.as_ref().ok().cloned(),
                error: outcome.as_ref().err().map(|e| e.to_string()),
            }
            .emit();
        });
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Poll
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// One status check. Never waits for the run to finish.
    ///
    /// A completed run's reply is the first text part of the run's latest
    /// assistant message. It is persisted the first time the run is seen
    /// completed, under the user recorded for the run (`user_id` only for
    /// runs the ledger does not know).
    pub async fn poll_run(
        &self,
        user_id: &str,
        thread_id: &str,
        run_id: &str,
    ) -> Result<RunResult> {
        if is_placeholder_run_id(run_id) {
            return Err(Error::InvalidRun(format!(
                "{run_id} is a placeholder; resolve it before polling"
            )));
        }

        let report = self.upstream.get_run_status(thread_id, run_id).await?;
        let state = RunState::from_upstream(&report.status);

        TraceEvent::RunPolled {
            thread_id: thread_id.to_owned(),
            run_id: run_id.to_owned(),
            upstream_status: report.status.clone(),
            state: state.caller_status().to_owned(),
        }
        .emit();

        match state {
            RunState::Failed => {
                let message = report
                    .error_message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.into());
                self.ledger
                    .advance(run_id, RunState::Failed, Some(message.clone()));
                Ok(RunResult::failed(message))
            }
            RunState::Completed => {
                let content = self
                    .upstream
                    .latest_assistant_message(thread_id, run_id)
                    .await?
                    .filter(|m| m.role == Role::Assistant)
                    .map(|m| m.first_text().to_owned())
                    .unwrap_or_default();

                // The reply belongs to whoever submitted the run, not to
                // whoever happened to poll it to completion.
                match self
                    .ledger
                    .claim_assistant_persist(run_id, user_id, thread_id)
                {
                    Some(owner) => {
                        self.history.record(ChatMessage::new(
                            owner.user_id,
                            Role::Assistant,
                            content.clone(),
                            owner.personality,
                            Some(thread_id.to_owned()),
                        ));
                    }
                    None => tracing::debug!(run_id, "assistant reply already persisted"),
                }
                Ok(RunResult::completed(content))
            }
            _ => {
                self.ledger.advance(run_id, RunState::Polling, None);
                Ok(RunResult::pending(RunState::Polling))
            }
        }
    }

    pub fn resolve_placeholder(&self, placeholder: &str) -> PlaceholderResolution {
        self.ledger.resolve_placeholder(placeholder)
    }

    /// Poll every `interval` until the run settles or `budget` is spent.
    ///
    /// A placeholder is swapped for the real run id as soon as its detached
    /// create-run lands. Returns the run id last polled and the last result;
    /// a non-terminal state means the budget ran out.
    pub async fn wait_for_run(
        &self,
        user_id: &str,
        handle: RunHandle,
        budget: Duration,
        interval: Duration,
    ) -> Result<(String, RunResult)> {
        let give_up = tokio::time::Instant::now() + budget;
        let interval = interval.max(Duration::from_millis(1));
        let mut run_id = handle.run_id;
        let mut last = RunResult::pending(handle.state);

        loop {
            if is_placeholder_run_id(&run_id) {
                match self.resolve_placeholder(&run_id) {
                    PlaceholderResolution::Resolved(real) => {
                        run_id = real;
                        continue;
                    }
                    PlaceholderResolution::Failed(error) => {
                        return Ok((run_id, RunResult::failed(error)));
                    }
                    PlaceholderResolution::Pending | PlaceholderResolution::Unknown => {}
                }
            } else {
                last = self.poll_run(user_id, &handle.thread_id, &run_id).await?;
                if last.state.is_terminal() {
                    return Ok((run_id, last));
                }
            }

            let now = tokio::time::Instant::now();
            if now >= give_up {
                return Ok((run_id, last));
            }
            tokio::time::sleep(interval.min(give_up - now)).await;
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Stream
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Append the user's message and relay a streaming run's text deltas.
    ///
    /// The full reply is persisted once the upstream stream ends cleanly.
    /// After `cancel` fires nothing further is yielded and nothing is
    /// persisted; the user message write is unaffected.
    pub async fn stream_turn(
        &self,
        user_id: &str,
        thread: &ThreadHandle,
        message: &str,
        cancel: CancelToken,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let appended = self.start_append(user_id, thread, message);
        if let Err(e) = appended.await {
            tracing::warn!(thread_id = %thread.thread_id, error = %e, "append task aborted");
        }

        let mut deltas = self
            .upstream
            .stream_run(&thread.thread_id, &thread.assistant_id)
            .await?;

        let history = self.history.clone();
        let user_id = user_id.to_owned();
        let thread = thread.clone();

        Ok(Box::pin(async_stream::stream! {
            let mut reply = String::new();
            let mut count = 0usize;
            let mut cancelled = false;
            let mut failed = false;

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    item = deltas.next() => Some(item),
                };
                match next {
                    None => {
                        cancelled = true;
                        break;
                    }
                    Some(None) => break,
                    Some(Some(Ok(delta))) => {
                        reply.push_str(&delta);
                        count += 1;
                        yield Ok(delta);
                    }
                    Some(Some(Err(e))) => {
                        failed = true;
                        yield Err(e);
                        break;
                    }
                }
            }
            drop(deltas);

            if !cancelled && !failed && !reply.is_empty() {
                history.record(ChatMessage::assistant(&user_id, &thread, &reply));
            }

            TraceEvent::StreamFinished {
                thread_id: thread.thread_id.clone(),
                deltas: count,
                chars: reply.chars().count(),
                cancelled,
            }
            .emit();
        }))
    }
}

fn flatten_join(
    joined: std::result::Result<Result<String>, tokio::task::JoinError>,
) -> Result<String> {
    joined.map_err(|e| Error::Other(format!("create_run task failed: {e}")))?
}
