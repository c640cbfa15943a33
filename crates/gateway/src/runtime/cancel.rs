//! Per-thread cancellation for streaming turns.
//!
//! Each in-flight stream registers a `CancelToken` under its thread id.
//! `POST /v1/threads/:thread_id/stop` cancels it; the stream stops reading
//! upstream and emits nothing further. Detached run continuations and
//! history writes never observe these tokens.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

static TOKEN_SEQ: AtomicU64 = AtomicU64::new(0);

/// A cancellation token that can be checked or awaited by a stream.
/// Clones share state and identity.
#[derive(Clone)]
pub struct CancelToken {
    inner: CancellationToken,
    id: u64,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self {
            inner: CancellationToken::new(),
            id: TOKEN_SEQ.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Repeated calls are no-ops.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await
    }
}

/// Active cancellation tokens keyed by thread id.
#[derive(Default)]
pub struct CancelMap {
    tokens: Mutex<HashMap<String, CancelToken>>,
}

impl CancelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a new token, replacing any previous one.
    pub fn register(&self, thread_id: &str) -> CancelToken {
        let token = CancelToken::new();
        self.tokens
            .lock()
            .insert(thread_id.to_owned(), token.clone());
        token
    }

    /// Cancel the running stream for a thread. Returns true if one was found.
    pub fn cancel(&self, thread_id: &str) -> bool {
        match self.tokens.lock().get(thread_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove the token for a thread only if it is still `token`, so a
    /// finished stream never unregisters a newer one on the same thread.
    pub fn finish(&self, thread_id: &str, token: &CancelToken) {
        let mut tokens = self.tokens.lock();
        if tokens.get(thread_id).is_some_and(|t| t.id == token.id) {
            tokens.remove(thread_id);
        }
    }

    /// Register a token whose registration ends when the returned guard is
    /// dropped, however the stream holding it ends.
    pub fn register_guarded(self: &Arc<Self>, thread_id: &str) -> StreamGuard {
        StreamGuard {
            token: self.register(thread_id),
            thread_id: thread_id.to_owned(),
            map: self.clone(),
        }
    }

    pub fn is_running(&self, thread_id: &str) -> bool {
        self.tokens.lock().contains_key(thread_id)
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.lock().is_empty()
    }
}

/// Keeps a stream's token registered for as long as the stream is alive.
pub struct StreamGuard {
    token: CancelToken,
    thread_id: String,
    map: Arc<CancelMap>,
}

impl StreamGuard {
    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.map.finish(&self.thread_id, &self.token);
    }
}
