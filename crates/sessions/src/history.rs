//! Conversation history: an append-only log of every [`ChatMessage`].
//!
//! Writes go through [`HistoryWriter::record`], which spawns the save and
//! returns immediately. Failures are logged where they happen and never
//! reach the turn that produced the message.
//!
//! The JSONL backend keeps one `<user>.jsonl` file per user under
//! `<state_path>/history`, with an in-memory write-through cache so reads
//! only hit disk the first time a user is listed. Loading and appending are
//! serialized per user, so a save never races a cold load.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tr_domain::chat::ChatMessage;
use tr_domain::error::{Error, Result};
use tr_domain::trace::TraceEvent;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    async fn save_message(&self, message: &ChatMessage) -> Result<()>;

    /// Messages for a user in insertion order, optionally for one thread.
    async fn list(&self, user_id: &str, thread_id: Option<&str>) -> Result<Vec<ChatMessage>>;
}

fn filter_thread(messages: Vec<ChatMessage>, thread_id: Option<&str>) -> Vec<ChatMessage> {
    match thread_id {
        Some(t) => messages
            .into_iter()
            .filter(|m| m.thread_id.as_deref() == Some(t))
            .collect(),
        None => messages,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fire-and-forget writer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub struct HistoryWriter {
    store: Arc<dyn HistoryStore>,
}

impl HistoryWriter {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    /// Persist `message` in the background.
    ///
    /// Callers on the request path drop the handle; tests await it.
    pub fn record(&self, message: ChatMessage) -> JoinHandle<()> {
        let store = self.store.clone();
        tokio::spawn(async move {
            match store.save_message(&message).await {
                Ok(()) => TraceEvent::HistoryAppend {
                    user_id: message.user_id.clone(),
                    role: message.role.as_str().to_owned(),
                    thread_id: message.thread_id.clone(),
                }
                .emit(),
                Err(e) => tracing::warn!(
                    user_id = %message.user_id,
                    role = message.role.as_str(),
                    message_id = %message.id,
                    error = %e,
                    "failed to persist chat message"
                ),
            }
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct InMemoryHistoryStore {
    messages: Mutex<Vec<ChatMessage>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

#[async_trait::async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn save_message(&self, message: &ChatMessage) -> Result<()> {
        self.messages.lock().push(message.clone());
        Ok(())
    }

    async fn list(&self, user_id: &str, thread_id: Option<&str>) -> Result<Vec<ChatMessage>> {
        let mine: Vec<ChatMessage> = self
            .messages
            .lock()
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        Ok(filter_thread(mine, thread_id))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JSONL store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct JsonlHistoryStore {
    base_dir: PathBuf,
    cache: RwLock<HashMap<String, Vec<ChatMessage>>>,
    user_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl JsonlHistoryStore {
    /// Open (creating if needed) `state_path/history`.
    pub fn new(state_path: &Path) -> Result<Self> {
        let base_dir = state_path.join("history");
        std::fs::create_dir_all(&base_dir).map_err(Error::Io)?;
        Ok(Self {
            base_dir,
            cache: RwLock::new(HashMap::new()),
            user_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn path_for(&self, user_id: &str) -> PathBuf {
        self.base_dir.join(format!("{}.jsonl", file_stem(user_id)))
    }

    fn user_lock(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.user_locks
            .lock()
            .entry(user_id.to_owned())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// File-safe stem for a user id. Bytes outside `[A-Za-z0-9_-]` are
/// written as `%XX`, so distinct ids never share a file.
fn file_stem(user_id: &str) -> String {
    let mut out = String::with_capacity(user_id.len());
    for b in user_id.bytes() {
        if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{b:02X}");
        }
    }
    out
}

#[async_trait::async_trait]
impl HistoryStore for JsonlHistoryStore {
    async fn save_message(&self, message: &ChatMessage) -> Result<()> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        let path = self.path_for(&message.user_id);

        let lock = self.user_lock(&message.user_id);
        let _held = lock.lock().await;

        // Disk first; the cache only follows a successful write.
        tokio::task::spawn_blocking(move || {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(Error::Io)?;
            file.write_all(line.as_bytes()).map_err(Error::Io)?;
            Ok::<(), Error>(())
        })
        .await
        .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))??;

        // Only extend users already loaded; others are read from disk later.
        if let Some(cached) = self.cache.write().get_mut(&message.user_id) {
            cached.push(message.clone());
        }
        Ok(())
    }

    async fn list(&self, user_id: &str, thread_id: Option<&str>) -> Result<Vec<ChatMessage>> {
        if let Some(cached) = self.cache.read().get(user_id).cloned() {
            return Ok(filter_thread(cached, thread_id));
        }

        let lock = self.user_lock(user_id);
        let _held = lock.lock().await;
        // A concurrent list may have loaded the user while we waited.
        if let Some(cached) = self.cache.read().get(user_id).cloned() {
            return Ok(filter_thread(cached, thread_id));
        }

        let path = self.path_for(user_id);
        let uid = user_id.to_owned();
        let loaded = tokio::task::spawn_blocking(move || read_jsonl_file(&path, &uid))
            .await
            .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))??;
        self.cache.write().insert(user_id.to_owned(), loaded.clone());
        Ok(filter_thread(loaded, thread_id))
    }
}

fn read_jsonl_file(path: &Path, user_id: &str) -> Result<Vec<ChatMessage>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
    let mut messages = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ChatMessage>(line) {
            Ok(m) => messages.push(m),
            Err(e) => {
                tracing::warn!(
                    user_id = user_id,
                    error = %e,
                    "skipping malformed history line"
                );
            }
        }
    }
    Ok(messages)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
