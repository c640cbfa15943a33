//! Thread registry: which upstream thread each user is talking in.
//!
//! One handle per user. Switching personality discards the old handle and
//! creates a fresh thread, because an upstream thread is bound to the
//! assistant that answers in it.
//!
//! Resolution for the same user is serialized by a per-user async mutex so
//! two concurrent first turns cannot both create a thread. Different users
//! never wait on each other.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tr_domain::chat::{Personality, ThreadHandle};
use tr_domain::config::PersonalityTable;
use tr_domain::error::{Error, Result};
use tr_domain::trace::TraceEvent;

pub struct ThreadRegistry {
    personalities: PersonalityTable,
    handles: RwLock<HashMap<String, ThreadHandle>>,
    user_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ThreadRegistry {
    pub fn new(personalities: PersonalityTable) -> Self {
        Self {
            personalities,
            handles: RwLock::new(HashMap::new()),
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the thread a turn should go to.
    ///
    /// - an explicit `thread_id` is trusted as-is and the stored handle is
    ///   left untouched;
    /// - otherwise the stored handle is reused when its personality matches;
    /// - otherwise `create` is awaited for a new upstream thread id, which
    ///   replaces whatever was stored.
    ///
    /// A failed `create` stores nothing and yields [`Error::ThreadCreation`].
    pub async fn resolve_thread<F, Fut>(
        &self,
        user_id: &str,
        personality: Personality,
        explicit_thread_id: Option<&str>,
        create: F,
    ) -> Result<ThreadHandle>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let assistant_id = self.personalities.assistant_id(personality)?;

        if let Some(thread_id) = explicit_thread_id.filter(|t| !t.is_empty()) {
            let handle = ThreadHandle {
                thread_id: thread_id.to_owned(),
                assistant_id,
                personality,
            };
            emit_resolved(user_id, &handle, false, true);
            return Ok(handle);
        }

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let existing = self.handles.read().get(user_id).cloned();
        if let Some(handle) = existing.filter(|h| h.personality == personality) {
            emit_resolved(user_id, &handle, false, false);
            return Ok(handle);
        }

        let thread_id = create().await.map_err(|e| match e {
            Error::ThreadCreation(msg) => Error::ThreadCreation(msg),
            other => Error::ThreadCreation(other.to_string()),
        })?;

        let handle = ThreadHandle {
            thread_id,
            assistant_id,
            personality,
        };
        self.handles
            .write()
            .insert(user_id.to_owned(), handle.clone());
        emit_resolved(user_id, &handle, true, false);
        Ok(handle)
    }

    pub fn get(&self, user_id: &str) -> Option<ThreadHandle> {
        self.handles.read().get(user_id).cloned()
    }

    /// Drop the stored handle so the next turn starts a new thread.
    pub fn forget(&self, user_id: &str) -> Option<ThreadHandle> {
        self.handles.write().remove(user_id)
    }

    pub fn len(&self) -> usize {
        self.handles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.read().is_empty()
    }

    pub fn personalities(&self) -> &PersonalityTable {
        &self.personalities
    }

    /// Remove per-user locks nobody is holding or waiting on.
    pub fn prune_idle_locks(&self) {
        let mut locks = self.user_locks.lock();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1 || lock.try_lock().is_err());
    }

    fn user_lock(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.user_locks
            .lock()
            .entry(user_id.to_owned())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

fn emit_resolved(user_id: &str, handle: &ThreadHandle, is_new: bool, explicit: bool) {
    TraceEvent::ThreadResolved {
        user_id: user_id.to_owned(),
        thread_id: handle.thread_id.clone(),
        personality: handle.personality.to_string(),
        is_new,
        explicit,
    }
    .emit();
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn table() -> PersonalityTable {
        let mut table = PersonalityTable::default();
        for (p, id) in [(Personality::Mentor, "asst_m"), (Personality::Companion, "asst_c")] {
            if let Some(profile) = table.0.get_mut(&p) {
                profile.assistant_id = id.into();
            }
        }
        table
    }

    /// Hands out `thread_1`, `thread_2`, ... and counts calls.
    #[derive(Clone, Default)]
    struct Minter(Arc<AtomicUsize>);

    impl Minter {
        fn create(&self) -> impl Future<Output = Result<String>> {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(format!("thread_{n}")) }
        }

        fn calls(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    async fn resolve(
        reg: &ThreadRegistry,
        mint: &Minter,
        personality: Personality,
    ) -> ThreadHandle {
        reg.resolve_thread("u1", personality, None, || mint.create())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn same_personality_reuses_thread() {
        let reg = ThreadRegistry::new(table());
        let mint = Minter::default();

        let a1 = resolve(&reg, &mint, Personality::Mentor).await;
        let a2 = resolve(&reg, &mint, Personality::Mentor).await;
        assert_eq!(a1.thread_id, a2.thread_id);
        assert_eq!(a1.assistant_id, "asst_m");
        assert_eq!(mint.calls(), 1);
    }

    #[tokio::test]
    async fn switching_personality_discards_old_thread() {
        let reg = ThreadRegistry::new(table());
        let mint = Minter::default();

        let a = resolve(&reg, &mint, Personality::Mentor).await;
        let b = resolve(&reg, &mint, Personality::Companion).await;
        assert_ne!(a.thread_id, b.thread_id);
        assert_eq!(b.assistant_id, "asst_c");

        let a_again = resolve(&reg, &mint, Personality::Mentor).await;
        assert_ne!(a_again.thread_id, a.thread_id);
        assert_ne!(a_again.thread_id, b.thread_id);
        assert_eq!(mint.calls(), 3);
    }

    #[tokio::test]
    async fn explicit_thread_id_is_trusted_and_not_stored() {
        let reg = ThreadRegistry::new(table());
        let mint = Minter::default();

        let stored = resolve(&reg, &mint, Personality::Mentor).await;
        let explicit = reg
            .resolve_thread("u1", Personality::Companion, Some("thread_x"), || mint.create())
            .await
            .unwrap();
        assert_eq!(explicit.thread_id, "thread_x");
        assert_eq!(explicit.assistant_id, "asst_c");
        assert_eq!(reg.get("u1").unwrap(), stored);
        assert_eq!(mint.calls(), 1);
    }

    #[tokio::test]
    async fn creation_failure_stores_nothing() {
        let reg = ThreadRegistry::new(table());
        let err = reg
            .resolve_thread("u1", Personality::Mentor, None, || async {
                Err(Error::Http("connection refused".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ThreadCreation(ref m) if m.contains("connection refused")));
        assert!(reg.get("u1").is_none());
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn missing_assistant_id_is_config_error() {
        let reg = ThreadRegistry::new(PersonalityTable::default());
        let err = reg
            .resolve_thread("u1", Personality::Mentor, None, || async { Ok("t".to_string()) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn concurrent_first_turns_create_one_thread() {
        let reg = Arc::new(ThreadRegistry::new(table()));
        let mint = Minter::default();

        let slow_create = |mint: Minter| {
            move || async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                mint.create().await
            }
        };

        let (r1, r2) = tokio::join!(
            reg.resolve_thread("u1", Personality::Mentor, None, slow_create(mint.clone())),
            reg.resolve_thread("u1", Personality::Mentor, None, slow_create(mint.clone())),
        );
        assert_eq!(r1.unwrap().thread_id, r2.unwrap().thread_id);
        assert_eq!(mint.calls(), 1);
    }

    #[tokio::test]
    async fn forget_forces_new_thread() {
        let reg = ThreadRegistry::new(table());
        let mint = Minter::default();

        let first = resolve(&reg, &mint, Personality::Mentor).await;
        assert_eq!(reg.forget("u1").unwrap(), first);
        let second = resolve(&reg, &mint, Personality::Mentor).await;
        assert_ne!(first.thread_id, second.thread_id);
        assert_eq!(reg.len(), 1);
    }

    #[tokio::test]
    async fn idle_locks_are_pruned() {
        let reg = ThreadRegistry::new(table());
        let mint = Minter::default();
        resolve(&reg, &mint, Personality::Mentor).await;
        assert_eq!(reg.user_locks.lock().len(), 1);
        reg.prune_idle_locks();
        assert!(reg.user_locks.lock().is_empty());
    }
}
