//! Bounded TTL cache for read-mostly upstream data.
//!
//! An entry is fresh until more than `ttl` has passed since it was set;
//! stale entries are dropped lazily on read (or by the background sweeper).
//! When the cache is full, inserting a new key evicts the key set longest
//! ago. Re-setting a key moves it to the back of that order.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tr_domain::error::Result;

/// Per-call knobs for [`TtlCache::cached_fetch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheOptions {
    /// Overrides the cache's default TTL for the stored value.
    pub ttl: Option<Duration>,
    /// Skip the lookup and always fetch (the result is still stored).
    pub bypass: bool,
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

struct CacheInner<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// Keys ordered by their most recent `set`, oldest first.
    order: VecDeque<K>,
}

impl<K: Eq + Hash, V> CacheInner<K, V> {
    fn remove(&mut self, key: &K) -> bool {
        if self.entries.remove(key).is_some() {
            self.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }
}

pub struct TtlCache<K, V> {
    inner: Mutex<CacheInner<K, V>>,
    default_ttl: Duration,
    max_size: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(default_ttl: Duration, max_size: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            default_ttl,
            max_size: max_size.max(1),
        }
    }

    /// Fresh value for `key`, or `None`. Expired entries are removed.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let expired = match inner.entries.get(key) {
            Some(e) if e.expires_at >= Instant::now() => return Some(e.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.remove(key);
        }
        None
    }

    /// Store `value` and make `key` the newest in the eviction order.
    pub fn set(&self, key: K, value: V, ttl: Option<Duration>) {
        let expires_at = Instant::now() + ttl.unwrap_or(self.default_ttl);
        let mut inner = self.inner.lock();

        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.value = value;
            entry.expires_at = expires_at;
            inner.order.retain(|k| k != &key);
            inner.order.push_back(key);
            return;
        }

        while inner.entries.len() >= self.max_size {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
        }
        inner.order.push_back(key.clone());
        inner.entries.insert(key, Entry { value, expires_at });
    }

    pub fn delete(&self, key: &K) -> bool {
        self.inner.lock().remove(key)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    /// Entries currently held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, e| e.expires_at >= now);
        let CacheInner { entries, order } = &mut *inner;
        order.retain(|k| entries.contains_key(k));
        before - entries.len()
    }

    /// Return the cached value, or run `fetch` and cache its result.
    ///
    /// A failed fetch is propagated and nothing is stored.
    pub async fn cached_fetch<F, Fut>(&self, key: K, fetch: F, opts: CacheOptions) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if !opts.bypass {
            if let Some(hit) = self.get(&key) {
                return Ok(hit);
            }
        }
        let value = fetch().await?;
        self.set(key, value.clone(), opts.ttl);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tr_domain::error::Error;

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(300), 10);
        cache.set("k", 7, Some(Duration::from_millis(100)));
        assert_eq!(cache.get(&"k"), Some(7));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.get(&"k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn full_cache_evicts_first_inserted() {
        let cache: TtlCache<String, usize> = TtlCache::new(Duration::from_secs(60), 3);
        for i in 0..3 {
            cache.set(format!("k{i}"), i, None);
        }
        cache.set("k3".into(), 3, None);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get(&"k0".to_string()), None);
        for i in 1..4 {
            assert_eq!(cache.get(&format!("k{i}")), Some(i));
        }
    }

    #[test]
    fn eviction_skips_deleted_keys() {
        let cache: TtlCache<&str, u8> = TtlCache::new(Duration::from_secs(60), 2);
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.delete(&"a");
        cache.set("c", 3, None);
        cache.set("d", 4, None);

        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"c"), Some(3));
        assert_eq!(cache.get(&"d"), Some(4));
    }

    #[test]
    fn overwrite_does_not_evict() {
        let cache: TtlCache<&str, u8> = TtlCache::new(Duration::from_secs(60), 2);
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.set("a", 10, None);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), Some(10));
        assert_eq!(cache.get(&"b"), Some(2));
    }

    #[test]
    fn reset_key_moves_to_back_of_eviction_order() {
        let cache: TtlCache<&str, u8> = TtlCache::new(Duration::from_secs(60), 2);
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.set("a", 10, None);
        cache.set("c", 3, None);

        assert_eq!(cache.get(&"a"), Some(10));
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn entry_is_fresh_at_exactly_ttl() {
        let cache: TtlCache<&str, u8> = TtlCache::new(Duration::from_secs(60), 10);
        cache.set("k", 1, Some(Duration::from_millis(100)));

        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(cache.get(&"k"), Some(1));
        assert_eq!(cache.purge_expired(), 0);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get(&"k"), None);
    }

    #[test]
    fn clear_empties_cache_and_order() {
        let cache: TtlCache<&str, u8> = TtlCache::new(Duration::from_secs(60), 2);
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&"a"), None);

        cache.set("c", 3, None);
        cache.set("d", 4, None);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"c"), Some(3));
        assert_eq!(cache.get(&"d"), Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_expired_drops_stale_entries() {
        let cache: TtlCache<&str, u8> = TtlCache::new(Duration::from_secs(60), 10);
        cache.set("short", 1, Some(Duration::from_millis(10)));
        cache.set("long", 2, None);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn cached_fetch_hits_and_bypasses() {
        let cache: TtlCache<&str, usize> = TtlCache::new(Duration::from_secs(60), 10);
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let fetch = move || async move { Ok::<_, Error>(calls.fetch_add(1, Ordering::SeqCst) + 1) };

        assert_eq!(cache.cached_fetch("k", fetch, CacheOptions::default()).await.unwrap(), 1);
        assert_eq!(cache.cached_fetch("k", fetch, CacheOptions::default()).await.unwrap(), 1);

        let bypass = CacheOptions { bypass: true, ..Default::default() };
        assert_eq!(cache.cached_fetch("k", fetch, bypass).await.unwrap(), 2);
        assert_eq!(cache.get(&"k"), Some(2));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached() {
        let cache: TtlCache<&str, usize> = TtlCache::new(Duration::from_secs(60), 10);
        let fetch = || async { Err(Error::Http("down".into())) };
        let err = cache
            .cached_fetch("k", fetch, CacheOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Http(_)));
        assert!(cache.get(&"k").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_entry_is_refetched() {
        let cache: TtlCache<&str, &str> = TtlCache::new(Duration::from_millis(50), 10);
        cache.set("k", "old", None);
        tokio::time::sleep(Duration::from_millis(60)).await;
        let v = cache
            .cached_fetch("k", || async { Ok("new") }, CacheOptions::default())
            .await
            .unwrap();
        assert_eq!(v, "new");
    }
}
