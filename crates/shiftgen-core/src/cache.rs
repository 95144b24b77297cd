//! Short-TTL read-through cache with single-flight loading and prefix
//! invalidation.

use crate::error::ShiftError;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

pub const SHIFTS_KEY_PREFIX: &str = "shifts|";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// `shifts|<workspace or all>|<month or all>`.
    pub fn shifts(workspace: Option<&str>, month: Option<&str>) -> Self {
        let part = |value: Option<&str>| {
            value
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .unwrap_or("all")
                .to_owned()
        };
        Self(format!(
            "{SHIFTS_KEY_PREFIX}{}|{}",
            part(workspace),
            part(month)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        CacheKey::new(value)
    }
}

impl From<String> for CacheKey {
    fn from(value: String) -> Self {
        CacheKey::new(value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

type SharedLoad<V> = Shared<BoxFuture<'static, Result<V, ShiftError>>>;

enum Slot<V> {
    Ready(V),
    Loading(SharedLoad<V>),
}

struct Entry<V> {
    slot: Slot<V>,
    expires_at: Instant,
    generation: u64,
}

pub struct ReadThroughCache<V> {
    entries: Mutex<HashMap<CacheKey, Entry<V>>>,
    next_generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V> Default for ReadThroughCache<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

impl<V> ReadThroughCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, Entry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached value for `key`, or runs `factory` to populate it.
    ///
    /// Concurrent callers for a key that is already loading await the same
    /// in-flight future; `factory` runs at most once per live entry. A failed
    /// load is evicted so the next caller retries.
    pub async fn get_or_set<F, Fut>(
        &self,
        key: impl Into<CacheKey>,
        ttl: Duration,
        factory: F,
    ) -> Result<V, ShiftError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ShiftError>> + Send + 'static,
    {
        let key = key.into();
        let (load, generation) = {
            let mut entries = self.entries();
            let now = Instant::now();
            let live = entries.get(&key).filter(|entry| entry.expires_at > now);
            match live {
                Some(Entry {
                    slot: Slot::Ready(value),
                    ..
                }) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(key = key.as_str(), "cache hit");
                    return Ok(value.clone());
                }
                Some(Entry {
                    slot: Slot::Loading(load),
                    generation,
                    ..
                }) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    (load.clone(), *generation)
                }
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    let load = factory().boxed().shared();
                    entries.insert(
                        key.clone(),
                        Entry {
                            slot: Slot::Loading(load.clone()),
                            expires_at: now + ttl,
                            generation,
                        },
                    );
                    (load, generation)
                }
            }
        };

        let result = load.await;

        let mut entries = self.entries();
        let still_ours = entries
            .get(&key)
            .map(|entry| entry.generation == generation)
            .unwrap_or(false);
        if still_ours {
            match &result {
                Ok(value) => {
                    if let Some(entry) = entries.get_mut(&key) {
                        entry.slot = Slot::Ready(value.clone());
                    }
                }
                Err(_) => {
                    entries.remove(&key);
                }
            }
        }

        result
    }

    /// Drops every entry whose key starts with `prefix`, loading or not.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|key, _| !key.as_str().starts_with(prefix));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(prefix, removed, "cache entries invalidated");
        }
        removed
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn shift_keys_default_missing_parts_to_all() {
        assert_eq!(CacheKey::shifts(Some("south"), None).as_str(), "shifts|south|all");
        assert_eq!(CacheKey::shifts(None, Some("2026-02")).as_str(), "shifts|all|2026-02");
    }

    #[tokio::test]
    async fn second_read_is_served_from_cache() {
        let cache = ReadThroughCache::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let value = cache
                .get_or_set("shifts|south|2026-02", TTL, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await
                .expect("cached value");
            assert_eq!(value, 7);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats(), CacheStats { hits: 2, misses: 1 });
    }

    #[tokio::test]
    async fn concurrent_readers_share_one_in_flight_load() {
        let cache = ReadThroughCache::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let (release, gate) = tokio::sync::oneshot::channel::<()>();
        let gate = gate.shared();

        let factory = |calls: Arc<AtomicUsize>, gate: Shared<tokio::sync::oneshot::Receiver<()>>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let _ = gate.await;
                Ok(11)
            }
        };

        let first = cache.get_or_set("k", TTL, factory(calls.clone(), gate.clone()));
        let second = cache.get_or_set("k", TTL, factory(calls.clone(), gate.clone()));
        let third = cache.get_or_set("k", TTL, factory(calls.clone(), gate.clone()));
        let opener = async move {
            tokio::task::yield_now().await;
            let _ = release.send(());
        };

        let (first, second, third, ()) = tokio::join!(first, second, third, opener);
        assert_eq!(first.expect("first"), 11);
        assert_eq!(second.expect("second"), 11);
        assert_eq!(third.expect("third"), 11);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_loads_are_evicted() {
        let cache = ReadThroughCache::<u32>::new();
        let error = cache
            .get_or_set("k", TTL, || async {
                Err(ShiftError::DependencyUnavailable("store offline".to_owned()))
            })
            .await
            .expect_err("factory error surfaces");
        assert!(matches!(error, ShiftError::DependencyUnavailable(_)));

        let value = cache
            .get_or_set("k", TTL, || async { Ok(3) })
            .await
            .expect("retry after failure");
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn zero_ttl_always_reloads() {
        let cache = ReadThroughCache::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let calls = calls.clone();
            cache
                .get_or_set("k", Duration::ZERO, move || async move {
                    Ok(calls.fetch_add(1, Ordering::SeqCst) as u32)
                })
                .await
                .expect("value");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_prefix_only_touches_matching_keys() {
        let cache = ReadThroughCache::<u32>::new();
        for key in ["shifts|south|2026-02", "shifts|all|all", "trips|all"] {
            cache
                .get_or_set(key, TTL, || async { Ok(1) })
                .await
                .expect("seed");
        }

        assert_eq!(cache.invalidate_prefix(SHIFTS_KEY_PREFIX), 2);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        cache
            .get_or_set("trips|all", TTL, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(2)
            })
            .await
            .expect("still cached");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
