// cache.rs - Shared, key-addressed store of loaded resources
//
// Lock discipline: the cache mutex is never held while a loader runs or while
// a release hook runs. A key being loaded is marked `Loading`; other threads
// asking for it wait on the condition variable until the load settles, and the
// loading thread itself gets `CyclicLoad` if its loader recurses into the key.

use crate::{Loader, Persistence, ResourceError, ResourceHandle, ResourceKey};
use serde::Serialize;
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

type Value = Arc<dyn Any + Send + Sync>;
type ReleaseHook = Box<dyn Fn(&Value) + Send + Sync>;

struct Entry {
    value: Value,
    holds: usize,
    persistence: Persistence,
    epoch: u64,
    release: ReleaseHook,
}

enum Slot {
    Loading { thread: ThreadId },
    Ready(Entry),
}

#[derive(Default)]
struct Inner {
    slots: HashMap<ResourceKey, Slot>,
    stats: CacheStats,
    next_epoch: u64,
}

struct Shared {
    inner: Mutex<Inner>,
    settled: Condvar,
}

/// Counters describing cache traffic since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Resolutions served from an existing entry.
    pub hits: u64,
    /// Resolutions that had to invoke a loader.
    pub misses: u64,
    pub loads: u64,
    pub failures: u64,
    pub evictions: u64,
}

/// Outcome of [`ResourceCache::sweep`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted: Vec<ResourceKey>,
    pub retained: usize,
}

/// Driver-scoped resource cache. Clones share the same storage.
#[derive(Clone)]
pub struct ResourceCache {
    shared: Arc<Shared>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
                settled: Condvar::new(),
            }),
        }
    }

    /// Create an unresolved handle for `path` decoded by `loader`.
    pub fn make_handle<L: Loader>(
        &self,
        path: impl Into<String>,
        loader: Arc<L>,
        persistence: Persistence,
    ) -> ResourceHandle<L::Output> {
        ResourceHandle::new(self.clone(), path.into(), loader, persistence)
    }

    /// Find or load the value for `key` and take one hold on it.
    ///
    /// Returns the value and the epoch of the entry the hold was taken on.
    pub(crate) fn acquire<T: Send + Sync + 'static>(
        &self,
        key: &ResourceKey,
        loader: &Arc<dyn Loader<Output = T>>,
        persistence: Persistence,
    ) -> Result<(Arc<T>, u64), ResourceError> {
        let current = thread::current().id();
        let mut inner = self.lock();

        loop {
            let in_flight = match inner.slots.get_mut(key) {
                Some(Slot::Ready(entry)) => {
                    let value = downcast::<T>(key, &entry.value)?;
                    entry.holds += 1;
                    entry.persistence = entry.persistence.max(persistence);
                    let epoch = entry.epoch;
                    inner.stats.hits += 1;
                    tracing::trace!(%key, "resource cache hit");
                    return Ok((value, epoch));
                }
                Some(Slot::Loading { thread }) if *thread == current => {
                    return Err(ResourceError::CyclicLoad { key: key.clone() });
                }
                Some(Slot::Loading { .. }) => true,
                None => false,
            };
            if !in_flight {
                break;
            }
            inner = self
                .shared
                .settled
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }

        inner
            .slots
            .insert(key.clone(), Slot::Loading { thread: current });
        inner.stats.misses += 1;
        drop(inner);

        let guard = LoadingGuard { cache: self, key };
        tracing::debug!(%key, "loading resource");
        let loaded = loader.load(key.path());
        guard.disarm();

        let mut inner = self.lock();
        let result = match loaded {
            Ok(value) => {
                let value = Arc::new(value);
                let epoch = inner.next_epoch;
                inner.next_epoch += 1;
                inner.stats.loads += 1;

                let hook_loader = Arc::clone(loader);
                let release: ReleaseHook = Box::new(move |value: &Value| {
                    if let Some(value) = value.downcast_ref::<T>() {
                        hook_loader.release(value);
                    }
                });
                let erased: Value = value.clone();
                inner.slots.insert(
                    key.clone(),
                    Slot::Ready(Entry {
                        value: erased,
                        holds: 1,
                        persistence,
                        epoch,
                        release,
                    }),
                );
                Ok((value, epoch))
            }
            Err(source) => {
                inner.slots.remove(key);
                inner.stats.failures += 1;
                tracing::warn!(%key, error = %source, "resource load failed");
                Err(ResourceError::LoadFailed {
                    key: key.clone(),
                    source,
                })
            }
        };
        drop(inner);
        self.shared.settled.notify_all();
        result
    }

    /// Drop one hold taken at `epoch`. Holds on an older epoch (the entry was
    /// evicted and reloaded since) are ignored.
    pub(crate) fn release(&self, key: &ResourceKey, epoch: u64) {
        let evicted = {
            let mut inner = self.lock();
            let remove = match inner.slots.get_mut(key) {
                Some(Slot::Ready(entry)) if entry.epoch == epoch => {
                    entry.holds = entry.holds.saturating_sub(1);
                    entry.holds == 0 && entry.persistence == Persistence::Ephemeral
                }
                _ => false,
            };
            if remove {
                inner.stats.evictions += 1;
                inner.slots.remove(key)
            } else {
                None
            }
        };

        if let Some(Slot::Ready(entry)) = evicted {
            tracing::debug!(%key, "ephemeral resource evicted");
            (entry.release)(&entry.value);
        }
    }

    /// Evict every unheld entry that is not `Persistent`.
    pub fn sweep(&self) -> SweepReport {
        let (evicted, retained) = {
            let mut inner = self.lock();
            let doomed: Vec<ResourceKey> = inner
                .slots
                .iter()
                .filter_map(|(key, slot)| match slot {
                    Slot::Ready(entry)
                        if entry.holds == 0 && entry.persistence != Persistence::Persistent =>
                    {
                        Some(key.clone())
                    }
                    _ => None,
                })
                .collect();

            let mut evicted = Vec::with_capacity(doomed.len());
            for key in doomed {
                if let Some(Slot::Ready(entry)) = inner.slots.remove(&key) {
                    evicted.push((key, entry));
                }
            }
            inner.stats.evictions += evicted.len() as u64;
            (evicted, inner.slots.len())
        };

        let mut report = SweepReport {
            evicted: Vec::with_capacity(evicted.len()),
            retained,
        };
        for (key, entry) in evicted {
            (entry.release)(&entry.value);
            report.evicted.push(key);
        }
        report.evicted.sort();

        tracing::debug!(evicted = report.evicted.len(), retained, "resource cache swept");
        report
    }

    /// Evict `key` regardless of holds or persistence. Outstanding handles keep
    /// their value but stop counting against the cache.
    pub fn evict(&self, key: &ResourceKey) -> bool {
        let removed = {
            let mut inner = self.lock();
            match inner.slots.get(key) {
                Some(Slot::Ready(_)) => {
                    inner.stats.evictions += 1;
                    inner.slots.remove(key)
                }
                _ => None,
            }
        };

        match removed {
            Some(Slot::Ready(entry)) => {
                tracing::debug!(%key, holds = entry.holds, "resource evicted");
                (entry.release)(&entry.value);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        matches!(self.lock().slots.get(key), Some(Slot::Ready(_)))
    }

    /// Current hold count, `None` if the key is not cached.
    pub fn hold_count(&self, key: &ResourceKey) -> Option<usize> {
        match self.lock().slots.get(key) {
            Some(Slot::Ready(entry)) => Some(entry.holds),
            _ => None,
        }
    }

    /// Effective persistence of a cached key.
    pub fn persistence(&self, key: &ResourceKey) -> Option<Persistence> {
        match self.lock().slots.get(key) {
            Some(Slot::Ready(entry)) => Some(entry.persistence),
            _ => None,
        }
    }

    /// Number of resolved entries.
    pub fn len(&self) -> usize {
        self.lock()
            .slots
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolved keys, sorted.
    pub fn keys(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<ResourceKey> = self
            .lock()
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("entries", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}

fn downcast<T: Send + Sync + 'static>(key: &ResourceKey, value: &Value) -> Result<Arc<T>, ResourceError> {
    Arc::clone(value)
        .downcast::<T>()
        .map_err(|_| ResourceError::TypeMismatch {
            key: key.clone(),
            expected: type_name::<T>(),
        })
}

/// Clears a `Loading` marker if the loader unwinds, so waiters do not hang.
struct LoadingGuard<'a> {
    cache: &'a ResourceCache,
    key: &'a ResourceKey,
}

impl LoadingGuard<'_> {
    fn disarm(self) {
        std::mem::forget(self);
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.cache.lock();
        if matches!(inner.slots.get(self.key), Some(Slot::Loading { .. })) {
            inner.slots.remove(self.key);
        }
        drop(inner);
        self.cache.shared.settled.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FnLoader;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    fn counting_loader(id: &str) -> (Arc<AtomicUsize>, Arc<impl Loader<Output = String>>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let loader = FnLoader::new(id, move |path: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(format!("contents of {path}"))
        });
        (calls, Arc::new(loader))
    }

    #[test]
    fn equal_keys_share_one_value() {
        let cache = ResourceCache::new();
        let (calls, loader) = counting_loader("text");

        let a = cache.make_handle("a.txt", Arc::clone(&loader), Persistence::Scene);
        let b = cache.make_handle("a.txt", loader, Persistence::Scene);

        let first = a.resolve().unwrap();
        let second = b.resolve().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.hold_count(a.key()), Some(2));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().loads, 1);
    }

    #[test]
    fn strongest_persistence_wins() {
        let cache = ResourceCache::new();
        let (_, loader) = counting_loader("text");
        let weak = cache.make_handle("a.txt", Arc::clone(&loader), Persistence::Ephemeral);
        let strong = cache.make_handle("a.txt", loader, Persistence::Persistent);

        weak.resolve().unwrap();
        strong.resolve().unwrap();
        assert_eq!(cache.persistence(weak.key()), Some(Persistence::Persistent));

        drop(weak);
        drop(strong);
        assert!(cache.sweep().evicted.is_empty());
        assert_eq!(cache.hold_count(&ResourceKey::new("a.txt", "text")), Some(0));
    }

    #[test]
    fn ephemeral_entries_go_at_zero_holds() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let loader = Arc::new(
            FnLoader::new("n", |_: &str| Ok(7u32))
                .with_release(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
        );

        let cache = ResourceCache::new();
        let handle = cache.make_handle("seven", loader, Persistence::Ephemeral);
        handle.resolve().unwrap();
        let key = handle.key().clone();
        assert!(cache.contains(&key));

        drop(handle);
        assert!(!cache.contains(&key));
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn sweep_releases_unheld_scene_entries() {
        let released = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&released);
        let loader = Arc::new(
            FnLoader::new("text", |path: &str| Ok(path.to_uppercase()))
                .with_release(move |value: &String| sink.lock().unwrap().push(value.clone())),
        );

        let cache = ResourceCache::new();
        let held = cache.make_handle("held", Arc::clone(&loader), Persistence::Scene);
        let dropped = cache.make_handle("dropped", Arc::clone(&loader), Persistence::Scene);
        let pinned = cache.make_handle("pinned", loader, Persistence::Persistent);
        held.resolve().unwrap();
        dropped.resolve().unwrap();
        pinned.resolve().unwrap();
        drop(dropped);
        drop(pinned);

        let report = cache.sweep();
        assert_eq!(report.evicted, vec![ResourceKey::new("dropped", "text")]);
        assert_eq!(report.retained, 2);
        assert_eq!(*released.lock().unwrap(), vec!["DROPPED".to_string()]);
    }

    #[test]
    fn evicted_value_survives_in_old_handles() {
        let cache = ResourceCache::new();
        let (calls, loader) = counting_loader("text");
        let old = cache.make_handle("a", Arc::clone(&loader), Persistence::Persistent);
        let before = old.resolve().unwrap();

        assert!(cache.evict(old.key()));
        assert!(!cache.evict(old.key()));

        let fresh = cache.make_handle("a", loader, Persistence::Scene);
        let after = fresh.resolve().unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // The stale hold does not count against the reloaded entry.
        drop(old);
        assert_eq!(cache.hold_count(fresh.key()), Some(1));
    }

    #[test]
    fn failed_load_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let loader = Arc::new(FnLoader::new("flaky", move |_: &str| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err("not yet".into())
            } else {
                Ok(1u8)
            }
        }));

        let cache = ResourceCache::new();
        let handle = cache.make_handle("x", loader, Persistence::Scene);
        let error = handle.resolve().unwrap_err();
        assert!(error.is_retryable());
        assert!(!cache.contains(handle.key()));

        assert_eq!(*handle.resolve().unwrap(), 1);
        assert_eq!(cache.stats().failures, 1);
        assert_eq!(cache.stats().loads, 1);
    }

    #[test]
    fn same_id_different_type_is_a_mismatch() {
        let cache = ResourceCache::new();
        let text = Arc::new(FnLoader::new("shared", |_: &str| Ok(String::from("s"))));
        let number = Arc::new(FnLoader::new("shared", |_: &str| Ok(1u32)));

        cache.make_handle("k", text, Persistence::Scene).resolve().unwrap();
        let error = cache
            .make_handle("k", number, Persistence::Scene)
            .resolve()
            .unwrap_err();
        assert!(matches!(error, ResourceError::TypeMismatch { .. }));
    }

    #[test]
    fn concurrent_resolution_joins_one_load() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let loader = Arc::new(FnLoader::new("slow", move |_: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            Ok(vec![0u8; 16])
        }));

        let cache = ResourceCache::new();
        let barrier = Arc::new(Barrier::new(4));
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let handle = cache.make_handle("blob", Arc::clone(&loader), Persistence::Scene);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    let value = handle.resolve().unwrap();
                    (handle, value)
                })
            })
            .collect();

        let results: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for (_, value) in &results[1..] {
            assert!(Arc::ptr_eq(value, &results[0].1));
        }
        assert_eq!(cache.hold_count(&ResourceKey::new("blob", "slow")), Some(4));
    }

    #[test]
    fn reentrant_load_is_cyclic() {
        let cache = ResourceCache::new();
        let inner_cache = cache.clone();
        let loader = Arc::new(FnLoader::new("loop", move |path: &str| {
            let again = Arc::new(FnLoader::new("loop", |_: &str| Ok(0u8)));
            match inner_cache.make_handle(path, again, Persistence::Scene).resolve() {
                Err(ResourceError::CyclicLoad { .. }) => Ok(1u8),
                _ => Err("expected a cycle".into()),
            }
        }));

        let handle = cache.make_handle("self", loader, Persistence::Scene);
        assert_eq!(*handle.resolve().unwrap(), 1);
    }
}
