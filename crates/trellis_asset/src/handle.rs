use crate::{Loader, Persistence, ResourceCache, ResourceError, ResourceKey};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Observable resolution state of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Unresolved,
    Resolved,
    Failed,
}

enum Slot<T> {
    Unresolved,
    Resolved { value: Arc<T>, epoch: u64 },
    Failed,
}

/// Lazily resolved reference to a cached resource.
///
/// A handle holds at most one count on its cache entry: taken on the first
/// successful [`resolve`](Self::resolve), given back by
/// [`release`](Self::release) or on drop. Cloning yields a fresh unresolved
/// handle for the same key.
pub struct ResourceHandle<T: Send + Sync + 'static> {
    key: ResourceKey,
    loader: Arc<dyn Loader<Output = T>>,
    persistence: Persistence,
    cache: ResourceCache,
    slot: Mutex<Slot<T>>,
}

impl<T: Send + Sync + 'static> ResourceHandle<T> {
    pub(crate) fn new<L>(cache: ResourceCache, path: String, loader: Arc<L>, persistence: Persistence) -> Self
    where
        L: Loader<Output = T>,
    {
        let loader: Arc<dyn Loader<Output = T>> = loader;
        Self::from_dyn(cache, path, loader, persistence)
    }

    pub(crate) fn from_dyn(
        cache: ResourceCache,
        path: String,
        loader: Arc<dyn Loader<Output = T>>,
        persistence: Persistence,
    ) -> Self {
        Self {
            key: ResourceKey::new(path, loader.id()),
            loader,
            persistence,
            cache,
            slot: Mutex::new(Slot::Unresolved),
        }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn persistence(&self) -> Persistence {
        self.persistence
    }

    pub fn state(&self) -> HandleState {
        match *self.lock() {
            Slot::Unresolved => HandleState::Unresolved,
            Slot::Resolved { .. } => HandleState::Resolved,
            Slot::Failed => HandleState::Failed,
        }
    }

    /// Return the value, loading it through the cache on first use.
    ///
    /// A failed resolution leaves the handle `Failed`; calling again retries.
    pub fn resolve(&self) -> Result<Arc<T>, ResourceError> {
        let mut slot = self.lock();
        if let Slot::Resolved { value, .. } = &*slot {
            return Ok(Arc::clone(value));
        }

        match self.cache.acquire(&self.key, &self.loader, self.persistence) {
            Ok((value, epoch)) => {
                *slot = Slot::Resolved {
                    value: Arc::clone(&value),
                    epoch,
                };
                Ok(value)
            }
            Err(error) => {
                *slot = Slot::Failed;
                Err(error)
            }
        }
    }

    /// The value if already resolved; never triggers a load.
    pub fn get(&self) -> Option<Arc<T>> {
        match &*self.lock() {
            Slot::Resolved { value, .. } => Some(Arc::clone(value)),
            _ => None,
        }
    }

    /// Give the hold back to the cache. The handle can be resolved again.
    pub fn release(&self) {
        let previous = std::mem::replace(&mut *self.lock(), Slot::Unresolved);
        if let Slot::Resolved { epoch, .. } = previous {
            self.cache.release(&self.key, epoch);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Send + Sync + 'static> Clone for ResourceHandle<T> {
    fn clone(&self) -> Self {
        Self::from_dyn(
            self.cache.clone(),
            self.key.path().to_string(),
            Arc::clone(&self.loader),
            self.persistence,
        )
    }
}

impl<T: Send + Sync + 'static> Drop for ResourceHandle<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: Send + Sync + 'static> fmt::Debug for ResourceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("key", &self.key)
            .field("persistence", &self.persistence)
            .field("state", &self.state())
            .finish()
    }
}
