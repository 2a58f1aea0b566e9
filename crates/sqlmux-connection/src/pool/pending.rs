//! Per-key deduplication of in-flight async operations
//!
//! The first caller for a key starts the operation; callers arriving while it
//! runs await the same shared future and observe the same result. The entry
//! removes itself when the operation finishes, whatever its outcome, unless it
//! was forgotten and another operation took the key.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

pub type SharedOperation<T> = Shared<BoxFuture<'static, T>>;

struct PendingOperation<T>
where
    T: Clone + Send + Sync + 'static,
{
    generation: u64,
    operation: SharedOperation<T>,
}

pub struct PendingMap<T>
where
    T: Clone + Send + Sync + 'static,
{
    name: &'static str,
    inner: Arc<DashMap<String, PendingOperation<T>>>,
    next_generation: AtomicU64,
}

impl<T> PendingMap<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Join the operation running under `key`, or start one with `start`.
    ///
    /// Returns the shared future and whether an existing operation was joined.
    /// A started operation is also driven by a spawned task so it completes
    /// (and leaves the map) even if every caller stops waiting.
    pub fn join_or_start<F>(&self, key: &str, start: F) -> (SharedOperation<T>, bool)
    where
        F: FnOnce() -> BoxFuture<'static, T>,
    {
        match self.inner.entry(key.to_string()) {
            Entry::Occupied(existing) => {
                debug!(map = self.name, key = %key, "[PendingMap] Joining in-flight operation");
                (existing.get().operation.clone(), true)
            }
            Entry::Vacant(slot) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let map = Arc::clone(&self.inner);
                let owned_key = key.to_string();
                let name = self.name;
                let operation = start();
                let shared = async move {
                    let output = operation.await;
                    map.remove_if(&owned_key, |_, pending| pending.generation == generation);
                    debug!(map = name, key = %owned_key, "[PendingMap] Operation finished");
                    output
                }
                .boxed()
                .shared();
                slot.insert(PendingOperation {
                    generation,
                    operation: shared.clone(),
                });
                tokio::spawn(shared.clone());
                (shared, false)
            }
        }
    }

    /// Detach the operation under `key` so the next caller starts a fresh one.
    ///
    /// Callers already awaiting it still receive its result.
    pub fn forget(&self, key: &str) -> bool {
        let forgotten = self.inner.remove(key).is_some();
        if forgotten {
            debug!(map = self.name, key = %key, "[PendingMap] Operation forgotten");
        }
        forgotten
    }

    /// The operation currently running under `key`, if any
    pub fn get(&self, key: &str) -> Option<SharedOperation<T>> {
        self.inner.get(key).map(|entry| entry.operation.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
