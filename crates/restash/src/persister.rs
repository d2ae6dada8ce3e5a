//! Persister — the persist/restore/remove capability bound to one key.
//!
//! A `Persister` closes over one storage backend, one key, one codec pair,
//! and one throttle interval. Built without a backend it degrades to a total
//! no-op, so callers run identically in environments with no storage.
//! Persistence is best-effort: write failures are logged and swallowed, never
//! surfaced to the owning application.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::StorageBackend;
use crate::error::PersistResult;
use crate::throttle::Throttle;
use crate::types::{DeserializeFn, PersisterOptions, Snapshot};

/// Persist/restore/remove operations over a single storage key.
///
/// `Clone` shares the same backend, throttle, and codec; one persister
/// exclusively owns its key (no locking across persisters sharing a key,
/// last write wins at the backend).
pub struct Persister<T> {
    inner: Arc<PersisterInner<T>>,
}

impl<T> Clone for Persister<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct PersisterInner<T> {
    backend: Option<Arc<dyn StorageBackend>>,
    key: String,
    deserialize: DeserializeFn<T>,
    /// Throttled write path; `None` when there is no backend.
    save: Option<Throttle<Snapshot<T>>>,
}

impl<T> Persister<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Build a persister from options.
    pub fn new(options: PersisterOptions<T>) -> Self {
        let PersisterOptions {
            backend,
            key,
            throttle_interval,
            serialize,
            deserialize,
        } = options;

        let save = backend.as_ref().map(|backend| {
            let backend = Arc::clone(backend);
            let key = key.clone();
            Throttle::new(throttle_interval, move |snapshot: Snapshot<T>| {
                let result = serialize(&snapshot)
                    .and_then(|serialized| backend.set(&key, &serialized));
                if let Err(e) = result {
                    // Best-effort: quota or disabled storage must not crash
                    // the owning application.
                    warn!(%key, error = %e, "failed to persist snapshot");
                }
            })
        });

        Self {
            inner: Arc::new(PersisterInner {
                backend,
                key,
                deserialize,
                save,
            }),
        }
    }

    /// The storage key this persister owns.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Queue `snapshot` for a throttled write to the backend.
    ///
    /// Bursts within one throttle interval collapse to a single write
    /// carrying the latest snapshot. Never fails: serialization and backend
    /// errors are logged and dropped, and without an ambient tokio runtime
    /// the write itself is dropped with a warning.
    pub fn persist(&self, snapshot: Snapshot<T>) {
        if let Some(save) = &self.inner.save {
            save.call(snapshot);
        }
    }

    /// Read and decode the stored snapshot.
    ///
    /// Returns `Ok(None)` when there is no backend or no (or empty) payload
    /// under the key. Deserialization errors propagate; the restore protocol
    /// one layer up turns them into a cache miss.
    pub fn restore(&self) -> PersistResult<Option<Snapshot<T>>> {
        let Some(backend) = &self.inner.backend else {
            return Ok(None);
        };
        match backend.get(&self.inner.key)? {
            Some(raw) if !raw.is_empty() => {
                let snapshot = (self.inner.deserialize)(&raw)?;
                Ok(Some(snapshot))
            }
            _ => Ok(None),
        }
    }

    /// Remove the stored payload unconditionally.
    ///
    /// Does not cancel a pending throttled write: a persist already queued
    /// can re-create the key after removal. Callers needing strict
    /// invalidation must serialize their own remove/persist calls.
    pub fn remove(&self) {
        if let Some(backend) = &self.inner.backend {
            if let Err(e) = backend.remove(&self.inner.key) {
                debug!(key = %self.inner.key, error = %e, "failed to remove entry");
            }
        }
    }
}
