//! Live state — the observable, persisted record handed to the application.
//!
//! `LiveState` is an event-emitting wrapper: every mutation through
//! [`update`](LiveState::update) synchronously notifies subscribers. The
//! binding entry point [`bind_persistent_state`] restores a validated
//! snapshot, merges it over the caller's initial state, and wires a
//! save-on-change subscription so the state survives restarts.

use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::persister::Persister;
use crate::protocol::{restore_validated, save_snapshot};
use crate::types::BindOptions;

type ChangeListener<T> = Box<dyn Fn(&T) + Send + Sync>;

/// Observable, persisted state record.
///
/// Mutations go through [`update`](LiveState::update), which notifies every
/// subscriber synchronously after the mutation. Subscriptions are
/// fire-and-forget and live as long as the state; there is no unsubscribe
/// path. `Clone` shares the same underlying record.
pub struct LiveState<T> {
    inner: Arc<LiveInner<T>>,
}

impl<T> Clone for LiveState<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct LiveInner<T> {
    state: Mutex<T>,
    listeners: Mutex<Vec<ChangeListener<T>>>,
    /// Kept for manual invalidation by the application (e.g. on logout).
    persister: Persister<T>,
}

impl<T> LiveState<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + 'static,
{
    fn new(state: T, persister: Persister<T>) -> Self {
        Self {
            inner: Arc::new(LiveInner {
                state: Mutex::new(state),
                listeners: Mutex::new(Vec::new()),
                persister,
            }),
        }
    }

    /// A clone of the current state.
    pub fn get(&self) -> T {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Mutate the state and notify all subscribers.
    pub fn update(&self, mutate: impl FnOnce(&mut T)) {
        let current = {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            mutate(&mut state);
            state.clone()
        };
        let listeners = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for listener in listeners.iter() {
            listener(&current);
        }
    }

    /// Register a change listener, notified after every mutation.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Box::new(listener));
    }

    /// The persister bound to this state, for manual invalidation.
    pub fn persister(&self) -> &Persister<T> {
        &self.inner.persister
    }
}

/// Bind `initial` to persistent storage and return the live, observable,
/// persisted state.
///
/// Restores a validated snapshot (if any) and shallow-merges it over
/// `initial`: restored fields win field-by-field, and fields present only in
/// `initial` survive. Every subsequent mutation queues a throttled save; the
/// save path defers on a tokio timer, so mutations made with no runtime
/// present are not persisted (the save is dropped with a warning).
pub fn bind_persistent_state<T>(initial: T, options: BindOptions<T>) -> LiveState<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + 'static,
{
    let BindOptions {
        persister_options,
        max_age,
        version,
        persister,
    } = options;

    // An explicit persister always wins over the inline backend options.
    let persister = persister.unwrap_or_else(|| Persister::new(persister_options));

    let state = match restore_validated(&persister, max_age, version) {
        Some(restored) => shallow_merge(initial, restored),
        None => initial,
    };

    let live = LiveState::new(state, persister.clone());

    live.subscribe(move |current: &T| {
        save_snapshot(&persister, current.clone(), version);
    });

    live
}

/// Shallow-merge `restored` over `initial` at the JSON-object level.
///
/// Restored keys overwrite initial ones; keys absent from the restored
/// payload keep their initial values. Non-object states (or a merge result
/// that no longer decodes as `T`) fall back to `restored` wholesale.
fn shallow_merge<T>(initial: T, restored: T) -> T
where
    T: Serialize + DeserializeOwned,
{
    let Ok(serde_json::Value::Object(mut base)) = serde_json::to_value(&initial) else {
        return restored;
    };
    let Ok(serde_json::Value::Object(overlay)) = serde_json::to_value(&restored) else {
        return restored;
    };

    for (key, value) in overlay {
        base.insert(key, value);
    }

    match serde_json::from_value(serde_json::Value::Object(base)) {
        Ok(merged) => merged,
        Err(e) => {
            debug!(error = %e, "merged state no longer decodes, using restored state");
            restored
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryStore, StorageBackend};
    use crate::types::{now_ms, Snapshot};
    use serde::Deserialize;
    use std::time::Duration;
    use tokio::time::sleep;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        count: u64,
    }

    fn options(backend: Arc<MemoryStore>) -> BindOptions<Counter> {
        BindOptions::new("k")
            .with_backend(backend)
            .with_version(1)
            .with_throttle_interval(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn fresh_init_persists_mutations() {
        let backend = Arc::new(MemoryStore::new());
        let live = bind_persistent_state(Counter { count: 0 }, options(Arc::clone(&backend)));

        assert_eq!(live.get(), Counter { count: 0 });

        live.update(|state| state.count = 1);
        sleep(Duration::from_millis(80)).await;

        let raw = backend.get("k").unwrap().expect("snapshot written");
        let stored: Snapshot<Counter> = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored.version, 1);
        assert!(stored.timestamp.is_some());
        assert_eq!(stored.state, Some(Counter { count: 1 }));
    }

    #[tokio::test]
    async fn reinit_restores_persisted_state() {
        let backend = Arc::new(MemoryStore::new());

        let live = bind_persistent_state(Counter { count: 0 }, options(Arc::clone(&backend)));
        live.update(|state| state.count = 1);
        sleep(Duration::from_millis(80)).await;

        // Second initialization against the same backend and key.
        let revived = bind_persistent_state(Counter { count: 0 }, options(Arc::clone(&backend)));
        assert_eq!(revived.get(), Counter { count: 1 });
    }

    #[tokio::test]
    async fn version_bump_discards_stored_state() {
        let backend = Arc::new(MemoryStore::new());

        let live = bind_persistent_state(Counter { count: 0 }, options(Arc::clone(&backend)));
        live.update(|state| state.count = 5);
        sleep(Duration::from_millis(80)).await;

        let revived = bind_persistent_state(
            Counter { count: 0 },
            options(Arc::clone(&backend)).with_version(2),
        );
        assert_eq!(revived.get(), Counter { count: 0 });
        assert_eq!(backend.get("k").unwrap(), None);
    }

    #[tokio::test]
    async fn expired_snapshot_falls_back_to_initial() {
        let backend = Arc::new(MemoryStore::new());
        let stale = now_ms() - 60_000;
        backend
            .set(
                "k",
                &format!(r#"{{"timestamp":{stale},"version":1,"state":{{"count":7}}}}"#),
            )
            .unwrap();

        let live = bind_persistent_state(
            Counter { count: 0 },
            options(Arc::clone(&backend)).with_max_age(Duration::from_millis(1_000)),
        );
        assert_eq!(live.get(), Counter { count: 0 });
        assert_eq!(backend.get("k").unwrap(), None);
    }

    #[tokio::test]
    async fn restored_fields_merge_over_initial() {
        // A stored payload that only defines some fields: initial-only
        // fields must survive the merge.
        let backend = Arc::new(MemoryStore::new());
        backend
            .set(
                "k",
                &format!(
                    r#"{{"timestamp":{},"version":1,"state":{{"count":3}}}}"#,
                    now_ms()
                ),
            )
            .unwrap();

        let initial = serde_json::json!({"count": 0, "name": "fresh"});
        let live = bind_persistent_state(
            initial,
            BindOptions::new("k").with_backend(backend).with_version(1),
        );
        assert_eq!(live.get(), serde_json::json!({"count": 3, "name": "fresh"}));
    }

    #[tokio::test]
    async fn explicit_persister_wins_over_inline_options() {
        let bound_backend = Arc::new(MemoryStore::new());
        let ignored_backend = Arc::new(MemoryStore::new());

        let persister = Persister::new(
            crate::types::PersisterOptions::new("k")
                .with_backend(Arc::clone(&bound_backend) as Arc<dyn StorageBackend>)
                .with_throttle_interval(Duration::from_millis(10)),
        );

        let live = bind_persistent_state(
            Counter { count: 0 },
            options(Arc::clone(&ignored_backend)).with_persister(persister),
        );
        live.update(|state| state.count = 2);
        sleep(Duration::from_millis(60)).await;

        assert!(bound_backend.get("k").unwrap().is_some());
        assert!(ignored_backend.get("k").unwrap().is_none());
    }

    #[tokio::test]
    async fn no_backend_binding_still_works() {
        let live = bind_persistent_state(Counter { count: 0 }, BindOptions::new("k"));
        live.update(|state| state.count = 9);
        assert_eq!(live.get(), Counter { count: 9 });
    }

    #[tokio::test]
    async fn subscribers_see_every_mutation() {
        let live = bind_persistent_state(Counter { count: 0 }, BindOptions::new("k"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        live.subscribe(move |state: &Counter| {
            sink.lock().unwrap().push(state.count);
        });

        live.update(|state| state.count = 1);
        live.update(|state| state.count = 2);

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn manual_invalidation_through_attached_persister() {
        let backend = Arc::new(MemoryStore::new());
        let live = bind_persistent_state(Counter { count: 0 }, options(Arc::clone(&backend)));

        live.update(|state| state.count = 1);
        sleep(Duration::from_millis(80)).await;
        assert!(backend.get("k").unwrap().is_some());

        live.persister().remove();
        assert_eq!(backend.get("k").unwrap(), None);
    }
}
