//! restash — persistent observable state with staleness and version
//! invalidation.
//!
//! Wraps an application state record so its contents survive restarts by
//! mirroring them into a pluggable key-value [`StorageBackend`]. Snapshots
//! are timestamped and versioned; restoration discards entries that are
//! stale, version-incompatible, or malformed. Writes are throttled so bursts
//! of mutations collapse into one trailing write per interval.
//!
//! # Architecture
//!
//! Data flows one way on write (mutation → snapshot → throttle → serialize →
//! backend) and one way on load (backend → deserialize → snapshot → validate
//! → merged initial state). Persistence is best-effort: no failure in this
//! crate ever reaches the application's mutation path.
//!
//! The throttled write path defers on a tokio timer, so saves need an
//! ambient tokio runtime; without one they are dropped with a warning rather
//! than panicking. Backends are synchronous and injected explicitly; the
//! crate never probes its host environment.
//!
//! # Example
//!
//! ```no_run
//! use restash::{bind_persistent_state, BindOptions, RedbStore};
//! use serde::{Deserialize, Serialize};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct Session {
//!     count: u64,
//! }
//!
//! # #[tokio::main] async fn main() -> Result<(), restash::PersistError> {
//! let backend = Arc::new(RedbStore::open(Path::new("app.redb"))?);
//! let state = bind_persistent_state(
//!     Session { count: 0 },
//!     BindOptions::new("session").with_backend(backend).with_version(1),
//! );
//!
//! state.update(|session| session.count += 1);
//! # Ok(()) }
//! ```

pub mod backend;
pub mod error;
pub mod live;
pub mod persister;
pub mod protocol;
pub mod store;
pub mod throttle;
pub mod types;

pub use backend::{MemoryStore, StorageBackend};
pub use error::{PersistError, PersistResult};
pub use live::{bind_persistent_state, LiveState};
pub use persister::Persister;
pub use protocol::{restore_validated, save_snapshot};
pub use store::RedbStore;
pub use throttle::Throttle;
pub use types::{BindOptions, PersisterOptions, Snapshot};

/// Build a [`Persister`] from options.
///
/// Equivalent to [`Persister::new`]; the free-function form mirrors
/// [`bind_persistent_state`] for callers wiring a persister manually.
pub fn create_persister<T>(options: PersisterOptions<T>) -> Persister<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned + Send + 'static,
{
    Persister::new(options)
}
