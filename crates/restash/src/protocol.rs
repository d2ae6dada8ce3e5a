//! Restore/save protocol: staleness and version validation.
//!
//! Restoration is strict: a snapshot must carry a timestamp, be younger than
//! the max age, and match the expected version. Anything else counts as a
//! cache miss and the stored entry is purged eagerly rather than lazily
//! overwritten. Saving stamps the state with the current time and version;
//! there is no validation on the save side.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::persister::Persister;
use crate::types::{now_ms, Snapshot};

/// Restore the persisted state if it is fresh and version-compatible.
///
/// Returns `None` when the snapshot is absent, malformed (no timestamp),
/// older than `max_age`, of a different version, or failed to decode; in the
/// non-absent cases the stored entry is removed as well. Errors never
/// propagate past this boundary; the caller simply starts from its initial
/// state.
pub fn restore_validated<T>(
    persister: &Persister<T>,
    max_age: Duration,
    version: u32,
) -> Option<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    let snapshot = match persister.restore() {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => return None,
        Err(e) => {
            debug!(key = %persister.key(), error = %e, "discarding unreadable snapshot");
            persister.remove();
            return None;
        }
    };

    let Some(timestamp) = snapshot.timestamp else {
        // Malformed: treated like corruption.
        debug!(key = %persister.key(), "discarding snapshot without timestamp");
        persister.remove();
        return None;
    };

    let expired = now_ms().saturating_sub(timestamp) > max_age.as_millis() as u64;
    if expired || snapshot.version != version {
        debug!(
            key = %persister.key(),
            expired,
            stored_version = snapshot.version,
            expected_version = version,
            "discarding stale or incompatible snapshot"
        );
        persister.remove();
        return None;
    }

    snapshot.state
}

/// Stamp `state` with the current time and `version`, and queue it for a
/// throttled write.
pub fn save_snapshot<T>(persister: &Persister<T>, state: T, version: u32)
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    persister.persist(Snapshot {
        timestamp: Some(now_ms()),
        version,
        state: Some(state),
    });
}
