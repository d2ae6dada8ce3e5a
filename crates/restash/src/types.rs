//! Core types for the restash persistence layer.
//!
//! A [`Snapshot`] is the unit of persistence: a timestamped, versioned copy
//! of application state, JSON-serialized into the storage backend under a
//! single key. Configuration is carried by explicit option structs with
//! documented defaults rather than loose optional arguments.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::backend::StorageBackend;
use crate::error::{PersistError, PersistResult};

/// Default throttle interval between storage writes.
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(1000);

/// Default maximum age before a restored snapshot is considered stale.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_millis(86_400_000);

/// Default snapshot version when the caller does not specify one.
pub const DEFAULT_VERSION: u32 = 0;

/// A timestamped, versioned copy of application state.
///
/// Wire shape: `{"timestamp": <epoch ms>, "version": <int>, "state": {...}}`.
/// A snapshot whose serialized form lacks a `timestamp` deserializes with
/// `timestamp: None` and is treated as malformed by the restore protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot<T> {
    /// Epoch milliseconds at which the snapshot was built.
    #[serde(default)]
    pub timestamp: Option<u64>,
    /// Caller-managed schema version; bumped manually on breaking changes.
    #[serde(default)]
    pub version: u32,
    /// The persisted state itself.
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub state: Option<T>,
}

/// Current time as epoch milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Serializer for a snapshot. Defaults to `serde_json`.
pub type SerializeFn<T> = Arc<dyn Fn(&Snapshot<T>) -> PersistResult<String> + Send + Sync>;

/// Deserializer for a snapshot. Defaults to `serde_json`.
pub type DeserializeFn<T> = Arc<dyn Fn(&str) -> PersistResult<Snapshot<T>> + Send + Sync>;

/// Default `serde_json` serializer.
pub fn json_serialize<T: Serialize>() -> SerializeFn<T> {
    Arc::new(|snapshot| {
        serde_json::to_string(snapshot).map_err(|e| PersistError::Serialize(e.to_string()))
    })
}

/// Default `serde_json` deserializer.
pub fn json_deserialize<T: DeserializeOwned>() -> DeserializeFn<T> {
    Arc::new(|raw| serde_json::from_str(raw).map_err(|e| PersistError::Deserialize(e.to_string())))
}

/// Options for building a [`Persister`](crate::Persister).
///
/// Defaults: no backend (the persister becomes a no-op), 1 s throttle
/// interval, `serde_json` codec.
#[derive(Clone)]
pub struct PersisterOptions<T> {
    /// Storage backend. `None` yields a no-op persister, so the same calling
    /// code runs identically in environments without storage.
    pub backend: Option<Arc<dyn StorageBackend>>,
    /// Storage key owned by this persister.
    pub key: String,
    /// Minimum interval between storage writes.
    pub throttle_interval: Duration,
    /// Snapshot serializer.
    pub serialize: SerializeFn<T>,
    /// Snapshot deserializer.
    pub deserialize: DeserializeFn<T>,
}

impl<T: Serialize + DeserializeOwned> PersisterOptions<T> {
    /// Options for the given key with all defaults.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            backend: None,
            key: key.into(),
            throttle_interval: DEFAULT_THROTTLE_INTERVAL,
            serialize: json_serialize(),
            deserialize: json_deserialize(),
        }
    }

    /// Set the storage backend.
    pub fn with_backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the throttle interval.
    pub fn with_throttle_interval(mut self, interval: Duration) -> Self {
        self.throttle_interval = interval;
        self
    }

    /// Replace the serializer/deserializer pair.
    pub fn with_codec(mut self, serialize: SerializeFn<T>, deserialize: DeserializeFn<T>) -> Self {
        self.serialize = serialize;
        self.deserialize = deserialize;
        self
    }
}

/// Options for [`bind_persistent_state`](crate::bind_persistent_state).
///
/// Extends [`PersisterOptions`] with restore validation parameters and an
/// optional ready-made persister (which always wins over the inline backend
/// options; used for testing and mocking).
#[derive(Clone)]
pub struct BindOptions<T> {
    /// Persister construction options, used unless `persister` is set.
    pub persister_options: PersisterOptions<T>,
    /// Maximum age before a restored snapshot is discarded as stale.
    pub max_age: Duration,
    /// Expected snapshot version; mismatching caches are purged.
    pub version: u32,
    /// Explicit persister, overriding `persister_options`.
    pub persister: Option<crate::Persister<T>>,
}

impl<T: Serialize + DeserializeOwned> BindOptions<T> {
    /// Options for the given key with all defaults.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            persister_options: PersisterOptions::new(key),
            max_age: DEFAULT_MAX_AGE,
            version: DEFAULT_VERSION,
            persister: None,
        }
    }

    /// Set the storage backend.
    pub fn with_backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.persister_options = self.persister_options.with_backend(backend);
        self
    }

    /// Set the throttle interval.
    pub fn with_throttle_interval(mut self, interval: Duration) -> Self {
        self.persister_options = self.persister_options.with_throttle_interval(interval);
        self
    }

    /// Set the maximum snapshot age.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set the expected snapshot version.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Use a ready-made persister instead of building one.
    pub fn with_persister(mut self, persister: crate::Persister<T>) -> Self {
        self.persister = Some(persister);
        self
    }
}
