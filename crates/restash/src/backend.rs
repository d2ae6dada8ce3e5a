//! Storage backend capability.
//!
//! The persistence core consumes storage through this narrow get/set/remove
//! interface and never selects a backend on its own: the embedding
//! application resolves one at startup and passes it in as a plain value.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{PersistError, PersistResult};

/// A synchronous key-value store holding string payloads.
///
/// Implementations own their durability story; the core treats every call as
/// synchronous and never assumes a backend instance outlives one call.
pub trait StorageBackend: Send + Sync {
    /// Fetch the payload stored under `key`, if any.
    fn get(&self, key: &str) -> PersistResult<Option<String>>;

    /// Store `value` under `key`, overwriting any previous payload.
    fn set(&self, key: &str, value: &str) -> PersistResult<()>;

    /// Remove the payload stored under `key`. Removing an absent key is not
    /// an error.
    fn remove(&self, key: &str) -> PersistResult<()>;
}

/// Ephemeral in-memory backend (for testing and storage-less environments).
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStore {
    fn get(&self, key: &str) -> PersistResult<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| PersistError::Backend(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> PersistResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| PersistError::Backend(e.to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> PersistResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| PersistError::Backend(e.to_string()))?;
        entries.remove(key);
        Ok(())
    }
}
