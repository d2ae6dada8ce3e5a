//! RedbStore — redb-backed storage backend.
//!
//! Serialized snapshots land in a single `&str` → `&str` table. The store
//! supports both on-disk and in-memory databases (the latter for testing)
//! and is `Clone` + `Send` + `Sync` over an `Arc<Database>`.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, TableDefinition};
use tracing::debug;

use crate::backend::StorageBackend;
use crate::error::{PersistError, PersistResult};

/// Convert any `Display` error into a `PersistError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| PersistError::$variant(e.to_string())
    };
}

/// Persisted snapshot payloads keyed by the persister key.
const ENTRIES: TableDefinition<&str, &str> = TableDefinition::new("entries");

/// Durable key-value store backed by redb.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> PersistResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_table()?;
        debug!(?path, "redb store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> PersistResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_table()?;
        debug!("in-memory redb store opened");
        Ok(store)
    }

    /// Create the entries table if it doesn't exist yet.
    fn ensure_table(&self) -> PersistResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Backend))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(ENTRIES).map_err(map_err!(Backend))?;
        txn.commit().map_err(map_err!(Backend))?;
        Ok(())
    }
}

impl StorageBackend for RedbStore {
    fn get(&self, key: &str) -> PersistResult<Option<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Backend))?;
        let table = txn.open_table(ENTRIES).map_err(map_err!(Backend))?;
        match table.get(key).map_err(map_err!(Backend))? {
            Some(guard) => Ok(Some(guard.value().to_string())),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> PersistResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Backend))?;
        {
            let mut table = txn.open_table(ENTRIES).map_err(map_err!(Backend))?;
            table.insert(key, value).map_err(map_err!(Backend))?;
        }
        txn.commit().map_err(map_err!(Backend))?;
        debug!(%key, "entry stored");
        Ok(())
    }

    fn remove(&self, key: &str) -> PersistResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Backend))?;
        {
            let mut table = txn.open_table(ENTRIES).map_err(map_err!(Backend))?;
            table.remove(key).map_err(map_err!(Backend))?;
        }
        txn.commit().map_err(map_err!(Backend))?;
        debug!(%key, "entry removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get() {
        let store = RedbStore::open_in_memory().unwrap();
        assert_eq!(store.get("k").unwrap(), None);

        store.set("k", r#"{"timestamp":1}"#).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(r#"{"timestamp":1}"#.to_string()));
    }

    #[test]
    fn overwrite_replaces_value() {
        let store = RedbStore::open_in_memory().unwrap();
        store.set("k", "first").unwrap();
        store.set("k", "second").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("second".to_string()));
    }

    #[test]
    fn remove_deletes_entry() {
        let store = RedbStore::open_in_memory().unwrap();
        store.set("k", "v").unwrap();

        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);

        // Removing an absent key is fine.
        store.remove("k").unwrap();
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = RedbStore::open(&db_path).unwrap();
            store.set("k", "kept").unwrap();
        }

        // Reopen the same database file.
        let store = RedbStore::open(&db_path).unwrap();
        assert_eq!(store.get("k").unwrap(), Some("kept".to_string()));
    }
}
