use std::path::Path;
use std::rc::Rc;

use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
}

/// String key/value persistence, the local equivalent of browser storage.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Rc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let store = Self::new(Connection::open(path)?);
        store.initialize()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        let store = Self::new(Connection::open_in_memory()?);
        store.initialize()?;
        Ok(store)
    }

    pub fn initialize(&self) -> Result<(), StorageError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> SqliteStore {
        SqliteStore::in_memory().unwrap()
    }

    #[test]
    fn initialize_is_idempotent_and_keeps_data() {
        let store = SqliteStore::new(Connection::open_in_memory().unwrap());

        store.initialize().unwrap();
        store.set("k", "v").unwrap();
        store.initialize().unwrap();

        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn uninitialized_connection_reports_database_error() {
        let store = SqliteStore::new(Connection::open_in_memory().unwrap());

        assert!(matches!(store.get("k"), Err(StorageError::DatabaseError(_))));
    }

    #[test]
    fn missing_key_returns_none() {
        let store = create_test_store();

        assert_eq!(store.get("nothing").unwrap(), None);
    }

    #[test]
    fn set_overwrites_existing_value() {
        let store = create_test_store();

        store.set("categories", "[]").unwrap();
        store.set("categories", "{\"version\":1}").unwrap();

        assert_eq!(store.get("categories").unwrap().as_deref(), Some("{\"version\":1}"));
    }

    #[test]
    fn remove_deletes_key_and_is_idempotent() {
        let store = create_test_store();
        store.set("disabled_calendars", "[\"a\"]").unwrap();

        store.remove("disabled_calendars").unwrap();
        store.remove("disabled_calendars").unwrap();

        assert_eq!(store.get("disabled_calendars").unwrap(), None);
    }

    #[test]
    fn shared_store_sees_writes_through_rc() {
        let store = Rc::new(create_test_store());
        let other = Rc::clone(&store);

        store.set("k", "v").unwrap();

        assert_eq!(other.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn values_survive_reopening_the_database_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("state.db");

        SqliteStore::open(&path).unwrap().set("k", "persisted").unwrap();
        let reopened = SqliteStore::open(&path).unwrap();

        assert_eq!(reopened.get("k").unwrap().as_deref(), Some("persisted"));
    }
}
