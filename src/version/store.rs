//! Namespaced key/JSON store persisted in SQLite

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

#[cfg(test)]
use mockall::automock;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info};

use crate::version::error::CacheError;
use crate::version::types::now_ms;

/// Persistent key -> JSON blob storage, partitioned by namespace
///
/// Writes are last-write-wins per (namespace, key).
#[cfg_attr(test, automock)]
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, CacheError>;

    fn update(&self, namespace: &str, key: &str, value: Value) -> Result<(), CacheError>;

    /// All keys stored under `namespace`, in key order
    fn keys(&self, namespace: &str) -> Result<Vec<String>, CacheError>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(db_path: &Path) -> Result<Self, CacheError> {
        info!("Initializing store database at {:?}", db_path);

        let conn = Connection::open(db_path)?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::with_connection(conn)
    }

    /// Store that lives only as long as the process
    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, CacheError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        debug!("Store initialized");
        Ok(store)
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn.lock().map_err(|_| CacheError::LockPoisoned)
    }

    fn create_schema(&self) -> Result<(), CacheError> {
        let conn = self.lock_conn()?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (namespace, key)
            )
            "#,
            [],
        )?;
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, CacheError> {
        let conn = self.lock_conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM entries WHERE namespace = ?1 AND key = ?2",
                (namespace, key),
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn update(&self, namespace: &str, key: &str, value: Value) -> Result<(), CacheError> {
        let raw = serde_json::to_string(&value)?;
        let conn = self.lock_conn()?;
        conn.execute(
            r#"
            INSERT INTO entries (namespace, key, value, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(namespace, key) DO UPDATE
                SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            (namespace, key, raw, now_ms()),
        )?;
        Ok(())
    }

    fn keys(&self, namespace: &str) -> Result<Vec<String>, CacheError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT key FROM entries WHERE namespace = ?1 ORDER BY key")?;
        let keys = stmt
            .query_map([namespace], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }
}
