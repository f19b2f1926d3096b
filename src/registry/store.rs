//! Durable storage of definition source text.
//!
//! The store only persists `(name, code)` pairs; definitions are re-parsed
//! from code when the registry opens.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Failed to create store directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Persistent name -> code mapping. Upsert is last-write-wins.
#[cfg_attr(test, mockall::automock)]
pub trait DefinitionStore: Send + Sync {
    /// Every stored `(name, code)` pair, ordered by name.
    fn fetch_all(&self) -> Result<Vec<(String, String)>, StoreError>;

    fn get(&self, name: &str) -> Result<Option<String>, StoreError>;

    fn exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.get(name)?.is_some())
    }

    fn upsert(&self, name: &str, code: &str) -> Result<(), StoreError>;
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS node_definitions (
    name TEXT PRIMARY KEY,
    code TEXT NOT NULL
);";

/// SQLite-backed definition store.
pub struct SqliteDefinitionStore {
    conn: Mutex<Connection>,
}

impl SqliteDefinitionStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.execute_batch(SCHEMA)?;

        debug!(path = %path.display(), "Definition store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl DefinitionStore for SqliteDefinitionStore {
    fn fetch_all(&self) -> Result<Vec<(String, String)>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT name, code FROM node_definitions ORDER BY name")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let rows = rows.collect::<Result<Vec<(String, String)>, _>>()?;
        Ok(rows)
    }

    fn get(&self, name: &str) -> Result<Option<String>, StoreError> {
        let conn = self.lock()?;
        let code = conn
            .query_row(
                "SELECT code FROM node_definitions WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(code)
    }

    fn upsert(&self, name: &str, code: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO node_definitions (name, code) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET code = excluded.code",
            params![name, code],
        )?;
        debug!(name, "Definition stored");
        Ok(())
    }
}

/// Volatile store for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryDefinitionStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryDefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated store.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: Mutex::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

impl DefinitionStore for MemoryDefinitionStore {
    fn fetch_all(&self) -> Result<Vec<(String, String)>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn get(&self, name: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(name).cloned())
    }

    fn upsert(&self, name: &str, code: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(name.to_string(), code.to_string());
        Ok(())
    }
}
