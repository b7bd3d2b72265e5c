//! Key-value engines: SQLite-backed for production, in-memory for tests.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use tasknest_core::{NestError, Result};

/// Minimal key-value engine the store adapter runs on.
pub trait KvEngine: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&self, key: &str, value: &str) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
}

/// SQLite-backed engine — a single `kv` table, values as JSON text.
pub struct SqliteKv {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteKv {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| NestError::Store(format!("db open: {e}")))?;
        let engine = Self {
            conn: Mutex::new(conn),
        };
        engine.migrate()?;
        Ok(engine)
    }

    /// In-memory SQLite database, useful for tooling.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| NestError::Store(format!("db open: {e}")))?;
        let engine = Self {
            conn: Mutex::new(conn),
        };
        engine.migrate()?;
        Ok(engine)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
        .map_err(|e| NestError::Store(format!("migration: {e}")))?;
        Ok(())
    }
}

impl KvEngine for SqliteKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT value FROM kv WHERE key = ?1")
            .map_err(|e| NestError::Store(format!("get: {e}")))?;
        let mut rows = stmt
            .query([key])
            .map_err(|e| NestError::Store(format!("get: {e}")))?;
        match rows.next().map_err(|e| NestError::Store(format!("get: {e}")))? {
            Some(row) => {
                let value: String = row
                    .get(0)
                    .map_err(|e| NestError::Store(format!("get: {e}")))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            rusqlite::params![key, value],
        )
        .map_err(|e| NestError::Store(format!("put: {e}")))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM kv WHERE key = ?1", [key])
            .map_err(|e| NestError::Store(format!("delete: {e}")))?;
        Ok(())
    }
}

/// In-memory engine for tests.
#[derive(Default)]
pub struct MemoryKv {
    map: Mutex<BTreeMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvEngine for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.lock().unwrap().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.map
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.map.lock().unwrap().remove(key);
        Ok(())
    }
}
