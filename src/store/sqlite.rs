//! SQLite implementation of the record store.

use super::{record_id, RecordStore};
use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const SCHEMA_VERSION: usize = 1;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS records (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    body TEXT NOT NULL,
    PRIMARY KEY (collection, id)
);
CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection);
";

/// Record store backed by a single SQLite database file.
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open record database: {:?}", path))?;
        Self::init(conn, Some(path))
    }

    /// In-memory database, useful for tests and throwaway runs.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<&Path>) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to apply record store schema")?;
        conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;
        if let Some(path) = path {
            info!(path = ?path, "Record store ready");
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl RecordStore for SqliteRecordStore {
    fn add(&self, collection: &str, record: &JsonValue) -> Result<()> {
        let id = record_id(record)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO records (collection, id, body) VALUES (?1, ?2, ?3)",
            params![collection, id, record.to_string()],
        )
        .with_context(|| format!("Failed to add record {} to {}", id, collection))?;
        Ok(())
    }

    fn list(&self, collection: &str) -> Result<Vec<JsonValue>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT body FROM records WHERE collection = ?1 ORDER BY rowid")?;
        let rows = stmt
            .query_map(params![collection], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()
            .with_context(|| format!("Failed to list collection {}", collection))?;

        rows.iter()
            .map(|body| {
                serde_json::from_str(body)
                    .with_context(|| format!("Corrupt record in collection {}", collection))
            })
            .collect()
    }

    fn update(&self, collection: &str, record: &JsonValue) -> Result<()> {
        let id = record_id(record)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO records (collection, id, body) VALUES (?1, ?2, ?3)
             ON CONFLICT (collection, id) DO UPDATE SET body = excluded.body",
            params![collection, id, record.to_string()],
        )
        .with_context(|| format!("Failed to upsert record {} in {}", id, collection))?;
        Ok(())
    }

    fn remove(&self, collection: &str, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM records WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )
        .with_context(|| format!("Failed to remove record {} from {}", id, collection))?;
        Ok(())
    }
}
