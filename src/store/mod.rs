//! The durable record store collaborator.
//!
//! The engine persists JSON records into named collections and assumes a
//! durable, single-writer backend. Records carry their id in an `"id"`
//! field; `update` is an upsert. No cross-collection transactions are
//! required.

mod memory;
mod sqlite;

pub use memory::MemoryRecordStore;
pub use sqlite::SqliteRecordStore;

use anyhow::{bail, Result};
use serde_json::Value as JsonValue;

/// Collection holding track records.
pub const TRACKS: &str = "tracks";

/// Generic record storage backend.
pub trait RecordStore: Send + Sync {
    /// Insert a new record. Fails if a record with the same id exists.
    fn add(&self, collection: &str, record: &JsonValue) -> Result<()>;

    /// All records in a collection.
    fn list(&self, collection: &str) -> Result<Vec<JsonValue>>;

    /// Upsert a record by id.
    fn update(&self, collection: &str, record: &JsonValue) -> Result<()>;

    /// Remove a record by id. Removing an absent id is not an error.
    fn remove(&self, collection: &str, id: &str) -> Result<()>;
}

/// Extract the mandatory string id of a record.
pub fn record_id(record: &JsonValue) -> Result<&str> {
    match record.get("id").and_then(JsonValue::as_str) {
        Some(id) if !id.is_empty() => Ok(id),
        _ => bail!("Record has no string 'id' field: {}", record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_id_present() {
        let record = json!({"id": "abc", "title": "Hello"});
        assert_eq!(record_id(&record).unwrap(), "abc");
    }

    #[test]
    fn test_record_id_missing_or_invalid() {
        assert!(record_id(&json!({"title": "Hello"})).is_err());
        assert!(record_id(&json!({"id": 42})).is_err());
        assert!(record_id(&json!({"id": ""})).is_err());
    }
}
