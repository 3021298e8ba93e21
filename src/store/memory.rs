//! In-memory record store for tests and ephemeral runs.

use super::{record_id, RecordStore};
use anyhow::{bail, Result};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

type Collections = BTreeMap<String, BTreeMap<String, JsonValue>>;

/// Record store held entirely in memory. Insertion order is not preserved
/// (records list in id order), which the engine does not rely on.
#[derive(Default)]
pub struct MemoryRecordStore {
    collections: Mutex<Collections>,
    fail_writes: AtomicBool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail, to exercise persistence-failure paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("Record store is in simulated failure mode");
        }
        Ok(())
    }
}

impl RecordStore for MemoryRecordStore {
    fn add(&self, collection: &str, record: &JsonValue) -> Result<()> {
        self.check_writable()?;
        let id = record_id(record)?.to_string();
        let mut collections = self.collections.lock().unwrap();
        let records = collections.entry(collection.to_string()).or_default();
        if records.contains_key(&id) {
            bail!("Record {} already exists in {}", id, collection);
        }
        records.insert(id, record.clone());
        Ok(())
    }

    fn list(&self, collection: &str) -> Result<Vec<JsonValue>> {
        let collections = self.collections.lock().unwrap();
        Ok(collections
            .get(collection)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    fn update(&self, collection: &str, record: &JsonValue) -> Result<()> {
        self.check_writable()?;
        let id = record_id(record)?.to_string();
        let mut collections = self.collections.lock().unwrap();
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, record.clone());
        Ok(())
    }

    fn remove(&self, collection: &str, id: &str) -> Result<()> {
        self.check_writable()?;
        let mut collections = self.collections.lock().unwrap();
        if let Some(records) = collections.get_mut(collection) {
            records.remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_upsert_and_remove() {
        let store = MemoryRecordStore::new();
        store.update("tracks", &json!({"id": "a", "n": 1})).unwrap();
        store.update("tracks", &json!({"id": "a", "n": 2})).unwrap();
        assert_eq!(store.list("tracks").unwrap()[0]["n"], 2);

        store.remove("tracks", "a").unwrap();
        assert!(store.list("tracks").unwrap().is_empty());
    }

    #[test]
    fn test_fail_writes_mode() {
        let store = MemoryRecordStore::new();
        store.set_fail_writes(true);
        assert!(store.add("tracks", &json!({"id": "a"})).is_err());
        assert!(store.list("tracks").unwrap().is_empty());

        store.set_fail_writes(false);
        store.add("tracks", &json!({"id": "a"})).unwrap();
    }
}
