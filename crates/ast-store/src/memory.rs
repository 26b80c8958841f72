//! ---
//! ast_section: "03-persistence-logging"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Storage collaborator abstractions and in-memory backends."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

use crate::object::ObjectStore;
use crate::record::{Record, RecordStore, ScanFilter};
use crate::{Result, StoreError};

/// In-memory record store used in simulation mode and tests.
///
/// Tables are created lazily on first write; scanning an unknown table
/// returns an empty list, matching the behaviour callers see from the
/// managed store once tables have been provisioned.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    tables: RwLock<HashMap<String, BTreeMap<String, Record>>>,
}

impl MemoryRecordStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, table: &str, key: &str) -> Result<Option<Record>> {
        let tables = self.tables.read();
        Ok(tables
            .get(table)
            .and_then(|records| records.get(key))
            .cloned())
    }

    async fn put(&self, table: &str, key: &str, record: Record) -> Result<()> {
        let mut tables = self.tables.write();
        tables
            .entry(table.to_owned())
            .or_default()
            .insert(key.to_owned(), record);
        debug!(table, key, "record stored");
        Ok(())
    }

    async fn update(&self, table: &str, key: &str, fields: Record) -> Result<()> {
        let mut tables = self.tables.write();
        let records = tables.entry(table.to_owned()).or_default();
        let record = records.entry(key.to_owned()).or_default();
        for (field, value) in fields {
            record.insert(field, value);
        }
        Ok(())
    }

    async fn delete(&self, table: &str, key: &str) -> Result<()> {
        let mut tables = self.tables.write();
        if let Some(records) = tables.get_mut(table) {
            records.remove(key);
        }
        Ok(())
    }

    async fn scan(&self, table: &str, filter: Option<&ScanFilter>) -> Result<Vec<Record>> {
        let tables = self.tables.read();
        let records = match tables.get(table) {
            Some(records) => records,
            None => return Ok(Vec::new()),
        };
        Ok(records
            .values()
            .filter(|record| filter.map(|f| f.matches(record)).unwrap_or(true))
            .cloned()
            .collect())
    }
}

/// In-memory object store mirroring the bucket/key layout of the managed
/// service, including its URL shape.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    buckets: RwLock<HashMap<String, HashMap<String, StoredObject>>>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Bytes,
    #[allow(dead_code)]
    content_type: String,
}

impl MemoryObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn url(bucket: &str, key: &str) -> String {
        format!("https://{bucket}.s3.amazonaws.com/{key}")
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String> {
        let mut buckets = self.buckets.write();
        buckets.entry(bucket.to_owned()).or_default().insert(
            key.to_owned(),
            StoredObject {
                bytes,
                content_type: content_type.to_owned(),
            },
        );
        debug!(bucket, key, "object stored");
        Ok(Self::url(bucket, key))
    }

    async fn fetch(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let buckets = self.buckets.read();
        buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|object| object.bytes.clone())
            .ok_or_else(|| StoreError::ObjectNotFound {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
            })
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let mut buckets = self.buckets.write();
        if let Some(objects) = buckets.get_mut(bucket) {
            objects.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(pairs: &[(&str, serde_json::Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn partial_update_leaves_other_fields_untouched() {
        let store = MemoryRecordStore::new();
        store
            .put(
                "ast-trucks",
                "truck-1",
                record(&[
                    ("truck_id", json!("truck-1")),
                    ("truck_name", json!("Hauler")),
                    ("status", json!("idle")),
                ]),
            )
            .await
            .unwrap();

        store
            .update(
                "ast-trucks",
                "truck-1",
                record(&[("status", json!("active")), ("speed", json!(52.0))]),
            )
            .await
            .unwrap();

        let truck = store.get("ast-trucks", "truck-1").await.unwrap().unwrap();
        assert_eq!(truck["truck_name"], json!("Hauler"));
        assert_eq!(truck["status"], json!("active"));
        assert_eq!(truck["speed"], json!(52.0));
    }

    #[tokio::test]
    async fn scan_honours_equality_filter() {
        let store = MemoryRecordStore::new();
        for (id, status) in [("a", "active"), ("b", "resolved"), ("c", "active")] {
            store
                .put(
                    "ast-alerts",
                    id,
                    record(&[("alert_id", json!(id)), ("status", json!(status))]),
                )
                .await
                .unwrap();
        }

        let filter = ScanFilter::equals("status", "active");
        let active = store.scan("ast-alerts", Some(&filter)).await.unwrap();
        assert_eq!(active.len(), 2);

        let all = store.scan("ast-alerts", None).await.unwrap();
        assert_eq!(all.len(), 3);

        let none = store.scan("unknown-table", None).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryRecordStore::new();
        store
            .put("ast-routes", "route-1", record(&[("route_id", json!("route-1"))]))
            .await
            .unwrap();
        store.delete("ast-routes", "route-1").await.unwrap();
        store.delete("ast-routes", "route-1").await.unwrap();
        assert!(store.get("ast-routes", "route-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn object_roundtrip_and_url_shape() {
        let store = MemoryObjectStore::new();
        let url = store
            .upload(
                "ast-data-bucket",
                "vision/image-1.jpg",
                Bytes::from_static(b"jpeg-bytes"),
                "image/jpeg",
            )
            .await
            .unwrap();
        assert_eq!(
            url,
            "https://ast-data-bucket.s3.amazonaws.com/vision/image-1.jpg"
        );

        let bytes = store
            .fetch("ast-data-bucket", "vision/image-1.jpg")
            .await
            .unwrap();
        assert_eq!(bytes.as_ref(), b"jpeg-bytes");

        store
            .delete("ast-data-bucket", "vision/image-1.jpg")
            .await
            .unwrap();
        let missing = store.fetch("ast-data-bucket", "vision/image-1.jpg").await;
        assert!(matches!(missing, Err(StoreError::ObjectNotFound { .. })));
    }
}
