//! ---
//! ast_section: "03-persistence-logging"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Storage collaborator abstractions and in-memory backends."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
use async_trait::async_trait;
use serde_json::Value;

use crate::Result;

/// A stored record: a JSON object keyed by a string primary id.
pub type Record = serde_json::Map<String, Value>;

/// Optional equality filter applied during a table scan.
#[derive(Debug, Clone)]
pub struct ScanFilter {
    /// Field the filter matches against.
    pub field: String,
    /// Value the field must equal for the record to be returned.
    pub equals: Value,
}

impl ScanFilter {
    /// Build a field-equals filter.
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            equals: value.into(),
        }
    }

    /// Whether a record passes the filter.
    pub fn matches(&self, record: &Record) -> bool {
        record.get(&self.field) == Some(&self.equals)
    }
}

/// Per-entity persistence contract offered by the managed key-value store.
///
/// `update` is a partial write: only the listed fields change, every other
/// field on the record is left untouched.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a record by primary key, `None` when absent.
    async fn get(&self, table: &str, key: &str) -> Result<Option<Record>>;

    /// Insert or replace a record under the given primary key.
    async fn put(&self, table: &str, key: &str, record: Record) -> Result<()>;

    /// Merge the listed field assignments into an existing record.
    async fn update(&self, table: &str, key: &str, fields: Record) -> Result<()>;

    /// Remove a record; deleting an absent key is a no-op.
    async fn delete(&self, table: &str, key: &str) -> Result<()>;

    /// Return every record in the table, optionally filtered.
    async fn scan(&self, table: &str, filter: Option<&ScanFilter>) -> Result<Vec<Record>>;
}
