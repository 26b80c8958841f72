//! ---
//! ast_section: "03-persistence-logging"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Storage collaborator abstractions and in-memory backends."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Storage collaborators for the AST platform.
//!
//! The managed key-value store and the object store are external systems;
//! this crate owns only their call contracts plus process-local in-memory
//! implementations used in simulation mode and throughout the test suites.

/// Result alias used throughout the storage crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error type for the storage subsystem.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Referenced bucket/key pair does not exist in the object store.
    #[error("object {key} not found in bucket {bucket}")]
    ObjectNotFound {
        /// Bucket that was queried.
        bucket: String,
        /// Object key that was missing.
        key: String,
    },
    /// Wrapper for JSON serialization issues.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// The backing service rejected or failed the operation.
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub mod memory;
pub mod object;
pub mod record;

pub use memory::{MemoryObjectStore, MemoryRecordStore};
pub use object::ObjectStore;
pub use record::{Record, RecordStore, ScanFilter};
