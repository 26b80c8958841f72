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
use bytes::Bytes;

use crate::Result;

/// Binary blob storage contract, S3-shaped: bucket plus object key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store a blob and return its retrieval URL.
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String>;

    /// Fetch a previously uploaded blob.
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Bytes>;

    /// Delete a blob; deleting an absent key is a no-op.
    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;
}
