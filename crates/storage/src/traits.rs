//! Storage traits/interfaces for S3 operations.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::types::{CompletedPart, DeleteBatchResult, ListPage, SourceObject};
use crate::parts::PartInfo;

/// Low-level S3 operations - implemented by each backend.
///
/// All copies are server-side; no object data passes through the caller.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Check if an object exists and return its size.
    /// Returns None if object doesn't exist.
    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<u64>, StorageError>;

    /// Copy an object in a single request, pinned to the source version.
    async fn copy_object(
        &self,
        source: &SourceObject,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<(), StorageError>;

    /// Start a multipart upload session.
    ///
    /// # Returns
    /// The upload id of the new session.
    async fn create_multipart_upload(&self, bucket: &str, key: &str)
        -> Result<String, StorageError>;

    /// Copy one byte range of the source into a part of the session.
    async fn upload_part_copy(
        &self,
        source: &SourceObject,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part: &PartInfo,
    ) -> Result<CompletedPart, StorageError>;

    /// Finalize a multipart upload. `parts` must be sorted by part number.
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StorageError>;

    /// Abort a multipart upload, discarding its parts.
    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError>;

    /// List one page of keys under a prefix.
    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage, StorageError>;

    /// Delete up to 1000 keys in one call.
    ///
    /// Per-object failures are returned in-band; `Err` is reserved for
    /// call-level (transport) failures.
    async fn delete_objects(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> Result<DeleteBatchResult, StorageError>;
}
