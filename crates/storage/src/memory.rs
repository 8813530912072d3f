//! In-memory `StorageClient` for tests and local runs.
//!
//! Objects are held per `(bucket, key)` with every version retained, so
//! copies pinned to a source version behave like a versioned bucket. Call
//! counters and failure injection let tests observe the adapter surface.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use rehydration_common::MAX_DELETE_BATCH;

use crate::error::{DeleteError, StorageError};
use crate::parts::PartInfo;
use crate::traits::StorageClient;
use crate::types::{CompletedPart, DeleteBatchResult, ListPage, SourceObject};

/// Default number of keys returned per listing page.
pub const DEFAULT_LIST_PAGE_SIZE: usize = 1000;

/// Number of calls made against each adapter operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounters {
    pub head_object: usize,
    pub copy_object: usize,
    pub create_multipart: usize,
    pub upload_part_copy: usize,
    pub complete_multipart: usize,
    pub abort_multipart: usize,
    pub list_objects: usize,
    pub delete_objects: usize,
}

impl CallCounters {
    /// Total number of calls that write to the store.
    pub fn writes(&self) -> usize {
        self.copy_object
            + self.create_multipart
            + self.upload_part_copy
            + self.complete_multipart
            + self.delete_objects
    }
}

#[derive(Debug)]
struct PendingUpload {
    bucket: String,
    key: String,
    parts: BTreeMap<i32, u64>,
}

#[derive(Debug, Default)]
struct MemoryState {
    /// Current object size per (bucket, key).
    objects: BTreeMap<(String, String), u64>,
    /// Size of every version per (bucket, key, version).
    versions: HashMap<(String, String, String), u64>,
    uploads: HashMap<String, PendingUpload>,
    next_version: u64,
    next_upload: u64,
    failing_copies: Vec<String>,
    failing_parts: HashSet<i32>,
    denied_deletes: HashSet<String>,
    fail_listing: bool,
    counters: CallCounters,
}

/// In-memory object store.
#[derive(Debug)]
pub struct MemoryStorageClient {
    state: Mutex<MemoryState>,
    page_size: usize,
}

impl Default for MemoryStorageClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorageClient {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            page_size: DEFAULT_LIST_PAGE_SIZE,
        }
    }

    /// Set the number of keys returned per listing page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Write an object of `size` bytes, creating a new version.
    ///
    /// # Returns
    /// The version id of the new version.
    pub fn put_object(&self, bucket: &str, key: &str, size: u64) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_version += 1;
        let version: String = format!("v{}", state.next_version);
        state
            .objects
            .insert((bucket.to_string(), key.to_string()), size);
        state
            .versions
            .insert((bucket.to_string(), key.to_string(), version.clone()), size);
        version
    }

    /// Current size of an object, if present.
    pub fn object_size(&self, bucket: &str, key: &str) -> Option<u64> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .copied()
    }

    /// All current keys in `bucket` under `prefix`, in lexical order.
    pub fn keys(&self, bucket: &str, prefix: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Fail every copy whose source key ends with `suffix`.
    pub fn fail_copies_ending_with(&self, suffix: &str) {
        let mut state = self.state.lock().unwrap();
        state.failing_copies.push(suffix.to_string());
    }

    /// Fail every ranged copy of the given part number.
    pub fn fail_part(&self, part_number: i32) {
        let mut state = self.state.lock().unwrap();
        state.failing_parts.insert(part_number);
    }

    /// Report an in-band AccessDenied when `key` is deleted.
    pub fn deny_delete(&self, key: &str) {
        let mut state = self.state.lock().unwrap();
        state.denied_deletes.insert(key.to_string());
    }

    /// Fail every listing call at the transport level.
    pub fn fail_listing(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_listing = true;
    }

    /// Remove every injected failure.
    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.failing_copies.clear();
        state.failing_parts.clear();
        state.denied_deletes.clear();
        state.fail_listing = false;
    }

    /// Snapshot of the call counters.
    pub fn counters(&self) -> CallCounters {
        self.state.lock().unwrap().counters.clone()
    }

    /// Number of multipart uploads neither completed nor aborted.
    pub fn pending_uploads(&self) -> usize {
        self.state.lock().unwrap().uploads.len()
    }

    fn resolve_source(state: &MemoryState, source: &SourceObject) -> Result<u64, StorageError> {
        let size: Option<u64> = match source.version_id.as_deref() {
            Some(version) if !version.is_empty() => state
                .versions
                .get(&(
                    source.bucket.clone(),
                    source.key.clone(),
                    version.to_string(),
                ))
                .copied(),
            _ => state
                .objects
                .get(&(source.bucket.clone(), source.key.clone()))
                .copied(),
        };
        size.ok_or_else(|| StorageError::NotFound {
            bucket: source.bucket.clone(),
            key: source.key.clone(),
        })
    }

    fn injected_copy_failure(state: &MemoryState, source: &SourceObject) -> Option<StorageError> {
        state
            .failing_copies
            .iter()
            .any(|suffix| source.key.ends_with(suffix.as_str()))
            .then(|| StorageError::NetworkError {
                message: format!("injected failure copying {}", source.copy_source()),
                retryable: false,
            })
    }
}

#[async_trait]
impl StorageClient for MemoryStorageClient {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<u64>, StorageError> {
        let mut state = self.state.lock().unwrap();
        state.counters.head_object += 1;
        Ok(state
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .copied())
    }

    async fn copy_object(
        &self,
        source: &SourceObject,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        state.counters.copy_object += 1;
        if let Some(err) = Self::injected_copy_failure(&state, source) {
            return Err(err);
        }
        let size: u64 = Self::resolve_source(&state, source)?;
        state
            .objects
            .insert((dest_bucket.to_string(), dest_key.to_string()), size);
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<String, StorageError> {
        let mut state = self.state.lock().unwrap();
        state.counters.create_multipart += 1;
        state.next_upload += 1;
        let upload_id: String = format!("upload-{}", state.next_upload);
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part_copy(
        &self,
        source: &SourceObject,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part: &PartInfo,
    ) -> Result<CompletedPart, StorageError> {
        let mut state = self.state.lock().unwrap();
        state.counters.upload_part_copy += 1;
        if state.failing_parts.contains(&part.part_number) {
            return Err(StorageError::NetworkError {
                message: format!("injected failure on part {}", part.part_number),
                retryable: false,
            });
        }
        if let Some(err) = Self::injected_copy_failure(&state, source) {
            return Err(err);
        }
        let size: u64 = Self::resolve_source(&state, source)?;
        if part.offset + part.length > size {
            return Err(StorageError::Other {
                message: format!("range {} exceeds object size {}", part.range_header(), size),
            });
        }

        let upload: &mut PendingUpload =
            state
                .uploads
                .get_mut(upload_id)
                .ok_or_else(|| StorageError::MultipartFailed {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    message: format!("no such upload {}", upload_id),
                })?;
        upload.parts.insert(part.part_number, part.length);

        Ok(CompletedPart {
            part_number: part.part_number,
            etag: format!("\"{}-{}\"", upload_id, part.part_number),
        })
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        state.counters.complete_multipart += 1;

        let failed = |message: String| StorageError::MultipartFailed {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message,
        };

        let upload: PendingUpload = state
            .uploads
            .remove(upload_id)
            .ok_or_else(|| failed(format!("no such upload {}", upload_id)))?;
        if upload.bucket != bucket || upload.key != key {
            return Err(failed(format!("upload {} belongs to another key", upload_id)));
        }
        if parts.is_empty() {
            return Err(failed("at least one part is required".to_string()));
        }
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(failed("parts are not in ascending order".to_string()));
        }

        let mut size: u64 = 0;
        for part in parts {
            let length: u64 = *upload
                .parts
                .get(&part.part_number)
                .ok_or_else(|| failed(format!("part {} was never uploaded", part.part_number)))?;
            size += length;
        }

        state
            .objects
            .insert((bucket.to_string(), key.to_string()), size);
        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        state.counters.abort_multipart += 1;
        state.uploads.remove(upload_id);
        Ok(())
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage, StorageError> {
        let mut state = self.state.lock().unwrap();
        state.counters.list_objects += 1;
        if state.fail_listing {
            return Err(StorageError::NetworkError {
                message: "injected listing failure".to_string(),
                retryable: true,
            });
        }

        // The token is the last key returned, so deletes between pages are safe.
        let mut matching = state
            .objects
            .keys()
            .filter(|(b, k)| {
                b == bucket
                    && k.starts_with(prefix)
                    && continuation_token.as_deref().map_or(true, |after| k.as_str() > after)
            })
            .map(|(_, k)| k.clone());

        let keys: Vec<String> = matching.by_ref().take(self.page_size).collect();
        let has_more: bool = matching.next().is_some();
        let continuation_token: Option<String> = if has_more {
            keys.last().cloned()
        } else {
            None
        };

        Ok(ListPage {
            keys,
            continuation_token,
        })
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> Result<DeleteBatchResult, StorageError> {
        let mut state = self.state.lock().unwrap();
        state.counters.delete_objects += 1;
        if keys.len() > MAX_DELETE_BATCH {
            return Err(StorageError::InvalidConfig {
                message: format!(
                    "cannot delete {} keys in one call (max {})",
                    keys.len(),
                    MAX_DELETE_BATCH
                ),
            });
        }

        let mut result = DeleteBatchResult::default();
        for key in keys {
            if state.denied_deletes.contains(key) {
                result
                    .errors
                    .push(DeleteError::new(key.clone(), "AccessDenied", "Access Denied"));
                continue;
            }
            state.objects.remove(&(bucket.to_string(), key.clone()));
            result.deleted += 1;
        }
        Ok(result)
    }
}
