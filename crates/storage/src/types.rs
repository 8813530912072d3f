//! Shared data structures for storage operations.

use rehydration_common::escape_copy_source_key;
use serde::{Deserialize, Serialize};

use crate::error::{DeleteError, StorageError};

/// Configuration settings for storage clients.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// AWS region.
    pub region: String,
    /// AWS credentials (access key, secret key, session token).
    pub credentials: Option<AwsCredentials>,
    /// Endpoint override (e.g. LocalStack/MinIO).
    pub endpoint: Option<String>,
    /// Per-operation timeout in milliseconds, including SDK retries.
    pub timeout_ms: Option<u64>,
    /// Retry settings applied to every request.
    pub retry: RetrySettings,
    /// Expected bucket owner account id, sent with every request when set.
    pub expected_bucket_owner: Option<String>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            region: "us-east-1".into(),
            credentials: None,
            endpoint: None,
            timeout_ms: None,
            retry: RetrySettings::default(),
            expected_bucket_owner: None,
        }
    }
}

/// AWS credentials.
#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

/// Retry settings for storage requests.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Initial backoff delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 20_000,
        }
    }
}

/// A versioned source object to be copied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceObject {
    /// Logical path of the file within the dataset.
    pub path: String,
    /// File name (used for diagnostics).
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Source bucket.
    pub bucket: String,
    /// Source object key.
    pub key: String,
    /// Source object version; pins the copy against later mutation.
    pub version_id: Option<String>,
}

impl SourceObject {
    /// Build the copy-source string for this object.
    ///
    /// Returns: "{bucket}/{escaped key}?versionId={version}" (the query part
    /// only when a version is pinned)
    pub fn copy_source(&self) -> String {
        let escaped: String = escape_copy_source_key(&self.key);
        match self.version_id.as_deref() {
            Some(version) if !version.is_empty() => {
                format!("{}/{}?versionId={}", self.bucket, escaped, version)
            }
            _ => format!("{}/{}", self.bucket, escaped),
        }
    }
}

/// Destination of one copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationObject {
    pub bucket: String,
    pub key: String,
}

impl DestinationObject {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

/// Pairing of one source file and its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RehydrationUnit {
    pub source: SourceObject,
    pub destination: DestinationObject,
}

/// Outcome of copying one unit.
#[derive(Debug, Clone)]
pub struct FileResult {
    /// Id of the worker that processed the unit.
    pub worker_id: usize,
    /// The unit that was processed.
    pub unit: RehydrationUnit,
    /// The failure, if the copy did not succeed.
    pub error: Option<StorageError>,
}

impl FileResult {
    /// Whether the copy succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A finished part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based part number.
    pub part_number: i32,
    /// ETag returned by the part copy.
    pub etag: String,
}

/// One page of keys from a prefix listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Keys in this page.
    pub keys: Vec<String>,
    /// Token for the next page; None when the listing is exhausted.
    pub continuation_token: Option<String>,
}

/// Result of one batched delete call.
#[derive(Debug, Clone, Default)]
pub struct DeleteBatchResult {
    /// Number of objects deleted.
    pub deleted: usize,
    /// Per-object failures, reported in-band.
    pub errors: Vec<DeleteError>,
}

impl DeleteBatchResult {
    /// Merge another batch result into this one.
    pub fn merge(&mut self, other: Self) {
        self.deleted += other.deleted;
        self.errors.extend(other.errors);
    }
}

/// Aggregated statistics for a batch of copies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyStatistics {
    /// Files attempted.
    pub files_processed: u64,
    /// Files copied successfully.
    pub files_copied: u64,
    /// Files that failed.
    pub files_failed: u64,
    /// Bytes copied successfully.
    pub bytes_copied: u64,
}

impl CopyStatistics {
    /// Summarize a set of file results.
    pub fn from_results(results: &[FileResult]) -> Self {
        let mut stats = CopyStatistics::default();
        for result in results {
            stats.files_processed += 1;
            if result.is_success() {
                stats.files_copied += 1;
                stats.bytes_copied += result.unit.source.size;
            } else {
                stats.files_failed += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(key: &str, version: Option<&str>) -> SourceObject {
        SourceObject {
            path: key.to_string(),
            name: "N.dat".to_string(),
            size: 10,
            bucket: "discover-bucket".to_string(),
            key: key.to_string(),
            version_id: version.map(String::from),
        }
    }

    #[test]
    fn test_copy_source_with_version() {
        let src: SourceObject = source("1234/files/my file.dat", Some("v1"));
        assert_eq!(
            src.copy_source(),
            "discover-bucket/1234/files/my%20file.dat?versionId=v1"
        );
    }

    #[test]
    fn test_copy_source_without_version() {
        let src: SourceObject = source("1234/files/a.dat", None);
        assert_eq!(src.copy_source(), "discover-bucket/1234/files/a.dat");

        let src: SourceObject = source("1234/files/a.dat", Some(""));
        assert_eq!(src.copy_source(), "discover-bucket/1234/files/a.dat");
    }

    #[test]
    fn test_copy_statistics_from_results() {
        let unit = RehydrationUnit {
            source: source("a", None),
            destination: DestinationObject::new("dest", "rehydrated/1/1/a"),
        };
        let results: Vec<FileResult> = vec![
            FileResult {
                worker_id: 0,
                unit: unit.clone(),
                error: None,
            },
            FileResult {
                worker_id: 1,
                unit,
                error: Some(StorageError::Cancelled),
            },
        ];

        let stats: CopyStatistics = CopyStatistics::from_results(&results);
        assert_eq!(stats.files_processed, 2);
        assert_eq!(stats.files_copied, 1);
        assert_eq!(stats.files_failed, 1);
        assert_eq!(stats.bytes_copied, 10);
    }
}
