//! Object store adapter for dataset rehydration.
//!
//! This crate provides a backend-agnostic interface for the server-side
//! object operations a rehydration needs, plus the logic built on top of it:
//!
//! - **Copy engine** - Fans out per-file copies across a fixed worker pool
//! - **Multipart copier** - Ranged part copies for large objects, with abort
//!   on failure and a wall-clock bound
//! - **Listing/purge** - Lazy prefix pagination and batched deletes
//!
//! Backends implement [`StorageClient`]. The S3 backend lives in
//! `rehydration-storage-s3`; [`MemoryStorageClient`] serves tests and local
//! runs.

mod copy;
mod error;
mod listing;
pub mod memory;
mod multipart;
mod parts;
mod traits;
mod types;

pub use copy::{CopyEngine, CopyOptions, CopyProcessor, ObjectCopier};
pub use error::{DeleteError, StorageError};
pub use listing::{delete_keys, list_pages, purge_prefix};
pub use memory::{CallCounters, MemoryStorageClient};
pub use multipart::{MultipartCopier, MultipartOptions, DEFAULT_PART_QUEUE_CAPACITY};
pub use parts::{copy_strategy, expected_part_count, generate_parts, CopyStrategy, PartInfo};
pub use traits::StorageClient;
pub use types::{
    AwsCredentials, CompletedPart, CopyStatistics, DeleteBatchResult, DestinationObject,
    FileResult, ListPage, RehydrationUnit, RetrySettings, SourceObject, StorageSettings,
};

pub use tokio_util::sync::CancellationToken;
