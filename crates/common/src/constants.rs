//! Shared constants used across rehydration crates.

/// One mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Files at or above this size are copied with multipart copy (100MB).
pub const MULTIPART_THRESHOLD: u64 = 100 * MIB;

/// Part size for multipart copies (50MB). The final part may be smaller.
pub const MULTIPART_PART_SIZE: u64 = 50 * MIB;

/// Maximum number of parts in a single multipart upload.
pub const MAX_MULTIPART_PARTS: usize = 10_000;

/// Default number of part-copy workers inside one multipart copy.
pub const DEFAULT_MULTIPART_WORKERS: usize = 10;

/// Default number of file-copy workers in the copy engine.
pub const DEFAULT_COPY_WORKERS: usize = 20;

/// Wall-clock bound for a single multipart copy (30 minutes).
pub const MULTIPART_TIMEOUT_SECS: u64 = 30 * 60;

/// Maximum keys accepted by one batched delete call.
pub const MAX_DELETE_BATCH: usize = 1000;

/// Default number of expiration-index records handled per sweep.
pub const DEFAULT_SWEEP_LIMIT: usize = 100;

/// Default time-to-live of a completed rehydration, in days.
pub const DEFAULT_REHYDRATION_TTL_DAYS: i64 = 14;

/// Default root prefix of rehydrated objects in the destination bucket.
pub const DEFAULT_ROOT_PREFIX: &str = "rehydrated";

/// URI scheme used for rehydration locations.
pub const LOCATION_SCHEME: &str = "s3";

/// Default arbitration retries in the admission handler.
pub const DEFAULT_MAX_ADMISSION_RETRIES: usize = 2;

/// Default timeout for discover service calls, in seconds.
pub const DEFAULT_DISCOVER_TIMEOUT_SECS: u64 = 30;
