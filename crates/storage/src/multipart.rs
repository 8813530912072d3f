//! Server-side multipart copy.
//!
//! Large objects are copied as ranged parts within a multipart upload. A
//! bounded pool of workers drains a bounded part queue; completions are
//! gathered, sorted by part number and submitted to finalize. Any worker
//! failure skips finalize and aborts the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use rehydration_common::{
    DEFAULT_MULTIPART_WORKERS, MAX_MULTIPART_PARTS, MULTIPART_PART_SIZE, MULTIPART_TIMEOUT_SECS,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::StorageError;
use crate::parts::{generate_parts, PartInfo};
use crate::traits::StorageClient;
use crate::types::{CompletedPart, SourceObject};

/// Default capacity of the part-descriptor queue.
pub const DEFAULT_PART_QUEUE_CAPACITY: usize = 20;

/// Options for multipart copies.
#[derive(Debug, Clone)]
pub struct MultipartOptions {
    /// Size of each part in bytes; the final part may be smaller.
    pub part_size: u64,
    /// Upper bound on the number of parts.
    pub max_parts: usize,
    /// Number of concurrent part copies.
    pub workers: usize,
    /// Capacity of the part-descriptor queue.
    pub queue_capacity: usize,
    /// Wall-clock bound on the whole copy.
    pub timeout: Duration,
}

impl Default for MultipartOptions {
    fn default() -> Self {
        Self {
            part_size: MULTIPART_PART_SIZE,
            max_parts: MAX_MULTIPART_PARTS,
            workers: DEFAULT_MULTIPART_WORKERS,
            queue_capacity: DEFAULT_PART_QUEUE_CAPACITY,
            timeout: Duration::from_secs(MULTIPART_TIMEOUT_SECS),
        }
    }
}

impl MultipartOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the part size.
    pub fn with_part_size(mut self, part_size: u64) -> Self {
        self.part_size = part_size;
        self
    }

    /// Set the maximum number of parts.
    pub fn with_max_parts(mut self, max_parts: usize) -> Self {
        self.max_parts = max_parts;
        self
    }

    /// Set the number of part workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the part queue capacity.
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Set the wall-clock bound.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Copies one object by ranged parts.
pub struct MultipartCopier<'a, C: StorageClient + ?Sized> {
    client: &'a C,
    options: MultipartOptions,
}

impl<'a, C: StorageClient + ?Sized> MultipartCopier<'a, C> {
    /// Create a copier with default options.
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            options: MultipartOptions::default(),
        }
    }

    /// Set multipart options.
    pub fn with_options(mut self, options: MultipartOptions) -> Self {
        self.options = options;
        self
    }

    /// Copy `source` to `dest_bucket/dest_key` by ranged parts.
    ///
    /// # Arguments
    /// * `source` - Versioned source object; its size drives the part layout
    /// * `dest_bucket` - Destination bucket
    /// * `dest_key` - Destination key
    /// * `cancel` - Cancellation signal
    ///
    /// # Errors
    /// Any part failure, the deadline, or cancellation. The deadline covers
    /// session creation, the parts and finalize. In every error case the
    /// upload session (if created) is aborted on a best-effort basis.
    pub async fn copy(
        &self,
        source: &SourceObject,
        dest_bucket: &str,
        dest_key: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        let parts: Vec<PartInfo> =
            generate_parts(source.size, self.options.part_size, self.options.max_parts)?;
        if parts.is_empty() {
            return Err(StorageError::MultipartFailed {
                bucket: dest_bucket.to_string(),
                key: dest_key.to_string(),
                message: "object has no bytes to copy".to_string(),
            });
        }
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }

        // Set once the session exists so a failure at any later stage can abort it.
        let session: OnceLock<String> = OnceLock::new();
        let timeout: Duration = self.options.timeout;
        let outcome: Result<(), StorageError> = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StorageError::Cancelled),
            result = tokio::time::timeout(
                timeout,
                self.run_session(source, dest_bucket, dest_key, parts, &session),
            ) => match result {
                Ok(inner) => inner,
                Err(_) => Err(StorageError::Timeout {
                    operation: format!("multipart copy to s3://{}/{}", dest_bucket, dest_key),
                    seconds: timeout.as_secs(),
                }),
            },
        };

        if let Err(err) = outcome {
            if let Some(upload_id) = session.get() {
                self.abort(dest_bucket, dest_key, upload_id).await;
            }
            return Err(err);
        }
        Ok(())
    }

    /// Create the session, copy every part and finalize.
    async fn run_session(
        &self,
        source: &SourceObject,
        dest_bucket: &str,
        dest_key: &str,
        parts: Vec<PartInfo>,
        session: &OnceLock<String>,
    ) -> Result<(), StorageError> {
        let upload_id: String = self
            .client
            .create_multipart_upload(dest_bucket, dest_key)
            .await?;
        let _ = session.set(upload_id.clone());
        log::debug!(
            "Started multipart copy of {} to s3://{}/{} ({} parts, upload {})",
            source.key,
            dest_bucket,
            dest_key,
            parts.len(),
            upload_id
        );

        let expected: usize = parts.len();
        let mut completed: Vec<CompletedPart> = self
            .copy_parts(source, dest_bucket, dest_key, &upload_id, parts)
            .await?;
        if completed.len() != expected {
            return Err(StorageError::MultipartFailed {
                bucket: dest_bucket.to_string(),
                key: dest_key.to_string(),
                message: format!("{} of {} parts completed", completed.len(), expected),
            });
        }

        completed.sort_by_key(|part| part.part_number);
        self.client
            .complete_multipart_upload(dest_bucket, dest_key, &upload_id, &completed)
            .await
    }

    /// Run the part worker pool and gather completions.
    ///
    /// Returns the first part error if any worker failed.
    async fn copy_parts(
        &self,
        source: &SourceObject,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<PartInfo>,
    ) -> Result<Vec<CompletedPart>, StorageError> {
        let total: usize = parts.len();
        let workers: usize = self.options.workers.clamp(1, total.max(1));

        let (part_tx, part_rx) = mpsc::channel::<PartInfo>(self.options.queue_capacity.max(1));
        let (done_tx, mut done_rx) = mpsc::channel::<CompletedPart>(total.max(1));
        let part_rx = tokio::sync::Mutex::new(part_rx);
        let worker_failed = AtomicBool::new(false);
        let first_error: Mutex<Option<StorageError>> = Mutex::new(None);

        let part_rx = &part_rx;
        let worker_failed = &worker_failed;
        let first_error = &first_error;

        let producer = async move {
            for part in parts {
                if worker_failed.load(Ordering::Acquire) {
                    break;
                }
                if part_tx.send(part).await.is_err() {
                    break;
                }
            }
        };

        let pool = futures::future::join_all((0..workers).map(|worker_id| {
            let done_tx = done_tx.clone();
            async move {
                loop {
                    let next: Option<PartInfo> = part_rx.lock().await.recv().await;
                    let Some(part) = next else {
                        break;
                    };
                    // Drain remaining descriptors once any worker has failed.
                    if worker_failed.load(Ordering::Acquire) {
                        continue;
                    }

                    match self
                        .client
                        .upload_part_copy(source, bucket, key, upload_id, &part)
                        .await
                    {
                        Ok(completed) => {
                            if done_tx.send(completed).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            log::warn!(
                                "Part worker {} failed on part {} of s3://{}/{}: {}",
                                worker_id,
                                part.part_number,
                                bucket,
                                key,
                                err
                            );
                            {
                                let mut slot = first_error.lock().unwrap();
                                if slot.is_none() {
                                    *slot = Some(err);
                                }
                            }
                            worker_failed.store(true, Ordering::Release);
                        }
                    }
                }
            }
        }));

        tokio::join!(producer, pool);
        drop(done_tx);

        if worker_failed.load(Ordering::Acquire) {
            let err: Option<StorageError> = first_error.lock().unwrap().take();
            return Err(err.unwrap_or_else(|| StorageError::MultipartFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: "part worker failed".to_string(),
            }));
        }

        let mut completed: Vec<CompletedPart> = Vec::with_capacity(total);
        while let Some(part) = done_rx.recv().await {
            completed.push(part);
        }
        Ok(completed)
    }

    /// Abort the upload session; failures are logged, not surfaced.
    async fn abort(&self, bucket: &str, key: &str, upload_id: &str) {
        if let Err(err) = self
            .client
            .abort_multipart_upload(bucket, key, upload_id)
            .await
        {
            log::error!(
                "Failed to abort multipart upload {} for s3://{}/{}: {}",
                upload_id,
                bucket,
                key,
                err
            );
        }
    }
}
