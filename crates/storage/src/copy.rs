//! Concurrent copy engine.
//!
//! Copies a list of rehydration units with a fixed pool of workers and
//! returns one `FileResult` per unit. Per-file failures do not stop other
//! copies; every unit is attempted.
//!
//! # Copy Strategy
//!
//! - Objects below the multipart threshold (100 MiB): one CopyObject call
//! - Larger objects: ranged part copies via [`MultipartCopier`]
//!
//! # Example
//!
//! ```ignore
//! use rehydration_storage::{CopyEngine, ObjectCopier};
//!
//! let copier = ObjectCopier::new(&client);
//! let results = CopyEngine::new(&copier).run(units, &cancel).await;
//! ```

use async_trait::async_trait;
use rehydration_common::{DEFAULT_COPY_WORKERS, MULTIPART_THRESHOLD};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::StorageError;
use crate::multipart::{MultipartCopier, MultipartOptions};
use crate::parts::{copy_strategy, CopyStrategy};
use crate::traits::StorageClient;
use crate::types::{CopyStatistics, DestinationObject, FileResult, RehydrationUnit, SourceObject};

/// Options for copy operations.
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Number of files copied concurrently.
    pub max_workers: usize,
    /// Objects at or above this size use multipart copy.
    pub multipart_threshold: u64,
    /// Options for multipart copies.
    pub multipart: MultipartOptions,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_COPY_WORKERS,
            multipart_threshold: MULTIPART_THRESHOLD,
            multipart: MultipartOptions::default(),
        }
    }
}

impl CopyOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of concurrent file workers.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Set the simple/multipart threshold.
    pub fn with_multipart_threshold(mut self, threshold: u64) -> Self {
        self.multipart_threshold = threshold;
        self
    }

    /// Set multipart options.
    pub fn with_multipart(mut self, multipart: MultipartOptions) -> Self {
        self.multipart = multipart;
        self
    }
}

/// Copies one file. Implemented by [`ObjectCopier`]; tests may substitute
/// their own processor.
#[async_trait]
pub trait CopyProcessor: Send + Sync {
    /// Copy `source` to `destination`.
    ///
    /// # Errors
    /// Returns `StorageError::CopyFailed` naming the file.
    async fn copy(
        &self,
        source: &SourceObject,
        destination: &DestinationObject,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError>;
}

/// Processor that picks simple or multipart copy by object size.
pub struct ObjectCopier<'a, C: StorageClient + ?Sized> {
    client: &'a C,
    options: CopyOptions,
}

impl<'a, C: StorageClient + ?Sized> ObjectCopier<'a, C> {
    /// Create a copier with default options.
    ///
    /// # Arguments
    /// * `client` - Storage client for S3 operations
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            options: CopyOptions::default(),
        }
    }

    /// Set copy options.
    pub fn with_options(mut self, options: CopyOptions) -> Self {
        self.options = options;
        self
    }

    /// The options in effect.
    pub fn options(&self) -> &CopyOptions {
        &self.options
    }

    async fn copy_unwrapped(
        &self,
        source: &SourceObject,
        destination: &DestinationObject,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        match copy_strategy(source.size, self.options.multipart_threshold) {
            CopyStrategy::Simple => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(StorageError::Cancelled),
                    result = self.client.copy_object(source, &destination.bucket, &destination.key) => result,
                }
            }
            CopyStrategy::Multipart => {
                MultipartCopier::new(self.client)
                    .with_options(self.options.multipart.clone())
                    .copy(source, &destination.bucket, &destination.key, cancel)
                    .await
            }
        }
    }
}

#[async_trait]
impl<'a, C: StorageClient + ?Sized> CopyProcessor for ObjectCopier<'a, C> {
    async fn copy(
        &self,
        source: &SourceObject,
        destination: &DestinationObject,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        self.copy_unwrapped(source, destination, cancel)
            .await
            .map_err(|err| StorageError::copy_failed(&source.name, err))
    }
}

/// Fans out copies across a fixed worker pool.
pub struct CopyEngine<'a, P: CopyProcessor + ?Sized> {
    processor: &'a P,
    workers: usize,
}

impl<'a, P: CopyProcessor + ?Sized> CopyEngine<'a, P> {
    /// Create an engine with the default number of workers.
    pub fn new(processor: &'a P) -> Self {
        Self {
            processor,
            workers: DEFAULT_COPY_WORKERS,
        }
    }

    /// Set the number of workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Copy every unit.
    ///
    /// # Arguments
    /// * `units` - Units to copy
    /// * `cancel` - Cancellation signal; units dequeued after cancellation
    ///   fail with `Cancelled` without touching the store
    ///
    /// # Returns
    /// Exactly one result per unit, in completion order.
    pub async fn run(
        &self,
        units: Vec<RehydrationUnit>,
        cancel: &CancellationToken,
    ) -> Vec<FileResult> {
        let total: usize = units.len();
        if total == 0 {
            return Vec::new();
        }

        let (unit_tx, unit_rx) = mpsc::channel::<RehydrationUnit>(total);
        let (result_tx, mut result_rx) = mpsc::channel::<FileResult>(total);

        // Capacity equals the unit count, so enqueueing never waits.
        for unit in units {
            if unit_tx.send(unit).await.is_err() {
                break;
            }
        }
        drop(unit_tx);

        let unit_rx = Mutex::new(unit_rx);
        let unit_rx = &unit_rx;
        let workers: usize = self.workers.clamp(1, total);

        futures::future::join_all((0..workers).map(|worker_id| {
            let result_tx = result_tx.clone();
            async move {
                loop {
                    let next: Option<RehydrationUnit> = unit_rx.lock().await.recv().await;
                    let Some(unit) = next else {
                        break;
                    };

                    let error: Option<StorageError> = if cancel.is_cancelled() {
                        Some(StorageError::copy_failed(
                            &unit.source.name,
                            StorageError::Cancelled,
                        ))
                    } else {
                        self.processor
                            .copy(&unit.source, &unit.destination, cancel)
                            .await
                            .err()
                    };

                    if let Some(ref err) = error {
                        log::warn!(
                            "Worker {} failed to copy {} to s3://{}/{}: {}",
                            worker_id,
                            unit.source.path,
                            unit.destination.bucket,
                            unit.destination.key,
                            err
                        );
                    }

                    let result = FileResult {
                        worker_id,
                        unit,
                        error,
                    };
                    if result_tx.send(result).await.is_err() {
                        break;
                    }
                }
            }
        }))
        .await;
        drop(result_tx);

        let mut results: Vec<FileResult> = Vec::with_capacity(total);
        while results.len() < total {
            match result_rx.recv().await {
                Some(result) => results.push(result),
                None => break,
            }
        }

        let stats: CopyStatistics = CopyStatistics::from_results(&results);
        log::info!(
            "Copied {}/{} files ({} bytes), {} failed",
            stats.files_copied,
            stats.files_processed,
            stats.bytes_copied,
            stats.files_failed
        );

        results
    }
}
