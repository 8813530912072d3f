//! Service configuration.

use chrono::Duration;
use rehydration_common::{
    DestinationLayout, DEFAULT_COPY_WORKERS, DEFAULT_MAX_ADMISSION_RETRIES,
    DEFAULT_REHYDRATION_TTL_DAYS, DEFAULT_SWEEP_LIMIT,
};
use rehydration_storage::CopyOptions;

/// Settings for one rehydration attempt.
#[derive(Debug, Clone)]
pub struct RehydrationSettings {
    /// Destination bucket and key layout.
    pub layout: DestinationLayout,
    /// How long a completed rehydration is kept.
    pub ttl: Duration,
    /// Copy engine and multipart options.
    pub copy: CopyOptions,
    /// Concurrent per-file discover lookups.
    pub resolve_workers: usize,
}

impl RehydrationSettings {
    /// Settings with default TTL and copy options.
    pub fn new(layout: DestinationLayout) -> Self {
        Self {
            layout,
            ttl: Duration::days(DEFAULT_REHYDRATION_TTL_DAYS),
            copy: CopyOptions::default(),
            resolve_workers: DEFAULT_COPY_WORKERS,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_ttl_days(self, days: i64) -> Self {
        self.with_ttl(Duration::days(days))
    }

    pub fn with_copy_options(mut self, copy: CopyOptions) -> Self {
        self.copy = copy;
        self
    }

    pub fn with_resolve_workers(mut self, workers: usize) -> Self {
        self.resolve_workers = workers;
        self
    }
}

/// Options for the admission handler.
#[derive(Debug, Clone)]
pub struct AdmissionOptions {
    /// Retries after a record vanished between insert and read.
    pub max_retries: usize,
}

impl Default for AdmissionOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_ADMISSION_RETRIES,
        }
    }
}

impl AdmissionOptions {
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Options for the expiration sweeper.
#[derive(Debug, Clone)]
pub struct SweepOptions {
    /// Records examined per sweep.
    pub limit: usize,
    /// Also finish expirations an earlier sweep left in EXPIRED.
    pub retry_expired: bool,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_SWEEP_LIMIT,
            retry_expired: true,
        }
    }
}

impl SweepOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_retry_expired(mut self, retry_expired: bool) -> Self {
        self.retry_expired = retry_expired;
        self
    }
}
