//! Idempotency store trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::IdempotencyError;
use crate::record::{ExpirationProjection, IdempotencyRecord};

/// Keyed record store with single-key conditional writes.
///
/// Every write is serializable per key; there are no multi-key
/// transactions. Implementations must use compare-and-set primitives with
/// strong single-key consistency.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Insert a new IN_PROGRESS record if none exists for `id`.
    ///
    /// # Arguments
    /// * `id` - Dataset-version id
    /// * `task_arn` - Owning task, when already known
    ///
    /// # Errors
    /// `RecordAlreadyExists`, carrying the stored record when the backend
    /// returns it.
    async fn save_in_progress(
        &self,
        id: &str,
        task_arn: Option<&str>,
    ) -> Result<IdempotencyRecord, IdempotencyError>;

    /// Fetch a record. `Ok(None)` iff it is absent.
    async fn get_record(&self, id: &str) -> Result<Option<IdempotencyRecord>, IdempotencyError>;

    /// Overwrite the mutable fields (`status`, `rehydrationLocation`,
    /// `expirationDate`, `taskARN`) in one write. Unset fields are removed.
    ///
    /// # Errors
    /// `RecordDoesNotExist` if the record has been deleted.
    async fn update_record(&self, record: &IdempotencyRecord) -> Result<(), IdempotencyError>;

    /// Set the owning task. No status precondition.
    ///
    /// # Errors
    /// `RecordDoesNotExist` if the record is absent; the record is never
    /// recreated by this call.
    async fn set_task_arn(&self, id: &str, task_arn: &str) -> Result<(), IdempotencyError>;

    /// Remove a record. Deleting an absent record succeeds.
    async fn delete_record(&self, id: &str) -> Result<(), IdempotencyError>;

    /// Set `status = EXPIRED`.
    ///
    /// # Errors
    /// `RecordDoesNotExist` if the record is absent.
    async fn expire_record(&self, id: &str) -> Result<(), IdempotencyError>;

    /// Set or push back the expiration date of a COMPLETED record.
    ///
    /// Only succeeds when the status is COMPLETED and the stored date is
    /// unset or earlier than `date`.
    ///
    /// # Errors
    /// `ConditionFailed` naming the offending field(s), or
    /// `RecordDoesNotExist`.
    async fn set_expiration_date(
        &self,
        id: &str,
        date: DateTime<Utc>,
    ) -> Result<(), IdempotencyError>;

    /// Up to `limit` COMPLETED records whose expiration date is at or
    /// before `now`. No ordering guarantee.
    async fn query_expiration_index(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ExpirationProjection>, IdempotencyError>;

    /// Up to `limit` EXPIRED records whose expiration date is at or before
    /// `now`: expirations a previous sweep could not finish.
    async fn query_expired_records(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ExpirationProjection>, IdempotencyError>;

    /// Set `status = EXPIRED` if the stored status and expiration date still
    /// equal the projected ones.
    ///
    /// # Returns
    /// The updated record.
    ///
    /// # Errors
    /// `ConditionFailed` carrying expected and actual values on mismatch
    /// (including when the record has vanished).
    async fn expire_by_index(
        &self,
        projection: &ExpirationProjection,
    ) -> Result<IdempotencyRecord, IdempotencyError>;
}
