//! DynamoDB table schema constants
//!
//! ## Idempotency table
//!
//! ```text
//! Primary Key:
//!   - id (String, Partition Key): "{datasetId}/{versionId}/"
//!
//! Attributes:
//!   - status: String ("IN_PROGRESS" | "COMPLETED" | "EXPIRED")
//!   - rehydrationLocation: String (optional) - "s3://bucket/{datasetId}/{versionId}/"
//!   - taskARN: String (optional) - owning worker task
//!   - expirationDate: String (optional) - RFC 3339, nanosecond precision
//!
//! Global secondary index ExpirationIndex:
//!   - projects id, status, rehydrationLocation, expirationDate
//! ```
//!
//! ## Tracking table
//!
//! ```text
//! Primary Key:
//!   - id (String, Partition Key): "{datasetId}/{versionId}/{taskArn}"
//!
//! Attributes:
//!   - datasetId, versionId: Number
//!   - userName, userEmail, taskArn: String
//!   - status: String ("IN_PROGRESS" | "SUCCESS" | "FAILED")
//!   - createdAt, updatedAt: String (RFC 3339)
//! ```

/// Primary key attribute - dataset-version id
pub const ATTR_ID: &str = "id";

/// Status attribute
/// Note: "status" is a DynamoDB reserved word, use ExpressionAttributeNames
pub const ATTR_STATUS: &str = "status";

/// Destination URI of a completed rehydration
pub const ATTR_REHYDRATION_LOCATION: &str = "rehydrationLocation";

/// Owning worker task
pub const ATTR_TASK_ARN: &str = "taskARN";

/// Expiration timestamp
pub const ATTR_EXPIRATION_DATE: &str = "expirationDate";

/// Secondary index over expiration dates
pub const EXPIRATION_INDEX_NAME: &str = "ExpirationIndex";

// ---------------------------------------------------------------------------
// Tracking table
// ---------------------------------------------------------------------------

pub const ATTR_DATASET_ID: &str = "datasetId";
pub const ATTR_VERSION_ID: &str = "versionId";
pub const ATTR_USER_NAME: &str = "userName";
pub const ATTR_USER_EMAIL: &str = "userEmail";
/// Tracking rows spell the task attribute in camel case.
pub const ATTR_TRACKING_TASK_ARN: &str = "taskArn";
pub const ATTR_CREATED_AT: &str = "createdAt";
pub const ATTR_UPDATED_AT: &str = "updatedAt";
