//! Error types for S3 storage operations.

use aws_sdk_s3::error::SdkError;
use aws_smithy_types::error::display::DisplayErrorContext;
use rehydration_storage::StorageError;
use thiserror::Error;

/// Errors specific to the S3 storage client.
#[derive(Error, Debug)]
pub enum S3Error {
    /// 404 from the service.
    #[error("Object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// 401/403 from the service.
    #[error("Access denied to s3://{bucket}/{key}: {message}")]
    AccessDenied {
        bucket: String,
        key: String,
        message: String,
    },

    /// Any other service response.
    #[error("S3 error for s3://{bucket}/{key} (HTTP {status}): {message}")]
    Service {
        bucket: String,
        key: String,
        status: u16,
        message: String,
    },

    /// Timeout or connection failure before a response arrived.
    #[error("S3 transport error for s3://{bucket}/{key}: {message}")]
    Transport {
        bucket: String,
        key: String,
        message: String,
    },

    /// Request could not be built.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl S3Error {
    /// Classify an SDK error by HTTP status.
    ///
    /// # Arguments
    /// * `err` - Error returned by an S3 operation
    /// * `bucket` - Bucket the operation addressed
    /// * `key` - Key the operation addressed
    pub fn from_sdk<E>(err: SdkError<E>, bucket: &str, key: &str) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let status: Option<u16> = match &err {
            SdkError::ServiceError(service_err) => Some(service_err.raw().status().as_u16()),
            _ => None,
        };
        let message: String = DisplayErrorContext(&err).to_string();
        match status {
            Some(status) => Self::from_status(status, bucket, key, message),
            None => S3Error::Transport {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message,
            },
        }
    }

    /// Classify a service response status.
    pub fn from_status(status: u16, bucket: &str, key: &str, message: String) -> Self {
        match status {
            404 => S3Error::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            401 | 403 => S3Error::AccessDenied {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message,
            },
            _ => S3Error::Service {
                bucket: bucket.to_string(),
                key: key.to_string(),
                status,
                message,
            },
        }
    }
}

/// Throttling and server errors are worth retrying.
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

impl From<S3Error> for StorageError {
    fn from(err: S3Error) -> Self {
        match err {
            S3Error::NotFound { bucket, key } => StorageError::NotFound { bucket, key },
            S3Error::AccessDenied {
                bucket,
                key,
                message,
            } => StorageError::AccessDenied {
                bucket,
                key,
                message,
            },
            S3Error::Service {
                status, message, ..
            } => StorageError::NetworkError {
                message: format!("HTTP {}: {}", status, message),
                retryable: is_retryable_status(status),
            },
            S3Error::Transport { message, .. } => StorageError::NetworkError {
                message,
                retryable: true,
            },
            S3Error::ConfigError(message) => StorageError::InvalidConfig { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_storage_not_found() {
        let err: StorageError =
            S3Error::from_status(404, "discover-bucket", "1234/a.dat", String::new()).into();
        assert!(matches!(
            err,
            StorageError::NotFound { ref bucket, ref key } if bucket == "discover-bucket" && key == "1234/a.dat"
        ));
    }

    #[test]
    fn test_forbidden_maps_to_access_denied() {
        let err: StorageError =
            S3Error::from_status(403, "b", "k", "AccessDenied".to_string()).into();
        assert!(matches!(err, StorageError::AccessDenied { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_throttling_is_retryable() {
        let err: StorageError = S3Error::from_status(503, "b", "k", "SlowDown".to_string()).into();
        assert!(err.is_retryable());

        let err: StorageError =
            S3Error::from_status(400, "b", "k", "InvalidRequest".to_string()).into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_config_error_maps_to_invalid_config() {
        let err: StorageError = S3Error::ConfigError("missing key".to_string()).into();
        assert!(matches!(err, StorageError::InvalidConfig { .. }));
    }
}
