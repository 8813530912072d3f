//! AWS SDK S3 client implementation.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::types::{CompletedMultipartUpload, Delete, ObjectIdentifier};
use aws_sdk_s3::Client as S3Client;
use aws_smithy_types::retry::RetryConfig;
use aws_smithy_types::timeout::TimeoutConfig;

use rehydration_storage::{
    CompletedPart, DeleteBatchResult, DeleteError, ListPage, PartInfo, SourceObject,
    StorageClient, StorageError, StorageSettings,
};

use crate::error::S3Error;

/// StorageClient implementation using AWS SDK for Rust.
///
/// The underlying client is thread-safe and meant to be built once per
/// process and shared.
#[derive(Clone)]
pub struct S3StorageClient {
    /// The underlying S3 client.
    s3_client: S3Client,
    /// Expected bucket owner for security validation.
    expected_bucket_owner: Option<String>,
}

impl S3StorageClient {
    /// Create a new S3 storage client with the default credential chain.
    ///
    /// # Arguments
    /// * `settings` - Storage settings including region and optional credentials
    ///
    /// # Returns
    /// A new S3 storage client.
    pub async fn new(settings: StorageSettings) -> Result<Self, StorageError> {
        let config_loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(settings.region.clone()));

        let config_loader = if let Some(ref creds) = settings.credentials {
            let credentials = Credentials::new(
                &creds.access_key_id,
                &creds.secret_access_key,
                creds.session_token.clone(),
                None,
                "rehydration",
            );
            config_loader.credentials_provider(credentials)
        } else {
            config_loader
        };

        let sdk_config = config_loader.load().await;
        Ok(Self::from_sdk_config(&sdk_config, &settings))
    }

    /// Create a client from a loaded SDK config, applying endpoint, retry and
    /// timeout overrides from `settings`.
    pub fn from_sdk_config(sdk_config: &aws_config::SdkConfig, settings: &StorageSettings) -> Self {
        let mut builder = aws_sdk_s3::config::Builder::from(sdk_config);

        if let Some(ref endpoint) = settings.endpoint {
            // LocalStack and MinIO need path-style addressing.
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let retry_config = RetryConfig::standard()
            .with_max_attempts(settings.retry.max_attempts.max(1))
            .with_initial_backoff(Duration::from_millis(settings.retry.initial_backoff_ms))
            .with_max_backoff(Duration::from_millis(settings.retry.max_backoff_ms));
        builder = builder.retry_config(retry_config);

        if let Some(timeout_ms) = settings.timeout_ms {
            let timeout_config = TimeoutConfig::builder()
                .operation_timeout(Duration::from_millis(timeout_ms))
                .build();
            builder = builder.timeout_config(timeout_config);
        }

        Self {
            s3_client: S3Client::from_conf(builder.build()),
            expected_bucket_owner: settings.expected_bucket_owner.clone(),
        }
    }

    /// Create a client from an existing S3Client (for testing).
    ///
    /// # Arguments
    /// * `s3_client` - Pre-configured S3 client
    /// * `expected_bucket_owner` - Optional expected bucket owner
    pub fn from_client(s3_client: S3Client, expected_bucket_owner: Option<String>) -> Self {
        Self {
            s3_client,
            expected_bucket_owner,
        }
    }
}

/// Build the completion body; `parts` must already be sorted.
fn completed_upload(parts: &[CompletedPart]) -> CompletedMultipartUpload {
    let parts: Vec<aws_sdk_s3::types::CompletedPart> = parts
        .iter()
        .map(|part| {
            aws_sdk_s3::types::CompletedPart::builder()
                .part_number(part.part_number)
                .e_tag(&part.etag)
                .build()
        })
        .collect();
    CompletedMultipartUpload::builder()
        .set_parts(Some(parts))
        .build()
}

/// Build a quiet delete request; only failures are reported back.
fn delete_request(keys: &[String]) -> Result<Delete, StorageError> {
    let objects: Vec<ObjectIdentifier> = keys
        .iter()
        .map(|key| ObjectIdentifier::builder().key(key).build())
        .collect::<Result<_, _>>()
        .map_err(|e| S3Error::ConfigError(e.to_string()))?;

    Delete::builder()
        .set_objects(Some(objects))
        .quiet(true)
        .build()
        .map_err(|e| S3Error::ConfigError(e.to_string()).into())
}

#[async_trait]
impl StorageClient for S3StorageClient {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<u64>, StorageError> {
        let request = self
            .s3_client
            .head_object()
            .bucket(bucket)
            .key(key)
            .set_expected_bucket_owner(self.expected_bucket_owner.clone());

        match request.send().await {
            Ok(output) => Ok(output.content_length().map(|l| l as u64)),
            Err(err) => {
                if matches!(err.as_service_error(), Some(e) if e.is_not_found()) {
                    Ok(None)
                } else {
                    Err(S3Error::from_sdk(err, bucket, key).into())
                }
            }
        }
    }

    async fn copy_object(
        &self,
        source: &SourceObject,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<(), StorageError> {
        self.s3_client
            .copy_object()
            .bucket(dest_bucket)
            .key(dest_key)
            .copy_source(source.copy_source())
            .set_expected_bucket_owner(self.expected_bucket_owner.clone())
            .send()
            .await
            .map_err(|err| S3Error::from_sdk(err, &source.bucket, &source.key))?;

        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<String, StorageError> {
        let output = self
            .s3_client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .set_expected_bucket_owner(self.expected_bucket_owner.clone())
            .send()
            .await
            .map_err(|err| S3Error::from_sdk(err, bucket, key))?;

        output
            .upload_id()
            .map(String::from)
            .ok_or_else(|| StorageError::MultipartFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: "CreateMultipartUpload returned no upload id".to_string(),
            })
    }

    async fn upload_part_copy(
        &self,
        source: &SourceObject,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part: &PartInfo,
    ) -> Result<CompletedPart, StorageError> {
        let output = self
            .s3_client
            .upload_part_copy()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part.part_number)
            .copy_source(source.copy_source())
            .copy_source_range(part.range_header())
            .set_expected_bucket_owner(self.expected_bucket_owner.clone())
            .send()
            .await
            .map_err(|err| S3Error::from_sdk(err, &source.bucket, &source.key))?;

        let etag: String = output
            .copy_part_result()
            .and_then(|result| result.e_tag())
            .map(String::from)
            .ok_or_else(|| StorageError::MultipartFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: format!("part {} returned no ETag", part.part_number),
            })?;

        Ok(CompletedPart {
            part_number: part.part_number,
            etag,
        })
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StorageError> {
        self.s3_client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_upload(parts))
            .set_expected_bucket_owner(self.expected_bucket_owner.clone())
            .send()
            .await
            .map_err(|err| S3Error::from_sdk(err, bucket, key))?;

        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        self.s3_client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .set_expected_bucket_owner(self.expected_bucket_owner.clone())
            .send()
            .await
            .map_err(|err| S3Error::from_sdk(err, bucket, key))?;

        Ok(())
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage, StorageError> {
        let response = self
            .s3_client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(continuation_token)
            .set_expected_bucket_owner(self.expected_bucket_owner.clone())
            .send()
            .await
            .map_err(|err| S3Error::from_sdk(err, bucket, prefix))?;

        let keys: Vec<String> = response
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(String::from))
            .collect();

        let continuation_token: Option<String> = if response.is_truncated() == Some(true) {
            response.next_continuation_token().map(String::from)
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
        if keys.is_empty() {
            return Ok(DeleteBatchResult::default());
        }

        let output = self
            .s3_client
            .delete_objects()
            .bucket(bucket)
            .delete(delete_request(keys)?)
            .set_expected_bucket_owner(self.expected_bucket_owner.clone())
            .send()
            .await
            .map_err(|err| S3Error::from_sdk(err, bucket, ""))?;

        let errors: Vec<DeleteError> = output
            .errors()
            .iter()
            .map(|e| {
                DeleteError::new(
                    e.key().unwrap_or_default(),
                    e.code().unwrap_or("Unknown"),
                    e.message().unwrap_or_default(),
                )
            })
            .collect();

        for error in &errors {
            log::warn!(
                "Failed to delete s3://{}/{}: {} {}",
                bucket,
                error.key,
                error.code,
                error.message
            );
        }

        Ok(DeleteBatchResult {
            deleted: keys.len().saturating_sub(errors.len()),
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_client_implements_storage_client() {
        // This is a compile-time test to ensure the trait is implemented correctly
        fn assert_storage_client<T: StorageClient>() {}
        assert_storage_client::<S3StorageClient>();
    }

    #[test]
    fn test_completed_upload_keeps_order() {
        let parts: Vec<CompletedPart> = (1..=3)
            .map(|n| CompletedPart {
                part_number: n,
                etag: format!("\"etag-{}\"", n),
            })
            .collect();

        let upload: CompletedMultipartUpload = completed_upload(&parts);
        let numbers: Vec<Option<i32>> = upload.parts().iter().map(|p| p.part_number()).collect();
        assert_eq!(numbers, vec![Some(1), Some(2), Some(3)]);
        assert_eq!(upload.parts()[0].e_tag(), Some("\"etag-1\""));
    }

    #[test]
    fn test_delete_request_is_quiet() {
        let keys: Vec<String> = vec!["rehydrated/43/1/a".to_string(), "rehydrated/43/1/b".to_string()];
        let delete: Delete = delete_request(&keys).unwrap();
        assert_eq!(delete.objects().len(), 2);
        assert_eq!(delete.objects()[1].key(), "rehydrated/43/1/b");
        assert_eq!(delete.quiet(), Some(true));
    }

    #[tokio::test]
    async fn test_from_sdk_config_with_endpoint() {
        let sdk_config = aws_config::SdkConfig::builder()
            .region(aws_sdk_s3::config::Region::new("us-east-1"))
            .behavior_version(BehaviorVersion::latest())
            .build();
        let settings = StorageSettings {
            endpoint: Some("http://localhost:4566".to_string()),
            timeout_ms: Some(5_000),
            expected_bucket_owner: Some("123456789012".to_string()),
            ..StorageSettings::default()
        };

        let client = S3StorageClient::from_sdk_config(&sdk_config, &settings);
        assert_eq!(client.expected_bucket_owner.as_deref(), Some("123456789012"));
    }
}
