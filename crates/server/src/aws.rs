//! Shared AWS client configuration

use aws_config::{BehaviorVersion, Region, SdkConfig};
use rehydration_storage::StorageSettings;

use crate::config::AwsArgs;

/// Load the SDK configuration once per process.
pub async fn load_sdk_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}

/// S3 settings for the given AWS arguments.
pub fn storage_settings(aws: &AwsArgs) -> StorageSettings {
    StorageSettings {
        region: aws.region.clone(),
        endpoint: aws.endpoint_url.clone(),
        timeout_ms: aws.timeout_ms,
        ..Default::default()
    }
}
