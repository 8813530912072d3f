//! DynamoDB tracking store.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use aws_smithy_types::error::display::DisplayErrorContext;
use chrono::{DateTime, Utc};

use super::schema::*;
use super::{build_client, DynamoDbConfig};
use crate::error::IdempotencyError;
use crate::timestamp::format_timestamp;
use crate::tracking::{TrackingRecord, TrackingStatus, TrackingStore};

/// DynamoDB-backed `TrackingStore`.
#[derive(Clone)]
pub struct DynamoDbTrackingStore {
    client: Client,
    table_name: String,
}

impl std::fmt::Debug for DynamoDbTrackingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbTrackingStore")
            .field("table_name", &self.table_name)
            .finish()
    }
}

impl DynamoDbTrackingStore {
    pub fn new(sdk_config: &aws_config::SdkConfig, config: DynamoDbConfig) -> Self {
        let client: Client = build_client(sdk_config, &config);
        Self {
            client,
            table_name: config.table_name,
        }
    }

    /// Create from a pre-built client (for testing)
    pub fn from_client(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }

    fn record_to_item(record: &TrackingRecord) -> HashMap<String, AttributeValue> {
        HashMap::from([
            (ATTR_ID.to_string(), AttributeValue::S(record.id.clone())),
            (
                ATTR_DATASET_ID.to_string(),
                AttributeValue::N(record.dataset_id.to_string()),
            ),
            (
                ATTR_VERSION_ID.to_string(),
                AttributeValue::N(record.version_id.to_string()),
            ),
            (
                ATTR_USER_NAME.to_string(),
                AttributeValue::S(record.user_name.clone()),
            ),
            (
                ATTR_USER_EMAIL.to_string(),
                AttributeValue::S(record.user_email.clone()),
            ),
            (
                ATTR_TRACKING_TASK_ARN.to_string(),
                AttributeValue::S(record.task_arn.clone()),
            ),
            (
                ATTR_STATUS.to_string(),
                AttributeValue::S(record.status.as_str().to_string()),
            ),
            (
                ATTR_CREATED_AT.to_string(),
                AttributeValue::S(format_timestamp(&record.created_at)),
            ),
            (
                ATTR_UPDATED_AT.to_string(),
                AttributeValue::S(format_timestamp(&record.updated_at)),
            ),
        ])
    }
}

#[async_trait]
impl TrackingStore for DynamoDbTrackingStore {
    async fn put_record(&self, record: &TrackingRecord) -> Result<(), IdempotencyError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(Self::record_to_item(record)))
            .send()
            .await
            .map_err(|e| {
                IdempotencyError::dynamodb(format!(
                    "DynamoDB PutItem failed: {}",
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }

    async fn update_status(
        &self,
        id: &str,
        status: TrackingStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), IdempotencyError> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key(ATTR_ID, AttributeValue::S(id.to_string()))
            .update_expression("SET #st = :st, #ua = :ua")
            .condition_expression("attribute_exists(#id)")
            .expression_attribute_names("#id", ATTR_ID)
            .expression_attribute_names("#st", ATTR_STATUS)
            .expression_attribute_names("#ua", ATTR_UPDATED_AT)
            .expression_attribute_values(":st", AttributeValue::S(status.as_str().to_string()))
            .expression_attribute_values(":ua", AttributeValue::S(format_timestamp(&updated_at)))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e)
                if matches!(
                    e.as_service_error(),
                    Some(UpdateItemError::ConditionalCheckFailedException(_))
                ) =>
            {
                Err(IdempotencyError::RecordDoesNotExist { id: id.to_string() })
            }
            Err(e) => Err(IdempotencyError::dynamodb(format!(
                "DynamoDB UpdateItem failed: {}",
                DisplayErrorContext(&e)
            ))),
        }
    }
}
