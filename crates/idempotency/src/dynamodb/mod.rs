//! DynamoDB idempotency store.
//!
//! Provides `DynamoDbIdempotencyStore`, which maps every trait operation to a
//! single conditional `PutItem`/`UpdateItem`/`DeleteItem` so that writes are
//! serialized per key by DynamoDB itself.

pub mod schema;
pub mod tracking;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use aws_sdk_dynamodb::types::error::ConditionalCheckFailedException;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue, ReturnValuesOnConditionCheckFailure};
use aws_sdk_dynamodb::Client;
use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::timeout::TimeoutConfig;
use chrono::{DateTime, Utc};
use schema::*;

use crate::backend::IdempotencyStore;
use crate::conditions::{expiration_update_error, projection_error};
use crate::error::IdempotencyError;
use crate::record::{ExpirationProjection, IdempotencyRecord, RecordStatus};
use crate::timestamp::{format_timestamp, parse_timestamp};

pub use tracking::DynamoDbTrackingStore;

/// DynamoDB table configuration
#[derive(Debug, Clone)]
pub struct DynamoDbConfig {
    /// DynamoDB table name
    pub table_name: String,
    /// Expiration index name
    pub index_name: String,
    /// AWS region (optional, uses SDK default if not specified)
    pub region: Option<String>,
    /// Optional endpoint override (e.g. LocalStack)
    pub endpoint: Option<String>,
    /// Timeout in milliseconds
    pub timeout_ms: Option<u64>,
}

impl DynamoDbConfig {
    /// Config for `table_name` with the default index and SDK settings.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            index_name: EXPIRATION_INDEX_NAME.to_string(),
            region: None,
            endpoint: None,
            timeout_ms: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Build a DynamoDB client that inherits `sdk_config` and applies the
/// overrides in `config`.
pub fn build_client(sdk_config: &aws_config::SdkConfig, config: &DynamoDbConfig) -> Client {
    let mut builder = aws_sdk_dynamodb::config::Builder::from(sdk_config);

    if let Some(region) = &config.region {
        builder = builder.region(aws_sdk_dynamodb::config::Region::new(region.clone()));
    }

    if let Some(endpoint) = &config.endpoint {
        builder = builder.endpoint_url(endpoint);
    }

    if let Some(timeout_ms) = config.timeout_ms {
        let timeout_config = TimeoutConfig::builder()
            .operation_timeout(Duration::from_millis(timeout_ms))
            .build();
        builder = builder.timeout_config(timeout_config);
    }

    Client::from_conf(builder.build())
}

/// DynamoDB-backed `IdempotencyStore`.
#[derive(Clone)]
pub struct DynamoDbIdempotencyStore {
    client: Client,
    table_name: String,
    index_name: String,
}

impl std::fmt::Debug for DynamoDbIdempotencyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbIdempotencyStore")
            .field("table_name", &self.table_name)
            .field("index_name", &self.index_name)
            .finish()
    }
}

impl DynamoDbIdempotencyStore {
    /// Create a store from shared SDK configuration.
    pub fn new(sdk_config: &aws_config::SdkConfig, config: DynamoDbConfig) -> Self {
        let client: Client = build_client(sdk_config, &config);
        Self {
            client,
            table_name: config.table_name,
            index_name: config.index_name,
        }
    }

    /// Create from a pre-built client (for testing)
    pub fn from_client(client: Client, table_name: String, index_name: String) -> Self {
        Self {
            client,
            table_name,
            index_name,
        }
    }

    /// Convert a record to a DynamoDB item. Unset fields are omitted.
    fn record_to_item(record: &IdempotencyRecord) -> HashMap<String, AttributeValue> {
        let mut item: HashMap<String, AttributeValue> = HashMap::new();
        item.insert(ATTR_ID.to_string(), AttributeValue::S(record.id.clone()));
        item.insert(
            ATTR_STATUS.to_string(),
            AttributeValue::S(record.status.as_str().to_string()),
        );
        if let Some(location) = &record.rehydration_location {
            item.insert(
                ATTR_REHYDRATION_LOCATION.to_string(),
                AttributeValue::S(location.clone()),
            );
        }
        if let Some(task_arn) = &record.task_arn {
            item.insert(ATTR_TASK_ARN.to_string(), AttributeValue::S(task_arn.clone()));
        }
        if let Some(date) = &record.expiration_date {
            item.insert(
                ATTR_EXPIRATION_DATE.to_string(),
                AttributeValue::S(format_timestamp(date)),
            );
        }
        item
    }

    /// Convert a DynamoDB item to a record.
    fn item_to_record(
        item: &HashMap<String, AttributeValue>,
    ) -> Result<IdempotencyRecord, IdempotencyError> {
        let id: String = required_string(item, ATTR_ID, "<unknown>")?;
        Ok(IdempotencyRecord {
            status: decode_status(item, &id)?,
            rehydration_location: optional_string(item, ATTR_REHYDRATION_LOCATION),
            task_arn: optional_string(item, ATTR_TASK_ARN),
            expiration_date: optional_date(item, &id)?,
            id,
        })
    }

    /// Convert an expiration index item to a projection.
    fn item_to_projection(
        item: &HashMap<String, AttributeValue>,
    ) -> Result<ExpirationProjection, IdempotencyError> {
        let id: String = required_string(item, ATTR_ID, "<unknown>")?;
        let expiration_date: DateTime<Utc> =
            optional_date(item, &id)?.ok_or_else(|| IdempotencyError::InvalidRecord {
                id: id.clone(),
                message: format!("index item lacks {}", ATTR_EXPIRATION_DATE),
            })?;
        Ok(ExpirationProjection {
            status: decode_status(item, &id)?,
            rehydration_location: optional_string(item, ATTR_REHYDRATION_LOCATION),
            expiration_date,
            id,
        })
    }

    /// Decode the old item carried by a condition failure, if any.
    fn old_record(failure: &ConditionalCheckFailedException) -> Option<IdempotencyRecord> {
        let item = failure.item()?;
        match Self::item_to_record(item) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("Could not decode item returned by condition failure: {}", e);
                None
            }
        }
    }

    /// The condition failure behind an UpdateItem error, if that is what it is.
    fn update_condition_failure(
        err: &SdkError<UpdateItemError>,
    ) -> Option<&ConditionalCheckFailedException> {
        match err {
            SdkError::ServiceError(service_err) => match service_err.err() {
                UpdateItemError::ConditionalCheckFailedException(failure) => Some(failure),
                _ => None,
            },
            _ => None,
        }
    }

    /// The condition failure behind a PutItem error, if that is what it is.
    fn put_condition_failure(
        err: &SdkError<PutItemError>,
    ) -> Option<&ConditionalCheckFailedException> {
        match err {
            SdkError::ServiceError(service_err) => match service_err.err() {
                PutItemError::ConditionalCheckFailedException(failure) => Some(failure),
                _ => None,
            },
            _ => None,
        }
    }

    /// Scan the expiration index for past-due items in `status`.
    ///
    /// `expirationDate` is the index's partition key, and a key condition
    /// cannot range over a partition key, so this is a filtered `Scan`
    /// rather than a `Query`. Each sweep reads every item in the index. The
    /// index is sparse (IN_PROGRESS records carry no expiration date), so it
    /// only holds rehydrations that are live or awaiting cleanup.
    async fn scan_index(
        &self,
        now: DateTime<Utc>,
        status: RecordStatus,
        limit: usize,
    ) -> Result<Vec<ExpirationProjection>, IdempotencyError> {
        let mut projections: Vec<ExpirationProjection> = Vec::new();
        let mut last_evaluated_key = None;

        while projections.len() < limit {
            let mut request = self
                .client
                .scan()
                .table_name(&self.table_name)
                .index_name(&self.index_name)
                .filter_expression("#exp <= :now AND #st = :status")
                .expression_attribute_names("#exp", ATTR_EXPIRATION_DATE)
                .expression_attribute_names("#st", ATTR_STATUS)
                .expression_attribute_values(":now", AttributeValue::S(format_timestamp(&now)))
                .expression_attribute_values(
                    ":status",
                    AttributeValue::S(status.as_str().to_string()),
                );

            if let Some(key) = last_evaluated_key.take() {
                request = request.set_exclusive_start_key(Some(key));
            }

            let response = request
                .send()
                .await
                .map_err(|e| Self::sdk_error("Scan", &e))?;

            for item in response.items() {
                match Self::item_to_projection(item) {
                    Ok(projection) => projections.push(projection),
                    Err(e) => log::warn!("Skipping undecodable index item: {}", e),
                }
            }

            match response.last_evaluated_key() {
                Some(key) if !key.is_empty() => {
                    last_evaluated_key = Some(key.clone());
                }
                _ => break,
            }
        }

        projections.truncate(limit);
        Ok(projections)
    }

    fn sdk_error<E>(operation: &str, err: &SdkError<E>) -> IdempotencyError
    where
        E: std::error::Error + 'static,
    {
        IdempotencyError::dynamodb(format!(
            "DynamoDB {} failed: {}",
            operation,
            DisplayErrorContext(err)
        ))
    }
}

fn required_string(
    item: &HashMap<String, AttributeValue>,
    attr: &str,
    id: &str,
) -> Result<String, IdempotencyError> {
    optional_string(item, attr).ok_or_else(|| IdempotencyError::InvalidRecord {
        id: id.to_string(),
        message: format!("missing string attribute {}", attr),
    })
}

fn optional_string(item: &HashMap<String, AttributeValue>, attr: &str) -> Option<String> {
    item.get(attr).and_then(|v| v.as_s().ok()).cloned()
}

fn decode_status(
    item: &HashMap<String, AttributeValue>,
    id: &str,
) -> Result<RecordStatus, IdempotencyError> {
    required_string(item, ATTR_STATUS, id)?
        .parse::<RecordStatus>()
        .map_err(|message: String| IdempotencyError::InvalidRecord {
            id: id.to_string(),
            message,
        })
}

fn optional_date(
    item: &HashMap<String, AttributeValue>,
    id: &str,
) -> Result<Option<DateTime<Utc>>, IdempotencyError> {
    optional_string(item, ATTR_EXPIRATION_DATE)
        .map(|raw| {
            parse_timestamp(&raw).map_err(|e| IdempotencyError::InvalidRecord {
                id: id.to_string(),
                message: format!("bad {} '{}': {}", ATTR_EXPIRATION_DATE, raw, e),
            })
        })
        .transpose()
}

#[async_trait]
impl IdempotencyStore for DynamoDbIdempotencyStore {
    async fn save_in_progress(
        &self,
        id: &str,
        task_arn: Option<&str>,
    ) -> Result<IdempotencyRecord, IdempotencyError> {
        let mut record: IdempotencyRecord = IdempotencyRecord::in_progress(id);
        record.task_arn = task_arn.map(String::from);

        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(Self::record_to_item(&record)))
            .condition_expression("attribute_not_exists(#id)")
            .expression_attribute_names("#id", ATTR_ID)
            .return_values_on_condition_check_failure(ReturnValuesOnConditionCheckFailure::AllOld)
            .send()
            .await;

        match result {
            Ok(_) => Ok(record),
            Err(e) => match Self::put_condition_failure(&e) {
                Some(failure) => Err(IdempotencyError::RecordAlreadyExists {
                    id: id.to_string(),
                    existing: Self::old_record(failure).map(Box::new),
                }),
                None => Err(Self::sdk_error("PutItem", &e)),
            },
        }
    }

    async fn get_record(&self, id: &str) -> Result<Option<IdempotencyRecord>, IdempotencyError> {
        let response = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(ATTR_ID, AttributeValue::S(id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| Self::sdk_error("GetItem", &e))?;

        response.item().map(Self::item_to_record).transpose()
    }

    async fn update_record(&self, record: &IdempotencyRecord) -> Result<(), IdempotencyError> {
        record.validate()?;

        let mut sets: Vec<&str> = vec!["#st = :st"];
        let mut removes: Vec<&str> = Vec::new();
        let mut request = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key(ATTR_ID, AttributeValue::S(record.id.clone()))
            .condition_expression("attribute_exists(#id)")
            .expression_attribute_names("#id", ATTR_ID)
            .expression_attribute_names("#st", ATTR_STATUS)
            .expression_attribute_names("#loc", ATTR_REHYDRATION_LOCATION)
            .expression_attribute_names("#arn", ATTR_TASK_ARN)
            .expression_attribute_names("#exp", ATTR_EXPIRATION_DATE)
            .expression_attribute_values(
                ":st",
                AttributeValue::S(record.status.as_str().to_string()),
            );

        match &record.rehydration_location {
            Some(location) => {
                sets.push("#loc = :loc");
                request = request
                    .expression_attribute_values(":loc", AttributeValue::S(location.clone()));
            }
            None => removes.push("#loc"),
        }
        match &record.task_arn {
            Some(task_arn) => {
                sets.push("#arn = :arn");
                request = request
                    .expression_attribute_values(":arn", AttributeValue::S(task_arn.clone()));
            }
            None => removes.push("#arn"),
        }
        match &record.expiration_date {
            Some(date) => {
                sets.push("#exp = :exp");
                request = request
                    .expression_attribute_values(":exp", AttributeValue::S(format_timestamp(date)));
            }
            None => removes.push("#exp"),
        }

        let mut update_expr: String = format!("SET {}", sets.join(", "));
        if !removes.is_empty() {
            update_expr.push_str(&format!(" REMOVE {}", removes.join(", ")));
        }

        let result = request.update_expression(update_expr).send().await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if Self::update_condition_failure(&e).is_some() => {
                Err(IdempotencyError::RecordDoesNotExist {
                    id: record.id.clone(),
                })
            }
            Err(e) => Err(Self::sdk_error("UpdateItem", &e)),
        }
    }

    async fn set_task_arn(&self, id: &str, task_arn: &str) -> Result<(), IdempotencyError> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key(ATTR_ID, AttributeValue::S(id.to_string()))
            .update_expression("SET #arn = :arn")
            .condition_expression("attribute_exists(#id)")
            .expression_attribute_names("#id", ATTR_ID)
            .expression_attribute_names("#arn", ATTR_TASK_ARN)
            .expression_attribute_values(":arn", AttributeValue::S(task_arn.to_string()))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if Self::update_condition_failure(&e).is_some() => {
                Err(IdempotencyError::RecordDoesNotExist { id: id.to_string() })
            }
            Err(e) => Err(Self::sdk_error("UpdateItem", &e)),
        }
    }

    async fn delete_record(&self, id: &str) -> Result<(), IdempotencyError> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key(ATTR_ID, AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| Self::sdk_error("DeleteItem", &e))?;
        Ok(())
    }

    async fn expire_record(&self, id: &str) -> Result<(), IdempotencyError> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key(ATTR_ID, AttributeValue::S(id.to_string()))
            .update_expression("SET #st = :expired")
            .condition_expression("attribute_exists(#id)")
            .expression_attribute_names("#id", ATTR_ID)
            .expression_attribute_names("#st", ATTR_STATUS)
            .expression_attribute_values(
                ":expired",
                AttributeValue::S(RecordStatus::Expired.as_str().to_string()),
            )
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if Self::update_condition_failure(&e).is_some() => {
                Err(IdempotencyError::RecordDoesNotExist { id: id.to_string() })
            }
            Err(e) => Err(Self::sdk_error("UpdateItem", &e)),
        }
    }

    async fn set_expiration_date(
        &self,
        id: &str,
        date: DateTime<Utc>,
    ) -> Result<(), IdempotencyError> {
        // Fixed-width UTC timestamps order lexicographically.
        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key(ATTR_ID, AttributeValue::S(id.to_string()))
            .update_expression("SET #exp = :date")
            .condition_expression(
                "#st = :completed AND (attribute_not_exists(#exp) OR #exp < :date)",
            )
            .expression_attribute_names("#st", ATTR_STATUS)
            .expression_attribute_names("#exp", ATTR_EXPIRATION_DATE)
            .expression_attribute_values(
                ":completed",
                AttributeValue::S(RecordStatus::Completed.as_str().to_string()),
            )
            .expression_attribute_values(":date", AttributeValue::S(format_timestamp(&date)))
            .return_values_on_condition_check_failure(ReturnValuesOnConditionCheckFailure::AllOld)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => match Self::update_condition_failure(&e) {
                Some(failure) => {
                    let stored: Option<IdempotencyRecord> = Self::old_record(failure);
                    Err(expiration_update_error(id, stored.as_ref(), &date))
                }
                None => Err(Self::sdk_error("UpdateItem", &e)),
            },
        }
    }

    async fn query_expiration_index(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ExpirationProjection>, IdempotencyError> {
        self.scan_index(now, RecordStatus::Completed, limit).await
    }

    async fn query_expired_records(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ExpirationProjection>, IdempotencyError> {
        self.scan_index(now, RecordStatus::Expired, limit).await
    }

    async fn expire_by_index(
        &self,
        projection: &ExpirationProjection,
    ) -> Result<IdempotencyRecord, IdempotencyError> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key(ATTR_ID, AttributeValue::S(projection.id.clone()))
            .update_expression("SET #st = :expired")
            .condition_expression("#st = :expected_status AND #exp = :expected_exp")
            .expression_attribute_names("#st", ATTR_STATUS)
            .expression_attribute_names("#exp", ATTR_EXPIRATION_DATE)
            .expression_attribute_values(
                ":expired",
                AttributeValue::S(RecordStatus::Expired.as_str().to_string()),
            )
            .expression_attribute_values(
                ":expected_status",
                AttributeValue::S(projection.status.as_str().to_string()),
            )
            .expression_attribute_values(
                ":expected_exp",
                AttributeValue::S(format_timestamp(&projection.expiration_date)),
            )
            .return_values(ReturnValue::AllNew)
            .return_values_on_condition_check_failure(ReturnValuesOnConditionCheckFailure::AllOld)
            .send()
            .await;

        match result {
            Ok(output) => match output.attributes() {
                Some(item) => Self::item_to_record(item),
                None => Err(IdempotencyError::InvalidRecord {
                    id: projection.id.clone(),
                    message: "UpdateItem returned no attributes".to_string(),
                }),
            },
            Err(e) => match Self::update_condition_failure(&e) {
                Some(failure) => {
                    let stored: Option<IdempotencyRecord> = Self::old_record(failure);
                    Err(projection_error(projection, stored.as_ref()))
                }
                None => Err(Self::sdk_error("UpdateItem", &e)),
            },
        }
    }
}
