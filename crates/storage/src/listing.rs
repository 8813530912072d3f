//! Prefix listing and batched deletes.

use futures::stream::{self, Stream, TryStreamExt};
use rehydration_common::MAX_DELETE_BATCH;

use crate::error::StorageError;
use crate::traits::StorageClient;
use crate::types::{DeleteBatchResult, ListPage};

enum ListState {
    Start,
    Next(String),
    Done,
}

/// Lazily page through every key under a prefix.
///
/// Each item is one page of keys; the page size is whatever the backend
/// returns. The stream ends after the page without a continuation token.
pub fn list_pages<'a, C: StorageClient + ?Sized>(
    client: &'a C,
    bucket: &'a str,
    prefix: &'a str,
) -> impl Stream<Item = Result<Vec<String>, StorageError>> + Send + 'a {
    stream::try_unfold(ListState::Start, move |state| async move {
        let token: Option<String> = match state {
            ListState::Start => None,
            ListState::Next(token) => Some(token),
            ListState::Done => return Ok(None),
        };

        let page: ListPage = client.list_objects_page(bucket, prefix, token).await?;
        let next: ListState = match page.continuation_token {
            Some(token) => ListState::Next(token),
            None => ListState::Done,
        };
        Ok(Some((page.keys, next)))
    })
}

/// Delete keys in batches of at most 1000.
///
/// # Returns
/// The merged per-batch results; per-object failures are in `errors`.
///
/// # Errors
/// The first call-level failure; later batches are not attempted.
pub async fn delete_keys<C: StorageClient + ?Sized>(
    client: &C,
    bucket: &str,
    keys: &[String],
) -> Result<DeleteBatchResult, StorageError> {
    let mut result = DeleteBatchResult::default();
    for batch in keys.chunks(MAX_DELETE_BATCH) {
        let batch_result: DeleteBatchResult = client.delete_objects(bucket, batch).await?;
        result.merge(batch_result);
    }
    Ok(result)
}

/// Delete every object under `prefix`.
///
/// # Arguments
/// * `client` - Storage client
/// * `bucket` - Bucket to purge
/// * `prefix` - Non-empty prefix ending in `/`
///
/// # Errors
/// `InvalidPrefix` for an empty prefix or one without a trailing `/`, or
/// the first list/delete transport failure.
pub async fn purge_prefix<C: StorageClient + ?Sized>(
    client: &C,
    bucket: &str,
    prefix: &str,
) -> Result<DeleteBatchResult, StorageError> {
    if prefix.is_empty() || !prefix.ends_with('/') {
        return Err(StorageError::InvalidPrefix {
            prefix: prefix.to_string(),
        });
    }

    let mut result = DeleteBatchResult::default();
    let mut pages = Box::pin(list_pages(client, bucket, prefix));
    while let Some(keys) = pages.try_next().await? {
        if keys.is_empty() {
            continue;
        }
        result.merge(delete_keys(client, bucket, &keys).await?);
    }

    if !result.errors.is_empty() {
        log::warn!(
            "Purge of s3://{}/{} left {} objects undeleted",
            bucket,
            prefix,
            result.errors.len()
        );
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::memory::MemoryStorageClient;

    fn keys(count: usize) -> Vec<String> {
        (0..count).map(|n| format!("rehydrated/43/1/{:04}", n)).collect()
    }

    #[tokio::test]
    async fn test_delete_exactly_one_batch() {
        let client = MemoryStorageClient::new();
        let result: DeleteBatchResult = delete_keys(&client, "b", &keys(1000)).await.unwrap();
        assert_eq!(result.deleted, 1000);
        assert_eq!(client.counters().delete_objects, 1);
    }

    #[tokio::test]
    async fn test_delete_splits_over_batch_limit() {
        let client = MemoryStorageClient::new();
        let result: DeleteBatchResult = delete_keys(&client, "b", &keys(1001)).await.unwrap();
        assert_eq!(result.deleted, 1001);
        assert_eq!(client.counters().delete_objects, 2);
    }

    #[tokio::test]
    async fn test_list_pages_visits_every_key() {
        let client = MemoryStorageClient::new().with_page_size(3);
        for key in keys(10) {
            client.put_object("b", &key, 1);
        }

        let pages: Vec<Vec<String>> = list_pages(&client, "b", "rehydrated/43/1/")
            .map(|page| page.unwrap())
            .collect()
            .await;

        assert_eq!(pages.len(), 4);
        assert_eq!(pages.concat(), keys(10));
    }

    #[tokio::test]
    async fn test_purge_prefix_leaves_neighbours() {
        let client = MemoryStorageClient::new().with_page_size(25);
        for n in 0..101 {
            client.put_object("b", &format!("rehydrated/43/1/files/{}.dat", n), 1);
        }
        for n in 0..10 {
            client.put_object("b", &format!("rehydrated/43/11/files/{}.dat", n), 1);
        }

        let result: DeleteBatchResult = purge_prefix(&client, "b", "rehydrated/43/1/").await.unwrap();

        assert_eq!(result.deleted, 101);
        assert!(result.errors.is_empty());
        assert!(client.keys("b", "rehydrated/43/1/").is_empty());
        assert_eq!(client.keys("b", "rehydrated/43/11/").len(), 10);
    }

    #[tokio::test]
    async fn test_purge_reports_denied_objects() {
        let client = MemoryStorageClient::new();
        client.put_object("b", "p/a", 1);
        client.put_object("b", "p/b", 1);
        client.deny_delete("p/a");

        let result: DeleteBatchResult = purge_prefix(&client, "b", "p/").await.unwrap();
        assert_eq!(result.deleted, 1);
        assert_eq!(result.errors[0].key, "p/a");
    }

    #[tokio::test]
    async fn test_purge_rejects_prefix_without_slash() {
        let client = MemoryStorageClient::new();
        client.put_object("b", "rehydrated/43/1/a", 1);

        for prefix in ["rehydrated/43/1", ""] {
            let result = purge_prefix(&client, "b", prefix).await;
            assert!(matches!(result, Err(StorageError::InvalidPrefix { .. })));
        }
        assert_eq!(client.counters().list_objects, 0);
    }

    #[tokio::test]
    async fn test_purge_surfaces_listing_failure() {
        let client = MemoryStorageClient::new();
        client.fail_listing();
        let result = purge_prefix(&client, "b", "p/").await;
        assert!(matches!(result, Err(StorageError::NetworkError { .. })));
    }
}
