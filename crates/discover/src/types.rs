//! Discover service response bodies.

use serde::{Deserialize, Serialize};

use crate::error::DiscoverError;

/// Response of `GetDatasetByVersion`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetInfo {
    /// URI of the dataset's source location, e.g. `s3://source-bucket/1234/`.
    pub uri: String,
}

/// One entry of a dataset version's file listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetFileEntry {
    /// Path of the file within the dataset.
    pub path: String,
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub file_type: String,
}

/// Response of `GetDatasetMetadataByVersion`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    #[serde(default)]
    pub files: Vec<DatasetFileEntry>,
}

/// Response of `GetDatasetFileByVersion`: the versioned source of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetFile {
    /// Object URI, `s3://bucket/key`, or a bare key relative to the dataset uri.
    pub uri: String,
    pub size: u64,
    pub name: String,
    #[serde(rename = "s3VersionId", default)]
    pub s3_version_id: Option<String>,
}

/// Bucket and key of an object URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectUri {
    pub bucket: String,
    pub key: String,
}

impl ObjectUri {
    /// Parse `scheme://bucket/key`.
    ///
    /// # Errors
    /// `InvalidUri` if the scheme separator or bucket is missing.
    pub fn parse(uri: &str) -> Result<Self, DiscoverError> {
        let (_, rest) = uri
            .split_once("://")
            .ok_or_else(|| DiscoverError::invalid_uri(uri, "missing scheme"))?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(DiscoverError::invalid_uri(uri, "missing bucket"));
        }
        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// Resolve a file URI, allowing bare keys relative to `dataset_uri`.
    ///
    /// # Arguments
    /// * `file_uri` - Absolute object URI, or a key within the dataset
    /// * `dataset_uri` - URI returned by `GetDatasetByVersion`
    pub fn resolve(file_uri: &str, dataset_uri: &str) -> Result<Self, DiscoverError> {
        if file_uri.contains("://") {
            return Self::parse(file_uri);
        }
        if file_uri.is_empty() {
            return Err(DiscoverError::invalid_uri(file_uri, "empty key"));
        }

        let base: ObjectUri = Self::parse(dataset_uri)?;
        let key: String = if base.key.is_empty() || file_uri.starts_with(&base.key) {
            file_uri.trim_start_matches('/').to_string()
        } else {
            format!(
                "{}/{}",
                base.key.trim_end_matches('/'),
                file_uri.trim_start_matches('/')
            )
        };
        Ok(Self {
            bucket: base.bucket,
            key,
        })
    }

    /// Whether the file URI needs the dataset URI to be resolved.
    pub fn is_relative(file_uri: &str) -> bool {
        !file_uri.contains("://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_uri() {
        let uri: ObjectUri = ObjectUri::parse("s3://source/1234/files/a b.dat").unwrap();
        assert_eq!(uri.bucket, "source");
        assert_eq!(uri.key, "1234/files/a b.dat");

        assert!(ObjectUri::parse("source/key").is_err());
        assert!(ObjectUri::parse("s3:///key").is_err());
    }

    #[test]
    fn test_resolve_relative_key() {
        let uri: ObjectUri = ObjectUri::resolve("files/1.dat", "s3://source/1234/").unwrap();
        assert_eq!(uri.bucket, "source");
        assert_eq!(uri.key, "1234/files/1.dat");

        let absolute: ObjectUri =
            ObjectUri::resolve("s3://other/x.dat", "s3://source/1234/").unwrap();
        assert_eq!(absolute.bucket, "other");

        let bucket_root: ObjectUri = ObjectUri::resolve("x.dat", "s3://source").unwrap();
        assert_eq!(bucket_root.key, "x.dat");
    }

    #[test]
    fn test_dataset_file_json() {
        let file: DatasetFile = serde_json::from_str(
            r#"{"uri":"s3://src/1/a.dat","size":12,"name":"a.dat","s3VersionId":"v3"}"#,
        )
        .unwrap();
        assert_eq!(file.s3_version_id.as_deref(), Some("v3"));

        let metadata: DatasetMetadata = serde_json::from_str(
            r#"{"files":[{"path":"files/a.dat","name":"a.dat","size":12,"fileType":"dat"}]}"#,
        )
        .unwrap();
        assert_eq!(metadata.files[0].file_type, "dat");
    }
}
