//! Destination key layout and rehydration location URIs.
//!
//! Rehydrated objects land at `{root_prefix}/{datasetId}/{versionId}/{path}`
//! in the destination bucket. The externally visible rehydration location
//! omits the root prefix: `s3://{bucket}/{datasetId}/{versionId}/`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_ROOT_PREFIX, LOCATION_SCHEME};
use crate::dataset::DatasetVersion;
use crate::error::LocationError;
use crate::path_utils::{ensure_trailing_slash, join_key};

/// Destination bucket and prefix configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationLayout {
    /// Destination bucket name.
    pub bucket: String,
    /// Root prefix for all rehydrated objects (e.g., "rehydrated").
    pub root_prefix: String,
}

impl DestinationLayout {
    /// Create a layout with the default root prefix.
    ///
    /// # Arguments
    /// * `bucket` - Destination bucket name
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            root_prefix: DEFAULT_ROOT_PREFIX.to_string(),
        }
    }

    /// Replace the root prefix. An empty prefix places objects at
    /// `{datasetId}/{versionId}/...`.
    pub fn with_root_prefix(mut self, root_prefix: impl Into<String>) -> Self {
        self.root_prefix = root_prefix.into();
        self
    }

    /// Key prefix holding every object of a dataset version.
    ///
    /// Returns: "{root_prefix}/{datasetId}/{versionId}/"
    pub fn version_prefix(&self, version: &DatasetVersion) -> String {
        join_key(&[&self.root_prefix, &version.id()])
    }

    /// Destination key for one source file.
    ///
    /// Returns: "{root_prefix}/{datasetId}/{versionId}/{path}"
    pub fn destination_key(&self, version: &DatasetVersion, path: &str) -> String {
        join_key(&[&self.root_prefix, &version.id(), path])
    }

    /// Rehydration location URI of a dataset version.
    pub fn location(&self, version: &DatasetVersion) -> RehydrationLocation {
        RehydrationLocation {
            scheme: LOCATION_SCHEME.to_string(),
            bucket: self.bucket.clone(),
            prefix: version.id(),
        }
    }

    /// Map a parsed location back to the key prefix that must be purged.
    ///
    /// # Arguments
    /// * `location` - Location previously produced by `location()`
    ///
    /// # Returns
    /// "{root_prefix}/{location.prefix}"
    pub fn purge_prefix(&self, location: &RehydrationLocation) -> String {
        ensure_trailing_slash(&join_key(&[&self.root_prefix, &location.prefix]))
    }
}

/// A parsed rehydration location: `scheme://bucket/prefix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RehydrationLocation {
    pub scheme: String,
    pub bucket: String,
    /// Non-empty prefix ending in `/`.
    pub prefix: String,
}

impl RehydrationLocation {
    /// Parse a location URI.
    ///
    /// # Arguments
    /// * `uri` - URI of the form `scheme://bucket/prefix/`
    ///
    /// # Errors
    /// Fails if the scheme or bucket is missing, or the prefix is empty or
    /// lacks a trailing `/`.
    pub fn parse(uri: &str) -> Result<Self, LocationError> {
        let (scheme, rest) = uri.split_once("://").ok_or_else(|| LocationError::MissingScheme {
            uri: uri.to_string(),
        })?;
        if scheme.is_empty() {
            return Err(LocationError::MissingScheme {
                uri: uri.to_string(),
            });
        }

        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(LocationError::MissingBucket {
                uri: uri.to_string(),
            });
        }
        if prefix.is_empty() || !prefix.ends_with('/') || prefix.starts_with('/') {
            return Err(LocationError::InvalidPrefix {
                uri: uri.to_string(),
            });
        }

        Ok(Self {
            scheme: scheme.to_string(),
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
        })
    }
}

impl fmt::Display for RehydrationLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.bucket, self.prefix)
    }
}
