//! Discover service contract and its HTTP implementation.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use rehydration_common::{DatasetVersion, DEFAULT_DISCOVER_TIMEOUT_SECS};
use serde::de::DeserializeOwned;

use crate::error::DiscoverError;
use crate::types::{DatasetFile, DatasetInfo, DatasetMetadata};

/// The three discover lookups a rehydration depends on.
#[async_trait]
pub trait DiscoverClient: Debug + Send + Sync {
    /// Source location of a dataset version.
    async fn get_dataset_by_version(
        &self,
        version: &DatasetVersion,
    ) -> Result<DatasetInfo, DiscoverError>;

    /// File listing of a dataset version.
    async fn get_dataset_metadata_by_version(
        &self,
        version: &DatasetVersion,
    ) -> Result<DatasetMetadata, DiscoverError>;

    /// Versioned source of one file.
    async fn get_dataset_file_by_version(
        &self,
        version: &DatasetVersion,
        path: &str,
    ) -> Result<DatasetFile, DiscoverError>;
}

/// Settings for the HTTP discover client.
#[derive(Debug, Clone)]
pub struct DiscoverSettings {
    /// Base URL, e.g. `https://discover.dev.internal`.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl DiscoverSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(DEFAULT_DISCOVER_TIMEOUT_SECS),
        }
    }

    /// Settings for a deployment environment.
    ///
    /// # Arguments
    /// * `env` - Deployment environment ("dev", "prod", ...)
    /// * `host_override` - Explicit base URL; wins over the derived host
    pub fn for_env(env: &str, host_override: Option<&str>) -> Self {
        match host_override {
            Some(host) if !host.is_empty() => Self::new(host),
            _ => Self::new(discover_host(env)),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Discover host of a deployment environment.
pub fn discover_host(env: &str) -> String {
    match env {
        "prod" | "production" => "https://discover.internal".to_string(),
        other => format!("https://discover.{}.internal", other),
    }
}

/// reqwest-based `DiscoverClient`.
#[derive(Debug, Clone)]
pub struct HttpDiscoverClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpDiscoverClient {
    /// Create a client with the configured timeout.
    ///
    /// # Errors
    /// `InvalidConfig` if the HTTP client cannot be built.
    pub fn new(settings: DiscoverSettings) -> Result<Self, DiscoverError> {
        let http: reqwest::Client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| DiscoverError::InvalidConfig {
                message: e.to_string(),
            })?;
        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn version_url(&self, version: &DatasetVersion) -> String {
        format!(
            "{}/datasets/{}/versions/{}",
            self.base_url, version.dataset_id, version.version_id
        )
    }

    /// Send a GET and decode a 2xx JSON body.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: String,
        query: &[(&str, &str)],
    ) -> Result<T, DiscoverError> {
        log::debug!("GET {}", url);
        let resp = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| DiscoverError::Request {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body: String = resp.text().await.unwrap_or_default();
            return Err(DiscoverError::Status {
                url,
                status: status.as_u16(),
                body,
            });
        }

        resp.json::<T>().await.map_err(|e| DiscoverError::Decode {
            url,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl DiscoverClient for HttpDiscoverClient {
    async fn get_dataset_by_version(
        &self,
        version: &DatasetVersion,
    ) -> Result<DatasetInfo, DiscoverError> {
        self.get_json(self.version_url(version), &[]).await
    }

    async fn get_dataset_metadata_by_version(
        &self,
        version: &DatasetVersion,
    ) -> Result<DatasetMetadata, DiscoverError> {
        let url: String = format!("{}/metadata", self.version_url(version));
        self.get_json(url, &[]).await
    }

    async fn get_dataset_file_by_version(
        &self,
        version: &DatasetVersion,
        path: &str,
    ) -> Result<DatasetFile, DiscoverError> {
        let url: String = format!("{}/file", self.version_url(version));
        self.get_json(url, &[("path", path)]).await
    }
}
