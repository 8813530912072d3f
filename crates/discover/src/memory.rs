//! In-memory discover client.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use rehydration_common::DatasetVersion;

use crate::client::DiscoverClient;
use crate::error::DiscoverError;
use crate::types::{DatasetFile, DatasetFileEntry, DatasetInfo, DatasetMetadata};

#[derive(Debug, Default)]
struct MemoryDataset {
    uri: String,
    files: Vec<(DatasetFileEntry, DatasetFile)>,
}

#[derive(Debug, Default)]
struct MemoryState {
    datasets: HashMap<DatasetVersion, MemoryDataset>,
    metadata_failures: HashMap<DatasetVersion, u16>,
    file_failures: HashSet<String>,
    calls: usize,
}

/// `DiscoverClient` over fixed, in-process data.
#[derive(Debug, Default)]
pub struct MemoryDiscoverClient {
    state: Mutex<MemoryState>,
}

impl MemoryDiscoverClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dataset version and its source URI.
    pub fn add_dataset(&self, version: DatasetVersion, uri: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        state.datasets.entry(version).or_default().uri = uri.into();
    }

    /// Register one file of a dataset version.
    ///
    /// # Arguments
    /// * `path` - Path within the dataset
    /// * `uri` - Source object URI
    /// * `size` - Size in bytes
    /// * `s3_version_id` - Source object version
    pub fn add_file(
        &self,
        version: DatasetVersion,
        path: &str,
        uri: impl Into<String>,
        size: u64,
        s3_version_id: Option<&str>,
    ) {
        let name: String = path.rsplit('/').next().unwrap_or(path).to_string();
        let entry = DatasetFileEntry {
            path: path.to_string(),
            name: name.clone(),
            size,
            file_type: name.rsplit_once('.').map(|(_, ext)| ext.to_string()).unwrap_or_default(),
        };
        let file = DatasetFile {
            uri: uri.into(),
            size,
            name,
            s3_version_id: s3_version_id.map(String::from),
        };

        let mut state = self.state.lock().unwrap();
        state
            .datasets
            .entry(version)
            .or_default()
            .files
            .push((entry, file));
    }

    /// Make metadata lookups for `version` answer with `status`.
    pub fn fail_metadata(&self, version: DatasetVersion, status: u16) {
        self.state
            .lock()
            .unwrap()
            .metadata_failures
            .insert(version, status);
    }

    /// Make file lookups for `path` answer with 500.
    pub fn fail_file(&self, path: &str) {
        self.state
            .lock()
            .unwrap()
            .file_failures
            .insert(path.to_string());
    }

    /// Number of calls served so far.
    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    fn not_found(version: &DatasetVersion, what: &str) -> DiscoverError {
        DiscoverError::Status {
            url: format!("memory://datasets/{}/{}", version, what),
            status: 404,
            body: "not found".to_string(),
        }
    }
}

#[async_trait]
impl DiscoverClient for MemoryDiscoverClient {
    async fn get_dataset_by_version(
        &self,
        version: &DatasetVersion,
    ) -> Result<DatasetInfo, DiscoverError> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        state
            .datasets
            .get(version)
            .map(|dataset| DatasetInfo {
                uri: dataset.uri.clone(),
            })
            .ok_or_else(|| Self::not_found(version, "dataset"))
    }

    async fn get_dataset_metadata_by_version(
        &self,
        version: &DatasetVersion,
    ) -> Result<DatasetMetadata, DiscoverError> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        if let Some(status) = state.metadata_failures.get(version) {
            return Err(DiscoverError::Status {
                url: format!("memory://datasets/{}/metadata", version),
                status: *status,
                body: "injected failure".to_string(),
            });
        }
        state
            .datasets
            .get(version)
            .map(|dataset| DatasetMetadata {
                files: dataset.files.iter().map(|(entry, _)| entry.clone()).collect(),
            })
            .ok_or_else(|| Self::not_found(version, "metadata"))
    }

    async fn get_dataset_file_by_version(
        &self,
        version: &DatasetVersion,
        path: &str,
    ) -> Result<DatasetFile, DiscoverError> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        if state.file_failures.contains(path) {
            return Err(DiscoverError::Status {
                url: format!("memory://datasets/{}/file?path={}", version, path),
                status: 500,
                body: "injected failure".to_string(),
            });
        }
        state
            .datasets
            .get(version)
            .and_then(|dataset| {
                dataset
                    .files
                    .iter()
                    .find(|(entry, _)| entry.path == path)
                    .map(|(_, file)| file.clone())
            })
            .ok_or_else(|| Self::not_found(version, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_discover_lookups() {
        let client = MemoryDiscoverClient::new();
        let version: DatasetVersion = DatasetVersion::new(1234, 3);
        client.add_dataset(version, "s3://source/1234/");
        client.add_file(version, "files/1.dat", "s3://source/1234/files/1.dat", 10, Some("v1"));

        let metadata: DatasetMetadata = client.get_dataset_metadata_by_version(&version).await.unwrap();
        assert_eq!(metadata.files.len(), 1);
        assert_eq!(metadata.files[0].name, "1.dat");
        assert_eq!(metadata.files[0].file_type, "dat");

        let file: DatasetFile = client
            .get_dataset_file_by_version(&version, "files/1.dat")
            .await
            .unwrap();
        assert_eq!(file.s3_version_id.as_deref(), Some("v1"));
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn test_memory_discover_failures() {
        let client = MemoryDiscoverClient::new();
        let version: DatasetVersion = DatasetVersion::new(5, 1);
        client.add_file(version, "a.dat", "s3://source/a.dat", 1, None);
        client.fail_file("a.dat");

        let err: DiscoverError = client
            .get_dataset_file_by_version(&version, "a.dat")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(500));

        client.fail_metadata(version, 503);
        let err: DiscoverError = client
            .get_dataset_metadata_by_version(&version)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(503));

        let missing: DiscoverError = client
            .get_dataset_by_version(&DatasetVersion::new(9, 9))
            .await
            .unwrap_err();
        assert_eq!(missing.status(), Some(404));
    }
}
