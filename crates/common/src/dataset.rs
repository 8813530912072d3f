//! Dataset version identity and the rehydration request body.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A published dataset version: the atomic unit of rehydration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetVersion {
    /// Dataset identifier.
    pub dataset_id: i64,
    /// Version identifier within the dataset.
    pub version_id: i64,
}

impl DatasetVersion {
    /// Create a new dataset version identity.
    pub fn new(dataset_id: i64, version_id: i64) -> Self {
        Self {
            dataset_id,
            version_id,
        }
    }

    /// Canonical string form, also the idempotency record key.
    ///
    /// # Returns
    /// `"{datasetId}/{versionId}/"`
    pub fn id(&self) -> String {
        format!("{}/{}/", self.dataset_id, self.version_id)
    }

    /// Parse the canonical string form back into an identity.
    ///
    /// # Arguments
    /// * `id` - String of the form `"{datasetId}/{versionId}/"`
    ///
    /// # Returns
    /// The identity, or None if the string is malformed.
    pub fn parse_id(id: &str) -> Option<Self> {
        let trimmed: &str = id.strip_suffix('/')?;
        let (dataset, version) = trimmed.split_once('/')?;
        Some(Self {
            dataset_id: dataset.parse().ok()?,
            version_id: version.parse().ok()?,
        })
    }
}

impl fmt::Display for DatasetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dataset_id, self.version_id)
    }
}

/// The requesting user, carried for notification and audit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub name: String,
    pub email: String,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Incoming admission request body.
///
/// All fields are optional on the wire so that a missing field surfaces as a
/// validation error instead of a decode failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RehydrationRequest {
    #[serde(default)]
    pub dataset_id: Option<i64>,
    #[serde(default)]
    pub dataset_version_id: Option<i64>,
    #[serde(default)]
    pub user: Option<User>,
}

impl RehydrationRequest {
    /// Create a fully populated request.
    pub fn new(version: DatasetVersion, user: User) -> Self {
        Self {
            dataset_id: Some(version.dataset_id),
            dataset_version_id: Some(version.version_id),
            user: Some(user),
        }
    }

    /// Validate the request and extract its dataset version and user.
    ///
    /// # Returns
    /// The validated `(DatasetVersion, User)` pair.
    ///
    /// # Errors
    /// Returns a `ValidationError` naming the first missing or invalid field.
    pub fn validate(&self) -> Result<(DatasetVersion, User), ValidationError> {
        let dataset_id: i64 = self
            .dataset_id
            .ok_or(ValidationError::missing("datasetId"))?;
        if dataset_id <= 0 {
            return Err(ValidationError::invalid("datasetId", "must be positive"));
        }

        let version_id: i64 = self
            .dataset_version_id
            .ok_or(ValidationError::missing("datasetVersionId"))?;
        if version_id <= 0 {
            return Err(ValidationError::invalid(
                "datasetVersionId",
                "must be positive",
            ));
        }

        let user: &User = self.user.as_ref().ok_or(ValidationError::missing("user"))?;
        if user.name.trim().is_empty() {
            return Err(ValidationError::missing("user.name"));
        }
        if user.email.trim().is_empty() {
            return Err(ValidationError::missing("user.email"));
        }

        Ok((DatasetVersion::new(dataset_id, version_id), user.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_version_id() {
        let version: DatasetVersion = DatasetVersion::new(1234, 3);
        assert_eq!(version.id(), "1234/3/");
        assert_eq!(version.to_string(), "1234/3");
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(
            DatasetVersion::parse_id("43/11/"),
            Some(DatasetVersion::new(43, 11))
        );
        assert_eq!(DatasetVersion::parse_id("43/11"), None);
        assert_eq!(DatasetVersion::parse_id("abc/1/"), None);
        assert_eq!(DatasetVersion::parse_id(""), None);
    }

    #[test]
    fn test_request_decodes_wire_format() {
        let body: &str = r#"{"datasetId": 1234, "datasetVersionId": 3,
            "user": {"name": "Ada", "email": "ada@example.org"}}"#;
        let request: RehydrationRequest = serde_json::from_str(body).unwrap();

        let (version, user) = request.validate().unwrap();
        assert_eq!(version, DatasetVersion::new(1234, 3));
        assert_eq!(user.email, "ada@example.org");
    }

    #[test]
    fn test_validate_missing_fields() {
        let request: RehydrationRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(
            request.validate().unwrap_err(),
            ValidationError::missing("datasetId")
        );

        let request = RehydrationRequest {
            dataset_id: Some(1),
            dataset_version_id: Some(2),
            user: Some(User::new("", "a@b.c")),
        };
        assert_eq!(
            request.validate().unwrap_err(),
            ValidationError::missing("user.name")
        );

        let request = RehydrationRequest {
            dataset_id: Some(1),
            dataset_version_id: None,
            user: Some(User::new("a", "a@b.c")),
        };
        assert_eq!(
            request.validate().unwrap_err(),
            ValidationError::missing("datasetVersionId")
        );
    }

    #[test]
    fn test_validate_rejects_zero_ids() {
        let request = RehydrationRequest {
            dataset_id: Some(0),
            dataset_version_id: Some(2),
            user: Some(User::new("a", "a@b.c")),
        };
        assert!(matches!(
            request.validate(),
            Err(ValidationError::InvalidField { field: "datasetId", .. })
        ));
    }
}
