//! Worker task environment.
//!
//! A spawned worker receives everything it needs as environment variables;
//! launchers write them with [`WorkerEnvironment::to_vars`] and the worker
//! reads them back with [`WorkerEnvironment::from_lookup`].

use rehydration_common::{DatasetVersion, User, DEFAULT_REHYDRATION_TTL_DAYS};

use crate::error::TaskEnvError;

pub const ENV_DATASET_ID: &str = "DATASET_ID";
pub const ENV_DATASET_VERSION_ID: &str = "DATASET_VERSION_ID";
pub const ENV_USER_NAME: &str = "USER_NAME";
pub const ENV_USER_EMAIL: &str = "USER_EMAIL";
/// Deployment environment; selects the discover host.
pub const ENV_ENV: &str = "ENV";
pub const ENV_IDEMPOTENCY_TABLE_NAME: &str = "IDEMPOTENCY_TABLE_NAME";
pub const ENV_TRACKING_TABLE_NAME: &str = "TRACKING_TABLE_NAME";
pub const ENV_REGION: &str = "REGION";
pub const ENV_REHYDRATION_BUCKET: &str = "REHYDRATION_BUCKET";
pub const ENV_DISCOVER_HOST: &str = "DISCOVER_HOST";
pub const ENV_REHYDRATION_TTL_DAYS: &str = "REHYDRATION_TTL_DAYS";
/// Identity of the worker task, when the platform exposes it.
pub const ENV_TASK_ARN: &str = "TASK_ARN";

/// Deployment settings shared by every worker a launcher starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerDeployment {
    pub env: String,
    pub idempotency_table: String,
    pub tracking_table: Option<String>,
    pub region: String,
    pub bucket: String,
    pub discover_host: Option<String>,
    pub ttl_days: i64,
}

impl WorkerDeployment {
    pub fn new(
        env: impl Into<String>,
        idempotency_table: impl Into<String>,
        region: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            env: env.into(),
            idempotency_table: idempotency_table.into(),
            tracking_table: None,
            region: region.into(),
            bucket: bucket.into(),
            discover_host: None,
            ttl_days: DEFAULT_REHYDRATION_TTL_DAYS,
        }
    }

    pub fn with_tracking_table(mut self, table: impl Into<String>) -> Self {
        self.tracking_table = Some(table.into());
        self
    }

    pub fn with_discover_host(mut self, host: impl Into<String>) -> Self {
        self.discover_host = Some(host.into());
        self
    }

    pub fn with_ttl_days(mut self, ttl_days: i64) -> Self {
        self.ttl_days = ttl_days;
        self
    }
}

/// The idempotency record a worker owns.
///
/// Readable whenever the dataset version and table are, even if the rest of
/// the environment is not, so a worker that cannot start can still release
/// the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLocator {
    pub version: DatasetVersion,
    pub idempotency_table: String,
    pub region: String,
}

impl RecordLocator {
    /// Read from the process environment.
    pub fn from_process_env() -> Result<Self, TaskEnvError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the version, table and region through a variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TaskEnvError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let dataset_id: i64 = parse_positive(ENV_DATASET_ID, required(&lookup, ENV_DATASET_ID)?)?;
        let version_id: i64 = parse_positive(
            ENV_DATASET_VERSION_ID,
            required(&lookup, ENV_DATASET_VERSION_ID)?,
        )?;
        Ok(Self {
            version: DatasetVersion::new(dataset_id, version_id),
            idempotency_table: required(&lookup, ENV_IDEMPOTENCY_TABLE_NAME)?,
            region: required(&lookup, ENV_REGION)?,
        })
    }
}

/// Complete input of one worker task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEnvironment {
    pub version: DatasetVersion,
    pub user: User,
    pub deployment: WorkerDeployment,
    pub task_arn: Option<String>,
}

impl WorkerEnvironment {
    pub fn new(version: DatasetVersion, user: User, deployment: WorkerDeployment) -> Self {
        Self {
            version,
            user,
            deployment,
            task_arn: None,
        }
    }

    /// Render as environment variables. Unset optional values are omitted.
    pub fn to_vars(&self) -> Vec<(String, String)> {
        let deployment: &WorkerDeployment = &self.deployment;
        let mut vars: Vec<(&str, String)> = vec![
            (ENV_DATASET_ID, self.version.dataset_id.to_string()),
            (ENV_DATASET_VERSION_ID, self.version.version_id.to_string()),
            (ENV_USER_NAME, self.user.name.clone()),
            (ENV_USER_EMAIL, self.user.email.clone()),
            (ENV_ENV, deployment.env.clone()),
            (ENV_IDEMPOTENCY_TABLE_NAME, deployment.idempotency_table.clone()),
            (ENV_REGION, deployment.region.clone()),
            (ENV_REHYDRATION_BUCKET, deployment.bucket.clone()),
            (ENV_REHYDRATION_TTL_DAYS, deployment.ttl_days.to_string()),
        ];
        if let Some(table) = &deployment.tracking_table {
            vars.push((ENV_TRACKING_TABLE_NAME, table.clone()));
        }
        if let Some(host) = &deployment.discover_host {
            vars.push((ENV_DISCOVER_HOST, host.clone()));
        }
        if let Some(task_arn) = &self.task_arn {
            vars.push((ENV_TASK_ARN, task_arn.clone()));
        }
        vars.into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }

    /// Read from the process environment.
    pub fn from_process_env() -> Result<Self, TaskEnvError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read through an arbitrary variable lookup.
    ///
    /// # Errors
    /// `Missing` for an absent or blank required variable, `Invalid` for a
    /// non-numeric or non-positive id or TTL.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TaskEnvError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let locator: RecordLocator = RecordLocator::from_lookup(&lookup)?;
        let ttl_days: i64 = match optional(&lookup, ENV_REHYDRATION_TTL_DAYS) {
            Some(raw) => parse_positive(ENV_REHYDRATION_TTL_DAYS, raw)?,
            None => DEFAULT_REHYDRATION_TTL_DAYS,
        };

        Ok(Self {
            version: locator.version,
            user: User::new(
                required(&lookup, ENV_USER_NAME)?,
                required(&lookup, ENV_USER_EMAIL)?,
            ),
            deployment: WorkerDeployment {
                env: required(&lookup, ENV_ENV)?,
                idempotency_table: locator.idempotency_table,
                tracking_table: optional(&lookup, ENV_TRACKING_TABLE_NAME),
                region: locator.region,
                bucket: required(&lookup, ENV_REHYDRATION_BUCKET)?,
                discover_host: optional(&lookup, ENV_DISCOVER_HOST),
                ttl_days,
            },
            task_arn: optional(&lookup, ENV_TASK_ARN),
        })
    }
}

fn optional<F: Fn(&str) -> Option<String>>(lookup: &F, name: &'static str) -> Option<String> {
    lookup(name).filter(|value| !value.trim().is_empty())
}

fn required<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    name: &'static str,
) -> Result<String, TaskEnvError> {
    optional(lookup, name).ok_or(TaskEnvError::Missing { name })
}

fn parse_positive(name: &'static str, value: String) -> Result<i64, TaskEnvError> {
    match value.trim().parse::<i64>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        Ok(_) => Err(TaskEnvError::Invalid {
            name,
            value,
            message: "must be positive".to_string(),
        }),
        Err(e) => Err(TaskEnvError::Invalid {
            name,
            message: e.to_string(),
            value,
        }),
    }
}
