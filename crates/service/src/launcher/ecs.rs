//! ECS Fargate task launcher.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_ecs::types::{
    AssignPublicIp, AwsVpcConfiguration, ContainerOverride, KeyValuePair, LaunchType,
    NetworkConfiguration, TaskOverride,
};
use aws_sdk_ecs::Client;
use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::timeout::TimeoutConfig;
use rehydration_common::{DatasetVersion, User};

use super::TaskLauncher;
use crate::error::LaunchError;
use crate::task::{WorkerDeployment, WorkerEnvironment};

/// Where and how worker tasks run.
#[derive(Debug, Clone, Default)]
pub struct EcsLauncherConfig {
    /// Cluster name or ARN.
    pub cluster: String,
    /// Task definition family, `family:revision`, or ARN.
    pub task_definition: String,
    /// Container receiving the environment overrides.
    pub container_name: String,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub assign_public_ip: bool,
    /// Timeout in milliseconds
    pub timeout_ms: Option<u64>,
}

/// Starts workers with ECS `RunTask`.
#[derive(Clone)]
pub struct EcsTaskLauncher {
    client: Client,
    config: EcsLauncherConfig,
    deployment: WorkerDeployment,
}

impl std::fmt::Debug for EcsTaskLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcsTaskLauncher")
            .field("cluster", &self.config.cluster)
            .field("task_definition", &self.config.task_definition)
            .finish()
    }
}

impl EcsTaskLauncher {
    /// Create a launcher from shared SDK configuration.
    pub fn new(
        sdk_config: &aws_config::SdkConfig,
        config: EcsLauncherConfig,
        deployment: WorkerDeployment,
    ) -> Self {
        let mut builder = aws_sdk_ecs::config::Builder::from(sdk_config);
        if let Some(timeout_ms) = config.timeout_ms {
            let timeout_config = TimeoutConfig::builder()
                .operation_timeout(Duration::from_millis(timeout_ms))
                .build();
            builder = builder.timeout_config(timeout_config);
        }
        Self::from_client(Client::from_conf(builder.build()), config, deployment)
    }

    /// Create from a pre-built client (for testing)
    pub fn from_client(
        client: Client,
        config: EcsLauncherConfig,
        deployment: WorkerDeployment,
    ) -> Self {
        Self {
            client,
            config,
            deployment,
        }
    }

    fn environment_pairs(vars: Vec<(String, String)>) -> Vec<KeyValuePair> {
        vars.into_iter()
            .map(|(name, value)| KeyValuePair::builder().name(name).value(value).build())
            .collect()
    }

    fn network_configuration(&self) -> Result<NetworkConfiguration, LaunchError> {
        if self.config.subnets.is_empty() {
            return Err(LaunchError::InvalidConfig {
                message: "at least one subnet is required".to_string(),
            });
        }
        let assign_public_ip: AssignPublicIp = if self.config.assign_public_ip {
            AssignPublicIp::Enabled
        } else {
            AssignPublicIp::Disabled
        };
        let vpc: AwsVpcConfiguration = AwsVpcConfiguration::builder()
            .set_subnets(Some(self.config.subnets.clone()))
            .set_security_groups(Some(self.config.security_groups.clone()))
            .assign_public_ip(assign_public_ip)
            .build()
            .map_err(|e| LaunchError::InvalidConfig {
                message: e.to_string(),
            })?;
        Ok(NetworkConfiguration::builder()
            .awsvpc_configuration(vpc)
            .build())
    }
}

#[async_trait]
impl TaskLauncher for EcsTaskLauncher {
    async fn launch(&self, version: &DatasetVersion, user: &User) -> Result<String, LaunchError> {
        let environment: WorkerEnvironment =
            WorkerEnvironment::new(*version, user.clone(), self.deployment.clone());
        let container = ContainerOverride::builder()
            .name(&self.config.container_name)
            .set_environment(Some(Self::environment_pairs(environment.to_vars())))
            .build();

        let output = self
            .client
            .run_task()
            .cluster(&self.config.cluster)
            .task_definition(&self.config.task_definition)
            .launch_type(LaunchType::Fargate)
            .count(1)
            .network_configuration(self.network_configuration()?)
            .overrides(TaskOverride::builder().container_overrides(container).build())
            .send()
            .await
            .map_err(|e| LaunchError::Ecs {
                message: DisplayErrorContext(&e).to_string(),
            })?;

        match output.tasks().iter().find_map(|task| task.task_arn()) {
            Some(task_arn) => {
                log::info!("Started worker task {} for dataset {}", task_arn, version);
                Ok(task_arn.to_string())
            }
            None => {
                let reason: String = output
                    .failures()
                    .iter()
                    .filter_map(|failure| failure.reason())
                    .collect::<Vec<&str>>()
                    .join("; ");
                Err(LaunchError::NoTask { reason })
            }
        }
    }
}
