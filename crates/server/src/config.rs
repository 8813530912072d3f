//! Command-line and environment configuration

use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand, ValueEnum};
use rehydration_common::{
    DestinationLayout, DEFAULT_MAX_ADMISSION_RETRIES, DEFAULT_REHYDRATION_TTL_DAYS,
    DEFAULT_ROOT_PREFIX, DEFAULT_SWEEP_LIMIT,
};
use rehydration_idempotency::dynamodb::schema::EXPIRATION_INDEX_NAME;
use rehydration_idempotency::DynamoDbConfig;
use rehydration_service::{AdmissionOptions, EcsLauncherConfig, SweepOptions, WorkerDeployment};

use crate::error::StartupError;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

/// How the server starts worker tasks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LauncherKind {
    /// ECS Fargate `RunTask`
    #[default]
    Ecs,
    /// Child process of this binary (local runs)
    Process,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "rehydration")]
#[command(about = "Dataset rehydration service", version)]
pub struct Cli {
    /// Log level used when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Human, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Serve the HTTP API
    Serve(ServeConfig),
    /// Run one rehydration; configured entirely through the task environment
    Worker,
    /// Run one expiration sweep and exit
    Sweep(SweepConfig),
}

/// AWS client settings shared by every command
#[derive(Debug, Clone, Args)]
pub struct AwsArgs {
    #[arg(long, env = "REGION", default_value = "us-east-1")]
    pub region: String,

    /// Endpoint override for S3 and DynamoDB (e.g. LocalStack)
    #[arg(long, env = "AWS_ENDPOINT_URL")]
    pub endpoint_url: Option<String>,

    /// Per-operation timeout in milliseconds
    #[arg(long, env = "AWS_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,
}

/// Idempotency table and destination bucket
#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    #[arg(long, env = "IDEMPOTENCY_TABLE_NAME")]
    pub idempotency_table: String,

    #[arg(long, env = "EXPIRATION_INDEX_NAME", default_value = EXPIRATION_INDEX_NAME)]
    pub expiration_index: String,

    #[arg(long, env = "REHYDRATION_BUCKET")]
    pub bucket: String,

    #[arg(long, env = "REHYDRATION_ROOT_PREFIX", default_value = DEFAULT_ROOT_PREFIX)]
    pub root_prefix: String,
}

impl StoreArgs {
    pub fn layout(&self) -> DestinationLayout {
        DestinationLayout::new(&self.bucket).with_root_prefix(&self.root_prefix)
    }

    pub fn dynamodb_config(&self, aws: &AwsArgs) -> DynamoDbConfig {
        let mut config = DynamoDbConfig::new(&self.idempotency_table).with_region(&aws.region);
        config.index_name = self.expiration_index.clone();
        if let Some(ref endpoint) = aws.endpoint_url {
            config = config.with_endpoint(endpoint);
        }
        if let Some(timeout_ms) = aws.timeout_ms {
            config = config.with_timeout_ms(timeout_ms);
        }
        config
    }
}

/// `serve` options
#[derive(Debug, Clone, Args)]
pub struct ServeConfig {
    #[arg(long, env = "REHYDRATION_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: SocketAddr,

    #[command(flatten)]
    pub aws: AwsArgs,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Deployment environment passed to workers (selects the discover host)
    #[arg(long = "env", env = "ENV", default_value = "dev")]
    pub environment: String,

    #[arg(long, env = "TRACKING_TABLE_NAME")]
    pub tracking_table: Option<String>,

    #[arg(long, env = "DISCOVER_HOST")]
    pub discover_host: Option<String>,

    /// Days a completed rehydration stays available
    #[arg(
        long,
        env = "REHYDRATION_TTL_DAYS",
        default_value_t = DEFAULT_REHYDRATION_TTL_DAYS,
        value_parser = clap::value_parser!(i64).range(1..)
    )]
    pub ttl_days: i64,

    /// Retries when the record vanishes between create and read
    #[arg(long, env = "REHYDRATION_MAX_RETRIES", default_value_t = DEFAULT_MAX_ADMISSION_RETRIES)]
    pub max_retries: usize,

    #[arg(long, env = "REHYDRATION_LAUNCHER", value_enum, default_value_t = LauncherKind::Ecs)]
    pub launcher: LauncherKind,

    #[arg(long, env = "ECS_CLUSTER")]
    pub ecs_cluster: Option<String>,

    #[arg(long, env = "ECS_TASK_DEFINITION")]
    pub ecs_task_definition: Option<String>,

    #[arg(long, env = "ECS_CONTAINER_NAME", default_value = "rehydration-worker")]
    pub ecs_container: String,

    #[arg(long, env = "ECS_SUBNETS", value_delimiter = ',')]
    pub ecs_subnets: Vec<String>,

    #[arg(long, env = "ECS_SECURITY_GROUPS", value_delimiter = ',')]
    pub ecs_security_groups: Vec<String>,

    #[arg(long, env = "ECS_ASSIGN_PUBLIC_IP", default_value = "false")]
    pub ecs_assign_public_ip: bool,

    /// Run an expiration sweep every N seconds inside the server
    #[arg(long, env = "SWEEP_INTERVAL_SECS")]
    pub sweep_interval_secs: Option<u64>,

    #[arg(long, env = "SWEEP_LIMIT", default_value_t = DEFAULT_SWEEP_LIMIT)]
    pub sweep_limit: usize,
}

impl ServeConfig {
    /// Settings every launched worker receives.
    pub fn deployment(&self) -> WorkerDeployment {
        let mut deployment = WorkerDeployment::new(
            &self.environment,
            &self.store.idempotency_table,
            &self.aws.region,
            &self.store.bucket,
        )
        .with_ttl_days(self.ttl_days);
        if let Some(ref table) = self.tracking_table {
            deployment = deployment.with_tracking_table(table);
        }
        if let Some(ref host) = self.discover_host {
            deployment = deployment.with_discover_host(host);
        }
        deployment
    }

    /// ECS launcher settings.
    ///
    /// # Errors
    /// `StartupError::Config` if the cluster, task definition or subnets are missing.
    pub fn ecs_config(&self) -> Result<EcsLauncherConfig, StartupError> {
        let cluster: &String = self
            .ecs_cluster
            .as_ref()
            .ok_or_else(|| StartupError::config("--ecs-cluster is required with the ecs launcher"))?;
        let task_definition: &String = self.ecs_task_definition.as_ref().ok_or_else(|| {
            StartupError::config("--ecs-task-definition is required with the ecs launcher")
        })?;
        if self.ecs_subnets.is_empty() {
            return Err(StartupError::config(
                "--ecs-subnets is required with the ecs launcher",
            ));
        }
        Ok(EcsLauncherConfig {
            cluster: cluster.clone(),
            task_definition: task_definition.clone(),
            container_name: self.ecs_container.clone(),
            subnets: self.ecs_subnets.clone(),
            security_groups: self.ecs_security_groups.clone(),
            assign_public_ip: self.ecs_assign_public_ip,
            timeout_ms: self.aws.timeout_ms,
        })
    }

    pub fn admission_options(&self) -> AdmissionOptions {
        AdmissionOptions::default().with_max_retries(self.max_retries)
    }

    pub fn sweep_options(&self) -> SweepOptions {
        SweepOptions::default().with_limit(self.sweep_limit)
    }
}

/// `sweep` options
#[derive(Debug, Clone, Args)]
pub struct SweepConfig {
    #[command(flatten)]
    pub aws: AwsArgs,

    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long, env = "SWEEP_LIMIT", default_value_t = DEFAULT_SWEEP_LIMIT)]
    pub sweep_limit: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    const SERVE: &[&str] = &[
        "rehydration",
        "serve",
        "--idempotency-table",
        "idempotency",
        "--bucket",
        "rehydration-bucket",
    ];

    fn serve_config(extra: &[&str]) -> ServeConfig {
        let mut args: Vec<&str> = SERVE.to_vec();
        args.extend_from_slice(extra);
        match parse(&args).command {
            Command::Serve(config) => config,
            other => panic!("expected serve, got {:?}", other),
        }
    }

    #[test]
    fn test_serve_defaults() {
        let config: ServeConfig = serve_config(&[]);
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.launcher, LauncherKind::Ecs);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.ttl_days, 14);
        assert_eq!(config.sweep_interval_secs, None);
        assert_eq!(config.store.layout().root_prefix, "rehydrated");
        assert_eq!(config.store.expiration_index, "ExpirationIndex");
    }

    #[test]
    fn test_ecs_config_requires_cluster() {
        let config: ServeConfig = serve_config(&[]);
        assert!(matches!(config.ecs_config(), Err(StartupError::Config { .. })));

        let config: ServeConfig = serve_config(&[
            "--ecs-cluster",
            "rehydration",
            "--ecs-task-definition",
            "worker:4",
            "--ecs-subnets",
            "subnet-a,subnet-b",
        ]);
        let ecs: EcsLauncherConfig = config.ecs_config().unwrap();
        assert_eq!(ecs.subnets, vec!["subnet-a", "subnet-b"]);
        assert_eq!(ecs.container_name, "rehydration-worker");
    }

    #[test]
    fn test_deployment_carries_optional_settings() {
        let config: ServeConfig = serve_config(&[
            "--env",
            "prod",
            "--tracking-table",
            "tracking",
            "--ttl-days",
            "3",
        ]);
        let deployment: WorkerDeployment = config.deployment();
        assert_eq!(deployment.env, "prod");
        assert_eq!(deployment.tracking_table.as_deref(), Some("tracking"));
        assert_eq!(deployment.ttl_days, 3);
        assert_eq!(deployment.bucket, "rehydration-bucket");
    }

    #[test]
    fn test_ttl_days_must_be_positive() {
        for ttl in ["0", "-3"] {
            let mut args: Vec<&str> = SERVE.to_vec();
            args.extend_from_slice(&["--ttl-days", ttl]);
            assert!(Cli::try_parse_from(&args).is_err(), "accepted --ttl-days {}", ttl);
        }
        assert_eq!(serve_config(&["--ttl-days", "1"]).ttl_days, 1);
    }

    #[test]
    fn test_worker_takes_no_arguments() {
        assert!(matches!(parse(&["rehydration", "worker"]).command, Command::Worker));
        assert!(Cli::try_parse_from(["rehydration", "worker", "--bucket", "x"]).is_err());
    }

    #[test]
    fn test_global_log_flags() {
        let cli: Cli = parse(&["rehydration", "worker", "--log-format", "json"]);
        assert_eq!(cli.log_format, LogFormat::Json);
    }
}
