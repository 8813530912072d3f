//! Local process launcher.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use rehydration_common::{DatasetVersion, User};
use tokio::process::{Child, Command};

use super::TaskLauncher;
use crate::error::LaunchError;
use crate::task::{WorkerDeployment, WorkerEnvironment};

/// Runs each worker as a child process with the worker environment set.
///
/// The returned task identity is `local:{pid}`.
#[derive(Debug, Clone)]
pub struct ProcessTaskLauncher {
    program: PathBuf,
    args: Vec<String>,
    deployment: WorkerDeployment,
}

impl ProcessTaskLauncher {
    /// # Arguments
    /// * `program` - Worker executable
    /// * `args` - Arguments placed before the environment, e.g. `["worker"]`
    /// * `deployment` - Settings passed to every worker
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, deployment: WorkerDeployment) -> Self {
        Self {
            program: program.into(),
            args,
            deployment,
        }
    }

    /// Launcher that re-runs the current executable as `worker`.
    ///
    /// # Errors
    /// `InvalidConfig` if the current executable cannot be determined.
    pub fn current_exe(deployment: WorkerDeployment) -> Result<Self, LaunchError> {
        let program: PathBuf = std::env::current_exe().map_err(|e| LaunchError::InvalidConfig {
            message: format!("cannot locate current executable: {}", e),
        })?;
        Ok(Self::new(program, vec!["worker".to_string()], deployment))
    }

    fn command(&self, environment: &WorkerEnvironment) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(environment.to_vars())
            .stdin(Stdio::null())
            .kill_on_drop(false);
        command
    }
}

#[async_trait]
impl TaskLauncher for ProcessTaskLauncher {
    async fn launch(&self, version: &DatasetVersion, user: &User) -> Result<String, LaunchError> {
        let environment: WorkerEnvironment =
            WorkerEnvironment::new(*version, user.clone(), self.deployment.clone());

        let mut child: Child = self
            .command(&environment)
            .spawn()
            .map_err(|e| LaunchError::Spawn {
                message: format!("{}: {}", self.program.display(), e),
            })?;
        let pid: u32 = child.id().ok_or_else(|| LaunchError::Spawn {
            message: "worker exited before its pid was read".to_string(),
        })?;
        let task_arn: String = format!("local:{}", pid);

        // Reap the child so it does not linger as a zombie.
        let label: String = task_arn.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => log::info!("Worker {} exited with {}", label, status),
                Err(e) => log::warn!("Failed to wait for worker {}: {}", label, e),
            }
        });

        Ok(task_arn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment() -> WorkerDeployment {
        WorkerDeployment::new("dev", "idempotency", "us-east-1", "rehydration-bucket")
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_returns_local_pid() {
        let launcher = ProcessTaskLauncher::new("true", Vec::new(), deployment());
        let task_arn: String = launcher
            .launch(&DatasetVersion::new(1, 1), &User::new("a", "a@example.com"))
            .await
            .unwrap();
        assert!(task_arn.starts_with("local:"));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let launcher =
            ProcessTaskLauncher::new("/nonexistent/rehydration-worker", Vec::new(), deployment());
        let result = launcher
            .launch(&DatasetVersion::new(1, 1), &User::new("a", "a@example.com"))
            .await;
        assert!(matches!(result, Err(LaunchError::Spawn { .. })));
    }
}
