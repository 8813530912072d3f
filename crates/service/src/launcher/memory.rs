//! In-memory launcher for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use rehydration_common::{DatasetVersion, User};

use super::TaskLauncher;
use crate::error::LaunchError;

#[derive(Debug, Default)]
struct LauncherState {
    launched: Vec<(DatasetVersion, User, String)>,
    failing: bool,
}

/// Records launches instead of starting anything.
///
/// Task ARNs are `arn:aws:ecs:local:000000000000:task/memory/{n}`.
#[derive(Debug, Default)]
pub struct MemoryTaskLauncher {
    state: Mutex<LauncherState>,
}

impl MemoryTaskLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent launches fail.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    /// Every successful launch, in order.
    pub fn launched(&self) -> Vec<(DatasetVersion, User, String)> {
        self.state.lock().unwrap().launched.clone()
    }

    pub fn launch_count(&self) -> usize {
        self.state.lock().unwrap().launched.len()
    }
}

#[async_trait]
impl TaskLauncher for MemoryTaskLauncher {
    async fn launch(&self, version: &DatasetVersion, user: &User) -> Result<String, LaunchError> {
        let mut state = self.state.lock().unwrap();
        if state.failing {
            return Err(LaunchError::Spawn {
                message: "launcher unavailable".to_string(),
            });
        }
        let task_arn: String = format!(
            "arn:aws:ecs:local:000000000000:task/memory/{}",
            state.launched.len() + 1
        );
        state
            .launched
            .push((*version, user.clone(), task_arn.clone()));
        Ok(task_arn)
    }
}
