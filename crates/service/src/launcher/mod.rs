//! Worker task launchers.
//!
//! The admission handler starts one worker per admitted request and does
//! not supervise it. A launcher returns the identity of the started task,
//! which is stored on the idempotency record.

mod ecs;
mod memory;
mod process;

use async_trait::async_trait;
use rehydration_common::{DatasetVersion, User};

use crate::error::LaunchError;

pub use ecs::{EcsLauncherConfig, EcsTaskLauncher};
pub use memory::MemoryTaskLauncher;
pub use process::ProcessTaskLauncher;

/// Starts worker tasks.
#[async_trait]
pub trait TaskLauncher: Send + Sync {
    /// Start a worker for one dataset version.
    ///
    /// # Returns
    /// The task ARN (or local equivalent) of the started worker.
    ///
    /// # Errors
    /// `LaunchError` if no worker was started.
    async fn launch(&self, version: &DatasetVersion, user: &User) -> Result<String, LaunchError>;
}
