//! Dataset rehydration service.
//!
//! - [`AdmissionHandler`] answers rehydration requests and launches workers
//! - [`Rehydrator`] runs inside a worker and copies one dataset version
//! - [`ExpirationSweeper`] purges rehydrations whose TTL has passed
//!
//! All three coordinate solely through the idempotency store.

pub mod admission;
pub mod config;
pub mod error;
pub mod launcher;
pub mod notifier;
pub mod orchestrator;
pub mod sweeper;
pub mod task;

pub use admission::{AdmissionHandler, AdmissionOutcome};
pub use config::{AdmissionOptions, RehydrationSettings, SweepOptions};
pub use error::{
    AdmissionError, LaunchError, NotifyError, RehydrationError, SweepError, TaskEnvError,
};
pub use launcher::{
    EcsLauncherConfig, EcsTaskLauncher, MemoryTaskLauncher, ProcessTaskLauncher, TaskLauncher,
};
pub use notifier::{LogNotifier, MemoryNotifier, Notification, Notifier, RehydrationNotice};
pub use orchestrator::{RehydrationJob, RehydrationReport, Rehydrator};
pub use sweeper::{ExpirationSweeper, SweepReport};
pub use task::{RecordLocator, WorkerDeployment, WorkerEnvironment};
