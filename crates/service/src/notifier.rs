//! Finalize notifications.
//!
//! Notification is fire-and-forget: callers log a `NotifyError` and carry
//! on. It never changes the idempotency record.

use std::sync::Mutex;

use async_trait::async_trait;
use rehydration_common::{DatasetVersion, User};

use crate::error::NotifyError;

/// What a notification is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RehydrationNotice {
    pub version: DatasetVersion,
    pub user: User,
    /// Location of the rehydrated data; set on success.
    pub location: Option<String>,
}

/// Receives the outcome of every rehydration attempt.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn rehydration_complete(&self, notice: &RehydrationNotice) -> Result<(), NotifyError>;

    async fn rehydration_failed(
        &self,
        notice: &RehydrationNotice,
        reason: &str,
    ) -> Result<(), NotifyError>;
}

/// Notifier that writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn rehydration_complete(&self, notice: &RehydrationNotice) -> Result<(), NotifyError> {
        log::info!(
            "Rehydration of dataset {} complete for {} <{}>: {}",
            notice.version,
            notice.user.name,
            notice.user.email,
            notice.location.as_deref().unwrap_or("")
        );
        Ok(())
    }

    async fn rehydration_failed(
        &self,
        notice: &RehydrationNotice,
        reason: &str,
    ) -> Result<(), NotifyError> {
        log::info!(
            "Rehydration of dataset {} failed for {} <{}>: {}",
            notice.version,
            notice.user.name,
            notice.user.email,
            reason
        );
        Ok(())
    }
}

/// A delivered notification, as recorded by [`MemoryNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Complete(RehydrationNotice),
    Failed(RehydrationNotice, String),
}

/// Notifier that records deliveries in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Notification>>,
    failing: Mutex<bool>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delivery fail (after recording it).
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification);
        if *self.failing.lock().unwrap() {
            return Err(NotifyError {
                message: "notifier unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn rehydration_complete(&self, notice: &RehydrationNotice) -> Result<(), NotifyError> {
        self.record(Notification::Complete(notice.clone()))
    }

    async fn rehydration_failed(
        &self,
        notice: &RehydrationNotice,
        reason: &str,
    ) -> Result<(), NotifyError> {
        self.record(Notification::Failed(notice.clone(), reason.to_string()))
    }
}
