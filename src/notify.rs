use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::error::{AppError, AppResult};

/// Notifier
///
/// Delivers a message to a user by email address. Used by report resolution
/// to warn an uploader.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_user(&self, email: &str, message: &str) -> AppResult<()>;
}

pub type NotifierState = Arc<dyn Notifier>;

/// LogNotifier
///
/// Writes the notification to the structured log. Delivery is left to
/// whatever ships the logs.
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_user(&self, email: &str, message: &str) -> AppResult<()> {
        tracing::info!(target: "semstore::notify", to = %email, "{}", message);
        Ok(())
    }
}

/// RecordingNotifier
///
/// Keeps every `(email, message)` pair in memory.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    pub should_fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_user(&self, email: &str, message: &str) -> AppResult<()> {
        if self.should_fail {
            return Err(AppError::Downstream(
                "Mock Notifier Error: Simulation requested".to_string(),
            ));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((email.to_string(), message.to_string()));
        }
        Ok(())
    }
}
