use crate::infrastructure::error::EngineError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// OS notification presentation, owned by the host shell. The delivery
/// runner treats a denied permission as logged-and-skipped, never fatal.
#[async_trait]
pub trait NotificationSurface: Send + Sync {
    async fn is_permission_granted(&self) -> bool;

    async fn request_permission(&self) -> bool;

    async fn send(
        &self,
        title: &str,
        body: &str,
        extra: serde_json::Value,
    ) -> Result<(), EngineError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub title: String,
    pub body: String,
    pub extra: serde_json::Value,
}

/// Records sent notifications instead of presenting them. Used by tests and
/// headless deployments.
#[derive(Debug)]
pub struct RecordingNotificationSurface {
    permission_granted: AtomicBool,
    sent: Mutex<Vec<SentNotification>>,
}

impl Default for RecordingNotificationSurface {
    fn default() -> Self {
        Self {
            permission_granted: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl RecordingNotificationSurface {
    pub fn set_permission_granted(&self, granted: bool) {
        self.permission_granted.store(granted, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl NotificationSurface for RecordingNotificationSurface {
    async fn is_permission_granted(&self) -> bool {
        self.permission_granted.load(Ordering::SeqCst)
    }

    async fn request_permission(&self) -> bool {
        self.permission_granted.load(Ordering::SeqCst)
    }

    async fn send(
        &self,
        title: &str,
        body: &str,
        extra: serde_json::Value,
    ) -> Result<(), EngineError> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|error| EngineError::Notification(format!("send lock poisoned: {error}")))?;
        sent.push(SentNotification {
            title: title.to_string(),
            body: body.to_string(),
            extra,
        });
        Ok(())
    }
}
