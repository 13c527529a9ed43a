use crate::application::queue::NotificationQueueService;
use crate::application::NowProvider;
use crate::domain::models::{
    next_id, BlockStatus, NotificationPayload, NotificationType, ScheduledNotification,
};
use crate::infrastructure::block_repository::BlockRepository;
use crate::infrastructure::error::EngineError;
use crate::infrastructure::notification_repository::NotificationRepository;
use crate::infrastructure::preferences_repository::PreferencesRepository;
use chrono::{Duration, Utc};
use serde_json::Value;
use std::sync::Arc;

pub const DEFAULT_SNOOZE_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    Start,
    Snooze,
    Skip,
}

impl NotificationAction {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "start" => Some(Self::Start),
            "snooze" => Some(Self::Snooze),
            "skip" => Some(Self::Skip),
            _ => None,
        }
    }
}

/// Handles user actions carried back from a delivered notification's
/// `extra` object. Malformed input is logged and ignored, never an error:
/// an action tap must not crash the host shell.
pub struct ActionHandler<B, N, P>
where
    B: BlockRepository,
    N: NotificationRepository,
    P: PreferencesRepository,
{
    user_id: String,
    blocks: Arc<B>,
    queue: NotificationQueueService<N, P>,
    snooze_minutes: i64,
    now_provider: NowProvider,
}

impl<B, N, P> ActionHandler<B, N, P>
where
    B: BlockRepository,
    N: NotificationRepository,
    P: PreferencesRepository,
{
    pub fn new(
        user_id: impl Into<String>,
        blocks: Arc<B>,
        queue: NotificationQueueService<N, P>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            blocks,
            queue,
            snooze_minutes: DEFAULT_SNOOZE_MINUTES,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_snooze_minutes(mut self, minutes: i64) -> Self {
        self.snooze_minutes = minutes;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn handle_action(&self, action_id: &str, extra: &Value) -> Result<(), EngineError> {
        let Some(action) = NotificationAction::parse(action_id) else {
            tracing::debug!(action_id, "ignoring unknown notification action");
            return Ok(());
        };

        match action {
            NotificationAction::Start => self.handle_start(extra),
            NotificationAction::Snooze => self.handle_snooze(extra),
            NotificationAction::Skip => self.handle_skip(extra),
        }
    }

    fn handle_start(&self, extra: &Value) -> Result<(), EngineError> {
        let Some(block_instance_id) = block_instance_id(extra) else {
            return Ok(());
        };
        let Some(mut block) = self.blocks.get_block(&self.user_id, block_instance_id)? else {
            tracing::warn!(block_instance_id, "start ignored: block not found");
            return Ok(());
        };

        match block.status {
            BlockStatus::Scheduled | BlockStatus::Paused => {
                block.status = BlockStatus::InProgress;
                block.actual_start = Some((self.now_provider)());
                block.paused_until = None;
                block.pause_reason = None;
                self.blocks.update_block(&block)
            }
            other => {
                tracing::warn!(
                    block_instance_id,
                    status = other.as_str(),
                    "start ignored: invalid block status"
                );
                Ok(())
            }
        }
    }

    fn handle_snooze(&self, extra: &Value) -> Result<(), EngineError> {
        let Some(notification_type) = extra
            .get("type")
            .and_then(Value::as_str)
            .and_then(NotificationType::parse)
        else {
            tracing::warn!("cannot snooze: missing or invalid notification type");
            return Ok(());
        };
        let payload: NotificationPayload = match serde_json::from_value(extra.clone()) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(%error, "cannot snooze: unparseable payload");
                return Ok(());
            }
        };

        let now = (self.now_provider)();
        let notification = ScheduledNotification {
            id: next_id("ntf"),
            user_id: self.user_id.clone(),
            notification_type,
            target_time: now + Duration::minutes(self.snooze_minutes),
            payload,
            created_at: now,
        };
        self.queue
            .enqueue(&self.user_id, std::slice::from_ref(&notification))
    }

    fn handle_skip(&self, extra: &Value) -> Result<(), EngineError> {
        let Some(block_instance_id) = block_instance_id(extra) else {
            return Ok(());
        };
        let Some(mut block) = self.blocks.get_block(&self.user_id, block_instance_id)? else {
            tracing::warn!(block_instance_id, "skip ignored: block not found");
            return Ok(());
        };

        if block.status == BlockStatus::Completed {
            tracing::warn!(block_instance_id, "skip ignored: already completed");
            return Ok(());
        }
        block.status = BlockStatus::Skipped;
        self.blocks.update_block(&block)
    }
}

fn block_instance_id(extra: &Value) -> Option<&str> {
    extra
        .get("block_instance_id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
