use crate::domain::models::{
    BlockInstance, BlockTypeMeta, NotificationQueueItem, ScheduledNotification,
};
use crate::domain::scheduler::{schedule_block_notifications, ScheduleContext};
use crate::infrastructure::error::EngineError;
use crate::infrastructure::notification_repository::NotificationRepository;
use crate::infrastructure::preferences_repository::PreferencesRepository;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub const DEFAULT_LOOKAHEAD_MINUTES: i64 = 60;
const DUE_BATCH_LIMIT: usize = 100;

/// Persistence-backed notification queue. The queue table is the single
/// source of truth for "has this notification already been scheduled/sent";
/// the pure scheduler's output is reconciled against it, never trusted.
pub struct NotificationQueueService<N, P>
where
    N: NotificationRepository,
    P: PreferencesRepository,
{
    notifications: Arc<N>,
    preferences: Arc<P>,
    timezone: Tz,
    default_lead_minutes: i64,
}

impl<N, P> Clone for NotificationQueueService<N, P>
where
    N: NotificationRepository,
    P: PreferencesRepository,
{
    fn clone(&self) -> Self {
        Self {
            notifications: Arc::clone(&self.notifications),
            preferences: Arc::clone(&self.preferences),
            timezone: self.timezone,
            default_lead_minutes: self.default_lead_minutes,
        }
    }
}

impl<N, P> NotificationQueueService<N, P>
where
    N: NotificationRepository,
    P: PreferencesRepository,
{
    pub fn new(notifications: Arc<N>, preferences: Arc<P>) -> Self {
        Self {
            notifications,
            preferences,
            timezone: chrono_tz::UTC,
            default_lead_minutes: 10,
        }
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_default_lead_minutes(mut self, minutes: i64) -> Self {
        self.default_lead_minutes = minutes;
        self
    }

    pub fn enqueue(
        &self,
        user_id: &str,
        notifications: &[ScheduledNotification],
    ) -> Result<(), EngineError> {
        if notifications.is_empty() {
            return Ok(());
        }
        let items: Vec<NotificationQueueItem> = notifications
            .iter()
            .map(|notification| NotificationQueueItem {
                id: notification.id.clone(),
                user_id: user_id.to_string(),
                notification_type: notification.notification_type,
                target_time: notification.target_time,
                payload: notification.payload.clone(),
                created_at: notification.created_at,
                sent_at: None,
            })
            .collect();
        self.notifications.insert_notifications(&items)
    }

    pub fn list_due(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<NotificationQueueItem>, EngineError> {
        self.notifications.list_due(user_id, now, DUE_BATCH_LIMIT)
    }

    pub fn mark_sent(&self, ids: &[String], now: DateTime<Utc>) -> Result<(), EngineError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.notifications.mark_sent(ids, now)
    }

    /// Reconciliation entry point: compute candidates for the lookahead
    /// window and insert only the ones whose exact target time is not
    /// already queued. Equality dedup is intentionally coarse; it relies on
    /// the scheduler being deterministic so unchanged inputs reproduce
    /// identical target times.
    pub fn schedule_blocks(
        &self,
        user_id: &str,
        blocks: &[BlockInstance],
        now: DateTime<Utc>,
        lookahead_minutes: i64,
        type_meta: Option<&HashMap<String, BlockTypeMeta>>,
    ) -> Result<(), EngineError> {
        let cutoff = now + Duration::minutes(lookahead_minutes);

        let queued: HashSet<DateTime<Utc>> = self
            .notifications
            .queued_target_times(user_id, now, cutoff)?
            .into_iter()
            .collect();

        let preferences = self.preferences.get_preferences(user_id)?;

        let mut context = ScheduleContext::new(user_id, blocks, now);
        context.upcoming_warning_minutes = self.default_lead_minutes;
        context.standup_time = preferences
            .as_ref()
            .and_then(|preferences| preferences.standup_time.as_deref());
        context.preferences = preferences.as_ref();
        context.type_meta = type_meta;
        context.timezone = self.timezone;

        let candidates = schedule_block_notifications(&context);
        let deduped: Vec<ScheduledNotification> = candidates
            .into_iter()
            .filter(|notification| {
                notification.target_time > now
                    && notification.target_time <= cutoff
                    && !queued.contains(&notification.target_time)
            })
            .collect();

        self.enqueue(user_id, &deduped)
    }
}
