use crate::domain::models::{
    next_id, parse_hhmm, BlockInstance, BlockPayload, BlockStatus, BlockTypeMeta,
    NotificationPayload, NotificationType, ScheduledNotification, StandupPayload, UserPreferences,
};
use chrono::{DateTime, Days, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;

/// Inputs for one pure scheduling pass. Identical inputs always yield the
/// same notification types and target times; only ids and `created_at`
/// differ between runs. Reconciliation in the queue relies on that.
pub struct ScheduleContext<'a> {
    pub user_id: &'a str,
    pub blocks: &'a [BlockInstance],
    pub now: DateTime<Utc>,
    pub upcoming_warning_minutes: i64,
    pub standup_time: Option<&'a str>,
    pub preferences: Option<&'a UserPreferences>,
    pub type_meta: Option<&'a HashMap<String, BlockTypeMeta>>,
    pub timezone: Tz,
}

impl<'a> ScheduleContext<'a> {
    pub fn new(user_id: &'a str, blocks: &'a [BlockInstance], now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            blocks,
            now,
            upcoming_warning_minutes: 10,
            standup_time: None,
            preferences: None,
            type_meta: None,
            timezone: chrono_tz::UTC,
        }
    }
}

/// Compute the full set of notifications that should exist for the given
/// blocks and standup setting. Past or current-moment targets are never
/// emitted; the queue is responsible for deduplication.
pub fn schedule_block_notifications(context: &ScheduleContext) -> Vec<ScheduledNotification> {
    if let Some(preferences) = context.preferences {
        if !preferences.notifications_enabled {
            return Vec::new();
        }
    }

    let lead_minutes = context
        .preferences
        .map(|preferences| preferences.effective_lead_minutes(context.upcoming_warning_minutes))
        .unwrap_or(context.upcoming_warning_minutes);

    let mut notifications = Vec::new();

    for block in context.blocks {
        let upcoming_time = block.planned_start - Duration::minutes(lead_minutes);
        if upcoming_time > context.now {
            notifications.push(make_notification(
                context,
                NotificationType::BlockUpcoming,
                upcoming_time,
                block_payload(context, block, Some(lead_minutes)),
            ));
        }

        if block.planned_start > context.now {
            notifications.push(make_notification(
                context,
                NotificationType::BlockStart,
                block.planned_start,
                block_payload(context, block, None),
            ));
        }

        if block.status == BlockStatus::Paused {
            if let Some(resume_time) = block.paused_until {
                if resume_time > context.now {
                    notifications.push(make_notification(
                        context,
                        NotificationType::BlockResumed,
                        resume_time,
                        block_payload(context, block, None),
                    ));
                }
            }
        }
    }

    if let Some(standup_time) = context.standup_time {
        if let Some(time) = parse_hhmm(standup_time) {
            if let Some(target) = next_standup_occurrence(context.timezone, context.now, time) {
                notifications.push(make_notification(
                    context,
                    NotificationType::Standup,
                    target,
                    NotificationPayload::Standup(StandupPayload {
                        time: standup_time.to_string(),
                    }),
                ));
            }
        }
    }

    notifications
}

fn make_notification(
    context: &ScheduleContext,
    notification_type: NotificationType,
    target_time: DateTime<Utc>,
    payload: NotificationPayload,
) -> ScheduledNotification {
    ScheduledNotification {
        id: next_id("ntf"),
        user_id: context.user_id.to_string(),
        notification_type,
        target_time,
        payload,
        created_at: Utc::now(),
    }
}

fn block_payload(
    context: &ScheduleContext,
    block: &BlockInstance,
    lead_minutes: Option<i64>,
) -> NotificationPayload {
    let meta = context
        .type_meta
        .and_then(|meta| meta.get(&block.block_type_id));

    NotificationPayload::Block(BlockPayload {
        block_name: meta.and_then(|meta| meta.name.clone()),
        block_color: meta.and_then(|meta| meta.color.clone()),
        lead_minutes,
        block_type_id: block.block_type_id.clone(),
        block_instance_id: block.id.clone(),
        start_time: block.planned_start,
    })
}

/// Today's occurrence of the HH:MM wall-clock time in `tz`, or tomorrow's if
/// today's has already passed. Returns None when neither resolves to a valid
/// local instant strictly after `now`.
fn next_standup_occurrence(tz: Tz, now: DateTime<Utc>, time: NaiveTime) -> Option<DateTime<Utc>> {
    let today = now.with_timezone(&tz).date_naive();
    for day_offset in 0..2u64 {
        let date = today.checked_add_days(Days::new(day_offset))?;
        if let Some(local) = tz.from_local_datetime(&date.and_time(time)).earliest() {
            let target = local.with_timezone(&Utc);
            if target > now {
                return Some(target);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::BlockTypeMeta;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_block(start: DateTime<Utc>, end: DateTime<Utc>) -> BlockInstance {
        BlockInstance {
            id: "blk-1".to_string(),
            user_id: "user-1".to_string(),
            block_type_id: "bt-deep".to_string(),
            planned_start: start,
            planned_end: end,
            status: BlockStatus::Scheduled,
            actual_start: None,
            actual_end: None,
            paused_until: None,
            pause_reason: None,
            notes: None,
        }
    }

    fn now() -> DateTime<Utc> {
        fixed_time("2026-08-07T12:00:00Z")
    }

    fn types_of(notifications: &[ScheduledNotification]) -> Vec<NotificationType> {
        notifications
            .iter()
            .map(|notification| notification.notification_type)
            .collect()
    }

    #[test]
    fn disabled_preferences_suppress_everything() {
        let blocks = vec![sample_block(
            now() + Duration::minutes(30),
            now() + Duration::minutes(90),
        )];
        let preferences = UserPreferences {
            notifications_enabled: false,
            ..UserPreferences::default()
        };
        let mut context = ScheduleContext::new("user-1", &blocks, now());
        context.preferences = Some(&preferences);
        context.standup_time = Some("09:00");

        assert!(schedule_block_notifications(&context).is_empty());
    }

    #[test]
    fn zero_lead_time_targets_block_start_exactly() {
        let start = now() + Duration::minutes(20);
        let blocks = vec![sample_block(start, start + Duration::minutes(60))];
        let preferences = UserPreferences {
            notification_lead_time_minutes: Some(0),
            ..UserPreferences::default()
        };
        let mut context = ScheduleContext::new("user-1", &blocks, now());
        context.preferences = Some(&preferences);

        let notifications = schedule_block_notifications(&context);
        let upcoming = notifications
            .iter()
            .find(|n| n.notification_type == NotificationType::BlockUpcoming)
            .expect("upcoming emitted");
        assert_eq!(upcoming.target_time, start);
        match &upcoming.payload {
            NotificationPayload::Block(payload) => assert_eq!(payload.lead_minutes, Some(0)),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn null_lead_time_falls_back_to_default() {
        let start = now() + Duration::minutes(30);
        let blocks = vec![sample_block(start, start + Duration::minutes(60))];
        let preferences = UserPreferences::default();
        let mut context = ScheduleContext::new("user-1", &blocks, now());
        context.preferences = Some(&preferences);
        context.upcoming_warning_minutes = 10;

        let notifications = schedule_block_notifications(&context);
        let upcoming = notifications
            .iter()
            .find(|n| n.notification_type == NotificationType::BlockUpcoming)
            .expect("upcoming emitted");
        assert_eq!(upcoming.target_time, start - Duration::minutes(10));
    }

    #[test]
    fn past_block_emits_nothing() {
        let blocks = vec![sample_block(
            now() - Duration::minutes(120),
            now() - Duration::minutes(60),
        )];
        let context = ScheduleContext::new("user-1", &blocks, now());
        assert!(schedule_block_notifications(&context).is_empty());
    }

    #[test]
    fn in_progress_block_emits_no_start_event() {
        let mut block = sample_block(now() - Duration::minutes(10), now() + Duration::minutes(50));
        block.status = BlockStatus::InProgress;
        let blocks = vec![block];
        let context = ScheduleContext::new("user-1", &blocks, now());
        assert!(schedule_block_notifications(&context).is_empty());
    }

    #[test]
    fn paused_block_with_future_resume_emits_one_resume() {
        let mut block = sample_block(now() - Duration::minutes(30), now() + Duration::minutes(30));
        block.status = BlockStatus::Paused;
        block.paused_until = Some(now() + Duration::minutes(15));
        let blocks = vec![block];
        let context = ScheduleContext::new("user-1", &blocks, now());

        let notifications = schedule_block_notifications(&context);
        let resumes: Vec<_> = notifications
            .iter()
            .filter(|n| n.notification_type == NotificationType::BlockResumed)
            .collect();
        assert_eq!(resumes.len(), 1);
        assert_eq!(resumes[0].target_time, now() + Duration::minutes(15));
    }

    #[test]
    fn paused_block_with_past_resume_emits_none() {
        let mut block = sample_block(now() - Duration::minutes(60), now() - Duration::minutes(10));
        block.status = BlockStatus::Paused;
        block.paused_until = Some(now() - Duration::minutes(5));
        let blocks = vec![block];
        let context = ScheduleContext::new("user-1", &blocks, now());
        assert!(schedule_block_notifications(&context).is_empty());
    }

    #[test]
    fn standup_before_todays_time_targets_today() {
        // now is 12:00 UTC; standup at 15:00 UTC is still ahead today.
        let blocks = Vec::new();
        let mut context = ScheduleContext::new("user-1", &blocks, now());
        context.standup_time = Some("15:00");

        let notifications = schedule_block_notifications(&context);
        assert_eq!(notifications.len(), 1);
        assert_eq!(
            notifications[0].target_time,
            fixed_time("2026-08-07T15:00:00Z")
        );
        match &notifications[0].payload {
            NotificationPayload::Standup(payload) => assert_eq!(payload.time, "15:00"),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn standup_after_todays_time_rolls_to_tomorrow() {
        let blocks = Vec::new();
        let mut context = ScheduleContext::new("user-1", &blocks, now());
        context.standup_time = Some("09:00");

        let notifications = schedule_block_notifications(&context);
        assert_eq!(notifications.len(), 1);
        assert_eq!(
            notifications[0].target_time,
            fixed_time("2026-08-08T09:00:00Z")
        );
    }

    #[test]
    fn standup_resolves_in_the_given_timezone() {
        let blocks = Vec::new();
        let mut context = ScheduleContext::new("user-1", &blocks, now());
        context.standup_time = Some("09:00");
        context.timezone = chrono_tz::America::New_York;

        // 12:00 UTC is 08:00 in New York during DST, so today's 09:00 local
        // (13:00 UTC) is still ahead.
        let notifications = schedule_block_notifications(&context);
        assert_eq!(notifications.len(), 1);
        assert_eq!(
            notifications[0].target_time,
            fixed_time("2026-08-07T13:00:00Z")
        );
    }

    #[test]
    fn malformed_standup_time_is_ignored() {
        let blocks = Vec::new();
        let mut context = ScheduleContext::new("user-1", &blocks, now());
        context.standup_time = Some("25:99");
        assert!(schedule_block_notifications(&context).is_empty());
    }

    #[test]
    fn upcoming_and_start_are_emitted_for_future_block() {
        let start = now() + Duration::minutes(30);
        let blocks = vec![sample_block(start, start + Duration::minutes(60))];
        let context = ScheduleContext::new("user-1", &blocks, now());

        let notifications = schedule_block_notifications(&context);
        assert_eq!(
            types_of(&notifications),
            vec![NotificationType::BlockUpcoming, NotificationType::BlockStart]
        );
        let start_event = &notifications[1];
        match &start_event.payload {
            NotificationPayload::Block(payload) => {
                assert_eq!(payload.lead_minutes, None);
                assert_eq!(payload.block_instance_id, "blk-1");
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn type_meta_enriches_payload() {
        let start = now() + Duration::minutes(30);
        let blocks = vec![sample_block(start, start + Duration::minutes(60))];
        let mut meta = HashMap::new();
        meta.insert(
            "bt-deep".to_string(),
            BlockTypeMeta {
                name: Some("Deep Work".to_string()),
                color: Some("#3366FF".to_string()),
            },
        );
        let mut context = ScheduleContext::new("user-1", &blocks, now());
        context.type_meta = Some(&meta);

        let notifications = schedule_block_notifications(&context);
        match &notifications[0].payload {
            NotificationPayload::Block(payload) => {
                assert_eq!(payload.block_name.as_deref(), Some("Deep Work"));
                assert_eq!(payload.block_color.as_deref(), Some("#3366FF"));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn identical_inputs_yield_identical_types_and_targets() {
        let start = now() + Duration::minutes(45);
        let mut paused = sample_block(start, start + Duration::minutes(60));
        paused.id = "blk-2".to_string();
        paused.status = BlockStatus::Paused;
        paused.paused_until = Some(now() + Duration::minutes(5));
        let blocks = vec![sample_block(start, start + Duration::minutes(60)), paused];
        let mut context = ScheduleContext::new("user-1", &blocks, now());
        context.standup_time = Some("18:30");

        let first = schedule_block_notifications(&context);
        let second = schedule_block_notifications(&context);
        let key = |ns: &[ScheduledNotification]| {
            ns.iter()
                .map(|n| (n.notification_type, n.target_time))
                .collect::<Vec<_>>()
        };
        assert_eq!(key(&first), key(&second));
    }
}
