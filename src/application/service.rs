use crate::application::actions::ActionHandler;
use crate::application::delivery::{DeliveryRunner, DeliveryRunnerOptions};
use crate::application::pause_watcher::subscribe_pause_notifications;
use crate::application::queue::NotificationQueueService;
use crate::application::scheduler_runner::{SchedulerRunner, SchedulerRunnerOptions};
use crate::infrastructure::block_repository::BlockRepository;
use crate::infrastructure::block_type_repository::BlockTypeRepository;
use crate::infrastructure::change_feed::{ChangeFeed, ChangeSubscription};
use crate::infrastructure::config::NotificationSettings;
use crate::infrastructure::notification_repository::NotificationRepository;
use crate::infrastructure::notifier::NotificationSurface;
use crate::infrastructure::preferences_repository::PreferencesRepository;
use chrono::Utc;
use chrono_tz::Tz;
use std::sync::Arc;

/// Collaborators needed to run the notification stack for one user.
pub struct NotificationDeps<B, T, N, P, S>
where
    B: BlockRepository + 'static,
    T: BlockTypeRepository + 'static,
    N: NotificationRepository + 'static,
    P: PreferencesRepository + 'static,
    S: NotificationSurface + 'static,
{
    pub blocks: Arc<B>,
    pub block_types: Arc<T>,
    pub notifications: Arc<N>,
    pub preferences: Arc<P>,
    pub surface: Arc<S>,
    pub change_feed: Option<Arc<dyn ChangeFeed>>,
}

/// Composition root for both runners, the pause watcher and the action
/// handler. Owns their lifecycle: construct with `start`, tear down with
/// `stop`. No hidden singletons; the caller owns the handle.
pub struct NotificationService<B, T, N, P, S>
where
    B: BlockRepository + 'static,
    T: BlockTypeRepository + 'static,
    N: NotificationRepository + 'static,
    P: PreferencesRepository + 'static,
    S: NotificationSurface + 'static,
{
    scheduler: SchedulerRunner<B, T, N, P>,
    delivery: DeliveryRunner<N, P, S>,
    actions: ActionHandler<B, N, P>,
    pause_subscription: Option<ChangeSubscription>,
}

impl<B, T, N, P, S> NotificationService<B, T, N, P, S>
where
    B: BlockRepository + 'static,
    T: BlockTypeRepository + 'static,
    N: NotificationRepository + 'static,
    P: PreferencesRepository + 'static,
    S: NotificationSurface + 'static,
{
    /// Wire everything up and start both runner loops. Must be called from
    /// within a tokio runtime.
    pub fn start(
        user_id: &str,
        deps: NotificationDeps<B, T, N, P, S>,
        settings: &NotificationSettings,
        timezone: Tz,
    ) -> Self {
        let queue = NotificationQueueService::new(
            Arc::clone(&deps.notifications),
            Arc::clone(&deps.preferences),
        )
        .with_timezone(timezone)
        .with_default_lead_minutes(settings.default_lead_minutes);

        let mut scheduler = SchedulerRunner::new(
            user_id,
            queue.clone(),
            Arc::clone(&deps.blocks),
            Arc::clone(&deps.block_types),
            SchedulerRunnerOptions {
                interval_ms: settings.schedule_interval_ms,
                lookahead_minutes: settings.lookahead_minutes,
                debounce_ms: settings.debounce_ms,
                min_tick_interval_ms: settings.min_tick_interval_ms,
            },
        );
        if settings.listen_realtime {
            if let Some(change_feed) = &deps.change_feed {
                scheduler = scheduler.with_change_feed(Arc::clone(change_feed));
            }
        }

        let delivery = DeliveryRunner::new(
            user_id,
            queue.clone(),
            Arc::clone(&deps.surface),
            DeliveryRunnerOptions {
                interval_ms: settings.delivery_interval_ms,
            },
        );

        let actions = ActionHandler::new(user_id, Arc::clone(&deps.blocks), queue.clone())
            .with_snooze_minutes(settings.snooze_minutes);

        let pause_subscription = deps.change_feed.as_ref().map(|change_feed| {
            subscribe_pause_notifications(
                change_feed.as_ref(),
                user_id,
                queue,
                Arc::clone(&deps.block_types),
                Arc::new(Utc::now),
            )
        });

        scheduler.start();
        delivery.start();

        Self {
            scheduler,
            delivery,
            actions,
            pause_subscription,
        }
    }

    /// Entry point for the host shell's notification action callback.
    pub fn actions(&self) -> &ActionHandler<B, N, P> {
        &self.actions
    }

    /// Manual reconciliation trigger, e.g. after a bulk import.
    pub fn request_reconcile(&self) {
        self.scheduler.request_debounced_tick();
    }

    /// Stop timers and subscriptions. In-flight ticks complete; calling
    /// twice is harmless.
    pub fn stop(&mut self) {
        self.scheduler.stop();
        self.delivery.stop();
        if let Some(subscription) = self.pause_subscription.take() {
            subscription.unsubscribe();
        }
    }

    /// Restart after a `stop`, reusing the wired dependencies.
    pub fn restart(&self) {
        self.scheduler.start();
        self.delivery.start();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{BlockInstance, BlockStatus, BlockType, NotificationType};
    use crate::infrastructure::block_repository::InMemoryBlockRepository;
    use crate::infrastructure::block_type_repository::InMemoryBlockTypeRepository;
    use crate::infrastructure::change_feed::{BlockChange, ChangeEvent, InMemoryChangeFeed};
    use crate::infrastructure::notification_repository::InMemoryNotificationRepository;
    use crate::infrastructure::notifier::RecordingNotificationSurface;
    use crate::infrastructure::preferences_repository::InMemoryPreferencesRepository;
    use chrono::{DateTime, Duration, Utc};
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn full_stack_delivers_pause_alert_end_to_end() {
        let blocks = Arc::new(InMemoryBlockRepository::default());
        let block_types = Arc::new(InMemoryBlockTypeRepository::default());
        let notifications = Arc::new(InMemoryNotificationRepository::default());
        let preferences = Arc::new(InMemoryPreferencesRepository::default());
        let surface = Arc::new(RecordingNotificationSurface::default());
        let feed = Arc::new(InMemoryChangeFeed::default());

        block_types
            .insert_block_type(&BlockType {
                id: "bt-deep".to_string(),
                user_id: "user-1".to_string(),
                name: "Deep Work".to_string(),
                color: "#3366FF".to_string(),
                default_duration_minutes: 60,
                recurring_enabled: false,
                recurring_days_of_week: Vec::new(),
                recurring_time_of_day: None,
                recurring_weeks_in_advance: None,
            })
            .expect("seed block type");

        let settings = NotificationSettings {
            delivery_interval_ms: 25,
            schedule_interval_ms: 3_600_000,
            min_tick_interval_ms: 0,
            ..NotificationSettings::default()
        };
        let mut service = NotificationService::start(
            "user-1",
            NotificationDeps {
                blocks: Arc::clone(&blocks),
                block_types: Arc::clone(&block_types),
                notifications: Arc::clone(&notifications),
                preferences: Arc::clone(&preferences),
                surface: Arc::clone(&surface),
                change_feed: Some(Arc::clone(&feed) as Arc<dyn ChangeFeed>),
            },
            &settings,
            chrono_tz::UTC,
        );

        let now: DateTime<Utc> = Utc::now();
        let old = BlockInstance {
            id: "blk-1".to_string(),
            user_id: "user-1".to_string(),
            block_type_id: "bt-deep".to_string(),
            planned_start: now - Duration::minutes(10),
            planned_end: now + Duration::minutes(50),
            status: BlockStatus::InProgress,
            actual_start: Some(now - Duration::minutes(10)),
            actual_end: None,
            paused_until: None,
            pause_reason: None,
            notes: None,
        };
        let mut paused = old.clone();
        paused.status = BlockStatus::Paused;
        paused.paused_until = Some(now + Duration::minutes(20));
        feed.publish(&BlockChange {
            user_id: "user-1".to_string(),
            event: ChangeEvent::BlockInstance {
                old: Some(old),
                new: Some(paused),
            },
        });

        // The pause watcher enqueues an immediately-due item; the delivery
        // loop polls every 25ms and presents it.
        tokio::time::sleep(StdDuration::from_millis(150)).await;
        let sent = surface.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].title, "Block paused for meeting");
        assert_eq!(sent[0].body, "Deep Work paused due to a meeting.");

        let items = notifications.all_items().expect("items");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].notification_type, NotificationType::BlockPaused);
        assert!(items[0].sent_at.is_some());

        service.stop();
        service.stop();
    }
}
