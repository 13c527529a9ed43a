use crate::application::queue::NotificationQueueService;
use crate::application::NowProvider;
use crate::domain::models::{
    next_id, BlockInstance, BlockPayload, BlockStatus, NotificationPayload, NotificationType,
    ScheduledNotification,
};
use crate::infrastructure::block_type_repository::BlockTypeRepository;
use crate::infrastructure::change_feed::{ChangeEvent, ChangeFeed, ChangeSubscription};
use crate::infrastructure::notification_repository::NotificationRepository;
use crate::infrastructure::preferences_repository::PreferencesRepository;
use std::sync::Arc;

/// Watch the change feed for blocks transitioning into `paused` and enqueue
/// an immediate `block_paused` notification, enriched with block-type
/// display metadata. Failures are logged; a missed pause alert must not
/// take the feed down.
pub fn subscribe_pause_notifications<T, N, P>(
    change_feed: &dyn ChangeFeed,
    user_id: &str,
    queue: NotificationQueueService<N, P>,
    block_types: Arc<T>,
    now_provider: NowProvider,
) -> ChangeSubscription
where
    T: BlockTypeRepository + 'static,
    N: NotificationRepository + 'static,
    P: PreferencesRepository + 'static,
{
    let user_id = user_id.to_string();
    change_feed.subscribe(
        &user_id.clone(),
        Box::new(move |change| {
            let ChangeEvent::BlockInstance {
                old: Some(old),
                new: Some(new),
            } = &change.event
            else {
                return;
            };
            if old.status == BlockStatus::Paused || new.status != BlockStatus::Paused {
                return;
            }

            if let Err(error) = enqueue_pause_notification(
                &user_id,
                new,
                &queue,
                block_types.as_ref(),
                (now_provider)(),
            ) {
                tracing::warn!(user_id = %user_id, %error, "failed to enqueue pause notification");
            }
        }),
    )
}

fn enqueue_pause_notification<T, N, P>(
    user_id: &str,
    block: &BlockInstance,
    queue: &NotificationQueueService<N, P>,
    block_types: &T,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<(), crate::infrastructure::error::EngineError>
where
    T: BlockTypeRepository,
    N: NotificationRepository,
    P: PreferencesRepository,
{
    let meta = block_types
        .get_block_type(user_id, &block.block_type_id)
        .unwrap_or_else(|error| {
            tracing::warn!(%error, "block type lookup failed, sending unnamed pause alert");
            None
        });

    let notification = ScheduledNotification {
        id: next_id("ntf"),
        user_id: user_id.to_string(),
        notification_type: NotificationType::BlockPaused,
        target_time: now,
        payload: NotificationPayload::Block(BlockPayload {
            block_name: meta.as_ref().map(|block_type| block_type.name.clone()),
            block_color: meta.as_ref().map(|block_type| block_type.color.clone()),
            lead_minutes: None,
            block_type_id: block.block_type_id.clone(),
            block_instance_id: block.id.clone(),
            start_time: block.planned_start,
        }),
        created_at: now,
    };
    queue.enqueue(user_id, std::slice::from_ref(&notification))
}
