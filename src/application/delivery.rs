use crate::application::queue::NotificationQueueService;
use crate::application::NowProvider;
use crate::domain::models::{NotificationPayload, NotificationQueueItem, NotificationType};
use crate::infrastructure::error::EngineError;
use crate::infrastructure::notification_repository::NotificationRepository;
use crate::infrastructure::notifier::NotificationSurface;
use crate::infrastructure::preferences_repository::PreferencesRepository;
use crate::infrastructure::storage::encode_timestamp;
use chrono::Utc;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct DeliveryRunnerOptions {
    pub interval_ms: u64,
}

impl Default for DeliveryRunnerOptions {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
        }
    }
}

/// Polls the queue for due notifications and dispatches them to the OS
/// surface. The whole batch is marked sent only after every dispatch
/// succeeded, so a failed dispatch leaves the batch unsent and the next tick
/// retries it: at-least-once delivery, not exactly-once.
pub struct DeliveryRunner<N, P, S>
where
    N: NotificationRepository + 'static,
    P: PreferencesRepository + 'static,
    S: NotificationSurface + 'static,
{
    inner: Arc<DeliveryInner<N, P, S>>,
    interval_task: Mutex<Option<JoinHandle<()>>>,
}

struct DeliveryInner<N, P, S>
where
    N: NotificationRepository,
    P: PreferencesRepository,
    S: NotificationSurface,
{
    user_id: String,
    queue: NotificationQueueService<N, P>,
    surface: Arc<S>,
    options: DeliveryRunnerOptions,
    now_provider: NowProvider,
    running: AtomicBool,
}

impl<N, P, S> DeliveryInner<N, P, S>
where
    N: NotificationRepository,
    P: PreferencesRepository,
    S: NotificationSurface,
{
    async fn tick(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        if let Err(error) = self.deliver_due().await {
            tracing::warn!(user_id = %self.user_id, %error, "delivery tick failed");
        }

        self.running.store(false, Ordering::SeqCst);
    }

    async fn deliver_due(&self) -> Result<(), EngineError> {
        let now = (self.now_provider)();
        let due = self.queue.list_due(&self.user_id, now)?;
        if due.is_empty() {
            return Ok(());
        }

        let granted = self.ensure_permission().await;
        if granted {
            // Ascending target-time order, straight from the queue.
            for item in &due {
                self.dispatch(item).await?;
            }
        } else {
            tracing::warn!(
                user_id = %self.user_id,
                count = due.len(),
                "notification permission denied, skipping delivery"
            );
        }

        let ids: Vec<String> = due.iter().map(|item| item.id.clone()).collect();
        self.queue.mark_sent(&ids, (self.now_provider)())
    }

    async fn ensure_permission(&self) -> bool {
        if self.surface.is_permission_granted().await {
            return true;
        }
        self.surface.request_permission().await
    }

    async fn dispatch(&self, item: &NotificationQueueItem) -> Result<(), EngineError> {
        let title = resolve_title(item.notification_type);
        let body = resolve_body(item);
        let extra = build_extra(item)?;
        self.surface.send(title, &body, extra).await
    }
}

pub(crate) fn resolve_title(notification_type: NotificationType) -> &'static str {
    match notification_type {
        NotificationType::BlockUpcoming => "Block starting soon",
        NotificationType::BlockStart => "Block in progress",
        NotificationType::BlockPaused => "Block paused for meeting",
        NotificationType::BlockResumed => "Block resumed",
        NotificationType::Standup => "Daily standup reminder",
    }
}

pub(crate) fn resolve_body(item: &NotificationQueueItem) -> String {
    match (&item.notification_type, &item.payload) {
        (NotificationType::BlockUpcoming, NotificationPayload::Block(payload)) => {
            format!(
                "{} begins in {} minutes.",
                block_name(payload.block_name.as_deref()),
                payload.lead_minutes.unwrap_or(10)
            )
        }
        (NotificationType::BlockStart, NotificationPayload::Block(payload)) => {
            format!("{} is starting now.", block_name(payload.block_name.as_deref()))
        }
        (NotificationType::BlockPaused, NotificationPayload::Block(payload)) => {
            format!(
                "{} paused due to a meeting.",
                block_name(payload.block_name.as_deref())
            )
        }
        (NotificationType::BlockResumed, _) => {
            "Meeting ended, your block has resumed.".to_string()
        }
        (NotificationType::Standup, NotificationPayload::Standup(payload)) => {
            format!("Standup starts at {}.", payload.time)
        }
        _ => "You have a new update.".to_string(),
    }
}

fn block_name(name: Option<&str>) -> &str {
    name.unwrap_or("Scheduled block")
}

/// Payload fields plus delivery context, handed back through notification
/// actions.
fn build_extra(item: &NotificationQueueItem) -> Result<Value, EngineError> {
    let mut extra = match serde_json::to_value(&item.payload)? {
        Value::Object(map) => map,
        other => {
            let mut map = serde_json::Map::new();
            map.insert("payload".to_string(), other);
            map
        }
    };
    extra.insert(
        "type".to_string(),
        Value::String(item.notification_type.as_str().to_string()),
    );
    extra.insert("queue_item_id".to_string(), Value::String(item.id.clone()));
    extra.insert(
        "target_time".to_string(),
        Value::String(encode_timestamp(item.target_time)),
    );
    Ok(Value::Object(extra))
}

impl<N, P, S> DeliveryRunner<N, P, S>
where
    N: NotificationRepository + 'static,
    P: PreferencesRepository + 'static,
    S: NotificationSurface + 'static,
{
    pub fn new(
        user_id: impl Into<String>,
        queue: NotificationQueueService<N, P>,
        surface: Arc<S>,
        options: DeliveryRunnerOptions,
    ) -> Self {
        Self {
            inner: Arc::new(DeliveryInner {
                user_id: user_id.into(),
                queue,
                surface,
                options,
                now_provider: Arc::new(Utc::now),
                running: AtomicBool::new(false),
            }),
            interval_task: Mutex::new(None),
        }
    }

    pub fn with_now_provider(self, now_provider: NowProvider) -> Self {
        let inner = Arc::new(DeliveryInner {
            user_id: self.inner.user_id.clone(),
            queue: self.inner.queue.clone(),
            surface: Arc::clone(&self.inner.surface),
            options: self.inner.options.clone(),
            now_provider,
            running: AtomicBool::new(false),
        });
        Self { inner, ..self }
    }

    pub async fn tick(&self) {
        self.inner.tick().await;
    }

    /// Idempotent: interval loop plus one immediate tick.
    pub fn start(&self) {
        let Ok(mut interval_task) = self.interval_task.lock() else {
            return;
        };
        if interval_task.is_some() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let interval_ms = inner.options.interval_ms.max(1);
        *interval_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                inner.tick().await;
            }
        }));
    }

    pub fn stop(&self) {
        if let Ok(mut interval_task) = self.interval_task.lock() {
            if let Some(task) = interval_task.take() {
                task.abort();
            }
        }
    }
}
