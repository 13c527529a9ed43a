use crate::application::queue::NotificationQueueService;
use crate::application::NowProvider;
use crate::domain::models::block_type_meta_map;
use crate::infrastructure::block_repository::BlockRepository;
use crate::infrastructure::block_type_repository::BlockTypeRepository;
use crate::infrastructure::change_feed::{ChangeFeed, ChangeSubscription};
use crate::infrastructure::error::EngineError;
use crate::infrastructure::notification_repository::NotificationRepository;
use crate::infrastructure::preferences_repository::PreferencesRepository;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct SchedulerRunnerOptions {
    pub interval_ms: u64,
    pub lookahead_minutes: i64,
    pub debounce_ms: u64,
    pub min_tick_interval_ms: u64,
}

impl Default for SchedulerRunnerOptions {
    fn default() -> Self {
        Self {
            interval_ms: 60_000,
            lookahead_minutes: 60,
            debounce_ms: 3_000,
            min_tick_interval_ms: 5_000,
        }
    }
}

/// Recurring reconciliation loop: re-derives notifications for the rolling
/// lookahead window on a fixed interval and on debounced change events.
/// Ticks are reentrancy-guarded and throttled; failures are logged and the
/// next tick retries against current state.
pub struct SchedulerRunner<B, T, N, P>
where
    B: BlockRepository + 'static,
    T: BlockTypeRepository + 'static,
    N: NotificationRepository + 'static,
    P: PreferencesRepository + 'static,
{
    inner: Arc<RunnerInner<B, T, N, P>>,
    change_feed: Option<Arc<dyn ChangeFeed>>,
    interval_task: Mutex<Option<JoinHandle<()>>>,
    subscription: Mutex<Option<ChangeSubscription>>,
}

struct RunnerInner<B, T, N, P>
where
    B: BlockRepository,
    T: BlockTypeRepository,
    N: NotificationRepository,
    P: PreferencesRepository,
{
    user_id: String,
    queue: NotificationQueueService<N, P>,
    blocks: Arc<B>,
    block_types: Arc<T>,
    options: SchedulerRunnerOptions,
    now_provider: NowProvider,
    running: AtomicBool,
    last_completed: Mutex<Option<DateTime<Utc>>>,
    debounce_task: Mutex<Option<JoinHandle<()>>>,
}

impl<B, T, N, P> RunnerInner<B, T, N, P>
where
    B: BlockRepository + 'static,
    T: BlockTypeRepository + 'static,
    N: NotificationRepository + 'static,
    P: PreferencesRepository + 'static,
{
    async fn tick(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        if self.throttled() {
            self.running.store(false, Ordering::SeqCst);
            return;
        }

        if let Err(error) = self.run_once() {
            tracing::warn!(user_id = %self.user_id, %error, "scheduler tick failed");
        }

        if let Ok(mut last_completed) = self.last_completed.lock() {
            *last_completed = Some((self.now_provider)());
        }
        self.running.store(false, Ordering::SeqCst);
    }

    fn throttled(&self) -> bool {
        let Ok(last_completed) = self.last_completed.lock() else {
            return false;
        };
        let Some(last) = *last_completed else {
            return false;
        };
        let elapsed = (self.now_provider)() - last;
        elapsed < ChronoDuration::milliseconds(self.options.min_tick_interval_ms as i64)
    }

    fn run_once(&self) -> Result<(), EngineError> {
        let now = (self.now_provider)();
        let cutoff = now + ChronoDuration::minutes(self.options.lookahead_minutes);

        let blocks = self
            .blocks
            .list_blocks_starting_in_range(&self.user_id, now, cutoff)?;
        let block_types = self.block_types.list_block_types(&self.user_id)?;
        let type_meta = block_type_meta_map(&block_types);

        self.queue.schedule_blocks(
            &self.user_id,
            &blocks,
            now,
            self.options.lookahead_minutes,
            Some(&type_meta),
        )
    }

    fn request_debounced_tick(inner: &Arc<Self>) {
        let Ok(mut debounce_task) = inner.debounce_task.lock() else {
            return;
        };
        if let Some(previous) = debounce_task.take() {
            previous.abort();
        }
        let task_inner = Arc::clone(inner);
        *debounce_task = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(task_inner.options.debounce_ms)).await;
            task_inner.tick().await;
        }));
    }
}

impl<B, T, N, P> SchedulerRunner<B, T, N, P>
where
    B: BlockRepository + 'static,
    T: BlockTypeRepository + 'static,
    N: NotificationRepository + 'static,
    P: PreferencesRepository + 'static,
{
    pub fn new(
        user_id: impl Into<String>,
        queue: NotificationQueueService<N, P>,
        blocks: Arc<B>,
        block_types: Arc<T>,
        options: SchedulerRunnerOptions,
    ) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                user_id: user_id.into(),
                queue,
                blocks,
                block_types,
                options,
                now_provider: Arc::new(Utc::now),
                running: AtomicBool::new(false),
                last_completed: Mutex::new(None),
                debounce_task: Mutex::new(None),
            }),
            change_feed: None,
            interval_task: Mutex::new(None),
            subscription: Mutex::new(None),
        }
    }

    pub fn with_change_feed(mut self, change_feed: Arc<dyn ChangeFeed>) -> Self {
        self.change_feed = Some(change_feed);
        self
    }

    pub fn with_now_provider(self, now_provider: NowProvider) -> Self {
        let inner = Arc::new(RunnerInner {
            user_id: self.inner.user_id.clone(),
            queue: self.inner.queue.clone(),
            blocks: Arc::clone(&self.inner.blocks),
            block_types: Arc::clone(&self.inner.block_types),
            options: self.inner.options.clone(),
            now_provider,
            running: AtomicBool::new(false),
            last_completed: Mutex::new(None),
            debounce_task: Mutex::new(None),
        });
        Self { inner, ..self }
    }

    pub async fn tick(&self) {
        self.inner.tick().await;
    }

    /// Restart the debounce timer; only a quiet period of `debounce_ms`
    /// lets the pending tick fire. Bursty change feeds collapse to one run.
    pub fn request_debounced_tick(&self) {
        RunnerInner::request_debounced_tick(&self.inner);
    }

    /// Idempotent: sets up the interval loop (first tick immediate) and the
    /// change-feed subscription if one was attached.
    pub fn start(&self) {
        {
            let Ok(mut interval_task) = self.interval_task.lock() else {
                return;
            };
            if interval_task.is_some() {
                return;
            }
            let inner = Arc::clone(&self.inner);
            *interval_task = Some(tokio::spawn(async move {
                let mut ticker =
                    tokio::time::interval(Duration::from_millis(inner.options.interval_ms.max(1)));
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    inner.tick().await;
                }
            }));
        }

        if let Some(change_feed) = &self.change_feed {
            let inner = Arc::clone(&self.inner);
            let subscription = change_feed.subscribe(
                &self.inner.user_id,
                Box::new(move |_change| {
                    RunnerInner::request_debounced_tick(&inner);
                }),
            );
            if let Ok(mut slot) = self.subscription.lock() {
                *slot = Some(subscription);
            }
        }
    }

    /// Idempotent: tears down the interval loop, any pending debounce and
    /// the subscription. An in-flight tick is allowed to complete.
    pub fn stop(&self) {
        if let Ok(mut interval_task) = self.interval_task.lock() {
            if let Some(task) = interval_task.take() {
                task.abort();
            }
        }
        if let Ok(mut debounce_task) = self.inner.debounce_task.lock() {
            if let Some(task) = debounce_task.take() {
                task.abort();
            }
        }
        if let Ok(mut subscription) = self.subscription.lock() {
            if let Some(subscription) = subscription.take() {
                subscription.unsubscribe();
            }
        }
    }
}
